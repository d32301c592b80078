//! Resume module
//!
//! Persists partial-download state so interrupted transfers continue
//! without re-sending bytes that already arrived.

pub mod session;
pub mod store;

// Re-export main types
pub use session::{ByteRange, DownloadSession, SessionState};
pub use store::ResumeStore;
