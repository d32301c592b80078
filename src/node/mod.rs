//! Node module
//!
//! The serving side: accepts peer connections, authenticates them, and
//! answers protocol commands from the file registry.

pub mod connection;
pub mod server;

// Re-export main types
pub use connection::{NodeConnection, CHUNK_SIZE};
pub use server::NodeServer;
