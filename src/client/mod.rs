//! Client module
//!
//! Connects to a node, authenticates, issues commands, and drives
//! downloads to completion with resume support.

pub mod connection;
pub mod download;

// Re-export main types
pub use connection::{ClientConnection, ReceivedChunk};
pub use download::{DownloadState, Downloader};
