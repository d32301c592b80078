//! p2p-fileshare
//!
//! An encrypted P2P file sharing node and client with resumable downloads.

pub mod cli;
pub mod client;
pub mod crypto;
pub mod error;
pub mod node;
pub mod protocol;
pub mod registry;
pub mod resume;

pub use error::ShareError;

pub use cli::{CliArgs, Command, Config, ProgressDisplay, TransferStats};
pub use client::{ClientConnection, DownloadState, Downloader};
pub use crypto::{derive_key, PayloadCipher, SecretKey};
pub use node::{NodeConnection, NodeServer, CHUNK_SIZE};
pub use protocol::{Message, MessageId};
pub use registry::{DirectoryPoller, FileEvent, FileMeta, FileRegistry, SharedFile};
pub use resume::{ByteRange, DownloadSession, ResumeStore, SessionState};
