//! Client connection module
//!
//! One authenticated connection to a node: issues protocol commands and
//! decrypts the reply stream. Every network read is bounded by a timeout.

use std::net::SocketAddr;

use anyhow::Result;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::crypto::PayloadCipher;
use crate::error::ShareError;
use crate::protocol::{answer_challenge, wire, Message};
use crate::registry::FileMeta;

/// Bound on establishing the TCP connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on waiting for any single reply frame
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// A decrypted unit of file content received from the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedChunk {
    pub start: u64,
    pub end: u64,
    pub data: Vec<u8>,
}

/// An authenticated connection to a node
pub struct ClientConnection {
    stream: TcpStream,
    addr: SocketAddr,
    cipher: PayloadCipher,
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl ClientConnection {
    /// Connect to a node and authenticate
    ///
    /// A wrong shared secret surfaces as `AuthenticationFailed`.
    pub async fn connect(addr: SocketAddr, cipher: PayloadCipher) -> Result<Self> {
        let mut connection = Self::open(addr, cipher).await?;
        connection.authenticate().await?;
        Ok(connection)
    }

    /// Establish the TCP connection without authenticating yet
    pub async fn open(addr: SocketAddr, cipher: PayloadCipher) -> Result<Self> {
        info!("Connecting to node {}", addr);
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|e| {
                warn!("Connection timeout to {}", addr);
                ShareError::connection_error_full("Connection timeout", addr.to_string(), e.to_string())
            })?
            .map_err(|e| {
                warn!("Failed to connect to {}: {}", addr, e);
                ShareError::connection_error_full("Failed to connect", addr.to_string(), e.to_string())
            })?;

        Ok(Self { stream, addr, cipher })
    }

    /// Run the challenge/response handshake
    pub async fn authenticate(&mut self) -> Result<()> {
        answer_challenge(&mut self.stream, &self.cipher).await?;
        debug!("Authenticated with node {}", self.addr);
        Ok(())
    }

    /// The node address this connection talks to
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Fetch the full file listing
    pub async fn list(&mut self) -> Result<Vec<FileMeta>> {
        wire::write_message(&mut self.stream, &Message::List).await?;
        self.read_file_list().await
    }

    /// Search for files whose names contain the query
    pub async fn search(&mut self, query: &str) -> Result<Vec<FileMeta>> {
        wire::write_message(
            &mut self.stream,
            &Message::Search {
                query: query.to_string(),
            },
        )
        .await?;
        self.read_file_list().await
    }

    /// Look up one file's metadata via the listing
    pub async fn file_meta(&mut self, name: &str) -> Result<FileMeta> {
        let files = self.list().await?;
        files
            .into_iter()
            .find(|f| f.name == name)
            .ok_or_else(|| ShareError::file_not_found(name).into())
    }

    /// Request file content starting at a byte offset
    pub async fn request_download(&mut self, name: &str, offset: u64) -> Result<()> {
        debug!("Requesting '{}' from offset {}", name, offset);
        wire::write_message(
            &mut self.stream,
            &Message::Download {
                name: name.to_string(),
                offset,
            },
        )
        .await
    }

    /// Receive and decrypt the next chunk of the current download
    ///
    /// Returns `None` at the end-of-stream marker. A chunk that fails
    /// authentication aborts with an error before anything is recorded.
    pub async fn next_chunk(&mut self) -> Result<Option<ReceivedChunk>> {
        let message = timeout(RESPONSE_TIMEOUT, wire::expect_message(&mut self.stream)).await??;
        match message {
            Message::Chunk { start, end, nonce, payload } => {
                let data = self.cipher.decrypt(&nonce, &payload)?;
                if data.len() as u64 != end.saturating_sub(start) {
                    return Err(ShareError::protocol_error_with_source(
                        "Chunk length does not match its range",
                        format!("range [{}, {}), {} bytes", start, end, data.len()),
                    )
                    .into());
                }
                Ok(Some(ReceivedChunk { start, end, data }))
            }
            Message::EndOfStream => Ok(None),
            Message::Error { kind, message } => Err(ShareError::from_kind(&kind, message).into()),
            other => Err(ShareError::protocol_error_with_source(
                "Unexpected frame during download",
                format!("{:?}", other.message_id()),
            )
            .into()),
        }
    }

    async fn read_file_list(&mut self) -> Result<Vec<FileMeta>> {
        let message = timeout(RESPONSE_TIMEOUT, wire::expect_message(&mut self.stream)).await??;
        match message {
            Message::FileList { files } => Ok(files),
            Message::Error { kind, message } => Err(ShareError::from_kind(&kind, message).into()),
            other => Err(ShareError::protocol_error_with_source(
                "Expected file list",
                format!("{:?}", other.message_id()),
            )
            .into()),
        }
    }
}
