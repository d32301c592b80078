//! Node connection handler
//!
//! Serves one authenticated peer: reads one command at a time and answers
//! it from the registry, streaming file content as independently encrypted
//! chunks.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::crypto::PayloadCipher;
use crate::error::ShareError;
use crate::protocol::{issue_challenge, wire, Message};
use crate::registry::{FileRegistry, SharedFile};

/// Plaintext bytes per encrypted chunk
pub const CHUNK_SIZE: u64 = 64 * 1024;

/// A peer that sends nothing for this long is dropped
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Serves protocol commands to a single authenticated peer
pub struct NodeConnection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<FileRegistry>,
    cipher: PayloadCipher,
}

impl NodeConnection {
    /// Wrap an accepted socket
    pub fn new(stream: TcpStream, peer_addr: SocketAddr, registry: Arc<FileRegistry>, cipher: PayloadCipher) -> Self {
        Self {
            stream,
            peer_addr,
            registry,
            cipher,
        }
    }

    /// Authenticate the peer, then answer commands until it disconnects
    ///
    /// Errors are scoped to this connection; the caller only logs them.
    pub async fn serve(mut self) -> Result<()> {
        issue_challenge(&mut self.stream, &self.cipher).await.map_err(|e| {
            debug!("Authentication with {} failed: {}", self.peer_addr, e);
            e
        })?;
        info!("Peer {} authenticated", self.peer_addr);

        loop {
            let message = match timeout(IDLE_TIMEOUT, wire::read_message(&mut self.stream)).await {
                Err(_) => {
                    info!("Peer {} idle, closing connection", self.peer_addr);
                    return Ok(());
                }
                Ok(Err(e)) => {
                    // Tell the peer why before dropping a malformed command
                    if let Some(err) = e.downcast_ref::<ShareError>() {
                        if matches!(err, ShareError::ProtocolError { .. }) {
                            let _ = wire::write_message(&mut self.stream, &Message::error_frame(err)).await;
                        }
                    }
                    return Err(e);
                }
                Ok(Ok(None)) => {
                    debug!("Peer {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Ok(Ok(Some(message))) => message,
            };

            match message {
                Message::List => self.handle_list().await?,
                Message::Search { query } => self.handle_search(&query).await?,
                Message::Download { name, offset } => {
                    // An error reply ends the connection; a served download
                    // loops back for the next command.
                    if !self.handle_download(&name, offset).await? {
                        return Ok(());
                    }
                }
                other => {
                    let err = ShareError::protocol_error_with_source(
                        "Unexpected command",
                        format!("{:?}", other.message_id()),
                    );
                    warn!("Peer {} sent unexpected {:?}", self.peer_addr, other.message_id());
                    wire::write_message(&mut self.stream, &Message::error_frame(&err)).await?;
                    return Err(err.into());
                }
            }
        }
    }

    async fn handle_list(&mut self) -> Result<()> {
        let files: Vec<_> = self.registry.list().await.iter().map(SharedFile::meta).collect();
        debug!("Peer {} listed {} files", self.peer_addr, files.len());
        wire::write_message(&mut self.stream, &Message::FileList { files }).await
    }

    async fn handle_search(&mut self, query: &str) -> Result<()> {
        let files: Vec<_> = self.registry.find(query).await.iter().map(SharedFile::meta).collect();
        debug!("Peer {} searched '{}': {} matches", self.peer_addr, query, files.len());
        wire::write_message(&mut self.stream, &Message::FileList { files }).await
    }

    /// Stream a file from the given offset; returns whether the connection
    /// should stay open for further commands
    async fn handle_download(&mut self, name: &str, offset: u64) -> Result<bool> {
        let Some(file) = self.registry.get(name).await else {
            let err = ShareError::file_not_found(name);
            info!("Peer {} requested unknown file '{}'", self.peer_addr, name);
            wire::write_message(&mut self.stream, &Message::error_frame(&err)).await?;
            return Ok(false);
        };

        if offset > file.size {
            let err = ShareError::protocol_error_with_source(
                "Download offset past end of file",
                format!("offset {} vs size {}", offset, file.size),
            );
            wire::write_message(&mut self.stream, &Message::error_frame(&err)).await?;
            return Ok(false);
        }

        info!(
            "Streaming '{}' to {} from offset {} ({} bytes total)",
            name, self.peer_addr, offset, file.size
        );

        // The registry may change under us mid-stream; we keep serving the
        // bytes we started from and let the client's finalize checksum be
        // the safety net.
        let mut source = fs::File::open(&file.path).await.map_err(|e| {
            ShareError::storage_error_full("Failed to open shared file", file.path.display().to_string(), e.to_string())
        })?;
        source.seek(std::io::SeekFrom::Start(offset)).await.map_err(|e| {
            ShareError::storage_error_full("Failed to seek shared file", file.path.display().to_string(), e.to_string())
        })?;

        let mut position = offset;
        let mut buf = vec![0u8; CHUNK_SIZE as usize];
        loop {
            let n = source.read(&mut buf).await.map_err(|e| {
                ShareError::storage_error_full("Failed to read shared file", file.path.display().to_string(), e.to_string())
            })?;
            if n == 0 {
                break;
            }

            let (nonce, payload) = self.cipher.encrypt(&buf[..n])?;
            let chunk = Message::Chunk {
                start: position,
                end: position + n as u64,
                nonce,
                payload,
            };
            wire::write_message(&mut self.stream, &chunk).await?;
            position += n as u64;
        }

        wire::write_message(&mut self.stream, &Message::EndOfStream).await?;
        debug!("Finished streaming '{}' to {}: [{}, {})", name, self.peer_addr, offset, position);
        Ok(true)
    }
}
