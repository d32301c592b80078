//! Node server
//!
//! Accepts inbound connections and runs one independent handler task per
//! peer. A misbehaving connection never takes the server down.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::crypto::PayloadCipher;
use crate::error::ShareError;
use crate::node::connection::NodeConnection;
use crate::registry::FileRegistry;

/// Listens for peers and serves the shared directory
pub struct NodeServer {
    listener: TcpListener,
    registry: Arc<FileRegistry>,
    cipher: PayloadCipher,
}

impl NodeServer {
    /// Bind the listening socket
    pub async fn bind(addr: &str, registry: Arc<FileRegistry>, cipher: PayloadCipher) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!("Failed to bind {}: {}", addr, e);
            ShareError::connection_error_full("Failed to bind listener", addr.to_string(), e.to_string())
        })?;
        info!("Node listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            registry,
            cipher,
        })
    }

    /// The locally bound address (useful when binding port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever
    pub async fn serve(self) -> Result<()> {
        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };
            info!("Connection from {}", peer_addr);

            let connection = NodeConnection::new(stream, peer_addr, self.registry.clone(), self.cipher.clone());
            tokio::spawn(async move {
                if let Err(e) = connection.serve().await {
                    warn!("Connection with {} ended with error: {}", peer_addr, e);
                } else {
                    info!("Connection with {} closed", peer_addr);
                }
            });
        }
    }
}
