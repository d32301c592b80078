//! Download driver
//!
//! Drives one download to completion through its state machine, resuming
//! from persisted progress. A connection drop leaves the session
//! interrupted on disk; a later run re-enters the same gap logic and never
//! re-requests bytes that were already recorded.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::client::connection::ClientConnection;
use crate::crypto::PayloadCipher;
use crate::error::ShareError;
use crate::resume::{DownloadSession, ResumeStore, SessionState};

/// States of one download invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    /// Session not yet opened
    Init,
    /// Establishing the TCP connection
    Connecting,
    /// Running the challenge/response handshake
    Authenticating,
    /// Fetching the listing and issuing the download command
    Requesting,
    /// Receiving and recording chunks
    Receiving,
    /// Checking the assembled file against the expected checksum
    Verifying,
    /// Download verified and moved into the downloads area
    Complete,
    /// Connection lost mid-transfer; the session is persisted for resume
    Interrupted,
    /// Unrecoverable for this invocation
    Failed,
}

impl DownloadState {
    /// Whether this state ends the invocation
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadState::Complete | DownloadState::Interrupted | DownloadState::Failed
        )
    }
}

/// Drives downloads against one node
pub struct Downloader {
    addr: SocketAddr,
    cipher: PayloadCipher,
    store: ResumeStore,
    state: DownloadState,
}

impl Downloader {
    /// Create a downloader for a node address
    pub fn new(addr: SocketAddr, cipher: PayloadCipher, store: ResumeStore) -> Self {
        Self {
            addr,
            cipher,
            store,
            state: DownloadState::Init,
        }
    }

    /// Current state of the last (or running) invocation
    pub fn state(&self) -> DownloadState {
        self.state
    }

    /// Download a file to the downloads area, resuming prior progress
    ///
    /// `on_progress` is called with (received, expected) after every
    /// recorded chunk. Returns the final path on success.
    pub async fn run<F>(&mut self, name: &str, mut on_progress: F) -> Result<PathBuf>
    where
        F: FnMut(u64, u64),
    {
        self.state = DownloadState::Connecting;
        let mut conn = match ClientConnection::open(self.addr, self.cipher.clone()).await {
            Ok(conn) => conn,
            Err(e) => {
                self.state = DownloadState::Failed;
                return Err(e);
            }
        };

        self.state = DownloadState::Authenticating;
        if let Err(e) = conn.authenticate().await {
            self.state = DownloadState::Failed;
            return Err(e);
        }

        self.state = DownloadState::Requesting;
        let meta = match conn.file_meta(name).await {
            Ok(meta) => meta,
            Err(e) => {
                self.state = DownloadState::Failed;
                return Err(e);
            }
        };

        let mut session = match self.store.open(name, meta.size, &meta.checksum).await {
            Ok(session) => session,
            Err(e) => {
                self.state = DownloadState::Failed;
                return Err(e);
            }
        };
        info!(
            "Downloading '{}': {} bytes, {} already recorded",
            name,
            meta.size,
            session.received_bytes()
        );
        on_progress(session.received_bytes(), meta.size);

        while let Some(gap) = session.next_gap() {
            debug!("Next gap for '{}': [{}, {})", name, gap.start, gap.end);
            if let Err(e) = conn.request_download(name, gap.start).await {
                return self.interrupt(&mut session, e).await;
            }

            self.state = DownloadState::Receiving;
            let received_before = session.received_bytes();

            loop {
                match conn.next_chunk().await {
                    Ok(Some(chunk)) => {
                        if let Err(e) = self
                            .store
                            .record_range(&mut session, chunk.start, chunk.end, &chunk.data)
                            .await
                        {
                            return self.fail(&mut session, e).await;
                        }
                        on_progress(session.received_bytes(), meta.size);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let retryable = e
                            .downcast_ref::<ShareError>()
                            .map_or(false, |err| err.is_retryable());
                        return if retryable {
                            self.interrupt(&mut session, e).await
                        } else {
                            // Tampered chunk or protocol violation: nothing
                            // from the bad chunk was recorded
                            self.fail(&mut session, e).await
                        };
                    }
                }
            }

            // The stream ended without closing the gap; the remote file is
            // shorter than its listing claimed
            if session.received_bytes() == received_before && session.next_gap().is_some() {
                let err = ShareError::incomplete_transfer(name, session.received_bytes(), meta.size);
                return self.fail(&mut session, err.into()).await;
            }
        }

        self.state = DownloadState::Verifying;
        match self.store.finalize(&mut session).await {
            Ok(path) => {
                self.state = DownloadState::Complete;
                on_progress(meta.size, meta.size);
                Ok(path)
            }
            Err(e) => {
                // On checksum mismatch the store has already marked the
                // session failed and kept the partial file
                self.state = DownloadState::Failed;
                Err(e)
            }
        }
    }

    /// Persist the session as interrupted and surface a retryable error
    async fn interrupt(&mut self, session: &mut DownloadSession, err: anyhow::Error) -> Result<PathBuf> {
        warn!("Transfer of '{}' interrupted: {}", session.filename, err);
        self.state = DownloadState::Interrupted;
        session.state = SessionState::Interrupted;
        if let Err(persist_err) = self.store.persist(session).await {
            warn!("Failed to persist interrupted session: {}", persist_err);
        }
        Err(err)
    }

    /// Persist what was validly recorded, then fail the invocation
    async fn fail(&mut self, session: &mut DownloadSession, err: anyhow::Error) -> Result<PathBuf> {
        warn!("Transfer of '{}' failed: {}", session.filename, err);
        self.state = DownloadState::Failed;
        session.state = SessionState::Interrupted;
        if let Err(persist_err) = self.store.persist(session).await {
            warn!("Failed to persist session: {}", persist_err);
        }
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::derive_key;
    use crate::node::NodeServer;
    use crate::protocol::{issue_challenge, wire, Message};
    use crate::registry::{FileEvent, FileRegistry};
    use sha2::{Digest, Sha256};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    fn test_root(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("fileshare_download_{}", name));
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(root.join("share")).unwrap();
        root
    }

    fn cipher_for(secret: &str) -> PayloadCipher {
        PayloadCipher::new(&derive_key(secret).unwrap())
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn store_for(root: &PathBuf) -> ResumeStore {
        ResumeStore::new(root.join("state"), root.join("downloads"))
    }

    async fn start_node(root: &PathBuf, secret: &str) -> SocketAddr {
        let share_dir = root.join("share");
        let registry = Arc::new(FileRegistry::new(share_dir.clone()));
        let mut entries = std::fs::read_dir(&share_dir).unwrap().collect::<Vec<_>>();
        entries.sort_by_key(|e| e.as_ref().unwrap().path());
        for entry in entries {
            let path = entry.unwrap().path();
            if path.is_file() {
                registry.apply(FileEvent::Added(path)).await.unwrap();
            }
        }
        let server = NodeServer::bind("127.0.0.1:0", registry, cipher_for(secret)).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.serve());
        addr
    }

    #[tokio::test]
    async fn test_end_to_end_download() {
        let root = test_root("end_to_end");
        // More than one chunk of content
        let content = patterned(200 * 1024);
        std::fs::write(root.join("share").join("big.bin"), &content).unwrap();
        let addr = start_node(&root, "secret-123").await;

        let mut downloader = Downloader::new(addr, cipher_for("secret-123"), store_for(&root));
        let path = downloader.run("big.bin", |_, _| {}).await.unwrap();

        assert_eq!(downloader.state(), DownloadState::Complete);
        assert_eq!(std::fs::read(path).unwrap(), content);

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_progress_callback_reaches_total() {
        let root = test_root("progress");
        let content = patterned(150 * 1024);
        std::fs::write(root.join("share").join("a.bin"), &content).unwrap();
        let addr = start_node(&root, "secret-123").await;

        let mut last = (0u64, 0u64);
        let mut downloader = Downloader::new(addr, cipher_for("secret-123"), store_for(&root));
        downloader
            .run("a.bin", |received, total| last = (received, total))
            .await
            .unwrap();

        assert_eq!(last, (content.len() as u64, content.len() as u64));

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_resume_equivalence_at_boundaries() {
        // A download interrupted after [0, k) then resumed must be
        // byte-identical to an uninterrupted one
        let content = patterned(100 * 1024);
        let checksum = hex::encode(Sha256::digest(&content));

        for (label, k) in [("zero", 0usize), ("one", 1), ("half", content.len() / 2), ("full", content.len())] {
            let root = test_root(&format!("resume_{}", label));
            std::fs::write(root.join("share").join("a.bin"), &content).unwrap();
            let addr = start_node(&root, "secret-123").await;
            let store = store_for(&root);

            // Simulate a prior attempt that recorded exactly [0, k)
            if k > 0 {
                let mut session = store.open("a.bin", content.len() as u64, &checksum).await.unwrap();
                store
                    .record_range(&mut session, 0, k as u64, &content[..k])
                    .await
                    .unwrap();
                session.state = SessionState::Interrupted;
                store.persist(&mut session).await.unwrap();
            }

            let mut downloader = Downloader::new(addr, cipher_for("secret-123"), store);
            let path = downloader.run("a.bin", |_, _| {}).await.unwrap();

            assert_eq!(downloader.state(), DownloadState::Complete, "k = {}", k);
            assert_eq!(std::fs::read(path).unwrap(), content, "k = {}", k);

            let _ = std::fs::remove_dir_all(root);
        }
    }

    #[tokio::test]
    async fn test_wrong_secret_fails_before_any_command() {
        let root = test_root("wrong_secret");
        std::fs::write(root.join("share").join("a.bin"), b"data").unwrap();
        let addr = start_node(&root, "server-secret").await;

        let mut downloader = Downloader::new(addr, cipher_for("other-secret"), store_for(&root));
        let err = downloader.run("a.bin", |_, _| {}).await.unwrap_err();

        let err = err.downcast::<ShareError>().unwrap();
        assert!(matches!(err, ShareError::AuthenticationFailed { .. }));
        assert_eq!(downloader.state(), DownloadState::Failed);
        // No session was ever created
        assert!(store_for(&root).list().await.unwrap().is_empty());

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let root = test_root("missing");
        let addr = start_node(&root, "secret-123").await;

        let mut downloader = Downloader::new(addr, cipher_for("secret-123"), store_for(&root));
        let err = downloader.run("ghost.bin", |_, _| {}).await.unwrap_err();

        let err = err.downcast::<ShareError>().unwrap();
        assert!(matches!(err, ShareError::FileNotFound { .. }));
        assert_eq!(downloader.state(), DownloadState::Failed);

        let _ = std::fs::remove_dir_all(root);
    }

    /// A node that authenticates correctly, then misbehaves while streaming
    async fn start_evil_node(
        secret: &str,
        meta_size: u64,
        meta_checksum: String,
        chunks: Vec<Message>,
        drop_after: bool,
    ) -> SocketAddr {
        let cipher = cipher_for(secret);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            issue_challenge(&mut stream, &cipher).await.unwrap();

            loop {
                let Some(message) = wire::read_message(&mut stream).await.unwrap() else {
                    return;
                };
                match message {
                    Message::List => {
                        let files = vec![crate::registry::FileMeta {
                            name: "a.bin".to_string(),
                            size: meta_size,
                            checksum: meta_checksum.clone(),
                            modified: 0,
                        }];
                        wire::write_message(&mut stream, &Message::FileList { files }).await.unwrap();
                    }
                    Message::Download { .. } => {
                        for chunk in &chunks {
                            wire::write_message(&mut stream, chunk).await.unwrap();
                        }
                        if drop_after {
                            return;
                        }
                        wire::write_message(&mut stream, &Message::EndOfStream).await.unwrap();
                    }
                    _ => return,
                }
            }
        });

        addr
    }

    #[tokio::test]
    async fn test_tampered_chunk_aborts_without_recording() {
        let root = test_root("tampered");
        let content = patterned(1024);
        let checksum = hex::encode(Sha256::digest(&content));
        let cipher = cipher_for("secret-123");

        // A validly encrypted chunk with one flipped ciphertext byte
        let (nonce, mut payload) = cipher.encrypt(&content).unwrap();
        payload[10] ^= 0xFF;
        let tampered = Message::Chunk {
            start: 0,
            end: content.len() as u64,
            nonce,
            payload,
        };

        let addr = start_evil_node("secret-123", content.len() as u64, checksum, vec![tampered], false).await;

        let store = store_for(&root);
        let mut downloader = Downloader::new(addr, cipher, store.clone());
        let err = downloader.run("a.bin", |_, _| {}).await.unwrap_err();

        let err = err.downcast::<ShareError>().unwrap();
        assert!(matches!(err, ShareError::AuthenticationFailed { .. }));
        assert_eq!(downloader.state(), DownloadState::Failed);

        // The corrupted range was never recorded
        let sessions = store.list().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].received_bytes(), 0);

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_connection_drop_interrupts_and_resume_completes() {
        let root = test_root("drop_resume");
        let content = patterned(64 * 1024);
        let checksum = hex::encode(Sha256::digest(&content));
        let cipher = cipher_for("secret-123");

        // First attempt: node sends 16 KiB then drops the connection
        let (nonce, payload) = cipher.encrypt(&content[..16 * 1024]).unwrap();
        let first_chunk = Message::Chunk {
            start: 0,
            end: 16 * 1024,
            nonce,
            payload,
        };
        let addr = start_evil_node(
            "secret-123",
            content.len() as u64,
            checksum.clone(),
            vec![first_chunk],
            true,
        )
        .await;

        let store = store_for(&root);
        let mut downloader = Downloader::new(addr, cipher.clone(), store.clone());
        let err = downloader.run("a.bin", |_, _| {}).await.unwrap_err();

        let err = err.downcast::<ShareError>().unwrap();
        assert!(err.is_retryable());
        assert_eq!(downloader.state(), DownloadState::Interrupted);

        let sessions = store.list().await.unwrap();
        assert_eq!(sessions[0].state, SessionState::Interrupted);
        assert_eq!(sessions[0].received_bytes(), 16 * 1024);

        // Second attempt against a well-behaved node resumes from the gap
        std::fs::write(root.join("share").join("a.bin"), &content).unwrap();
        let good_addr = start_node(&root, "secret-123").await;
        let mut downloader = Downloader::new(good_addr, cipher, store);
        let path = downloader.run("a.bin", |_, _| {}).await.unwrap();

        assert_eq!(downloader.state(), DownloadState::Complete);
        assert_eq!(std::fs::read(path).unwrap(), content);

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_fails_and_retains_partial() {
        let root = test_root("bad_checksum");
        let content = patterned(8 * 1024);
        // The node lists a checksum that does not match what it streams
        let wrong_checksum = hex::encode(Sha256::digest(b"something else"));
        let cipher = cipher_for("secret-123");

        let (nonce, payload) = cipher.encrypt(&content).unwrap();
        let chunk = Message::Chunk {
            start: 0,
            end: content.len() as u64,
            nonce,
            payload,
        };
        let addr = start_evil_node("secret-123", content.len() as u64, wrong_checksum, vec![chunk], false).await;

        let store = store_for(&root);
        let mut downloader = Downloader::new(addr, cipher, store.clone());
        let err = downloader.run("a.bin", |_, _| {}).await.unwrap_err();

        let err = err.downcast::<ShareError>().unwrap();
        assert!(matches!(err, ShareError::ChecksumMismatch { .. }));
        assert_eq!(downloader.state(), DownloadState::Failed);

        // Session and partial file retained for inspection
        let sessions = store.list().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].state, SessionState::Failed);
        assert!(store.partial_path("a.bin").exists());

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn test_terminal_states() {
        assert!(DownloadState::Complete.is_terminal());
        assert!(DownloadState::Interrupted.is_terminal());
        assert!(DownloadState::Failed.is_terminal());
        assert!(!DownloadState::Receiving.is_terminal());
        assert!(!DownloadState::Init.is_terminal());
    }
}
