//! Resume store module
//!
//! Durable persistence for download sessions: one JSON metadata file plus
//! one partial data file per session, both named by the SHA-256 of the
//! remote filename so any registry name is filesystem-safe. Metadata is
//! replaced atomically (write temp, rename) only after chunk data has been
//! written and synced, so a crash can never claim bytes that were not
//! stored.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::ShareError;
use crate::registry::hash_file;
use crate::resume::session::{DownloadSession, SessionState};

/// Suffix of session metadata files
const SESSION_SUFFIX: &str = "session";

/// Suffix of partial data files
const PARTIAL_SUFFIX: &str = "part";

/// Sessions untouched for this long are pruned when listed
const STALE_SESSION_SECS: u64 = 7 * 24 * 60 * 60;

/// Durable store for download sessions and their partial files
#[derive(Debug, Clone)]
pub struct ResumeStore {
    /// Directory holding session metadata and partial files
    state_dir: PathBuf,
    /// Directory completed downloads are moved into
    downloads_dir: PathBuf,
}

impl ResumeStore {
    /// Create a store rooted at the given directories
    pub fn new(state_dir: PathBuf, downloads_dir: PathBuf) -> Self {
        Self {
            state_dir,
            downloads_dir,
        }
    }

    /// The directory completed downloads are moved into
    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    fn stem(filename: &str) -> String {
        hex::encode(Sha256::digest(filename.as_bytes()))
    }

    fn session_path(&self, filename: &str) -> PathBuf {
        self.state_dir.join(format!("{}.{}", Self::stem(filename), SESSION_SUFFIX))
    }

    /// Path of the on-disk partial file for a session
    pub fn partial_path(&self, filename: &str) -> PathBuf {
        self.state_dir.join(format!("{}.{}", Self::stem(filename), PARTIAL_SUFFIX))
    }

    async fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.state_dir).await.map_err(|e| {
            ShareError::storage_error_full("Failed to create state directory", self.state_dir.display().to_string(), e.to_string())
        })?;
        fs::create_dir_all(&self.downloads_dir).await.map_err(|e| {
            ShareError::storage_error_full(
                "Failed to create downloads directory",
                self.downloads_dir.display().to_string(),
                e.to_string(),
            )
        })?;
        Ok(())
    }

    /// Open a session for a file, resuming prior progress when it matches
    ///
    /// A stored session whose expected size or checksum differs is
    /// discarded along with its partial file: the remote file changed and
    /// the old bytes cannot be trusted.
    pub async fn open(&self, filename: &str, expected_size: u64, expected_checksum: &str) -> Result<DownloadSession> {
        self.ensure_dirs().await?;

        let session_path = self.session_path(filename);
        if let Ok(data) = fs::read(&session_path).await {
            match DownloadSession::deserialize(&data) {
                Ok(mut existing)
                    if existing.expected_size == expected_size
                        && existing.expected_checksum == expected_checksum
                        && existing.state != SessionState::Complete =>
                {
                    if fs::metadata(self.partial_path(filename)).await.is_ok() {
                        info!(
                            "Resuming session for '{}': {}/{} bytes already received",
                            filename,
                            existing.received_bytes(),
                            expected_size
                        );
                        existing.state = SessionState::InProgress;
                        return Ok(existing);
                    }
                    warn!("Partial file for '{}' is missing, starting over", filename);
                    self.cleanup(filename).await?;
                }
                Ok(_) => {
                    info!("Stored session for '{}' no longer matches the remote file, starting over", filename);
                    self.cleanup(filename).await?;
                }
                Err(e) => {
                    warn!("Discarding unreadable session for '{}': {}", filename, e);
                    self.cleanup(filename).await?;
                }
            }
        }

        // Fresh session: preallocate the partial file so chunks can land at
        // any offset
        let partial_path = self.partial_path(filename);
        let partial = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&partial_path)
            .await
            .map_err(|e| {
                ShareError::storage_error_full("Failed to create partial file", partial_path.display().to_string(), e.to_string())
            })?;
        partial.set_len(expected_size).await.map_err(|e| {
            ShareError::storage_error_full("Failed to size partial file", partial_path.display().to_string(), e.to_string())
        })?;

        let mut session = DownloadSession::new(filename, expected_size, expected_checksum);
        self.persist(&mut session).await?;
        debug!("Opened fresh session for '{}' ({} bytes)", filename, expected_size);
        Ok(session)
    }

    /// Record one verified chunk
    ///
    /// Writes the data at its offset, syncs it, merges the interval, then
    /// atomically replaces the session metadata. Only after this returns is
    /// the range considered received.
    pub async fn record_range(&self, session: &mut DownloadSession, start: u64, end: u64, data: &[u8]) -> Result<()> {
        if data.len() as u64 != end.saturating_sub(start) {
            return Err(ShareError::protocol_error_with_source(
                "Chunk length does not match its range",
                format!("range [{}, {}), {} bytes", start, end, data.len()),
            )
            .into());
        }
        // Validate against session invariants before touching disk
        let mut probe = session.clone();
        probe.merge_range(start, end)?;

        let partial_path = self.partial_path(&session.filename);
        let mut partial = fs::OpenOptions::new()
            .write(true)
            .open(&partial_path)
            .await
            .map_err(|e| {
                ShareError::storage_error_full("Failed to open partial file", partial_path.display().to_string(), e.to_string())
            })?;
        partial
            .seek(std::io::SeekFrom::Start(start))
            .await
            .map_err(|e| {
                ShareError::storage_error_full("Failed to seek in partial file", partial_path.display().to_string(), e.to_string())
            })?;
        partial.write_all(data).await.map_err(|e| {
            ShareError::storage_error_full("Failed to write partial file", partial_path.display().to_string(), e.to_string())
        })?;
        partial.sync_data().await.map_err(|e| {
            ShareError::storage_error_full("Failed to sync partial file", partial_path.display().to_string(), e.to_string())
        })?;

        *session = probe;
        self.persist(session).await?;
        Ok(())
    }

    /// Verify the assembled file and move it into the downloads area
    ///
    /// On checksum mismatch the session is marked failed and the partial
    /// file is retained for inspection, never auto-deleted.
    pub async fn finalize(&self, session: &mut DownloadSession) -> Result<PathBuf> {
        if !session.is_fully_received() {
            return Err(ShareError::incomplete_transfer(
                session.filename.clone(),
                session.received_bytes(),
                session.expected_size,
            )
            .into());
        }

        let partial_path = self.partial_path(&session.filename);
        let actual = hash_file(&partial_path).await?;
        if !actual.eq_ignore_ascii_case(&session.expected_checksum) {
            session.state = SessionState::Failed;
            self.persist(session).await?;
            warn!(
                "Checksum mismatch for '{}': expected {}, got {}",
                session.filename, session.expected_checksum, actual
            );
            return Err(ShareError::checksum_mismatch(session.filename.clone(), session.expected_checksum.clone(), actual).into());
        }

        let final_path = self.downloads_dir.join(&session.filename);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                ShareError::storage_error_full("Failed to create download directory", parent.display().to_string(), e.to_string())
            })?;
        }
        fs::rename(&partial_path, &final_path).await.map_err(|e| {
            ShareError::storage_error_full("Failed to move completed download", final_path.display().to_string(), e.to_string())
        })?;

        session.state = SessionState::Complete;
        let session_path = self.session_path(&session.filename);
        if let Err(e) = fs::remove_file(&session_path).await {
            warn!("Failed to remove completed session metadata: {}", e);
        }

        info!("Completed download '{}' -> {}", session.filename, final_path.display());
        Ok(final_path)
    }

    /// All stored sessions, pruning ones untouched for over a week
    pub async fn list(&self) -> Result<Vec<DownloadSession>> {
        let mut sessions = Vec::new();
        if !self.state_dir.exists() {
            return Ok(sessions);
        }

        let now = now_secs();
        let mut entries = fs::read_dir(&self.state_dir).await.map_err(|e| {
            ShareError::storage_error_full("Failed to read state directory", self.state_dir.display().to_string(), e.to_string())
        })?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            ShareError::storage_error_full("Failed to read state entry", self.state_dir.display().to_string(), e.to_string())
        })? {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != SESSION_SUFFIX) {
                continue;
            }
            let Ok(data) = fs::read(&path).await else {
                continue;
            };
            match DownloadSession::deserialize(&data) {
                Ok(session) => {
                    if now.saturating_sub(session.updated_at) > STALE_SESSION_SECS {
                        info!("Pruning stale session for '{}'", session.filename);
                        let _ = self.cleanup(&session.filename).await;
                        continue;
                    }
                    sessions.push(session);
                }
                Err(e) => warn!("Skipping unreadable session file {}: {}", path.display(), e),
            }
        }

        sessions.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(sessions)
    }

    /// Remove a session's partial file and metadata
    pub async fn cleanup(&self, filename: &str) -> Result<bool> {
        let mut removed = false;
        for path in [self.session_path(filename), self.partial_path(filename)] {
            match fs::remove_file(&path).await {
                Ok(_) => removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ShareError::storage_error_full(
                        "Failed to remove session file",
                        path.display().to_string(),
                        e.to_string(),
                    )
                    .into())
                }
            }
        }
        if removed {
            debug!("Cleaned up session for '{}'", filename);
        }
        Ok(removed)
    }

    /// Persist session metadata atomically (write temp file, then rename)
    pub async fn persist(&self, session: &mut DownloadSession) -> Result<()> {
        session.updated_at = now_secs();
        let session_path = self.session_path(&session.filename);
        let tmp_path = session_path.with_extension("session.tmp");

        let data = session.serialize()?;
        let mut tmp = fs::File::create(&tmp_path).await.map_err(|e| {
            ShareError::storage_error_full("Failed to create session temp file", tmp_path.display().to_string(), e.to_string())
        })?;
        tmp.write_all(&data).await.map_err(|e| {
            ShareError::storage_error_full("Failed to write session temp file", tmp_path.display().to_string(), e.to_string())
        })?;
        tmp.sync_all().await.map_err(|e| {
            ShareError::storage_error_full("Failed to sync session temp file", tmp_path.display().to_string(), e.to_string())
        })?;
        drop(tmp);

        fs::rename(&tmp_path, &session_path).await.map_err(|e| {
            ShareError::storage_error_full("Failed to replace session metadata", session_path.display().to_string(), e.to_string())
        })?;
        Ok(())
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
