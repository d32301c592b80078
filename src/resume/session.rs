//! Download session module
//!
//! Tracks which byte ranges of a download have been received and verified.
//! The interval set is kept sorted and disjoint at all times; adjacent and
//! overlapping intervals coalesce on insert.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::ShareError;

/// A half-open byte interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Create a range; `start` must be below `end`
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start < end);
        Self { start, end }
    }

    /// Length of the range in bytes
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the range is empty
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Persisted state of one download session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// A transfer attempt is (or was last) actively receiving
    InProgress,
    /// The last transfer attempt lost its connection mid-stream
    Interrupted,
    /// All bytes received and the full-file checksum verified
    Complete,
    /// Verification failed; partial file retained for inspection
    Failed,
}

/// One download's progress, keyed by filename
///
/// Mirrored on disk by the resume store after every recorded chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSession {
    /// Remote file name this session downloads
    pub filename: String,
    /// Size captured from the node's listing at session start
    pub expected_size: u64,
    /// Checksum captured from the node's listing at session start
    pub expected_checksum: String,
    /// Sorted, disjoint intervals already written and persisted
    pub received: Vec<ByteRange>,
    /// Session lifecycle state
    pub state: SessionState,
    /// Last metadata update, seconds since the epoch
    pub updated_at: u64,
}

impl DownloadSession {
    /// Create a fresh session with nothing received
    pub fn new(filename: impl Into<String>, expected_size: u64, expected_checksum: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            expected_size,
            expected_checksum: expected_checksum.into(),
            received: Vec::new(),
            state: SessionState::InProgress,
            updated_at: 0,
        }
    }

    /// Merge a received interval into the set
    ///
    /// Coalesces with any adjacent or overlapping intervals; merging an
    /// exact duplicate is a no-op. Rejects empty intervals and intervals
    /// reaching past the expected size.
    pub fn merge_range(&mut self, start: u64, end: u64) -> Result<()> {
        if start >= end {
            return Err(ShareError::protocol_error_with_source(
                "Invalid byte range",
                format!("[{}, {})", start, end),
            )
            .into());
        }
        if end > self.expected_size {
            return Err(ShareError::protocol_error_with_source(
                "Byte range exceeds expected size",
                format!("[{}, {}) vs {}", start, end, self.expected_size),
            )
            .into());
        }

        let mut merged = ByteRange::new(start, end);
        let mut result: Vec<ByteRange> = Vec::with_capacity(self.received.len() + 1);

        for range in &self.received {
            if range.end < merged.start || range.start > merged.end {
                // Disjoint and not adjacent
                result.push(*range);
            } else {
                // Overlapping or touching: absorb into the merged interval
                merged.start = merged.start.min(range.start);
                merged.end = merged.end.max(range.end);
            }
        }

        result.push(merged);
        result.sort_by_key(|r| r.start);
        self.received = result;
        Ok(())
    }

    /// First byte range not yet received, bounded by the expected size
    ///
    /// `None` means every byte is present (verification still required).
    pub fn next_gap(&self) -> Option<ByteRange> {
        let mut cursor = 0u64;
        for range in &self.received {
            if range.start > cursor {
                return Some(ByteRange::new(cursor, range.start));
            }
            cursor = cursor.max(range.end);
        }
        if cursor < self.expected_size {
            Some(ByteRange::new(cursor, self.expected_size))
        } else {
            None
        }
    }

    /// Total bytes received so far
    pub fn received_bytes(&self) -> u64 {
        self.received.iter().map(|r| r.len()).sum()
    }

    /// Whether the union of received intervals covers the whole file
    pub fn is_fully_received(&self) -> bool {
        self.next_gap().is_none()
    }

    /// Fraction received (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.expected_size == 0 {
            return 1.0;
        }
        self.received_bytes() as f64 / self.expected_size as f64
    }

    /// Serialize to bytes
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Deserialize from bytes
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}
