// Copyright (c) 2026 Adrian Robinson. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.

//! Replay Log implementations
//!
//! A store appends one [`LogEntry`] per `put` and rebuilds its sketch after a
//! restart by replaying every entry in order.
//!
//! # File Layout
//!
//! [`FileLog`] keeps one changelog per store name, `<dir>/<name>.changelog`,
//! as a sequence of frames:
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │ length: u32 LE                   │
//! │ checksum: u32 LE (CRC32)         │
//! │ payload: bincode(LogEntry)       │
//! ├──────────────────────────────────┤
//! │ Frame 1 ...                      │
//! └──────────────────────────────────┘
//! ```
//!
//! A truncated final frame is a torn write from a crash: it is dropped on
//! open. A checksum mismatch on a complete frame, or a length above
//! [`MAX_FRAME_LEN`], is corruption and fails the read.

use crate::traits::{ReplayLog, StoreError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Frame overhead: length(4) + checksum(4)
pub const FRAME_HEADER_SIZE: usize = 8;

/// Largest payload a frame may declare. A torn tail is therefore never
/// longer than one header plus this many bytes.
pub const MAX_FRAME_LEN: usize = 1 << 20;

pub const CHANGELOG_EXTENSION: &str = "changelog";

/// One observation of a key, as recorded in the replay log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogEntry {
    pub key: Vec<u8>,
    /// Record timestamp supplied by the processing engine.
    pub timestamp: i64,
}

impl LogEntry {
    pub fn new(key: impl Into<Vec<u8>>, timestamp: i64) -> Self {
        Self {
            key: key.into(),
            timestamp,
        }
    }

    /// Encodes the entry as a checksummed frame.
    pub fn encode_frame(&self) -> Result<Vec<u8>, StoreError> {
        let payload =
            bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))?;
        if payload.len() > MAX_FRAME_LEN {
            return Err(StoreError::Serialization(format!(
                "log entry of {} bytes exceeds the {} byte frame limit",
                payload.len(),
                MAX_FRAME_LEN
            )));
        }
        let len = payload.len() as u32;

        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }
}

/// Decodes consecutive frames from `data`.
///
/// Returns the decoded entries and the number of bytes they occupy. Decoding
/// stops without error at a truncated trailing frame. A frame declaring more
/// than [`MAX_FRAME_LEN`] bytes is a corrupted header, not a torn write, and
/// fails with [`StoreError::Deserialization`].
pub fn decode_frames(data: &[u8]) -> Result<(Vec<LogEntry>, usize), StoreError> {
    let mut entries = Vec::new();
    let mut offset = 0;

    while data.len() - offset >= FRAME_HEADER_SIZE {
        let header = &data[offset..offset + FRAME_HEADER_SIZE];
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let checksum = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if len > MAX_FRAME_LEN {
            return Err(StoreError::Deserialization(format!(
                "log frame at offset {} declares {} bytes, above the {} byte limit",
                offset, len, MAX_FRAME_LEN
            )));
        }

        let start = offset + FRAME_HEADER_SIZE;
        let Some(end) = start.checked_add(len).filter(|&end| end <= data.len()) else {
            break;
        };

        let payload = &data[start..end];
        if crc32fast::hash(payload) != checksum {
            return Err(StoreError::Deserialization(format!(
                "checksum mismatch in log frame at offset {}",
                offset
            )));
        }
        let entry: LogEntry = bincode::deserialize(payload)
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        entries.push(entry);
        offset = end;
    }

    Ok((entries, offset))
}

/// Rejects names that cannot safely namespace a changelog file.
pub fn validate_store_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::InvalidConfiguration(
            "store name must not be empty".into(),
        ));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(StoreError::InvalidConfiguration(format!(
            "store name '{}' must not contain path components",
            name
        )));
    }
    Ok(())
}

// ============================================================================
// In-Memory Log
// ============================================================================

#[derive(Debug, Default)]
struct MemoryLogInner {
    durable: Vec<LogEntry>,
    pending: Vec<LogEntry>,
    flushes: u64,
    fail_appends: bool,
}

/// Replay log held in memory.
///
/// Clones share the same underlying log, so a handle kept outside a store can
/// reopen the log after the store is closed. Appends stay pending until
/// `flush`; only flushed entries are returned by `read_all`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLog {
    inner: Arc<Mutex<MemoryLogInner>>,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log that already holds `entries` as durable history.
    pub fn with_entries(entries: Vec<LogEntry>) -> Self {
        let log = Self::new();
        log.inner.lock().durable = entries;
        log
    }

    pub fn durable_len(&self) -> usize {
        self.inner.lock().durable.len()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn flush_count(&self) -> u64 {
        self.inner.lock().flushes
    }

    /// Snapshot of the durable entries.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.inner.lock().durable.clone()
    }

    /// Drops every unflushed entry, as a process crash would.
    pub fn crash(&self) {
        self.inner.lock().pending.clear();
    }

    /// Makes subsequent appends fail with an I/O error until reset.
    pub fn set_fail_appends(&self, fail: bool) {
        self.inner.lock().fail_appends = fail;
    }
}

impl ReplayLog for InMemoryLog {
    fn append(&mut self, entry: &LogEntry) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.fail_appends {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::Other,
                "in-memory log rejected append",
            )));
        }
        inner.pending.push(entry.clone());
        Ok(())
    }

    fn read_all(&mut self) -> Result<Vec<LogEntry>, StoreError> {
        Ok(self.inner.lock().durable.clone())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let pending = std::mem::take(&mut inner.pending);
        inner.durable.extend(pending);
        inner.flushes += 1;
        Ok(())
    }

    fn is_empty(&mut self) -> Result<bool, StoreError> {
        Ok(self.inner.lock().durable.is_empty())
    }
}

// ============================================================================
// File Log
// ============================================================================

/// Replay log persisted to a single append-only file per store name.
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileLog {
    /// Opens (or creates) `<dir>/<store_name>.changelog`.
    ///
    /// A torn trailing frame left by a crash is truncated away so that new
    /// appends start on a frame boundary.
    pub fn open(dir: impl AsRef<Path>, store_name: &str) -> Result<Self, StoreError> {
        validate_store_name(store_name)?;
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.{}", store_name, CHANGELOG_EXTENSION));

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let existing = fs::read(&path)?;
        let (entries, valid_len) = decode_frames(&existing)?;
        if valid_len < existing.len() {
            warn!(
                path = %path.display(),
                entries = entries.len(),
                dropped_bytes = existing.len() - valid_len,
                "truncating torn changelog tail"
            );
            file.set_len(valid_len as u64)?;
            file.sync_data()?;
        }

        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReplayLog for FileLog {
    fn append(&mut self, entry: &LogEntry) -> Result<(), StoreError> {
        let frame = entry.encode_frame()?;
        self.writer.write_all(&frame)?;
        Ok(())
    }

    fn read_all(&mut self) -> Result<Vec<LogEntry>, StoreError> {
        self.writer.flush()?;
        let data = fs::read(&self.path)?;
        let (entries, valid_len) = decode_frames(&data)?;
        if valid_len < data.len() {
            warn!(
                path = %self.path.display(),
                dropped_bytes = data.len() - valid_len,
                "ignoring torn changelog tail"
            );
        }
        Ok(entries)
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        debug!(path = %self.path.display(), "changelog synced");
        Ok(())
    }

    /// Checks the file length only. `open` has already dropped any torn tail.
    fn is_empty(&mut self) -> Result<bool, StoreError> {
        self.writer.flush()?;
        Ok(self.writer.get_ref().metadata()?.len() == 0)
    }
}
