// Copyright (c) 2026 Adrian Robinson. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.

use crate::log::LogEntry;
use thiserror::Error;

/// Error type for sketch and store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("Illegal store state: {0}")]
    IllegalStoreState(String),
    #[error("Store '{0}' is closed")]
    StoreClosed(String),
    #[error("Restore incomplete: {0}")]
    RestoreIncomplete(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Replay log I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns true if re-invoking the failed operation may succeed.
    ///
    /// Only an interrupted restore qualifies; log I/O errors are surfaced
    /// unchanged and retry policy belongs to the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::RestoreIncomplete(_))
    }
}

/// Replay Log trait - the append-only, ordered changelog backing a store.
///
/// A store exclusively owns one log handle for its lifetime. Entries must be
/// returned by [`ReplayLog::read_all`] in exactly the order they were appended;
/// restored sketch contents are only reproducible under that guarantee.
///
/// # Durability
///
/// `append` may buffer. Only entries covered by a successful `flush` are
/// required to survive a crash.
pub trait ReplayLog {
    /// Appends one entry to the end of the log.
    fn append(&mut self, entry: &LogEntry) -> Result<(), StoreError>;

    /// Reads every durable entry from the beginning of the log, in append order.
    fn read_all(&mut self) -> Result<Vec<LogEntry>, StoreError>;

    /// Makes all previously appended entries durable. Must be idempotent.
    fn flush(&mut self) -> Result<(), StoreError>;

    /// Returns true if the log holds no durable entries.
    ///
    /// The default reads the whole log; implementations should override it
    /// with a cheaper check.
    fn is_empty(&mut self) -> Result<bool, StoreError> {
        Ok(self.read_all()?.is_empty())
    }
}

impl<L: ReplayLog + ?Sized> ReplayLog for Box<L> {
    fn append(&mut self, entry: &LogEntry) -> Result<(), StoreError> {
        (**self).append(entry)
    }

    fn read_all(&mut self) -> Result<Vec<LogEntry>, StoreError> {
        (**self).read_all()
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        (**self).flush()
    }

    fn is_empty(&mut self) -> Result<bool, StoreError> {
        (**self).is_empty()
    }
}
