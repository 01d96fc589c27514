// Copyright (c) 2026 Adrian Robinson. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.

//! Count-Min State Store
//!
//! Wraps one [`CountMinSketch`] with a name, a replay log and a lifecycle:
//!
//! ```text
//!  Created ──init──▶ Restoring ──restore──▶ Serving ──close──▶ Closed
//!     │                                        ▲
//!     └───────────── init (empty log) ─────────┘
//! ```
//!
//! Every `put` is appended to the log before the sketch is touched, and
//! `restore` replays the log in append order, so a restored sketch is
//! counter-for-counter identical to the one that produced the log.
//!
//! # Concurrency
//!
//! [`CountMinStore`] assumes one processing task drives it (single writer,
//! one reader at a time) and does no locking of its own. Use
//! [`SharedStore`] when several callers must share one store.
//!
//! # Example
//!
//! ```
//! use sketch_state_store::{CountMinStore, InMemoryLog, StoreConfig, StoreState};
//!
//! let log = InMemoryLog::new();
//! let mut store = CountMinStore::open("word-counts", &StoreConfig::new(4, 1000), log.clone()).unwrap();
//! assert_eq!(store.state(), StoreState::Serving);
//!
//! store.put("kafka", 1).unwrap();
//! assert_eq!(store.put("kafka", 2).unwrap(), 2);
//! store.close().unwrap();
//!
//! let mut reopened = CountMinStore::open("word-counts", &StoreConfig::new(4, 1000), log).unwrap();
//! assert_eq!(reopened.state(), StoreState::Restoring);
//! reopened.restore_from_log(None).unwrap();
//! assert_eq!(reopened.get("kafka").unwrap(), 2);
//! ```

use crate::config::StoreConfig;
use crate::enums::{DurabilityMode, StoreState};
use crate::log::{validate_store_name, LogEntry};
use crate::probabilistic::CountMinSketch;
use crate::traits::{ReplayLog, StoreError};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Entries replayed between deadline checks during a bounded restore.
const DEADLINE_CHECK_INTERVAL: u64 = 256;

/// Durable, restorable frequency store backed by a Count-Min sketch.
#[derive(Debug)]
pub struct CountMinStore<L: ReplayLog> {
    name: String,
    sketch: CountMinSketch,
    total_count: u64,
    /// Released on close.
    log: Option<L>,
    state: StoreState,
    durability: DurabilityMode,
    flush_interval: usize,
    /// Appends since the last flush.
    unflushed: usize,
}

impl<L: ReplayLog> CountMinStore<L> {
    /// Creates a store in the `Created` state. The log is not read until
    /// [`init`](Self::init).
    ///
    /// # Errors
    /// [`StoreError::InvalidConfiguration`] for a bad name or sketch dimensions.
    pub fn new(name: impl Into<String>, config: &StoreConfig, log: L) -> Result<Self, StoreError> {
        let name = name.into();
        validate_store_name(&name)?;
        config.validate()?;

        Ok(Self {
            sketch: config.build_sketch()?,
            name,
            total_count: 0,
            log: Some(log),
            state: StoreState::Created,
            durability: config.durability,
            flush_interval: config.flush_interval,
            unflushed: 0,
        })
    }

    /// Creates and initializes a store in one step.
    pub fn open(name: impl Into<String>, config: &StoreConfig, log: L) -> Result<Self, StoreError> {
        let mut store = Self::new(name, config, log)?;
        store.init()?;
        Ok(store)
    }

    /// Probes the replay log and moves to `Restoring` if it holds prior
    /// entries, or straight to `Serving` if it is empty.
    pub fn init(&mut self) -> Result<StoreState, StoreError> {
        match self.state {
            StoreState::Created => {}
            StoreState::Closed => return Err(StoreError::StoreClosed(self.name.clone())),
            state => {
                return Err(StoreError::IllegalStoreState(format!(
                    "store '{}' is already initialized ({})",
                    self.name, state
                )))
            }
        }

        let has_history = !self.log_mut()?.is_empty()?;
        self.state = if has_history {
            StoreState::Restoring
        } else {
            StoreState::Serving
        };

        info!(
            store = %self.name,
            has_history,
            depth = self.sketch.depth(),
            width = self.sketch.width(),
            durability = %self.durability,
            state = %self.state,
            "store initialized"
        );
        Ok(self.state)
    }

    /// Records one observation of `key` and returns its updated estimate.
    ///
    /// The entry is appended to the replay log before the sketch is
    /// incremented. A log failure is returned unchanged and leaves the sketch
    /// untouched.
    pub fn put<K: AsRef<[u8]> + ?Sized>(&mut self, key: &K, timestamp: i64) -> Result<u64, StoreError> {
        self.ensure_serving("put")?;
        let key = key.as_ref();

        self.append(&LogEntry::new(key, timestamp))?;
        self.sketch.increment(key);
        self.total_count = self.total_count.saturating_add(1);

        let estimate = self.sketch.estimate(key);
        trace!(store = %self.name, timestamp, estimate, "put");
        Ok(estimate)
    }

    /// Returns the estimated count of `key` without touching the log.
    pub fn get<K: AsRef<[u8]> + ?Sized>(&self, key: &K) -> Result<u64, StoreError> {
        self.ensure_serving("get")?;
        Ok(self.sketch.estimate(key))
    }

    /// Replays `entries` in order and starts serving.
    ///
    /// Only legal once, while `Restoring`. Returns the number of entries replayed.
    pub fn restore<I>(&mut self, entries: I) -> Result<u64, StoreError>
    where
        I: IntoIterator<Item = LogEntry>,
    {
        self.replay(entries, None)
    }

    /// Like [`restore`](Self::restore), but gives up once `timeout` elapses.
    ///
    /// On timeout nothing replayed so far is kept, the store stays
    /// `Restoring`, and [`StoreError::RestoreIncomplete`] is returned. The
    /// caller may retry with the full entry sequence.
    pub fn restore_with_timeout<I>(&mut self, entries: I, timeout: Duration) -> Result<u64, StoreError>
    where
        I: IntoIterator<Item = LogEntry>,
    {
        self.replay(entries, Instant::now().checked_add(timeout))
    }

    /// Reads the store's own replay log from the beginning and restores from it.
    ///
    /// `timeout` covers reading the log as well as replaying it.
    pub fn restore_from_log(&mut self, timeout: Option<Duration>) -> Result<u64, StoreError> {
        self.ensure_state_for_restore()?;
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let entries = self.log_mut()?.read_all()?;
        self.replay(entries, deadline)
    }

    /// Forces buffered log writes to be durable. Idempotent; the sketch is
    /// never touched.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        match self.state {
            StoreState::Closed => Err(StoreError::StoreClosed(self.name.clone())),
            StoreState::Created => Err(StoreError::IllegalStoreState(format!(
                "flush called on store '{}' before init",
                self.name
            ))),
            StoreState::Restoring | StoreState::Serving => self.flush_log(),
        }
    }

    /// Flushes and releases the replay log. Every later `put`, `get`, `flush`
    /// or `restore` fails with [`StoreError::StoreClosed`]. Closing twice is a
    /// no-op.
    ///
    /// The log handle is released even if the final flush fails; that error
    /// is still returned.
    pub fn close(&mut self) -> Result<(), StoreError> {
        if self.state == StoreState::Closed {
            return Ok(());
        }

        let result = match self.log.take() {
            Some(mut log) => log.flush(),
            None => Ok(()),
        };
        self.state = StoreState::Closed;
        self.unflushed = 0;

        info!(store = %self.name, total_count = self.total_count, "store closed");
        result
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    pub fn durability(&self) -> DurabilityMode {
        self.durability
    }

    /// Sum of all increments, live and restored.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn sketch(&self) -> &CountMinSketch {
        &self.sketch
    }

    /// Absolute over-count bound ε·N at the sketch's confidence level.
    pub fn error_bound(&self) -> f64 {
        self.sketch.relative_error() * self.total_count as f64
    }

    /// Serialized copy of the current sketch.
    pub fn snapshot(&self) -> Result<Vec<u8>, StoreError> {
        self.sketch.to_bytes()
    }

    fn replay<I>(&mut self, entries: I, deadline: Option<Instant>) -> Result<u64, StoreError>
    where
        I: IntoIterator<Item = LogEntry>,
    {
        self.ensure_state_for_restore()?;

        let started = Instant::now();
        let mut scratch = self.sketch.clone();
        let mut replayed: u64 = 0;

        for entry in entries {
            if let Some(deadline) = deadline {
                if replayed % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= deadline {
                    warn!(store = %self.name, replayed, "restore timed out");
                    return Err(StoreError::RestoreIncomplete(format!(
                        "store '{}' timed out after replaying {} entries",
                        self.name, replayed
                    )));
                }
            }
            scratch.increment(&entry.key);
            replayed += 1;
        }

        self.sketch = scratch;
        self.total_count = self.total_count.saturating_add(replayed);
        self.state = StoreState::Serving;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(store = %self.name, replayed, elapsed_ms, "store restored");
        Ok(replayed)
    }

    fn ensure_state_for_restore(&self) -> Result<(), StoreError> {
        match self.state {
            StoreState::Restoring => Ok(()),
            StoreState::Closed => Err(StoreError::StoreClosed(self.name.clone())),
            StoreState::Created => Err(StoreError::IllegalStoreState(format!(
                "restore called on store '{}' before init",
                self.name
            ))),
            StoreState::Serving => Err(StoreError::IllegalStoreState(format!(
                "store '{}' is already serving; restore is only allowed once, before live traffic",
                self.name
            ))),
        }
    }

    fn ensure_serving(&self, operation: &str) -> Result<(), StoreError> {
        match self.state {
            StoreState::Serving => Ok(()),
            StoreState::Closed => Err(StoreError::StoreClosed(self.name.clone())),
            StoreState::Restoring => Err(StoreError::RestoreIncomplete(format!(
                "{} rejected: store '{}' has not finished restoring",
                operation, self.name
            ))),
            StoreState::Created => Err(StoreError::IllegalStoreState(format!(
                "{} called on store '{}' before init",
                operation, self.name
            ))),
        }
    }

    fn append(&mut self, entry: &LogEntry) -> Result<(), StoreError> {
        self.log_mut()?.append(entry)?;
        self.unflushed += 1;

        let due = match self.durability {
            DurabilityMode::Sync => true,
            DurabilityMode::AsyncWithPeriodicFlush => {
                self.flush_interval > 0 && self.unflushed >= self.flush_interval
            }
        };
        if due {
            self.flush_log()?;
        }
        Ok(())
    }

    fn flush_log(&mut self) -> Result<(), StoreError> {
        let pending = self.unflushed;
        self.log_mut()?.flush()?;
        self.unflushed = 0;
        if self.durability == DurabilityMode::AsyncWithPeriodicFlush {
            debug!(store = %self.name, pending, "replay log flushed");
        }
        Ok(())
    }

    fn log_mut(&mut self) -> Result<&mut L, StoreError> {
        self.log
            .as_mut()
            .ok_or_else(|| StoreError::StoreClosed(self.name.clone()))
    }
}

// ============================================================================
// Shared Store
// ============================================================================

/// A [`CountMinStore`] behind a mutex, for deployments where more than one
/// caller drives the same store.
///
/// Every operation takes the lock for its whole duration, so `put` and
/// `restore` are atomic and mutually exclusive.
#[derive(Debug)]
pub struct SharedStore<L: ReplayLog> {
    inner: Arc<Mutex<CountMinStore<L>>>,
}

impl<L: ReplayLog> Clone for SharedStore<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: ReplayLog> SharedStore<L> {
    pub fn new(store: CountMinStore<L>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Locks the store for a sequence of operations, e.g. to bind a
    /// [`CountTransformer`](crate::CountTransformer) to it.
    pub fn lock(&self) -> MutexGuard<'_, CountMinStore<L>> {
        self.inner.lock()
    }

    pub fn put<K: AsRef<[u8]> + ?Sized>(&self, key: &K, timestamp: i64) -> Result<u64, StoreError> {
        self.inner.lock().put(key, timestamp)
    }

    pub fn get<K: AsRef<[u8]> + ?Sized>(&self, key: &K) -> Result<u64, StoreError> {
        self.inner.lock().get(key)
    }

    pub fn restore<I>(&self, entries: I) -> Result<u64, StoreError>
    where
        I: IntoIterator<Item = LogEntry>,
    {
        self.inner.lock().restore(entries)
    }

    pub fn restore_from_log(&self, timeout: Option<Duration>) -> Result<u64, StoreError> {
        self.inner.lock().restore_from_log(timeout)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.inner.lock().flush()
    }

    pub fn close(&self) -> Result<(), StoreError> {
        self.inner.lock().close()
    }

    pub fn state(&self) -> StoreState {
        self.inner.lock().state()
    }

    pub fn total_count(&self) -> u64 {
        self.inner.lock().total_count()
    }
}
