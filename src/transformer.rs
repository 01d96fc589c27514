// Copyright (c) 2026 Adrian Robinson. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.

//! Per-record binding between a processing engine and a [`CountMinStore`].
//!
//! The engine owns the store; the binding borrows it from `init` until
//! `close` and never constructs or closes it.
//!
//! # Example
//!
//! ```
//! use sketch_state_store::{CountMinStore, CountTransformer, InMemoryLog, StoreConfig};
//!
//! let mut store = CountMinStore::open("words", &StoreConfig::new(4, 1000), InMemoryLog::new()).unwrap();
//! let mut transformer = CountTransformer::new();
//! transformer.init(&mut store).unwrap();
//!
//! let emitted = transformer.process_line(None, "Hello Kafka, hello streams", 42).unwrap();
//! assert_eq!(emitted[2], ("hello".to_string(), 2));
//! transformer.close();
//! ```

use crate::store::CountMinStore;
use crate::traits::{ReplayLog, StoreError};
use tracing::debug;

/// Emits `(value, estimate)` for every record it processes.
#[derive(Debug)]
pub struct CountTransformer<'a, L: ReplayLog> {
    store: Option<&'a mut CountMinStore<L>>,
    initialized: bool,
}

impl<L: ReplayLog> Default for CountTransformer<'_, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, L: ReplayLog> CountTransformer<'a, L> {
    pub fn new() -> Self {
        Self {
            store: None,
            initialized: false,
        }
    }

    /// Binds the store. Must be called exactly once, before `process`.
    pub fn init(&mut self, store: &'a mut CountMinStore<L>) -> Result<(), StoreError> {
        if self.initialized {
            return Err(StoreError::IllegalStoreState(
                "transformer is already bound to a store".into(),
            ));
        }
        debug!(store = %store.name(), "transformer bound");
        self.store = Some(store);
        self.initialized = true;
        Ok(())
    }

    /// Counts `value` and returns it paired with its updated estimate.
    ///
    /// The record key is not used. Store errors are returned unchanged.
    pub fn process(
        &mut self,
        _raw_key: Option<&[u8]>,
        value: &str,
        timestamp: i64,
    ) -> Result<(String, u64), StoreError> {
        let store = self.store.as_deref_mut().ok_or_else(|| {
            StoreError::IllegalStoreState("transformer is not bound to a store".into())
        })?;
        let estimate = store.put(value, timestamp)?;
        Ok((value.to_string(), estimate))
    }

    /// Splits `line` into lowercase words and processes each in order.
    ///
    /// Stops at the first failing word; words before it have been counted.
    pub fn process_line(
        &mut self,
        raw_key: Option<&[u8]>,
        line: &str,
        timestamp: i64,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        tokenize(line)
            .map(|word| self.process(raw_key, &word, timestamp))
            .collect()
    }

    pub fn is_bound(&self) -> bool {
        self.store.is_some()
    }

    /// Releases the store reference. The store itself stays open.
    pub fn close(&mut self) {
        if self.store.take().is_some() {
            debug!("transformer released store");
        }
    }
}

/// Lowercase words of `line`, split on every non-alphanumeric character.
pub fn tokenize(line: &str) -> impl Iterator<Item = String> + '_ {
    line.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}
