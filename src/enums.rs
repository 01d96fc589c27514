// Copyright (c) 2026 Adrian Robinson. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.

use crate::traits::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// When appended log entries are forced durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurabilityMode {
    /// Every `put` flushes the log before the sketch is updated.
    #[default]
    Sync,
    /// `put` only buffers; the log is flushed every `flush_interval` appends
    /// and on explicit `flush`. Unflushed entries are lost on a crash.
    #[serde(alias = "async")]
    AsyncWithPeriodicFlush,
}

impl fmt::Display for DurabilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurabilityMode::Sync => write!(f, "sync"),
            DurabilityMode::AsyncWithPeriodicFlush => write!(f, "async"),
        }
    }
}

impl FromStr for DurabilityMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace(['_', '-'], "").to_lowercase().as_str() {
            "sync" => Ok(DurabilityMode::Sync),
            "async" | "asyncwithperiodicflush" => Ok(DurabilityMode::AsyncWithPeriodicFlush),
            _ => Err(StoreError::InvalidConfiguration(format!(
                "Unknown durability mode: {}",
                s
            ))),
        }
    }
}

/// Lifecycle state of a store.
///
/// `Created → Restoring → Serving → Closed`, skipping `Restoring` when the
/// replay log is empty. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreState {
    Created,
    Restoring,
    Serving,
    Closed,
}

impl fmt::Display for StoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreState::Created => write!(f, "Created"),
            StoreState::Restoring => write!(f, "Restoring"),
            StoreState::Serving => write!(f, "Serving"),
            StoreState::Closed => write!(f, "Closed"),
        }
    }
}
