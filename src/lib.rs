// Copyright (c) 2026 Adrian Robinson. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.

//! # sketch-state-store
//!
//! A fault-tolerant state store that estimates per-key frequencies over an
//! unbounded stream with a Count-Min sketch, and rebuilds itself after a
//! restart by replaying an ordered changelog.

pub mod config;
pub mod enums;
pub mod log;
pub mod probabilistic;
pub mod store;
pub mod traits;
pub mod transformer;

// Re-export core traits
pub use traits::{ReplayLog, StoreError};

pub use config::StoreConfig;
pub use enums::{DurabilityMode, StoreState};
pub use log::{FileLog, InMemoryLog, LogEntry};
pub use probabilistic::CountMinSketch;
pub use store::{CountMinStore, SharedStore};
pub use transformer::{tokenize, CountTransformer};
