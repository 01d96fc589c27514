// Copyright (c) 2026 Adrian Robinson. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.

//! Store configuration.
//!
//! # Example
//!
//! ```
//! use sketch_state_store::{DurabilityMode, StoreConfig};
//!
//! let config = StoreConfig::from_json(r#"{"depth": 4, "width": 1000, "durability": "sync"}"#).unwrap();
//! assert_eq!(config.depth, 4);
//! assert_eq!(config.durability, DurabilityMode::Sync);
//! ```

use crate::enums::DurabilityMode;
use crate::probabilistic::CountMinSketch;
use crate::traits::StoreError;
use serde::{Deserialize, Serialize};

/// Rows in the default sketch: δ = e^-5 ≈ 0.0067.
pub const DEFAULT_DEPTH: usize = 5;
/// Counters per row in the default sketch: ε = e / 2719 ≈ 0.001.
pub const DEFAULT_WIDTH: usize = 2719;
pub const DEFAULT_SEED: u64 = 0x5EED_C0DE_2026_0001;
/// Appends between automatic flushes in async durability mode.
pub const DEFAULT_FLUSH_INTERVAL: usize = 1000;

/// Sizing and durability settings for a [`CountMinStore`](crate::CountMinStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Number of hash functions (rows).
    pub depth: usize,
    /// Number of counters per row.
    pub width: usize,
    /// Base seed for the per-row hash functions. Every replica and every
    /// restart of a store must use the same seed.
    pub seed: u64,
    pub durability: DurabilityMode,
    /// Ignored in `Sync` mode. `0` disables automatic flushing.
    pub flush_interval: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            width: DEFAULT_WIDTH,
            seed: DEFAULT_SEED,
            durability: DurabilityMode::Sync,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl StoreConfig {
    pub fn new(depth: usize, width: usize) -> Self {
        Self {
            depth,
            width,
            ..Self::default()
        }
    }

    /// Sizes the sketch for relative error `epsilon` with confidence `1 - delta`.
    pub fn with_error_bounds(epsilon: f64, delta: f64) -> Result<Self, StoreError> {
        Ok(Self::new(
            CountMinSketch::suggest_depth(delta)?,
            CountMinSketch::suggest_width(epsilon)?,
        ))
    }

    pub fn durability(mut self, durability: DurabilityMode) -> Self {
        self.durability = durability;
        self
    }

    pub fn flush_interval(mut self, flush_interval: usize) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Parses a JSON document; absent fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| StoreError::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects empty sketches and sketches larger than
    /// [`CountMinSketch::MAX_CELLS`] counters.
    pub fn validate(&self) -> Result<(), StoreError> {
        CountMinSketch::check_dimensions(self.depth, self.width)
    }

    /// Builds an empty sketch with this configuration's dimensions and seed.
    pub fn build_sketch(&self) -> Result<CountMinSketch, StoreError> {
        CountMinSketch::new(self.depth, self.width, self.seed)
    }
}
