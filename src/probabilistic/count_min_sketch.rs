// Copyright (c) 2026 Adrian Robinson. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.

use crate::traits::StoreError;
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;
use std::f64::consts::E;
use std::hash::Hasher;

/// Golden-ratio increment used by the splitmix64 seed sequence.
const SEED_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// Count-Min Sketch - Frequency Estimation
///
/// A probabilistic data structure for estimating the frequency of keys in a stream of data.
/// It uses a `depth × width` matrix of counters and one keyed hash function per row.
///
/// # Key Properties
///
/// - **Fixed Memory**: Uses a fixed size matrix (`width` × `depth` × 8 bytes), regardless of the number of unique keys.
/// - **Conservative**: Frequencies are never underestimated, but may be overestimated due to collisions.
/// - **Bounded Error**: With `N` total increments, `estimate(k) <= true(k) + ε·N` with probability `1 - δ`,
///   where `ε = e / width` and `δ = e^-depth`.
/// - **Mergeable**: Sketches sharing `(depth, width, hash_seeds)` merge by summing corresponding counters.
///
/// # Algebraic Properties
///
/// - **Commutativity**: Yes (Matrix addition is commutative).
/// - **Associativity**: Yes (Matrix addition is associative).
/// - **Idempotence**: **NO**. Merging the same sketch twice doubles the counts.
///
/// # Example
///
/// ```
/// use sketch_state_store::CountMinSketch;
///
/// let mut cms = CountMinSketch::new(4, 1000, 7).unwrap();
/// cms.increment("apple");
/// cms.increment("apple");
/// cms.increment("banana");
///
/// assert!(cms.estimate("apple") >= 2);
/// assert!(cms.estimate("banana") >= 1);
/// assert_eq!(cms.total(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountMinSketch {
    /// Number of hash functions (rows)
    depth: usize,
    /// Number of counters per row
    width: usize,
    /// One hash key per row
    hash_seeds: Vec<u64>,
    /// The matrix of counters (row-major)
    matrix: Vec<Vec<u64>>,
    /// Sum of all increments applied, saturating
    total: u64,
}

impl CountMinSketch {
    /// Upper bound on `depth × width` (2 GiB of counters).
    pub const MAX_CELLS: usize = 1 << 28;

    /// Creates an empty sketch with `depth` rows of `width` counters.
    ///
    /// The per-row hash seeds are derived from `seed`, so two sketches created
    /// with identical arguments hash every key to identical cells.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidConfiguration`] if `depth` or `width` is
    /// zero, or if the matrix would exceed [`Self::MAX_CELLS`] counters.
    pub fn new(depth: usize, width: usize, seed: u64) -> Result<Self, StoreError> {
        Self::check_dimensions(depth, width)?;

        Ok(Self {
            depth,
            width,
            hash_seeds: derive_seeds(seed, depth),
            matrix: vec![vec![0; width]; depth],
            total: 0,
        })
    }

    /// Creates a sketch sized for relative error `epsilon` with confidence `1 - delta`.
    pub fn with_error_bounds(epsilon: f64, delta: f64, seed: u64) -> Result<Self, StoreError> {
        Self::new(Self::suggest_depth(delta)?, Self::suggest_width(epsilon)?, seed)
    }

    /// Number of counters per row needed for relative error `epsilon`: `⌈e / ε⌉`.
    pub fn suggest_width(epsilon: f64) -> Result<usize, StoreError> {
        if !(epsilon > 0.0 && epsilon < 1.0) {
            return Err(StoreError::InvalidConfiguration(format!(
                "epsilon must be in (0, 1), got {}",
                epsilon
            )));
        }
        Self::bounded_size("width", (E / epsilon).ceil())
    }

    /// Number of rows needed for failure probability `delta`: `⌈ln(1 / δ)⌉`.
    pub fn suggest_depth(delta: f64) -> Result<usize, StoreError> {
        if !(delta > 0.0 && delta < 1.0) {
            return Err(StoreError::InvalidConfiguration(format!(
                "delta must be in (0, 1), got {}",
                delta
            )));
        }
        Ok(Self::bounded_size("depth", (1.0 / delta).ln().ceil())?.max(1))
    }

    /// Checks that a `depth × width` matrix is non-empty and allocatable.
    pub fn check_dimensions(depth: usize, width: usize) -> Result<(), StoreError> {
        if depth == 0 {
            return Err(StoreError::InvalidConfiguration(
                "sketch depth must be at least 1".into(),
            ));
        }
        if width == 0 {
            return Err(StoreError::InvalidConfiguration(
                "sketch width must be at least 1".into(),
            ));
        }
        match depth.checked_mul(width) {
            Some(cells) if cells <= Self::MAX_CELLS => Ok(()),
            _ => Err(StoreError::InvalidConfiguration(format!(
                "sketch of {}x{} exceeds the limit of {} counters",
                depth,
                width,
                Self::MAX_CELLS
            ))),
        }
    }

    fn bounded_size(what: &str, size: f64) -> Result<usize, StoreError> {
        if !size.is_finite() || size > Self::MAX_CELLS as f64 {
            return Err(StoreError::InvalidConfiguration(format!(
                "suggested {} {} exceeds the limit of {} counters",
                what,
                size,
                Self::MAX_CELLS
            )));
        }
        Ok(size as usize)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn hash_seeds(&self) -> &[u64] {
        &self.hash_seeds
    }

    /// Total number of increments applied to this sketch.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Records one occurrence of `key`.
    pub fn increment<K: AsRef<[u8]> + ?Sized>(&mut self, key: &K) {
        self.add(key, 1);
    }

    /// Records `count` occurrences of `key`.
    ///
    /// Counters saturate at `u64::MAX`. Reaching the ceiling is an invariant
    /// violation in debug builds; release builds clamp and the estimate for
    /// keys sharing that cell stops growing.
    pub fn add<K: AsRef<[u8]> + ?Sized>(&mut self, key: &K, count: u64) {
        let key = key.as_ref();
        for row in 0..self.depth {
            let col = self.column(row, key);
            let cell = &mut self.matrix[row][col];
            debug_assert!(
                cell.checked_add(count).is_some(),
                "Count-Min counter overflow in row {}",
                row
            );
            *cell = cell.saturating_add(count);
        }
        self.total = self.total.saturating_add(count);
    }

    /// Returns the estimated count of `key`, never less than its true count.
    pub fn estimate<K: AsRef<[u8]> + ?Sized>(&self, key: &K) -> u64 {
        let key = key.as_ref();
        (0..self.depth)
            .map(|row| self.matrix[row][self.column(row, key)])
            .min()
            .unwrap_or(0)
    }

    /// Merges another CountMinSketch into this one.
    ///
    /// # Arguments
    /// * `other` - The other CountMinSketch to merge.
    ///
    /// # Errors
    /// Returns [`StoreError::DimensionMismatch`] unless both sketches share
    /// depth, width and hash seeds.
    pub fn merge(&mut self, other: &Self) -> Result<(), StoreError> {
        self.check_compatible(other)?;

        for (row, other_row) in self.matrix.iter_mut().zip(&other.matrix) {
            for (cell, &count) in row.iter_mut().zip(other_row) {
                *cell = cell.saturating_add(count);
            }
        }
        self.total = self.total.saturating_add(other.total);
        Ok(())
    }

    /// Merges N sketches into a single new sketch.
    pub fn merge_all(sketches: &[Self]) -> Result<Self, StoreError> {
        let (first, rest) = sketches.split_first().ok_or_else(|| {
            StoreError::InvalidConfiguration("cannot merge an empty set of sketches".into())
        })?;

        let mut merged = first.clone();
        for sketch in rest {
            merged.merge(sketch)?;
        }
        Ok(merged)
    }

    /// Relative error ε = e / width.
    pub fn relative_error(&self) -> f64 {
        E / self.width as f64
    }

    /// Probability 1 - δ that an estimate is within the error bound.
    pub fn confidence(&self) -> f64 {
        1.0 - (-(self.depth as f64)).exp()
    }

    /// Absolute over-count bound ε·N for the current total.
    pub fn error_bound(&self) -> f64 {
        self.relative_error() * self.total as f64
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.iter().all(|row| row.iter().all(|&x| x == 0))
    }

    /// Validates the internal consistency of the sketch.
    pub fn validate(&self) -> Result<(), StoreError> {
        Self::check_dimensions(self.depth, self.width)?;
        if self.hash_seeds.len() != self.depth {
            return Err(StoreError::DimensionMismatch("Hash seed count mismatch".into()));
        }
        if self.matrix.len() != self.depth {
            return Err(StoreError::DimensionMismatch("Matrix depth mismatch".into()));
        }
        if self.matrix.iter().any(|row| row.len() != self.width) {
            return Err(StoreError::DimensionMismatch("Matrix width mismatch".into()));
        }
        Ok(())
    }

    /// Serializes the whole sketch, counters and seeds included.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, StoreError> {
        let sketch: Self =
            bincode::deserialize(data).map_err(|e| StoreError::Deserialization(e.to_string()))?;
        sketch.validate()?;
        Ok(sketch)
    }

    fn check_compatible(&self, other: &Self) -> Result<(), StoreError> {
        if self.depth != other.depth || self.width != other.width {
            return Err(StoreError::DimensionMismatch(format!(
                "cannot merge {}x{} sketch into {}x{} sketch",
                other.depth, other.width, self.depth, self.width
            )));
        }
        if self.hash_seeds != other.hash_seeds {
            return Err(StoreError::DimensionMismatch(
                "cannot merge sketches with different hash seeds".into(),
            ));
        }
        Ok(())
    }

    fn column(&self, row: usize, key: &[u8]) -> usize {
        let seed = self.hash_seeds[row];
        let mut hasher = SipHasher13::new_with_keys(seed, seed.rotate_left(32) ^ SEED_GAMMA);
        hasher.write(key);
        (hasher.finish() % self.width as u64) as usize
    }
}

/// splitmix64 sequence starting at `seed`.
fn derive_seeds(seed: u64, depth: usize) -> Vec<u64> {
    let mut state = seed;
    (0..depth)
        .map(|_| {
            state = state.wrapping_add(SEED_GAMMA);
            let mut z = state;
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            z ^ (z >> 31)
        })
        .collect()
}
