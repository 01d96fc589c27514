// Copyright (c) 2026 Adrian Robinson. All rights reserved.
// Licensed under the MIT License. See LICENSE file in the project root for full license information.

//! Probabilistic Data Structures (Sketches)
//!
//! These data structures provide approximate answers to frequency queries using
//! significantly less memory than exact structures. They are mergeable, so
//! per-partition sketches can be aggregated after the fact.

pub mod count_min_sketch;

pub use count_min_sketch::CountMinSketch;
