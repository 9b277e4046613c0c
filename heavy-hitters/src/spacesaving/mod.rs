// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Space-Saving sketch for finding heavy hitters.
//!
//! # Overview
//!
//! The Space-Saving algorithm of Metwally, Agrawal and El Abbadi ("Efficient Computation of
//! Frequent and Top-k Elements in Data Streams", 2005) keeps a fixed set of counters. A key
//! that is already tracked has its counter incremented. An untracked key takes over the
//! counter with the smallest count, inheriting that count as its error.
//!
//! This implementation keeps the counters in an array that is both a binary min-heap on the
//! count, so that the eviction victim is always at the root, and the arena of a chained hash
//! index, so that a tracked key is found in constant expected time. Both views are repaired
//! together on every heap swap.
//!
//! # Accuracy
//!
//! For a sketch built with parameter `phi` the sketch keeps more than `1 / phi` counters, which
//! guarantees:
//! * the estimate of a key never underestimates its true weight;
//! * the estimate exceeds the true weight by at most [`SpaceSavingSketch::error_bound`], which
//!   is at most `phi * W` for a stream of total weight `W`;
//! * every key with true weight at least `T >= phi * W` is reported by
//!   [`SpaceSavingSketch::frequent_items`] for threshold `T`.
//!
//! # Examples
//!
//! ```
//! # use heavy_hitters::spacesaving::SpaceSavingSketch;
//! let mut sketch = SpaceSavingSketch::new(0.25);
//! for key in [7, 7, 7, 1, 2, 3, 4, 5] {
//!     sketch.update(key, 1);
//! }
//! assert!(sketch.estimate(7) >= 3);
//! assert!(sketch.frequent_items(3).contains_key(&7));
//! ```

mod sketch;

pub use self::sketch::SpaceSavingSketch;
