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

//! Lossy Summing sketches for finding heavy hitters.
//!
//! # Overview
//!
//! A Lossy Summing sketch keeps two generations of counters. New keys are only admitted into
//! the *active* generation; the *passive* generation holds the previous one while it is
//! maintained. When the active generation runs out of room the two are swapped, and a
//! maintenance cycle:
//!
//! 1. selects a quantile of the passive counts with [`crate::select`];
//! 2. raises the sketch-wide `quantile` to it if it is larger;
//! 3. moves every passive counter above the quantile into the active generation;
//! 4. empties the passive generation.
//!
//! A key seen for the first time is admitted with its weight plus a floor: its passive count
//! if the passive generation still tracks it, the quantile otherwise. The quantile is thus an
//! upper bound on the weight of any key the sketch has dropped, and it is the error bound of
//! every estimate.
//!
//! Two forms are provided:
//! * [`LossySummingSketch`] runs the whole cycle inside the update that triggers the swap.
//! * [`IncrementalLossySummingSketch`] splits the cycle into the phases of [`Phase`] and spreads
//!   them over the updates that follow the swap, optionally selecting the quantile on a
//!   background thread (see [`MaintenanceMode`]).
//!
//! # Sizing
//!
//! For parameters `phi` and `gamma`, each generation holds `⌈gamma / phi⌉ + ⌈1 / phi⌉ - 1`
//! counters. Of those, `⌈gamma / phi⌉` are admitted fresh each cycle, and at most
//! `⌈1 / phi⌉ - 1` are reserved for counters that survive a cycle. The incremental form
//! replaces `phi` by `1 / (1 / phi + 1)`.
//!
//! # Examples
//!
//! ```
//! # use heavy_hitters::lossysumming::LossySummingSketch;
//! let mut sketch = LossySummingSketch::with_gamma(0.1, 4.0);
//! for i in 0..1000u32 {
//!     let key = if i % 2 == 0 { 42 } else { i };
//!     sketch.update(key, 1);
//! }
//! assert!(sketch.estimate(42) >= 500);
//! assert!(sketch.frequent_items(100).contains_key(&42));
//! ```
//!
//! ```
//! # use heavy_hitters::lossysumming::LossySummingSketch;
//! # use heavy_hitters::lossysumming::MaintenanceMode;
//! let mut sketch = LossySummingSketch::builder()
//!     .phi(0.05)
//!     .gamma(2.0)
//!     .maintenance(MaintenanceMode::Background)
//!     .build_incremental()
//!     .unwrap();
//! for i in 0..10_000u32 {
//!     sketch.update(i % 7, 1);
//! }
//! assert!(sketch.estimate(3) >= 1428);
//! ```

mod generation;
mod incremental;
mod maintenance;
mod sketch;

pub use self::incremental::IncrementalLossySummingSketch;
pub use self::maintenance::MaintenanceMode;
pub use self::maintenance::MaintenanceProgress;
pub use self::maintenance::Phase;
pub use self::sketch::LossySummingBuilder;
pub use self::sketch::LossySummingSketch;
