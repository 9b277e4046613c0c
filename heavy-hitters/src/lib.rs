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

//! Heavy-hitters sketches for weighted streams of `u32` keys.
//!
//! Every sketch here answers the same question with memory fixed at construction: which keys
//! carry at least a `phi` fraction of the total weight seen so far? Estimates never undercount,
//! and each sketch reports a bound on how much it may overcount.
//!
//! * [`spacesaving`]: the Space-Saving algorithm over a heap of counters.
//! * [`lossysumming`]: the two-generation Lossy Summing algorithm, with a synchronous form and
//!   an incremental form whose maintenance is spread over updates and can run its quantile
//!   selection on a background thread.
//!
//! All of them implement [`FrequencySketch`].

mod chained_index;
mod common;

pub mod error;
pub mod hash;
pub mod lossysumming;
pub mod select;
pub mod spacesaving;

pub use self::common::FrequencySketch;
