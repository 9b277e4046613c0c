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

use std::collections::BTreeMap;

use crate::lossysumming::IncrementalLossySummingSketch;
use crate::lossysumming::LossySummingSketch;
use crate::spacesaving::SpaceSavingSketch;

/// Operations shared by every heavy-hitters sketch in this crate.
///
/// Keys are `u32` and weights are non-negative `u32`; estimates, errors and weights summed
/// over the stream are `u64`.
pub trait FrequencySketch {
    /// Adds `weight` to `key`. A weight of zero is a no-op.
    fn update(&mut self, key: u32, weight: u32);

    /// Returns an upper bound on the total weight of `key`.
    fn estimate(&self, key: u32) -> u64;

    /// Returns the largest amount by which `estimate(key)` may exceed the true weight.
    fn error_bound(&self, key: u32) -> u64;

    /// Returns every tracked key whose estimate is at least `threshold`.
    fn frequent_items(&self, threshold: u64) -> BTreeMap<u32, u64>;

    /// Returns the memory held by the sketch in bytes.
    fn size_in_bytes(&self) -> usize;

    /// Returns the sum of all weights observed.
    fn total_weight(&self) -> u64;
}

macro_rules! impl_frequency_sketch {
    ($($sketch:ty),+) => {
        $(
            impl FrequencySketch for $sketch {
                fn update(&mut self, key: u32, weight: u32) {
                    <$sketch>::update(self, key, weight)
                }

                fn estimate(&self, key: u32) -> u64 {
                    <$sketch>::estimate(self, key)
                }

                fn error_bound(&self, key: u32) -> u64 {
                    <$sketch>::error_bound(self, key)
                }

                fn frequent_items(&self, threshold: u64) -> BTreeMap<u32, u64> {
                    <$sketch>::frequent_items(self, threshold)
                }

                fn size_in_bytes(&self) -> usize {
                    <$sketch>::size_in_bytes(self)
                }

                fn total_weight(&self) -> u64 {
                    <$sketch>::total_weight(self)
                }
            }
        )+
    };
}

impl_frequency_sketch!(
    SpaceSavingSketch,
    LossySummingSketch,
    IncrementalLossySummingSketch
);
