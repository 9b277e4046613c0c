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

use crate::chained_index::Chained;
use crate::chained_index::ChainedIndex;
use crate::chained_index::HASH_MULTIPLIER;
use crate::chained_index::Link;
use crate::chained_index::MAX_SLOTS;
use crate::error::Error;
use crate::hash::DEFAULT_SEED;
use crate::hash::PairwiseHash;

#[derive(Debug, Clone, Copy)]
struct HeapCounter {
    key: u32,
    count: u64,
    /// Count inherited from the evicted key; bounds the over-estimate.
    delta: u64,
    link: Link,
}

impl HeapCounter {
    const EMPTY: HeapCounter = HeapCounter {
        key: 0,
        count: 0,
        delta: 0,
        link: Link::DETACHED,
    };
}

impl Chained for HeapCounter {
    fn key(&self) -> u32 {
        self.key
    }

    fn link(&self) -> &Link {
        &self.link
    }

    fn link_mut(&mut self) -> &mut Link {
        &mut self.link
    }
}

/// Space-Saving heavy-hitters sketch over `u32` keys.
///
/// See [`crate::spacesaving`] for an overview and error guarantees.
#[derive(Debug, Clone)]
pub struct SpaceSavingSketch {
    phi: f64,
    total_weight: u64,
    num_tracked: usize,
    counters: Box<[HeapCounter]>,
    index: ChainedIndex,
}

impl SpaceSavingSketch {
    /// Creates a sketch that reports keys holding at least a `phi` fraction of the stream.
    ///
    /// Hash coefficients are drawn from [`DEFAULT_SEED`].
    ///
    /// # Panics
    ///
    /// Panics if `phi` is not in `(0, 1]`.
    pub fn new(phi: f64) -> Self {
        Self::with_seed(phi, DEFAULT_SEED)
    }

    /// Creates a sketch whose hash coefficients are drawn from `seed`.
    ///
    /// # Panics
    ///
    /// Panics if `phi` is not in `(0, 1]`.
    pub fn with_seed(phi: f64, seed: u64) -> Self {
        Self::with_hash(phi, PairwiseHash::from_seed(seed))
    }

    /// Creates a sketch that buckets keys with `hash`.
    ///
    /// # Panics
    ///
    /// Panics if `phi` is not in `(0, 1]`.
    pub fn with_hash(phi: f64, hash: PairwiseHash) -> Self {
        let capacity = Self::capacity_for(phi);
        Self {
            phi,
            total_weight: 0,
            num_tracked: 0,
            counters: vec![HeapCounter::EMPTY; capacity].into_boxed_slice(),
            index: ChainedIndex::new(hash, capacity * HASH_MULTIPLIER),
        }
    }

    /// Returns the number of counters a sketch built with `phi` allocates.
    ///
    /// This is the smallest odd number greater than `1 / phi + 1`, so that every inner node of
    /// the heap has two children.
    ///
    /// # Panics
    ///
    /// Panics if `phi` is not in `(0, 1]`, or if `phi` is so small that the sketch would need
    /// more counters than its index can address.
    pub fn capacity_for(phi: f64) -> usize {
        assert!(
            phi > 0.0 && phi <= 1.0,
            "phi must be in (0, 1], got {phi}"
        );
        let inverse = (1.0 / phi).ceil();
        assert!(
            inverse + 2.0 <= MAX_SLOTS as f64,
            "phi {phi} needs more than {MAX_SLOTS} counters"
        );
        (inverse as usize + 1) | 1
    }

    /// Returns the configured fraction.
    pub fn phi(&self) -> f64 {
        self.phi
    }

    /// Returns the number of counters.
    pub fn capacity(&self) -> usize {
        self.counters.len()
    }

    /// Returns the number of distinct keys currently tracked.
    pub fn num_tracked(&self) -> usize {
        self.num_tracked
    }

    /// Returns true if no weight has been observed.
    pub fn is_empty(&self) -> bool {
        self.num_tracked == 0
    }

    /// Returns the sum of all weights passed to [`SpaceSavingSketch::update`].
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Returns the smallest count held by any counter.
    ///
    /// This is zero until every counter is in use.
    pub fn minimum_count(&self) -> u64 {
        self.counters[0].count
    }

    /// Adds `weight` to `key`.
    ///
    /// A weight of zero is a no-op.
    pub fn update(&mut self, key: u32, weight: u32) {
        if weight == 0 {
            return;
        }
        let weight = u64::from(weight);
        self.total_weight += weight;

        let bucket = self.index.bucket_of(key);
        if let Some(slot) = self.index.find_in_bucket(&self.counters, bucket, key) {
            self.counters[slot].count += weight;
            self.sift_down(slot);
            return;
        }

        // take over the counter with the smallest count
        if self.counters[0].link.is_detached() {
            self.num_tracked += 1;
        } else {
            self.index.unlink(&mut self.counters, 0);
        }
        let victim = &mut self.counters[0];
        victim.key = key;
        victim.delta = victim.count;
        victim.count += weight;
        self.index.push_front(&mut self.counters, 0, bucket);
        self.sift_down(0);
    }

    /// Returns an upper bound on the weight of `key`.
    ///
    /// An untracked key is estimated at the minimum count, the most it could have accumulated
    /// before being evicted.
    pub fn estimate(&self, key: u32) -> u64 {
        match self.index.find(&self.counters, key) {
            Some(slot) => self.counters[slot].count,
            None => self.minimum_count(),
        }
    }

    /// Returns the largest amount by which [`SpaceSavingSketch::estimate`] may exceed the true
    /// weight of `key`.
    pub fn error_bound(&self, key: u32) -> u64 {
        match self.index.find(&self.counters, key) {
            Some(slot) => self.counters[slot].delta,
            None => self.minimum_count(),
        }
    }

    /// Returns every tracked key whose estimate is at least `threshold`.
    pub fn frequent_items(&self, threshold: u64) -> BTreeMap<u32, u64> {
        self.counters
            .iter()
            .filter(|c| !c.link.is_detached() && c.count >= threshold)
            .map(|c| (c.key, c.count))
            .collect()
    }

    /// Returns the memory held by the sketch, including its counter array and hash index.
    pub fn size_in_bytes(&self) -> usize {
        size_of::<Self>()
            + self.counters.len() * size_of::<HeapCounter>()
            + self.index.size_in_bytes()
    }

    /// Verifies the heap order and the hash index.
    ///
    /// This walks every counter and every chain, so it is meant for tests and debugging.
    pub fn check_integrity(&self) -> Result<(), Error> {
        for child in 1..self.counters.len() {
            let parent = (child - 1) / 2;
            if self.counters[parent].count > self.counters[child].count {
                return Err(Error::corrupted("heap order violated")
                    .with_context("parent", parent)
                    .with_context("child", child));
            }
        }
        let chained = self.index.check(&self.counters)?;
        if chained != self.num_tracked {
            return Err(Error::corrupted("tracked keys do not match the hash index")
                .with_context("chained", chained)
                .with_context("tracked", self.num_tracked));
        }
        Ok(())
    }

    fn sift_down(&mut self, mut slot: usize) {
        let size = self.counters.len();
        loop {
            let right = 2 * slot + 2;
            if right >= size {
                break;
            }
            let left = right - 1;
            let child = if self.counters[left].count < self.counters[right].count {
                left
            } else {
                right
            };
            if self.counters[slot].count <= self.counters[child].count {
                break;
            }
            self.counters.swap(slot, child);
            self.index.repair_swapped(&mut self.counters, slot, child);
            slot = child;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_odd() {
        assert_eq!(SpaceSavingSketch::capacity_for(0.25), 5);
        assert_eq!(SpaceSavingSketch::capacity_for(0.3), 5);
        assert_eq!(SpaceSavingSketch::capacity_for(0.1), 11);
        assert_eq!(SpaceSavingSketch::capacity_for(1.0), 3);
        assert_eq!(
            SpaceSavingSketch::capacity_for(1.0 / f64::from(1u32 << 29)),
            (1 << 29) + 1
        );
    }

    #[test]
    fn test_eviction_inherits_minimum() {
        let mut sketch = SpaceSavingSketch::new(1.0);
        sketch.update(1, 5);
        sketch.update(2, 3);
        sketch.update(3, 4);
        assert_eq!(sketch.minimum_count(), 3);

        sketch.update(4, 1);
        assert_eq!(sketch.estimate(4), 4);
        assert_eq!(sketch.error_bound(4), 3);
        // key 2 was evicted
        assert_eq!(sketch.estimate(2), sketch.minimum_count());
        assert_eq!(sketch.num_tracked(), 3);
        sketch.check_integrity().unwrap();
    }

    #[test]
    fn test_zero_weight_is_ignored() {
        let mut sketch = SpaceSavingSketch::new(0.5);
        sketch.update(9, 0);
        assert!(sketch.is_empty());
        assert_eq!(sketch.total_weight(), 0);
        assert_eq!(sketch.estimate(9), 0);
    }

    #[test]
    #[should_panic(expected = "phi must be in (0, 1]")]
    fn test_invalid_phi() {
        SpaceSavingSketch::new(0.0);
    }

    #[test]
    #[should_panic(expected = "counters")]
    fn test_phi_too_small() {
        SpaceSavingSketch::new(1e-300);
    }
}
