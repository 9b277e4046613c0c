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

//! One generation of counters: a fill-only counter array plus its hash index.

use crate::chained_index::Chained;
use crate::chained_index::ChainedIndex;
use crate::chained_index::HASH_MULTIPLIER;
use crate::chained_index::Link;
use crate::error::Error;
use crate::hash::PairwiseHash;

#[derive(Debug, Clone, Copy)]
pub(super) struct Counter {
    pub(super) key: u32,
    pub(super) count: u64,
    link: Link,
}

impl Counter {
    const EMPTY: Counter = Counter {
        key: 0,
        count: 0,
        link: Link::DETACHED,
    };
}

impl Chained for Counter {
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

/// Counters are appended in slot order and never removed individually; the whole generation
/// is emptied at once.
#[derive(Debug, Clone)]
pub(super) struct Generation {
    counters: Box<[Counter]>,
    len: usize,
    index: ChainedIndex,
}

impl Generation {
    pub(super) fn new(hash: PairwiseHash, capacity: usize) -> Self {
        Self {
            counters: vec![Counter::EMPTY; capacity].into_boxed_slice(),
            len: 0,
            index: ChainedIndex::new(hash, capacity * HASH_MULTIPLIER),
        }
    }

    pub(super) fn len(&self) -> usize {
        self.len
    }

    pub(super) fn num_buckets(&self) -> usize {
        self.index.num_buckets()
    }

    pub(super) fn bucket_of(&self, key: u32) -> usize {
        self.index.bucket_of(key)
    }

    pub(super) fn find(&self, key: u32) -> Option<usize> {
        self.index.find(self.occupied(), key)
    }

    pub(super) fn find_in_bucket(&self, bucket: usize, key: u32) -> Option<usize> {
        self.index.find_in_bucket(self.occupied(), bucket, key)
    }

    pub(super) fn count(&self, slot: usize) -> u64 {
        self.occupied()[slot].count
    }

    pub(super) fn add(&mut self, slot: usize, weight: u64) {
        debug_assert!(slot < self.len, "slot {slot} is not occupied");
        self.counters[slot].count += weight;
    }

    pub(super) fn occupied(&self) -> &[Counter] {
        &self.counters[..self.len]
    }

    /// Appends a counter for `key`, which must not be present, and chains it at `bucket`.
    ///
    /// # Panics
    ///
    /// Panics if every slot is in use.
    pub(super) fn insert_in_bucket(&mut self, bucket: usize, key: u32, count: u64) {
        assert!(
            self.len < self.counters.len(),
            "generation capacity exceeded: {} counters",
            self.counters.len()
        );
        let slot = self.len;
        self.len += 1;
        self.counters[slot] = Counter {
            key,
            count,
            link: Link::DETACHED,
        };
        self.index.push_front(&mut self.counters, slot, bucket);
    }

    pub(super) fn insert(&mut self, key: u32, count: u64) {
        let bucket = self.bucket_of(key);
        self.insert_in_bucket(bucket, key, count);
    }

    /// Empties the generation in one go.
    pub(super) fn reset(&mut self) {
        self.index.clear();
        self.len = 0;
    }

    /// Drops the counters of a generation whose buckets were already cleared one by one.
    pub(super) fn discard(&mut self) {
        debug_assert!(self.index.is_clear(), "discarded generation is still indexed");
        self.len = 0;
    }

    pub(super) fn clear_bucket(&mut self, bucket: usize) {
        self.index.clear_bucket(bucket);
    }

    pub(super) fn size_in_bytes(&self) -> usize {
        self.counters.len() * size_of::<Counter>() + self.index.size_in_bytes()
    }

    pub(super) fn check_integrity(&self) -> Result<(), Error> {
        let chained = self.index.check(self.occupied())?;
        if chained != self.len {
            return Err(Error::corrupted("occupied counters do not match the hash index")
                .with_context("chained", chained)
                .with_context("occupied", self.len));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_find() {
        let mut generation = Generation::new(PairwiseHash::default(), 4);
        generation.insert(11, 3);
        generation.insert(12, 1);
        let slot = generation.find(11).unwrap();
        generation.add(slot, 2);
        assert_eq!(generation.count(slot), 5);
        assert_eq!(generation.find(13), None);
        assert_eq!(generation.len(), 2);
        generation.check_integrity().unwrap();

        generation.reset();
        assert_eq!(generation.len(), 0);
        assert_eq!(generation.find(11), None);
        generation.check_integrity().unwrap();
    }

    #[test]
    fn test_bucket_by_bucket_clear() {
        let mut generation = Generation::new(PairwiseHash::default(), 8);
        for key in 0..8 {
            generation.insert(key, 1);
        }
        for bucket in 0..generation.num_buckets() {
            generation.clear_bucket(bucket);
        }
        generation.discard();
        assert_eq!(generation.find(3), None);
        generation.insert(3, 7);
        assert_eq!(generation.count(generation.find(3).unwrap()), 7);
    }

    #[test]
    #[should_panic(expected = "generation capacity exceeded")]
    fn test_overfill() {
        let mut generation = Generation::new(PairwiseHash::default(), 1);
        generation.insert(1, 1);
        generation.insert(2, 1);
    }
}
