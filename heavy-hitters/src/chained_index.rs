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

//! A chained hash index over a fixed arena of records.
//!
//! Records live in a caller-owned slice and are identified by their slot. Each record embeds
//! a [`Link`] that threads it into the doubly-linked chain of its bucket; the index itself only
//! stores one head slot per bucket. Links are `u32` slot numbers with [`NIL`] meaning "none",
//! so nothing here ever allocates after construction.

use crate::error::Error;
use crate::hash::PairwiseHash;

/// Slot number standing for "no record".
pub(crate) const NIL: u32 = u32::MAX;

/// Number of hash buckets allocated per record slot.
pub(crate) const HASH_MULTIPLIER: usize = 3;

/// Largest number of record slots whose buckets still fit in a link.
pub(crate) const MAX_SLOTS: usize = (NIL as usize - 1) / HASH_MULTIPLIER;

/// Position of a record inside the chain of its bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Link {
    pub(crate) bucket: u32,
    pub(crate) prev: u32,
    pub(crate) next: u32,
}

impl Link {
    /// Link of a record that is not in any chain.
    pub(crate) const DETACHED: Link = Link {
        bucket: NIL,
        prev: NIL,
        next: NIL,
    };

    pub(crate) fn is_detached(&self) -> bool {
        self.bucket == NIL
    }
}

/// A record that can be threaded into a [`ChainedIndex`].
pub(crate) trait Chained {
    fn key(&self) -> u32;
    fn link(&self) -> &Link;
    fn link_mut(&mut self) -> &mut Link;
}

#[derive(Debug, Clone)]
pub(crate) struct ChainedIndex {
    hash: PairwiseHash,
    heads: Box<[u32]>,
}

impl ChainedIndex {
    /// Creates an index with `num_buckets` empty buckets.
    ///
    /// # Panics
    ///
    /// Panics if `num_buckets` is zero or does not fit in a link.
    pub(crate) fn new(hash: PairwiseHash, num_buckets: usize) -> Self {
        assert!(num_buckets > 0, "num_buckets must be positive");
        assert!(
            num_buckets < NIL as usize,
            "num_buckets must be less than {NIL}, got {num_buckets}"
        );
        Self {
            hash,
            heads: vec![NIL; num_buckets].into_boxed_slice(),
        }
    }

    pub(crate) fn num_buckets(&self) -> usize {
        self.heads.len()
    }

    pub(crate) fn bucket_of(&self, key: u32) -> usize {
        self.hash.hash(key) as usize % self.heads.len()
    }

    /// Returns the slot holding `key`, if any.
    pub(crate) fn find<R: Chained>(&self, slots: &[R], key: u32) -> Option<usize> {
        self.find_in_bucket(slots, self.bucket_of(key), key)
    }

    /// Walks the chain of `bucket` looking for `key`.
    ///
    /// Callers that already hashed the key use this to avoid hashing twice.
    pub(crate) fn find_in_bucket<R: Chained>(
        &self,
        slots: &[R],
        bucket: usize,
        key: u32,
    ) -> Option<usize> {
        let mut cur = self.heads[bucket];
        while cur != NIL {
            let record = &slots[cur as usize];
            if record.key() == key {
                return Some(cur as usize);
            }
            cur = record.link().next;
        }
        None
    }

    /// Makes `slot` the head of the chain of `bucket`.
    ///
    /// The record must be detached.
    pub(crate) fn push_front<R: Chained>(&mut self, slots: &mut [R], slot: usize, bucket: usize) {
        debug_assert!(slots[slot].link().is_detached(), "slot {slot} is chained");
        let old_head = self.heads[bucket];
        *slots[slot].link_mut() = Link {
            bucket: bucket as u32,
            prev: NIL,
            next: old_head,
        };
        if old_head != NIL {
            slots[old_head as usize].link_mut().prev = slot as u32;
        }
        self.heads[bucket] = slot as u32;
    }

    /// Removes `slot` from its chain and marks it detached.
    pub(crate) fn unlink<R: Chained>(&mut self, slots: &mut [R], slot: usize) {
        let link = *slots[slot].link();
        debug_assert!(!link.is_detached(), "slot {slot} is not chained");
        if link.prev == NIL {
            self.heads[link.bucket as usize] = link.next;
        } else {
            slots[link.prev as usize].link_mut().next = link.next;
        }
        if link.next != NIL {
            slots[link.next as usize].link_mut().prev = link.prev;
        }
        *slots[slot].link_mut() = Link::DETACHED;
    }

    /// Restores the chains after the records at `a` and `b` traded places in `slots`.
    ///
    /// The links carried by the two records still describe their old slots; they are rewritten
    /// here together with their neighbours and bucket heads.
    pub(crate) fn repair_swapped<R: Chained>(&mut self, slots: &mut [R], a: usize, b: usize) {
        if a == b {
            return;
        }
        let (link_a, link_b) = (*slots[a].link(), *slots[b].link());
        if !link_a.is_detached() && link_a.bucket == link_b.bucket {
            // neighbours in one chain point at each other's old slots
            let remap = |s: u32| {
                if s == a as u32 {
                    b as u32
                } else if s == b as u32 {
                    a as u32
                } else {
                    s
                }
            };
            for slot in [a, b] {
                let link = slots[slot].link_mut();
                link.prev = remap(link.prev);
                link.next = remap(link.next);
            }
        }
        self.relink(slots, a);
        self.relink(slots, b);
    }

    fn relink<R: Chained>(&mut self, slots: &mut [R], slot: usize) {
        let link = *slots[slot].link();
        if link.is_detached() {
            return;
        }
        if link.prev == NIL {
            self.heads[link.bucket as usize] = slot as u32;
        } else {
            slots[link.prev as usize].link_mut().next = slot as u32;
        }
        if link.next != NIL {
            slots[link.next as usize].link_mut().prev = slot as u32;
        }
    }

    /// Empties `bucket`. The records that were chained there keep stale links.
    pub(crate) fn clear_bucket(&mut self, bucket: usize) {
        self.heads[bucket] = NIL;
    }

    pub(crate) fn clear(&mut self) {
        self.heads.fill(NIL);
    }

    /// Returns true if no bucket has a chain.
    pub(crate) fn is_clear(&self) -> bool {
        self.heads.iter().all(|&head| head == NIL)
    }

    /// Validates every chain against `slots` and returns the number of chained records.
    pub(crate) fn check<R: Chained>(&self, slots: &[R]) -> Result<usize, Error> {
        let mut chained = 0;
        for (bucket, &head) in self.heads.iter().enumerate() {
            let mut prev = NIL;
            let mut cur = head;
            let mut steps = 0;
            while cur != NIL {
                let Some(record) = slots.get(cur as usize) else {
                    return Err(Error::corrupted("chain points past the occupied slots")
                        .with_context("bucket", bucket)
                        .with_context("slot", cur));
                };
                let link = record.link();
                if link.bucket as usize != bucket {
                    return Err(Error::corrupted("record is chained in a foreign bucket")
                        .with_context("bucket", bucket)
                        .with_context("slot", cur)
                        .with_context("recorded_bucket", link.bucket));
                }
                if self.bucket_of(record.key()) != bucket {
                    return Err(Error::corrupted("key does not hash to its bucket")
                        .with_context("bucket", bucket)
                        .with_context("key", record.key()));
                }
                if link.prev != prev {
                    return Err(Error::corrupted("prev link is not symmetric")
                        .with_context("bucket", bucket)
                        .with_context("slot", cur));
                }
                steps += 1;
                if steps > slots.len() {
                    return Err(Error::corrupted("chain contains a cycle").with_context("bucket", bucket));
                }
                prev = cur;
                cur = link.next;
            }
            chained += steps;
        }
        Ok(chained)
    }

    /// Returns the heap footprint of the bucket heads.
    pub(crate) fn size_in_bytes(&self) -> usize {
        self.heads.len() * size_of::<u32>()
    }
}
