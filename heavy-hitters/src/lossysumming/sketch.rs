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
use std::mem;

use crate::chained_index::MAX_SLOTS;
use crate::error::Error;
use crate::hash::DEFAULT_SEED;
use crate::hash::PairwiseHash;
use crate::lossysumming::generation::Generation;
use crate::lossysumming::incremental::IncrementalLossySummingSketch;
use crate::lossysumming::maintenance::MaintenanceMode;
use crate::select::select_kth_with_pivot;

const DEFAULT_PHI: f64 = 0.01;
const DEFAULT_GAMMA: f64 = 1.0;

/// Counter budget of a two-generation sketch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Sizing {
    /// Counters per generation.
    pub(super) capacity: usize,
    /// New keys admitted per maintenance cycle on top of the survivors.
    pub(super) allowance: usize,
    /// Smallest passive population that triggers a quantile computation.
    pub(super) retained: usize,
    /// Most passive counters that can outlive a maintenance pass.
    pub(super) max_survivors: usize,
}

impl Sizing {
    /// Derives the budget from `1 / phi` and `gamma`.
    ///
    /// # Panics
    ///
    /// Panics if a generation would need more counters than its index can address.
    pub(super) fn new(inverse_phi: f64, gamma: f64) -> Self {
        let allowance = (gamma * inverse_phi).ceil();
        let retained = inverse_phi.ceil();
        assert!(
            allowance + retained - 1.0 <= MAX_SLOTS as f64,
            "phi {} and gamma {gamma} need more than {MAX_SLOTS} counters per generation",
            1.0 / inverse_phi
        );
        let allowance = allowance as usize;
        let retained = retained as usize;
        Self {
            capacity: allowance + retained - 1,
            allowance,
            retained,
            max_survivors: retained - 1,
        }
    }
}

/// Builder for [`LossySummingSketch`] and [`IncrementalLossySummingSketch`].
#[derive(Debug, Clone)]
pub struct LossySummingBuilder {
    phi: f64,
    gamma: f64,
    seed: u64,
    hash: Option<PairwiseHash>,
    maintenance: MaintenanceMode,
}

impl Default for LossySummingBuilder {
    fn default() -> Self {
        Self {
            phi: DEFAULT_PHI,
            gamma: DEFAULT_GAMMA,
            seed: DEFAULT_SEED,
            hash: None,
            maintenance: MaintenanceMode::default(),
        }
    }
}

impl LossySummingBuilder {
    /// Set the fraction of the total weight above which a key is a heavy hitter.
    ///
    /// # Panics
    ///
    /// If phi is not in range (0.0, 1.0)
    pub fn phi(mut self, phi: f64) -> Self {
        assert!(phi > 0.0 && phi < 1.0, "phi must be in (0.0, 1.0), got {phi}");
        self.phi = phi;
        self
    }

    /// Set the space multiplier gamma.
    ///
    /// Each generation admits `gamma / phi` new keys per maintenance cycle. A larger gamma
    /// costs memory and makes maintenance rarer.
    ///
    /// # Panics
    ///
    /// If gamma is not a positive finite number
    pub fn gamma(mut self, gamma: f64) -> Self {
        assert!(
            gamma.is_finite() && gamma > 0.0,
            "gamma must be positive and finite, got {gamma}"
        );
        self.gamma = gamma;
        self
    }

    /// Set the seed the hash coefficients are drawn from.
    ///
    /// Ignored when explicit coefficients are set with [`LossySummingBuilder::hash`].
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set explicit hash coefficients.
    pub fn hash(mut self, hash: PairwiseHash) -> Self {
        self.hash = Some(hash);
        self
    }

    /// Set where the incremental form computes its quantile.
    ///
    /// Only [`LossySummingBuilder::build_incremental`] uses this setting.
    pub fn maintenance(mut self, mode: MaintenanceMode) -> Self {
        self.maintenance = mode;
        self
    }

    /// Build the synchronous sketch.
    ///
    /// # Panics
    ///
    /// Panics if phi and gamma ask for more counters than a generation can address.
    pub fn build(self) -> LossySummingSketch {
        let hash = self.resolve_hash();
        LossySummingSketch::from_parts(self.phi, Sizing::new(1.0 / self.phi, self.gamma), hash)
    }

    /// Build the incremental sketch.
    ///
    /// The incremental form tightens phi to `1 / (1 / phi + 1)` so that the extra survivor
    /// reserved across a cycle still fits the budget.
    ///
    /// # Panics
    ///
    /// Panics if phi and gamma ask for more counters than a generation can address.
    ///
    /// # Errors
    ///
    /// Returns an error if the background maintenance thread cannot be spawned.
    pub fn build_incremental(self) -> Result<IncrementalLossySummingSketch, Error> {
        let hash = self.resolve_hash();
        let sizing = Sizing::new(1.0 / self.phi + 1.0, self.gamma);
        IncrementalLossySummingSketch::from_parts(self.phi, sizing, hash, self.maintenance)
    }

    fn resolve_hash(&self) -> PairwiseHash {
        self.hash
            .unwrap_or_else(|| PairwiseHash::from_seed(self.seed))
    }
}

/// Lossy Summing sketch whose maintenance runs inside the update that needs it.
///
/// See [`crate::lossysumming`] for an overview and error guarantees.
#[derive(Debug, Clone)]
pub struct LossySummingSketch {
    phi: f64,
    sizing: Sizing,
    total_weight: u64,
    /// Estimate given to keys the sketch does not track; also the error of every estimate.
    quantile: u64,
    /// Insertions left before the next swap.
    extra: usize,
    cycles: u64,
    active: Generation,
    passive: Generation,
    buffer: Box<[u64]>,
}

impl LossySummingSketch {
    /// Returns a builder with default parameters.
    pub fn builder() -> LossySummingBuilder {
        LossySummingBuilder::default()
    }

    /// Creates a sketch with the default gamma.
    ///
    /// # Panics
    ///
    /// Panics if `phi` is not in `(0, 1)`.
    pub fn new(phi: f64) -> Self {
        Self::builder().phi(phi).build()
    }

    /// Creates a sketch with the given phi and gamma.
    ///
    /// # Panics
    ///
    /// Panics if `phi` is not in `(0, 1)` or `gamma` is not positive and finite.
    pub fn with_gamma(phi: f64, gamma: f64) -> Self {
        Self::builder().phi(phi).gamma(gamma).build()
    }

    fn from_parts(phi: f64, sizing: Sizing, hash: PairwiseHash) -> Self {
        Self {
            phi,
            sizing,
            total_weight: 0,
            quantile: 0,
            extra: sizing.capacity,
            cycles: 0,
            active: Generation::new(hash, sizing.capacity),
            passive: Generation::new(hash, sizing.capacity),
            buffer: vec![0; sizing.capacity].into_boxed_slice(),
        }
    }

    /// Returns the configured fraction.
    pub fn phi(&self) -> f64 {
        self.phi
    }

    /// Returns the number of counters in each generation.
    pub fn capacity(&self) -> usize {
        self.sizing.capacity
    }

    /// Returns the number of maintenance passes run so far.
    pub fn num_maintenance_cycles(&self) -> u64 {
        self.cycles
    }

    /// Returns the number of counters in use across both generations.
    pub fn num_counters(&self) -> usize {
        self.active.len() + self.passive.len()
    }

    /// Returns true if no weight has been observed.
    pub fn is_empty(&self) -> bool {
        self.total_weight == 0
    }

    /// Returns the sum of all weights passed to [`LossySummingSketch::update`].
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Returns the estimate given to untracked keys.
    pub fn quantile(&self) -> u64 {
        self.quantile
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

        let bucket = self.active.bucket_of(key);
        if let Some(slot) = self.active.find_in_bucket(bucket, key) {
            self.active.add(slot, weight);
            return;
        }

        // swap first so the new key starts from the quantile of the finished pass
        if self.extra == 0 {
            self.restart_maintenance();
        }
        let floor = match self.passive.find_in_bucket(bucket, key) {
            Some(slot) => self.passive.count(slot),
            None => self.quantile,
        };
        self.extra -= 1;
        self.active.insert_in_bucket(bucket, key, weight + floor);
    }

    /// Returns an upper bound on the weight of `key`.
    pub fn estimate(&self, key: u32) -> u64 {
        if let Some(slot) = self.active.find(key) {
            return self.active.count(slot);
        }
        match self.passive.find(key) {
            Some(slot) => self.passive.count(slot),
            None => self.quantile,
        }
    }

    /// Returns the largest amount by which [`LossySummingSketch::estimate`] may exceed the true
    /// weight of `key`.
    pub fn error_bound(&self, _key: u32) -> u64 {
        self.quantile
    }

    /// Returns every tracked key whose estimate is at least `threshold`.
    ///
    /// A key tracked by both generations is reported with its active count.
    pub fn frequent_items(&self, threshold: u64) -> BTreeMap<u32, u64> {
        let mut items = BTreeMap::new();
        for counter in self.active.occupied() {
            if counter.count >= threshold {
                items.insert(counter.key, counter.count);
            }
        }
        for counter in self.passive.occupied() {
            if counter.count >= threshold && self.active.find(counter.key).is_none() {
                items.insert(counter.key, counter.count);
            }
        }
        items
    }

    /// Returns the memory held by the sketch: both generations and the selection buffer.
    pub fn size_in_bytes(&self) -> usize {
        size_of::<Self>()
            + self.active.size_in_bytes()
            + self.passive.size_in_bytes()
            + self.buffer.len() * size_of::<u64>()
    }

    /// Verifies both hash indexes and that no active count is below the quantile.
    pub fn check_integrity(&self) -> Result<(), Error> {
        self.active.check_integrity()?;
        self.passive.check_integrity()?;
        if let Some(counter) = self
            .active
            .occupied()
            .iter()
            .find(|c| c.count < self.quantile)
        {
            return Err(Error::corrupted("active count is below the quantile")
                .with_context("key", counter.key)
                .with_context("count", counter.count)
                .with_context("quantile", self.quantile));
        }
        Ok(())
    }

    fn restart_maintenance(&mut self) {
        mem::swap(&mut self.active, &mut self.passive);
        let reserved = self.passive.len().min(self.sizing.max_survivors)
            + self.sizing.allowance
            + self.active.len();
        assert!(
            reserved <= self.sizing.capacity,
            "maintenance reserved {reserved} counters, capacity is {}",
            self.sizing.capacity
        );
        self.extra = self.sizing.capacity - reserved;
        self.maintain();
    }

    fn maintain(&mut self) {
        self.cycles += 1;
        let num_passive = self.passive.len();
        if num_passive + 1 >= self.sizing.retained {
            let rank = num_passive + 1 - self.sizing.retained;
            let buffer = &mut self.buffer[..num_passive];
            for (value, counter) in buffer.iter_mut().zip(self.passive.occupied()) {
                *value = counter.count;
            }
            let selected = select_kth_with_pivot(buffer, rank, self.quantile.saturating_add(1));
            if selected > self.quantile {
                tracing::trace!(from = self.quantile, to = selected, "quantile raised");
                self.quantile = selected;
            }
        }

        let mut migrated = 0;
        for counter in self.passive.occupied() {
            if counter.count <= self.quantile {
                continue;
            }
            if self.active.find(counter.key).is_none() {
                self.active.insert(counter.key, counter.count);
                migrated += 1;
            } else {
                self.extra += 1;
            }
        }
        self.passive.reset();
        self.extra += self.sizing.allowance;

        tracing::debug!(
            cycle = self.cycles,
            num_passive,
            migrated,
            quantile = self.quantile,
            "lossy summing maintenance finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizing() {
        let sizing = Sizing::new(10.0, 4.0);
        assert_eq!(
            sizing,
            Sizing {
                capacity: 49,
                allowance: 40,
                retained: 10,
                max_survivors: 9,
            }
        );
        // the incremental form of the same parameters
        let sizing = Sizing::new(11.0, 4.0);
        assert_eq!(sizing.capacity, 54);

        let largest = f64::from(1u32 << 29);
        assert_eq!(Sizing::new(largest, 1.0).capacity, (1 << 30) - 1);
    }

    #[test]
    #[should_panic(expected = "counters per generation")]
    fn test_sizing_too_large() {
        Sizing::new(f64::from(1u32 << 30), 1.0);
    }

    #[test]
    #[should_panic(expected = "counters per generation")]
    fn test_gamma_too_large() {
        LossySummingSketch::with_gamma(0.1, 1e300);
    }

    #[test]
    fn test_swap_with_equal_counts() {
        // rank 2 of [2, 2, 2] is 2, so nothing outlives the pass
        let mut sketch = LossySummingSketch::with_gamma(0.5, 1.0);
        for key in 1..=3 {
            sketch.update(key, 2);
        }
        assert_eq!(sketch.num_maintenance_cycles(), 0);
        sketch.update(4, 1);
        assert_eq!(sketch.num_maintenance_cycles(), 1);
        assert_eq!(sketch.quantile(), 2);
        assert_eq!(sketch.num_counters(), 1);
        assert_eq!(sketch.estimate(4), 3);
        assert_eq!(sketch.estimate(1), 2);
        sketch.check_integrity().unwrap();
    }

    #[test]
    fn test_swap_raises_quantile() {
        // capacity 3: allowance 2, retained 2
        let mut sketch = LossySummingSketch::with_gamma(0.5, 1.0);
        assert_eq!(sketch.capacity(), 3);
        sketch.update(1, 10);
        sketch.update(2, 1);
        sketch.update(3, 1);
        assert_eq!(sketch.num_maintenance_cycles(), 0);

        // the fourth key forces a swap; rank 2 of [10, 1, 1] is 10
        sketch.update(4, 1);
        assert_eq!(sketch.num_maintenance_cycles(), 1);
        assert_eq!(sketch.quantile(), 10);
        assert_eq!(sketch.estimate(4), 11);
        assert_eq!(sketch.estimate(1), 10);
        assert_eq!(sketch.num_counters(), 1);
        sketch.check_integrity().unwrap();
    }

    #[test]
    fn test_swap_keeps_survivors() {
        // capacity 7: allowance 4, retained 4
        let mut sketch = LossySummingSketch::with_gamma(0.25, 1.0);
        assert_eq!(sketch.capacity(), 7);
        sketch.update(1, 10);
        sketch.update(2, 9);
        for key in 3..8 {
            sketch.update(key, 1);
        }

        // rank 4 of [10, 9, 1, 1, 1, 1, 1] is 1, so only keys 1 and 2 survive
        sketch.update(8, 1);
        assert_eq!(sketch.quantile(), 1);
        assert_eq!(sketch.num_counters(), 3);
        assert_eq!(sketch.estimate(1), 10);
        assert_eq!(sketch.estimate(2), 9);
        assert_eq!(sketch.estimate(3), 1);
        assert_eq!(sketch.estimate(8), 2);
        assert_eq!(sketch.error_bound(8), 1);
        sketch.check_integrity().unwrap();
    }

    #[test]
    #[should_panic(expected = "phi must be in (0.0, 1.0)")]
    fn test_invalid_phi() {
        LossySummingSketch::new(1.0);
    }

    #[test]
    #[should_panic(expected = "gamma must be positive and finite")]
    fn test_invalid_gamma() {
        LossySummingSketch::with_gamma(0.1, f64::NAN);
    }
}
