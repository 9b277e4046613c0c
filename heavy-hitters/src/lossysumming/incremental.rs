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

use crate::error::Error;
use crate::hash::PairwiseHash;
use crate::lossysumming::generation::Generation;
use crate::lossysumming::maintenance::MaintenanceMode;
use crate::lossysumming::maintenance::MaintenanceProgress;
use crate::lossysumming::maintenance::MaintenanceWorker;
use crate::lossysumming::maintenance::Phase;
use crate::lossysumming::maintenance::QuantileJob;
use crate::lossysumming::maintenance::QuantileResult;
use crate::lossysumming::sketch::Sizing;

/// Scheduled cost of selecting the quantile, per passive counter.
const QUANTILE_STEPS_PER_COUNTER: usize = 23;

/// Lossy Summing sketch that spreads each maintenance cycle over the updates that follow a
/// generation swap.
///
/// Every update performs a share of the outstanding maintenance work proportional to the
/// updates left before the next swap, so no single update pays for a whole cycle. With
/// [`MaintenanceMode::Background`] the quantile selection runs on a dedicated thread and the
/// update path only blocks when its schedule reaches a selection that has not finished.
///
/// Built with [`LossySummingBuilder::build_incremental`](crate::lossysumming::LossySummingBuilder::build_incremental).
#[derive(Debug)]
pub struct IncrementalLossySummingSketch {
    phi: f64,
    sizing: Sizing,
    mode: MaintenanceMode,
    total_weight: u64,
    quantile: u64,
    cycles: u64,
    progress: MaintenanceProgress,
    active: Generation,
    passive: Generation,
    /// Taken by the worker while a background selection is in flight.
    buffer: Option<Box<[u64]>>,
    worker: Option<MaintenanceWorker>,
}

impl IncrementalLossySummingSketch {
    pub(super) fn from_parts(
        phi: f64,
        sizing: Sizing,
        hash: PairwiseHash,
        mode: MaintenanceMode,
    ) -> Result<Self, Error> {
        let worker = match mode {
            MaintenanceMode::Cooperative => None,
            MaintenanceMode::Background => Some(MaintenanceWorker::spawn()?),
        };
        let active = Generation::new(hash, sizing.capacity);
        let passive = Generation::new(hash, sizing.capacity);
        Ok(Self {
            phi,
            sizing,
            mode,
            total_weight: 0,
            quantile: 0,
            cycles: 0,
            progress: MaintenanceProgress::idle(active.num_buckets()),
            active,
            passive,
            buffer: Some(vec![0; sizing.capacity].into_boxed_slice()),
            worker,
        })
    }

    /// Returns the configured fraction, before tightening.
    pub fn phi(&self) -> f64 {
        self.phi
    }

    /// Returns the number of counters in each generation.
    pub fn capacity(&self) -> usize {
        self.sizing.capacity
    }

    /// Returns where the quantile is computed.
    pub fn maintenance_mode(&self) -> MaintenanceMode {
        self.mode
    }

    /// Returns the progress of the current maintenance cycle.
    pub fn maintenance_progress(&self) -> MaintenanceProgress {
        self.progress
    }

    /// Returns the number of generation swaps so far.
    pub fn num_maintenance_cycles(&self) -> u64 {
        self.cycles
    }

    /// Returns how many more new keys the active generation admits before the next swap.
    pub fn updates_until_swap(&self) -> usize {
        self.sizing.capacity - self.active.len() - self.progress.left_to_move
    }

    /// Returns the number of counters in use across both generations.
    pub fn num_counters(&self) -> usize {
        self.active.len() + self.passive.len()
    }

    /// Returns true if no weight has been observed.
    pub fn is_empty(&self) -> bool {
        self.total_weight == 0
    }

    /// Returns the sum of all weights passed to [`IncrementalLossySummingSketch::update`].
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Returns the estimate given to untracked keys.
    pub fn quantile(&self) -> u64 {
        self.quantile
    }

    /// Adds `weight` to `key` and advances maintenance by this update's share.
    ///
    /// A weight of zero is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if the background worker has exited.
    pub fn update(&mut self, key: u32, weight: u32) {
        if weight == 0 {
            return;
        }
        let mut updates_left = self.updates_until_swap();
        if updates_left == 0 {
            self.restart_maintenance();
            updates_left = self.updates_until_swap();
        }
        let budget = self.progress.steps_left().div_ceil(updates_left);
        self.apply_update(key, u64::from(weight));
        self.advance_maintenance(budget);
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

    /// Returns the largest amount by which
    /// [`IncrementalLossySummingSketch::estimate`] may exceed the true weight of `key`.
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
            + self.sizing.capacity * size_of::<u64>()
    }

    /// Verifies the active hash index, and the passive one unless it is being cleared.
    pub fn check_integrity(&self) -> Result<(), Error> {
        self.active.check_integrity()?;
        if self.progress.phase != Phase::Clear {
            self.passive.check_integrity()?;
        }
        Ok(())
    }

    fn apply_update(&mut self, key: u32, weight: u64) {
        self.total_weight += weight;
        let bucket = self.active.bucket_of(key);
        if let Some(slot) = self.active.find_in_bucket(bucket, key) {
            self.active.add(slot, weight);
            return;
        }
        let floor = match self.passive.find_in_bucket(bucket, key) {
            Some(slot) => self.passive.count(slot),
            None => self.quantile,
        };
        self.active.insert_in_bucket(bucket, key, weight + floor);
    }

    fn restart_maintenance(&mut self) {
        assert!(
            self.progress.is_complete(),
            "maintenance has not kept pace with arrivals: {:?}",
            self.progress
        );
        mem::swap(&mut self.active, &mut self.passive);
        debug_assert_eq!(self.active.len(), 0);
        self.cycles += 1;

        let num_passive = self.passive.len();
        let progress = &mut self.progress;
        progress.num_passive = num_passive;
        progress.left_to_move = num_passive.min(self.sizing.max_survivors);
        progress.moved_from_passive = 0;
        progress.cleared_from_passive = 0;
        if num_passive >= self.sizing.retained {
            progress.phase = Phase::CopyToBuffer;
            progress.copied_to_buffer = 0;
            progress.quantile_steps_left = num_passive * QUANTILE_STEPS_PER_COUNTER;
        } else {
            progress.phase = Phase::Move;
            progress.copied_to_buffer = num_passive;
            progress.quantile_steps_left = 0;
        }

        tracing::debug!(
            cycle = self.cycles,
            num_passive,
            quantile = self.quantile,
            steps = self.progress.steps_left(),
            "lossy summing generations swapped"
        );
    }

    fn advance_maintenance(&mut self, mut budget: usize) {
        if self.progress.phase == Phase::QuantileCompute {
            if let Some(result) = self.worker.as_ref().and_then(|w| w.try_finish()) {
                self.finish_quantile(result);
            }
        }
        while budget > 0 {
            let spent = match self.progress.phase {
                Phase::CopyToBuffer => self.copy_to_buffer(budget),
                Phase::QuantileCompute => self.compute_quantile(budget),
                Phase::Move => self.move_survivors(budget),
                Phase::Clear => self.clear_passive(budget),
                Phase::Idle => break,
            };
            budget -= spent.min(budget);
        }
    }

    fn copy_to_buffer(&mut self, budget: usize) -> usize {
        let progress = &mut self.progress;
        let start = progress.copied_to_buffer;
        let end = progress.num_passive.min(start + budget);
        let buffer = self
            .buffer
            .as_deref_mut()
            .expect("selection buffer is only lent out during the quantile phase");
        for (value, counter) in buffer[start..end]
            .iter_mut()
            .zip(&self.passive.occupied()[start..end])
        {
            *value = counter.count;
        }
        progress.copied_to_buffer = end;
        if end == progress.num_passive {
            progress.phase = Phase::QuantileCompute;
            self.start_quantile();
        }
        end - start
    }

    fn quantile_job(&mut self) -> QuantileJob {
        let num_passive = self.progress.num_passive;
        QuantileJob {
            buffer: self
                .buffer
                .take()
                .expect("selection buffer is only lent out during the quantile phase"),
            len: num_passive,
            rank: num_passive - self.sizing.retained,
            pivot: self.quantile.saturating_add(1),
        }
    }

    fn start_quantile(&mut self) {
        if self.worker.is_some() {
            let job = self.quantile_job();
            if let Some(worker) = &self.worker {
                worker.submit(job);
            }
        }
    }

    fn compute_quantile(&mut self, budget: usize) -> usize {
        let spent = budget.min(self.progress.quantile_steps_left);
        if self.worker.is_none() {
            let job = self.quantile_job();
            self.finish_quantile(job.run());
            return spent;
        }
        self.progress.quantile_steps_left -= spent;
        if self.progress.quantile_steps_left == 0 && spent < budget {
            if let Some(worker) = &self.worker {
                let result = worker.wait();
                self.finish_quantile(result);
            }
        }
        spent
    }

    fn finish_quantile(&mut self, result: QuantileResult) {
        if result.value > self.quantile {
            tracing::trace!(from = self.quantile, to = result.value, "quantile raised");
            self.quantile = result.value;
        }
        self.buffer = Some(result.buffer);
        self.progress.quantile_steps_left = 0;
        self.progress.phase = Phase::Move;
    }

    fn move_survivors(&mut self, budget: usize) -> usize {
        let progress = &mut self.progress;
        let start = progress.moved_from_passive;
        let end = progress.num_passive.min(start + budget);
        for counter in &self.passive.occupied()[start..end] {
            if counter.count <= self.quantile {
                continue;
            }
            if self.active.find(counter.key).is_none() {
                self.active.insert(counter.key, counter.count);
            }
            assert!(
                progress.left_to_move > 0,
                "more passive counters survived than were reserved"
            );
            progress.left_to_move -= 1;
        }
        progress.moved_from_passive = end;
        if end == progress.num_passive {
            progress.left_to_move = 0;
            progress.phase = Phase::Clear;
        }
        end - start
    }

    fn clear_passive(&mut self, budget: usize) -> usize {
        let progress = &mut self.progress;
        let start = progress.cleared_from_passive;
        let end = progress.num_buckets.min(start + budget);
        for bucket in start..end {
            self.passive.clear_bucket(bucket);
        }
        progress.cleared_from_passive = end;
        if end == progress.num_buckets {
            self.passive.discard();
            progress.phase = Phase::Idle;
        }
        end - start
    }
}
