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

//! Maintenance state of the incremental sketch and its background worker.

use std::sync::mpsc;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::mpsc::SyncSender;
use std::sync::mpsc::TryRecvError;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::Error;
use crate::error::ErrorKind;
use crate::select::select_kth_with_pivot;

const WORKER_THREAD_NAME: &str = "lossy-summing-maintenance";

/// How long the foreground waits for a quantile before logging that it is still waiting.
const DIAGNOSTIC_INTERVAL: Duration = Duration::from_secs(1);

/// Where the incremental sketch computes its quantile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MaintenanceMode {
    /// Every phase runs on the thread calling `update`.
    #[default]
    Cooperative,
    /// The quantile is selected on a dedicated thread while updates continue.
    Background,
}

/// Phase of a maintenance cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Passive counts are being copied into the selection buffer.
    CopyToBuffer,
    /// The quantile of the passive counts is being selected.
    QuantileCompute,
    /// Passive counters above the quantile are being moved into the active generation.
    Move,
    /// Passive hash buckets are being emptied.
    Clear,
    /// The cycle is complete and the next swap may happen.
    Idle,
}

/// Snapshot of the progress of the current maintenance cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceProgress {
    pub(super) phase: Phase,
    pub(super) num_passive: usize,
    pub(super) copied_to_buffer: usize,
    pub(super) quantile_steps_left: usize,
    pub(super) moved_from_passive: usize,
    pub(super) cleared_from_passive: usize,
    pub(super) left_to_move: usize,
    pub(super) num_buckets: usize,
}

impl MaintenanceProgress {
    pub(super) fn idle(num_buckets: usize) -> Self {
        Self {
            phase: Phase::Idle,
            num_passive: 0,
            copied_to_buffer: 0,
            quantile_steps_left: 0,
            moved_from_passive: 0,
            cleared_from_passive: num_buckets,
            left_to_move: 0,
            num_buckets,
        }
    }

    /// Returns the current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the number of counters the passive generation held at the last swap.
    pub fn num_passive(&self) -> usize {
        self.num_passive
    }

    /// Returns how many passive counts have been copied into the selection buffer.
    pub fn copied_to_buffer(&self) -> usize {
        self.copied_to_buffer
    }

    /// Returns the scheduled work left for the quantile selection.
    pub fn quantile_steps_left(&self) -> usize {
        self.quantile_steps_left
    }

    /// Returns how many passive counters the move phase has visited.
    pub fn moved_from_passive(&self) -> usize {
        self.moved_from_passive
    }

    /// Returns how many passive hash buckets have been emptied.
    pub fn cleared_from_passive(&self) -> usize {
        self.cleared_from_passive
    }

    /// Returns the active slots still reserved for passive counters above the quantile.
    pub fn left_to_move(&self) -> usize {
        self.left_to_move
    }

    /// Returns the number of hash buckets of a generation.
    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    /// Returns the scheduled work left in this cycle.
    pub fn steps_left(&self) -> usize {
        (self.num_passive - self.copied_to_buffer)
            + self.quantile_steps_left
            + (self.num_passive - self.moved_from_passive)
            + (self.num_buckets - self.cleared_from_passive)
    }

    /// Returns true if every phase of the cycle has run to completion.
    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Idle
            && self.copied_to_buffer == self.num_passive
            && self.moved_from_passive == self.num_passive
            && self.cleared_from_passive == self.num_buckets
            && self.left_to_move == 0
    }
}

#[derive(Debug)]
pub(super) struct QuantileJob {
    pub(super) buffer: Box<[u64]>,
    pub(super) len: usize,
    pub(super) rank: usize,
    pub(super) pivot: u64,
}

impl QuantileJob {
    pub(super) fn run(mut self) -> QuantileResult {
        let value = select_kth_with_pivot(&mut self.buffer[..self.len], self.rank, self.pivot);
        QuantileResult {
            buffer: self.buffer,
            value,
        }
    }
}

#[derive(Debug)]
pub(super) struct QuantileResult {
    pub(super) buffer: Box<[u64]>,
    pub(super) value: u64,
}

/// Handle to the thread that selects quantiles for [`MaintenanceMode::Background`].
///
/// Jobs travel to the worker over a single-slot "start" channel and results come back over a
/// single-slot "finished" channel. Dropping the handle closes the "start" channel, which lets
/// the worker finish any selection in flight and exit, and then joins it.
#[derive(Debug)]
pub(super) struct MaintenanceWorker {
    start: Option<SyncSender<QuantileJob>>,
    finished: Receiver<QuantileResult>,
    handle: Option<JoinHandle<()>>,
}

impl MaintenanceWorker {
    pub(super) fn spawn() -> Result<Self, Error> {
        let (start_tx, start_rx) = mpsc::sync_channel(1);
        let (finished_tx, finished_rx) = mpsc::sync_channel(1);
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(start_rx, finished_tx))
            .map_err(|err| {
                Error::new(ErrorKind::Unexpected, "failed to spawn maintenance thread")
                    .with_context("thread", WORKER_THREAD_NAME)
                    .set_source(err)
            })?;
        Ok(Self {
            start: Some(start_tx),
            finished: finished_rx,
            handle: Some(handle),
        })
    }

    /// Hands a selection to the worker.
    ///
    /// # Panics
    ///
    /// Panics if the worker has exited.
    pub(super) fn submit(&self, job: QuantileJob) {
        let sent = match &self.start {
            Some(start) => start.send(job).is_ok(),
            None => false,
        };
        assert!(sent, "maintenance worker has exited");
    }

    /// Returns the result of the submitted selection if it is ready.
    pub(super) fn try_finish(&self) -> Option<QuantileResult> {
        match self.finished.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => panic!("maintenance worker has exited"),
        }
    }

    /// Blocks until the submitted selection finishes.
    pub(super) fn wait(&self) -> QuantileResult {
        let mut waited = Duration::ZERO;
        loop {
            match self.finished.recv_timeout(DIAGNOSTIC_INTERVAL) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) => {
                    waited += DIAGNOSTIC_INTERVAL;
                    tracing::warn!(?waited, "still waiting for the maintenance worker");
                }
                Err(RecvTimeoutError::Disconnected) => panic!("maintenance worker has exited"),
            }
        }
    }
}

impl Drop for MaintenanceWorker {
    fn drop(&mut self) {
        drop(self.start.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("maintenance worker panicked");
            }
        }
    }
}

fn run_worker(start: Receiver<QuantileJob>, finished: SyncSender<QuantileResult>) {
    tracing::debug!("maintenance worker started");
    while let Ok(job) = start.recv() {
        if finished.send(job.run()).is_err() {
            break;
        }
    }
    tracing::debug!("maintenance worker exiting");
}
