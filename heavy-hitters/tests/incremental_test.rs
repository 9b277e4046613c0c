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

mod common;

use common::assert_estimates_bounded;
use common::assert_recall;
use common::exact_counts;
use common::feed;
use common::skewed_stream;
use common::uniform_stream;
use googletest::assert_that;
use googletest::matchers::eq;
use googletest::matchers::ge;
use googletest::matchers::le;
use heavy_hitters::lossysumming::IncrementalLossySummingSketch;
use heavy_hitters::lossysumming::LossySummingSketch;
use heavy_hitters::lossysumming::MaintenanceMode;
use heavy_hitters::lossysumming::Phase;
use proptest::prelude::*;

fn build(phi: f64, gamma: f64, mode: MaintenanceMode) -> IncrementalLossySummingSketch {
    LossySummingSketch::builder()
        .phi(phi)
        .gamma(gamma)
        .maintenance(mode)
        .build_incremental()
        .unwrap()
}

/// Feeds `stream` and checks that every cycle has finished whenever a swap becomes due.
fn feed_checking_cycles(sketch: &mut IncrementalLossySummingSketch, stream: &[(u32, u32)]) {
    for &(key, weight) in stream {
        sketch.update(key, weight);
        if sketch.updates_until_swap() == 0 {
            let progress = sketch.maintenance_progress();
            assert!(progress.is_complete(), "swap due with {progress:?}");
            assert_eq!(progress.copied_to_buffer(), progress.num_passive());
            assert_eq!(progress.moved_from_passive(), progress.num_passive());
            assert_eq!(progress.cleared_from_passive(), progress.num_buckets());
        }
    }
}

#[test]
fn test_init_defaults() {
    let sketch = LossySummingSketch::builder().build_incremental().unwrap();
    assert_eq!(sketch.phi(), 0.01);
    assert_eq!(sketch.capacity(), 201);
    assert_eq!(sketch.maintenance_mode(), MaintenanceMode::Cooperative);
    assert_eq!(sketch.updates_until_swap(), 201);
    assert_eq!(sketch.maintenance_progress().phase(), Phase::Idle);
    assert!(sketch.is_empty());
}

#[test]
fn test_no_eviction_is_exact() {
    let mut sketch = build(0.1, 4.0, MaintenanceMode::Cooperative);
    feed(&mut sketch, &[(5, 2), (1, 1), (5, 3), (9, 7), (2, 1), (7, 4)]);
    insta::assert_debug_snapshot!(sketch.frequent_items(2), @r"
    {
        5: 5,
        7: 4,
        9: 7,
    }
    ");
    assert_eq!(sketch.updates_until_swap(), 54 - 5);
}

#[test]
fn test_skewed_stream() {
    for mode in [MaintenanceMode::Cooperative, MaintenanceMode::Background] {
        let phi = 0.1;
        let mut sketch = build(phi, 4.0, mode);
        let size = sketch.size_in_bytes();
        let stream = skewed_stream(10_000, 1, 42);
        feed_checking_cycles(&mut sketch, &stream);
        sketch.check_integrity().unwrap();
        assert_that!(sketch.num_maintenance_cycles(), ge(1));

        let exact = exact_counts(&stream);
        assert_estimates_bounded(&sketch, &exact);
        let threshold = (phi * sketch.total_weight() as f64).ceil() as u64;
        assert_recall(&sketch, &exact, threshold);
        assert_that!(sketch.size_in_bytes(), eq(size));
        assert_that!(sketch.quantile() * 10, le(sketch.total_weight()));
    }
}

#[test]
fn test_uniform_stream_error_within_phi() {
    for mode in [MaintenanceMode::Cooperative, MaintenanceMode::Background] {
        let mut sketch = build(0.1, 1.0, mode);
        let stream = uniform_stream(20_000, 1_000, 11);
        for &(key, weight) in &stream {
            sketch.update(key, weight);
            assert!(
                sketch.quantile() * 10 <= sketch.total_weight(),
                "{mode:?}: quantile {} above a tenth of {}",
                sketch.quantile(),
                sketch.total_weight()
            );
        }
        assert_that!(sketch.num_maintenance_cycles(), ge(100));
        assert_estimates_bounded(&sketch, &exact_counts(&stream));
    }
}

#[test]
fn test_phases_advance_in_order() {
    let mut sketch = build(0.2, 2.0, MaintenanceMode::Cooperative);
    let stream = skewed_stream(2_000, 3, 9);
    let mut last = Phase::Idle;
    let mut seen = vec![];
    for &(key, weight) in &stream {
        sketch.update(key, weight);
        let phase = sketch.maintenance_progress().phase();
        if phase != last {
            seen.push(phase);
            last = phase;
        }
    }
    // each cycle walks forward through the phases and ends idle
    let order = |phase: Phase| match phase {
        Phase::CopyToBuffer => 0,
        Phase::QuantileCompute => 1,
        Phase::Move => 2,
        Phase::Clear => 3,
        Phase::Idle => 4,
    };
    let mut previous = 4;
    for phase in seen {
        let current = order(phase);
        assert!(current > previous || previous == 4, "{phase:?} after {previous}");
        previous = current;
    }
}

#[test]
fn test_background_worker_survives_many_cycles() {
    let mut sketch = build(0.05, 0.5, MaintenanceMode::Background);
    let stream = skewed_stream(20_000, 4, 1);
    feed_checking_cycles(&mut sketch, &stream);
    assert_that!(sketch.num_maintenance_cycles(), ge(10));
    assert_estimates_bounded(&sketch, &exact_counts(&stream));
    drop(sketch);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn property_test_cycles_complete_before_swap(
        phi in prop::sample::select(vec![0.5, 0.25, 0.1]),
        gamma in prop::sample::select(vec![0.5, 1.0, 3.0]),
        mode in prop::sample::select(vec![
            MaintenanceMode::Cooperative,
            MaintenanceMode::Background,
        ]),
        stream in prop::collection::vec((0u32..300, 0u32..6), 0..1_500),
    ) {
        let mut sketch = build(phi, gamma, mode);
        feed_checking_cycles(&mut sketch, &stream);
        prop_assert!(sketch.check_integrity().is_ok());
        assert_estimates_bounded(&sketch, &exact_counts(&stream));
    }
}
