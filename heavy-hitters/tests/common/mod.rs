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

#![allow(dead_code)]

use std::collections::HashMap;

use heavy_hitters::FrequencySketch;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Distribution;
use rand_distr::Pareto;

/// Generates `len` updates whose keys follow a Pareto law: key 1 takes more than half of the
/// stream, key 2 about a sixth, and the tail is long. Weights are drawn from `1..=max_weight`.
pub fn skewed_stream(len: usize, max_weight: u32, seed: u64) -> Vec<(u32, u32)> {
    let distribution = Pareto::new(1.0, 1.2).expect("pareto distribution should be valid");
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| {
            let key = distribution.sample(&mut rng) as u32;
            let weight = rng.random_range(1..=max_weight);
            (key, weight)
        })
        .collect()
}

/// Generates `len` unit-weight updates over keys drawn uniformly from `0..num_keys`.
pub fn uniform_stream(len: usize, num_keys: u32, seed: u64) -> Vec<(u32, u32)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| (rng.random_range(0..num_keys), 1))
        .collect()
}

pub fn exact_counts(stream: &[(u32, u32)]) -> HashMap<u32, u64> {
    let mut counts = HashMap::new();
    for &(key, weight) in stream {
        if weight > 0 {
            *counts.entry(key).or_insert(0) += u64::from(weight);
        }
    }
    counts
}

pub fn feed<S: FrequencySketch>(sketch: &mut S, stream: &[(u32, u32)]) {
    for &(key, weight) in stream {
        sketch.update(key, weight);
    }
}

/// Every estimate is at least the true weight and at most the true weight plus the error bound.
pub fn assert_estimates_bounded<S: FrequencySketch>(sketch: &S, exact: &HashMap<u32, u64>) {
    for (&key, &count) in exact {
        let estimate = sketch.estimate(key);
        assert!(
            estimate >= count,
            "key {key} estimated at {estimate}, true weight {count}"
        );
        assert!(
            estimate - count <= sketch.error_bound(key),
            "key {key} estimated at {estimate}, true weight {count}, error bound {}",
            sketch.error_bound(key)
        );
    }
}

/// Every key with true weight at least `threshold` is reported by `frequent_items(threshold)`.
pub fn assert_recall<S: FrequencySketch>(
    sketch: &S,
    exact: &HashMap<u32, u64>,
    threshold: u64,
) {
    let reported = sketch.frequent_items(threshold);
    for (&key, &count) in exact {
        if count >= threshold {
            assert!(
                reported.contains_key(&key),
                "key {key} with weight {count} missing from frequent items at {threshold}"
            );
        }
    }
}
