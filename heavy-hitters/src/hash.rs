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

//! Pairwise-independent hashing of 32-bit keys.
//!
//! Every sketch in this crate buckets keys with the classic `hash31` family
//! `h(x) = ((a * x + b) mod p)` for the Mersenne prime `p = 2^31 - 1`, evaluated without a
//! division by folding the high bits back onto the low bits.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// The Mersenne prime `2^31 - 1`, the modulus of the hash family.
pub const MERSENNE_31: u64 = (1 << 31) - 1;

/// Seed used to draw hash coefficients when the caller does not supply one.
pub const DEFAULT_SEED: u64 = 9001;

/// A member of the `hash31` pairwise-independent family, identified by its coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairwiseHash {
    a: u64,
    b: u64,
}

impl PairwiseHash {
    /// Creates a hash function from explicit coefficients.
    ///
    /// # Panics
    ///
    /// Panics if `a` is not in `[1, 2^31 - 1)` or `b` is not in `[0, 2^31 - 1)`.
    pub fn new(a: u64, b: u64) -> Self {
        assert!(
            (1..MERSENNE_31).contains(&a),
            "a must be in [1, {MERSENNE_31}), got {a}"
        );
        assert!(b < MERSENNE_31, "b must be in [0, {MERSENNE_31}), got {b}");
        Self { a, b }
    }

    /// Draws coefficients from a generator seeded with `seed`.
    pub fn from_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::from_rng(&mut rng)
    }

    /// Draws coefficients from the given random source.
    pub fn from_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            a: rng.random_range(1..MERSENNE_31),
            b: rng.random_range(0..MERSENNE_31),
        }
    }

    /// Returns the multiplicative coefficient.
    pub fn a(&self) -> u64 {
        self.a
    }

    /// Returns the additive coefficient.
    pub fn b(&self) -> u64 {
        self.b
    }

    /// Hashes `key` into `[0, 2^31 - 1]`.
    #[inline]
    pub fn hash(&self, key: u32) -> u32 {
        // a < 2^31 and key < 2^32, so the product and sum fit in 64 bits
        let result = self.a * u64::from(key) + self.b;
        (((result >> 31) + result) & MERSENNE_31) as u32
    }
}

impl Default for PairwiseHash {
    fn default() -> Self {
        Self::from_seed(DEFAULT_SEED)
    }
}
