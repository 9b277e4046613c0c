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

//! In-place order-statistic selection.
//!
//! [`select_strided`] finds the k-th smallest element of a strided view of a slice in linear
//! time and without allocating, using the median-of-medians pivot rule and a three-way
//! partition. Maintenance of the two-generation sketches uses it to recompute the error
//! quantile, passing the previous quantile as a pivot hint so that a fresh median-of-medians
//! pivot is usually unnecessary.
//!
//! # Examples
//!
//! ```
//! # use heavy_hitters::select::select_kth;
//! let mut values = [9u64, 1, 8, 2, 7, 3];
//! assert_eq!(select_kth(&mut values, 0), 1);
//! assert_eq!(select_kth(&mut values, 4), 8);
//! ```

/// Returns the `k`-th smallest element (zero based) of `values`, reordering it in place.
///
/// # Panics
///
/// Panics if `k >= values.len()`.
pub fn select_kth<T: Copy + Ord>(values: &mut [T], k: usize) -> T {
    select_strided(values, values.len(), k, 1, None)
}

/// Like [`select_kth`], but partitions around `pivot` first instead of computing a
/// median-of-medians pivot.
///
/// A pivot close to the answer saves a full median-of-medians pass. The pivot does not need
/// to be an element of `values`.
pub fn select_kth_with_pivot<T: Copy + Ord>(values: &mut [T], k: usize, pivot: T) -> T {
    select_strided(values, values.len(), k, 1, Some(pivot))
}

/// Returns the `k`-th smallest of the `n` elements `values[0], values[stride], ...,
/// values[(n - 1) * stride]`, reordering that view in place.
///
/// Elements equal to the pivot form the middle partition; if `k` lands inside it the pivot
/// is returned directly. A `pivot` hint is only used for the outermost partition.
///
/// # Panics
///
/// Panics if `k >= n`, if `stride` is zero, or if the view does not fit in `values`.
pub fn select_strided<T: Copy + Ord>(
    values: &mut [T],
    n: usize,
    k: usize,
    stride: usize,
    pivot: Option<T>,
) -> T {
    assert!(k < n, "k must be less than n, got k = {k}, n = {n}");
    assert!(stride > 0, "stride must be positive");
    assert!(
        (n - 1) * stride < values.len(),
        "strided view of {n} elements with stride {stride} exceeds slice of length {}",
        values.len()
    );

    if n == 1 {
        return values[0];
    }
    if n == 2 {
        let (first, second) = (values[0], values[stride]);
        return if k == 0 {
            first.min(second)
        } else {
            first.max(second)
        };
    }

    let pivot = match pivot {
        Some(pivot) => pivot,
        None => median_of_medians(values, n, stride),
    };

    // [0, less) < pivot, [less, equal) == pivot, [equal, n) > pivot
    let mut less = 0;
    for i in 0..n {
        if values[i * stride] < pivot {
            values.swap(i * stride, less * stride);
            less += 1;
        }
    }
    let mut equal = less;
    for i in less..n {
        if values[i * stride] == pivot {
            values.swap(i * stride, equal * stride);
            equal += 1;
        }
    }

    if k < less {
        select_strided(values, less, k, stride, None)
    } else if k >= equal {
        select_strided(&mut values[equal * stride..], n - equal, k - equal, stride, None)
    } else {
        pivot
    }
}

/// Moves the three smallest elements of every quintet to its front, so that position 2 of
/// each quintet with at least three elements holds that quintet's median, then selects the
/// median of those medians.
fn median_of_medians<T: Copy + Ord>(values: &mut [T], n: usize, stride: usize) -> T {
    for start in (0..n).step_by(5) {
        let len = (n - start).min(5);
        for j0 in 0..len.min(3) {
            let mut jmin = j0;
            for j in j0 + 1..len {
                if values[(start + j) * stride] < values[(start + jmin) * stride] {
                    jmin = j;
                }
            }
            values.swap((start + j0) * stride, (start + jmin) * stride);
        }
    }
    let medians = (n + 2) / 5;
    select_strided(
        &mut values[2 * stride..],
        medians,
        medians / 2,
        stride * 5,
        None,
    )
}
