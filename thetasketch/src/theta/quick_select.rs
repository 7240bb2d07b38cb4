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

//! In-place order statistic selection used to pick a new theta.

/// Rearranges `values` so that `values[rank]` holds the value it would hold if the slice were
/// sorted, with no greater value before it and no smaller value after it. Returns that value.
///
/// Runs in expected linear time. The pivot is the median of the first, middle and last element
/// of the current range, which keeps already ordered input from degrading to quadratic time.
///
/// # Panics
///
/// Panics if `rank >= values.len()`.
pub(crate) fn select(values: &mut [u64], rank: usize) -> u64 {
    assert!(
        rank < values.len(),
        "rank {rank} out of range for {} values",
        values.len()
    );

    let mut lo = 0;
    let mut hi = values.len() - 1;
    while lo < hi {
        let pivot = partition(values, lo, hi);
        if rank < pivot {
            hi = pivot - 1;
        } else if rank > pivot {
            lo = pivot + 1;
        } else {
            return values[rank];
        }
    }
    values[rank]
}

/// Partitions `values[lo..=hi]` around a median-of-three pivot and returns the pivot's final
/// index. Smaller values end up to its left, the others to its right.
fn partition(values: &mut [u64], lo: usize, hi: usize) -> usize {
    let mid = lo + (hi - lo) / 2;
    if values[mid] < values[lo] {
        values.swap(mid, lo);
    }
    if values[hi] < values[lo] {
        values.swap(hi, lo);
    }
    if values[hi] < values[mid] {
        values.swap(hi, mid);
    }
    // median now sits at mid; park it at hi
    values.swap(mid, hi);
    let pivot = values[hi];

    let mut store = lo;
    for i in lo..hi {
        if values[i] < pivot {
            values.swap(i, store);
            store += 1;
        }
    }
    values.swap(store, hi);
    store
}
