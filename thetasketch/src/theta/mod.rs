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

//! Theta sketch: approximate distinct counting with a hash table bounded by QuickSelect.
//!
//! A [`ThetaSketch`] hashes every update, keeps the hashes below a threshold theta in an
//! open-addressed table, and lowers theta whenever the table grows past its budget of
//! `k = 2^lg_k` entries. The number of distinct values is estimated as
//! `num_retained / (theta / MAX_THETA)`.
//!
//! The table can live on the heap ([`ThetaSketch`]) or inside a caller-owned buffer
//! ([`DirectThetaSketch`]). Both share the same update engine and query surface; a direct
//! sketch's buffer is at every moment a valid update image that [`ThetaSketch::deserialize`]
//! and [`DirectThetaSketch::wrap`] accept.
//!
//! # Examples
//!
//! ```
//! use thetasketch::theta::ThetaSketch;
//! use thetasketch::theta::UpdateReturnState;
//!
//! let mut sketch = ThetaSketch::builder().lg_k(12).build().unwrap();
//! assert_eq!(sketch.update_str("apple"), UpdateReturnState::InsertedCountIncremented);
//! assert_eq!(sketch.update_str("apple"), UpdateReturnState::RejectedDuplicate);
//! sketch.update_str("banana");
//! assert_eq!(sketch.estimate(), 2.0);
//! ```

mod compact;
mod direct;
mod hash_table;
mod quick_select;
mod serialization;
mod sketch;
mod slot;
mod storage;
mod update_value;

pub use self::compact::CompactThetaSketch;
pub use self::direct::DirectThetaSketch;
pub use self::sketch::ThetaSketch;
pub use self::sketch::ThetaSketchBuilder;
pub use self::storage::BufferStorage;
pub use self::storage::CacheStorage;
pub use self::storage::HeapStorage;
pub use self::storage::TableState;
pub use self::update_value::UpdateValue;

use crate::common::NumStdDev;
use crate::common::binomial_bounds;
use crate::error::Error;

/// Maximum theta value (signed max for compatibility with Java)
pub const MAX_THETA: u64 = i64::MAX as u64;

/// Minimum log2 of K
pub const MIN_LG_K: u8 = 5;

/// Maximum log2 of K
pub const MAX_LG_K: u8 = 26;

/// Default log2 of K
pub const DEFAULT_LG_K: u8 = 12;

/// Minimum log2 of the number of hash table slots
pub const MIN_LG_ARR_LONGS: u8 = 5;

/// Outcome of a single update.
///
/// Only [`UpdateReturnState::RejectedFull`] signals a problem; every other rejection is an
/// expected outcome of sketching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateReturnState {
    /// The hash was stored in an empty slot.
    InsertedCountIncremented,
    /// The hash overwrote a dirty slot; the number of occupied slots is unchanged.
    InsertedCountNotIncremented,
    /// The hash is already retained.
    RejectedDuplicate,
    /// The table is full and its resize policy or storage does not allow it to grow.
    RejectedFull,
    /// The input was empty.
    RejectedNullOrEmpty,
    /// The hash is not below theta.
    RejectedOverTheta,
}

impl UpdateReturnState {
    /// Returns true if the update stored a new hash.
    pub fn is_inserted(self) -> bool {
        matches!(
            self,
            UpdateReturnState::InsertedCountIncremented
                | UpdateReturnState::InsertedCountNotIncremented
        )
    }

    /// Returns true if the caller has to handle this outcome as an error.
    pub fn is_error(self) -> bool {
        self == UpdateReturnState::RejectedFull
    }

    /// Converts [`UpdateReturnState::RejectedFull`] into a
    /// [`CapacityExhausted`](crate::error::ErrorKind::CapacityExhausted) error.
    ///
    /// # Examples
    ///
    /// ```
    /// use thetasketch::theta::UpdateReturnState;
    ///
    /// assert!(UpdateReturnState::RejectedDuplicate.into_result().is_ok());
    /// assert!(UpdateReturnState::RejectedFull.into_result().is_err());
    /// ```
    pub fn into_result(self) -> Result<Self, Error> {
        if self.is_error() {
            Err(Error::capacity_exhausted())
        } else {
            Ok(self)
        }
    }
}

pub(crate) fn theta_fraction(theta: u64) -> f64 {
    theta as f64 / MAX_THETA as f64
}

pub(crate) fn estimation_mode(theta: u64, is_empty: bool) -> bool {
    theta < MAX_THETA && !is_empty
}

pub(crate) fn lower_bound(
    num_retained: usize,
    theta: u64,
    is_empty: bool,
    num_std_dev: NumStdDev,
) -> f64 {
    if !estimation_mode(theta, is_empty) {
        return num_retained as f64;
    }
    // theta of a live sketch is never zero, so the fraction is always in (0, 1]
    binomial_bounds::lower_bound(num_retained as u64, theta_fraction(theta), num_std_dev)
        .expect("theta should always be valid")
}

pub(crate) fn upper_bound(
    num_retained: usize,
    theta: u64,
    is_empty: bool,
    num_std_dev: NumStdDev,
) -> f64 {
    if !estimation_mode(theta, is_empty) {
        return num_retained as f64;
    }
    binomial_bounds::upper_bound(
        num_retained as u64,
        theta_fraction(theta),
        num_std_dev,
        is_empty,
    )
    .expect("theta should always be valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_update_return_state() {
        assert!(UpdateReturnState::InsertedCountIncremented.is_inserted());
        assert!(UpdateReturnState::InsertedCountNotIncremented.is_inserted());
        assert!(!UpdateReturnState::RejectedOverTheta.is_inserted());

        assert!(UpdateReturnState::RejectedFull.is_error());
        assert!(!UpdateReturnState::RejectedDuplicate.is_error());
        let err = UpdateReturnState::RejectedFull.into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityExhausted);
    }

    #[test]
    fn test_bounds_outside_estimation_mode() {
        assert_eq!(lower_bound(0, MAX_THETA / 2, true, NumStdDev::Two), 0.0);
        assert_eq!(upper_bound(17, MAX_THETA, false, NumStdDev::Three), 17.0);
    }

    #[test]
    fn test_bounds_bracket_estimate() {
        let theta = MAX_THETA / 4;
        let estimate = 1000.0 / theta_fraction(theta);
        for nsd in [NumStdDev::One, NumStdDev::Two, NumStdDev::Three] {
            assert!(lower_bound(1000, theta, false, nsd) < estimate);
            assert!(upper_bound(1000, theta, false, nsd) > estimate);
        }
        assert!(
            lower_bound(1000, theta, false, NumStdDev::Three)
                < lower_bound(1000, theta, false, NumStdDev::One)
        );
    }
}
