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

//! Classification of the 64-bit slots of a theta hash table.

/// The state of one table slot relative to the current theta.
///
/// States are never stored: they are derived from the slot value and theta, so lowering theta
/// turns slots dirty without touching the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotState {
    /// Holds nothing.
    Empty,
    /// Holds a retained hash: `0 < value < theta`.
    Valid,
    /// Holds a hash that is no longer below theta. It is skipped by estimation and may be
    /// overwritten by a later insert.
    Dirty,
}

impl SlotState {
    /// Classifies a slot value against `theta`.
    ///
    /// Theta never exceeds `i64::MAX`, so values with the sign bit set are always dirty.
    pub fn classify(value: u64, theta: u64) -> Self {
        if value == 0 {
            SlotState::Empty
        } else if value < theta {
            SlotState::Valid
        } else {
            SlotState::Dirty
        }
    }
}

/// Returns true if `value` is a retained hash under `theta`.
pub(crate) fn is_valid(value: u64, theta: u64) -> bool {
    SlotState::classify(value, theta) == SlotState::Valid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theta::MAX_THETA;

    #[test]
    fn test_classify() {
        let theta = 1000;
        assert_eq!(SlotState::classify(0, theta), SlotState::Empty);
        assert_eq!(SlotState::classify(1, theta), SlotState::Valid);
        assert_eq!(SlotState::classify(999, theta), SlotState::Valid);
        assert_eq!(SlotState::classify(1000, theta), SlotState::Dirty);
        assert_eq!(SlotState::classify(u64::MAX, theta), SlotState::Dirty);
    }

    #[test]
    fn test_sign_bit_is_dirty_even_at_max_theta() {
        assert_eq!(SlotState::classify(1 << 63, MAX_THETA), SlotState::Dirty);
        assert_eq!(SlotState::classify(MAX_THETA, MAX_THETA), SlotState::Dirty);
        assert!(is_valid(MAX_THETA - 1, MAX_THETA));
    }
}
