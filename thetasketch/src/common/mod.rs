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

//! Types and numeric helpers shared across the theta sketch modules.

pub mod binomial_bounds;

use std::fmt;

use crate::error::Error;

/// Growth policy of the hash table backing an update sketch.
///
/// The table grows by `2^lg_value()` each time it resizes, until it reaches its maximum size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResizeFactor {
    /// Never grow: the table starts at the largest size it will ever have.
    X1,
    /// Double the table on every resize.
    X2,
    /// Quadruple the table on every resize.
    X4,
    /// Multiply the table by eight on every resize.
    #[default]
    X8,
}

impl ResizeFactor {
    /// Returns log2 of the growth multiplier.
    pub const fn lg_value(self) -> u8 {
        match self {
            ResizeFactor::X1 => 0,
            ResizeFactor::X2 => 1,
            ResizeFactor::X4 => 2,
            ResizeFactor::X8 => 3,
        }
    }

    /// Returns the growth multiplier.
    pub const fn value(self) -> u32 {
        1 << self.lg_value()
    }

    /// Returns the resize factor for the given log2 multiplier.
    ///
    /// Only the low two bits are considered, matching the two-bit field of the update sketch
    /// preamble.
    pub const fn from_lg_value(lg: u8) -> Self {
        match lg & 0x3 {
            0 => ResizeFactor::X1,
            1 => ResizeFactor::X2,
            2 => ResizeFactor::X4,
            _ => ResizeFactor::X8,
        }
    }
}

/// Number of standard deviations for confidence bounds.
///
/// Corresponds to two-sided confidence levels of about 68.3%, 95.4% and 99.7%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumStdDev {
    /// One standard deviation (~68.3% confidence).
    One = 1,
    /// Two standard deviations (~95.4% confidence).
    Two = 2,
    /// Three standard deviations (~99.7% confidence).
    Three = 3,
}

impl NumStdDev {
    /// Returns the number of standard deviations as an integer.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns the number of standard deviations as a floating point value.
    pub const fn as_f64(self) -> f64 {
        self as u8 as f64
    }
}

impl TryFrom<u8> for NumStdDev {
    type Error = Error;

    /// # Examples
    ///
    /// ```
    /// use thetasketch::common::NumStdDev;
    ///
    /// assert_eq!(NumStdDev::try_from(2).unwrap(), NumStdDev::Two);
    /// assert!(NumStdDev::try_from(4).is_err());
    /// ```
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(NumStdDev::One),
            2 => Ok(NumStdDev::Two),
            3 => Ok(NumStdDev::Three),
            _ => Err(Error::config(format!(
                "num_std_dev must be 1, 2 or 3, got {value}"
            ))),
        }
    }
}

impl fmt::Display for NumStdDev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Canonicalize double value for compatibility with Java
///
/// Both zeros hash as `0.0` and every NaN hashes as the canonical NaN.
pub(crate) fn canonical_double(value: f64) -> i64 {
    if value.is_nan() {
        0x7ff8000000000000i64
    } else {
        (value + 0.0).to_bits() as i64
    }
}

/// Returns true if `v` is a positive integer power of two.
pub(crate) fn is_power_of_2(v: u64) -> bool {
    v > 0 && (v & (v - 1)) == 0
}

/// Returns log2 of a power of two.
pub(crate) fn exact_log2(v: u64) -> u8 {
    debug_assert!(is_power_of_2(v), "{v} is not a power of 2");
    v.trailing_zeros() as u8
}

/// Checks that `p` is a valid sampling probability: `0 < p <= 1`.
pub(crate) fn check_probability(p: f32, arg_name: &'static str) -> Result<(), Error> {
    if p > 0.0 && p <= 1.0 {
        Ok(())
    } else {
        Err(Error::config(format!(
            "{arg_name} must be in (0.0, 1.0], got {p}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_powers_of_two() {
        assert!(is_power_of_2(1));
        assert!(is_power_of_2(4096));
        assert!(!is_power_of_2(0));
        assert!(!is_power_of_2(4095));

        assert_eq!(exact_log2(1), 0);
        assert_eq!(exact_log2(4096), 12);
    }

    #[test]
    fn test_check_probability() {
        assert!(check_probability(1.0, "p").is_ok());
        assert!(check_probability(0.001, "p").is_ok());
        assert!(check_probability(0.0, "p").is_err());
        assert!(check_probability(-0.5, "p").is_err());
        assert!(check_probability(1.5, "p").is_err());
        assert!(check_probability(f32::NAN, "p").is_err());
    }

    #[test]
    fn test_resize_factor_lg_round_trip() {
        for rf in [
            ResizeFactor::X1,
            ResizeFactor::X2,
            ResizeFactor::X4,
            ResizeFactor::X8,
        ] {
            assert_eq!(ResizeFactor::from_lg_value(rf.lg_value()), rf);
        }
        assert_eq!(ResizeFactor::X4.value(), 4);
        assert_eq!(ResizeFactor::default(), ResizeFactor::X8);
    }

    #[test]
    fn test_num_std_dev_conversion() {
        assert_eq!(NumStdDev::try_from(1).unwrap(), NumStdDev::One);
        assert_eq!(NumStdDev::try_from(3).unwrap().as_f64(), 3.0);
        let err = NumStdDev::try_from(0).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_canonical_double() {
        assert_eq!(canonical_double(0.0), canonical_double(-0.0));
        assert_eq!(canonical_double(f64::NAN), canonical_double(-f64::NAN));
        assert_ne!(canonical_double(1.0), canonical_double(2.0));
    }
}
