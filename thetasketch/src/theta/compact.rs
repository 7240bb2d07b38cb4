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

//! Immutable theta sketch holding the retained hashes in ascending order.
//!
//! A CompactThetaSketch is what an update sketch reduces to once no more updates are expected:
//! theta, the sorted hashes below it, and the seed hash. Its image (family 3) is the smallest
//! serialized form of a theta sketch.

use crate::codec::Family;
use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::ensure_preamble_longs_in;
use crate::codec::ensure_serial_version_is;
use crate::codec::insufficient_data;
use crate::common::NumStdDev;
use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::compute_seed_hash;
use crate::theta::MAX_THETA;
use crate::theta::estimation_mode;
use crate::theta::serialization::*;
use crate::theta::theta_fraction;

/// Compact (immutable) theta sketch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactThetaSketch {
    theta: u64,
    entries: Vec<u64>,
    seed_hash: u16,
    is_empty: bool,
}

impl CompactThetaSketch {
    /// `entries` must be sorted and below `theta`.
    pub(crate) fn new(theta: u64, entries: Vec<u64>, seed_hash: u16, is_empty: bool) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0] < w[1]));
        Self {
            theta,
            entries,
            seed_hash,
            is_empty,
        }
    }

    /// Returns true if the sketch never saw an accepted hash.
    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    /// Estimated number of distinct values.
    pub fn estimate(&self) -> f64 {
        match self.is_empty {
            true => 0.0,
            false => self.entries.len() as f64 / self.theta(),
        }
    }

    /// Theta as a fraction of the hash space.
    pub fn theta(&self) -> f64 {
        theta_fraction(self.theta)
    }

    /// Theta as the raw 63-bit threshold.
    pub fn theta64(&self) -> u64 {
        self.theta
    }

    pub fn is_estimation_mode(&self) -> bool {
        estimation_mode(self.theta, self.is_empty)
    }

    pub fn num_retained(&self) -> usize {
        self.entries.len()
    }

    /// Retained hashes in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().copied()
    }

    pub fn seed_hash(&self) -> u16 {
        self.seed_hash
    }

    /// Lower bound of the estimate at the given confidence.
    pub fn lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        super::lower_bound(self.entries.len(), self.theta, self.is_empty, num_std_dev)
    }

    /// Upper bound of the estimate at the given confidence.
    pub fn upper_bound(&self, num_std_dev: NumStdDev) -> f64 {
        super::upper_bound(self.entries.len(), self.theta, self.is_empty, num_std_dev)
    }

    fn layout(&self) -> CompactLayout {
        if self.is_empty {
            CompactLayout::Empty
        } else if self.is_estimation_mode() {
            CompactLayout::Estimation
        } else if self.entries.len() == 1 {
            CompactLayout::SingleItem
        } else {
            CompactLayout::Exact
        }
    }

    /// Serializes the sketch into the compact image.
    ///
    /// An exact sketch holding a single hash uses the one-long single-item form.
    pub fn serialize(&self) -> Vec<u8> {
        let layout = self.layout();
        let preamble_longs = layout.preamble_longs();
        let mut bytes = SketchBytes::with_capacity(
            usize::from(preamble_longs) * 8 + self.entries.len() * HASH_SIZE_BYTES,
        );

        bytes.write_u8(preamble_longs);
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(Family::COMPACT.id);
        // lg_k and lg_arr_longs are meaningless once compacted
        bytes.write_u8(0);
        bytes.write_u8(0);
        bytes.write_u8(layout.flags());
        bytes.write_u16_le(self.seed_hash);

        match layout {
            CompactLayout::Empty | CompactLayout::SingleItem => {}
            CompactLayout::Exact => {
                bytes.write_u32_le(self.entries.len() as u32);
                bytes.write_u32_le(DEFAULT_P_FLOAT_BITS);
            }
            CompactLayout::Estimation => {
                bytes.write_u32_le(self.entries.len() as u32);
                bytes.write_u32_le(DEFAULT_P_FLOAT_BITS);
                bytes.write_u64_le(self.theta);
            }
        }
        self.entries.iter().for_each(|&hash| bytes.write_u64_le(hash));
        bytes.into_bytes()
    }

    /// Deserializes a compact image hashed with the default seed.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Self::deserialize_with_seed(bytes, DEFAULT_UPDATE_SEED)
    }

    /// Deserializes a compact image, checking that it was hashed with `seed`.
    pub fn deserialize_with_seed(bytes: &[u8], seed: u64) -> Result<Self, Error> {
        let mut cursor = SketchSlice::new(bytes);
        let preamble_longs = cursor.read_u8().map_err(insufficient_data("preamble_longs"))?;
        let serial_version = cursor.read_u8().map_err(insufficient_data("serial_version"))?;
        let family_id = cursor.read_u8().map_err(insufficient_data("family_id"))?;
        cursor.read_u16_le().map_err(insufficient_data("lg_k"))?;
        let flags = cursor.read_u8().map_err(insufficient_data("flags"))?;
        let seed_hash = cursor.read_u16_le().map_err(insufficient_data("seed_hash"))?;

        Family::COMPACT.validate_id(family_id)?;
        ensure_preamble_longs_in(
            &[
                PREAMBLE_LONGS_EMPTY,
                PREAMBLE_LONGS_EXACT,
                PREAMBLE_LONGS_ESTIMATION,
            ],
            preamble_longs,
        )?;
        ensure_serial_version_is(SERIAL_VERSION, serial_version)?;
        let expected_seed_hash = compute_seed_hash(seed);
        if seed_hash != expected_seed_hash {
            return Err(Error::seed_hash_mismatch(expected_seed_hash, seed_hash));
        }
        if flags & FLAG_COMPACT == 0 {
            return Err(Error::deserial(
                "update images must be read with ThetaSketch::deserialize",
            ));
        }

        let layout = CompactLayout::from_preamble(preamble_longs, flags)?;
        let (num_entries, theta) = match layout {
            CompactLayout::Empty => {
                return Ok(Self::new(MAX_THETA, Vec::new(), seed_hash, true));
            }
            CompactLayout::SingleItem => (1, MAX_THETA),
            CompactLayout::Exact | CompactLayout::Estimation => {
                let num_entries = cursor
                    .read_u32_le()
                    .map_err(insufficient_data("num_entries"))?;
                cursor.read_u32_le().map_err(insufficient_data("p"))?;
                let theta = if layout == CompactLayout::Estimation {
                    cursor.read_u64_le().map_err(insufficient_data("theta"))?
                } else {
                    MAX_THETA
                };
                (num_entries as usize, theta)
            }
        };

        let entries = (0..num_entries)
            .map(|_| cursor.read_u64_le())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| {
                Error::insufficient_data("entries").with_context("num_entries", num_entries)
            })?;
        Self::checked(theta, entries, seed_hash)
    }

    /// Rejects decoded entries that are out of order, zero, or not below theta.
    fn checked(theta: u64, entries: Vec<u64>, seed_hash: u16) -> Result<Self, Error> {
        if theta == 0 || theta > MAX_THETA {
            return Err(Error::deserial(format!(
                "theta {theta} is out of range [1, {MAX_THETA}]"
            )));
        }
        let ascending = entries.windows(2).all(|pair| pair[0] < pair[1]);
        if !ascending || entries.iter().any(|&hash| hash == 0 || hash >= theta) {
            return Err(Error::deserial(
                "compact entries must be ascending, non-zero and below theta",
            ));
        }
        Ok(Self::new(theta, entries, seed_hash, false))
    }
}

/// The four shapes a compact image can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompactLayout {
    Empty,
    SingleItem,
    Exact,
    Estimation,
}

impl CompactLayout {
    fn preamble_longs(self) -> u8 {
        match self {
            CompactLayout::Empty | CompactLayout::SingleItem => PREAMBLE_LONGS_EMPTY,
            CompactLayout::Exact => PREAMBLE_LONGS_EXACT,
            CompactLayout::Estimation => PREAMBLE_LONGS_ESTIMATION,
        }
    }

    fn flags(self) -> u8 {
        let flags = FLAG_READ_ONLY | FLAG_COMPACT | FLAG_ORDERED;
        match self {
            CompactLayout::Empty => flags | FLAG_EMPTY,
            CompactLayout::SingleItem => flags | FLAG_SINGLE_ITEM,
            CompactLayout::Exact | CompactLayout::Estimation => flags,
        }
    }

    fn from_preamble(preamble_longs: u8, flags: u8) -> Result<Self, Error> {
        if flags & FLAG_EMPTY != 0 {
            return Ok(CompactLayout::Empty);
        }
        match preamble_longs {
            PREAMBLE_LONGS_EMPTY if flags & FLAG_SINGLE_ITEM != 0 => Ok(CompactLayout::SingleItem),
            PREAMBLE_LONGS_EMPTY => Err(Error::deserial(
                "non-empty sketch with one preamble long must be a single item",
            )),
            PREAMBLE_LONGS_EXACT => Ok(CompactLayout::Exact),
            _ => Ok(CompactLayout::Estimation),
        }
    }
}
