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

//! Binary serialization format of theta sketches.
//!
//! Two images are produced by this crate. Both are little endian.
//!
//! # Update image (family 2, QuickSelect)
//!
//! The full hash table of an update sketch behind a fixed three-long preamble. A buffer-resident
//! sketch lives in exactly this layout, so wrapping its buffer is the same as deserializing it.
//!
//! | Byte  | Field            | Description                                             |
//! |-------|------------------|---------------------------------------------------------|
//! | 0     | preamble_longs   | Low 6 bits: always 3. High 2 bits: lg of resize factor  |
//! | 1     | serial_version   | Serialization version (currently 3)                     |
//! | 2     | family_id        | Family ID (2 for QuickSelect)                           |
//! | 3     | lg_k             | Log2 of nominal entries                                 |
//! | 4     | lg_arr_longs     | Log2 of the current number of table slots               |
//! | 5     | flags            | Bit flags (see below)                                   |
//! | 6-7   | seed_hash        | 16-bit hash of the seed                                 |
//! | 8-11  | retained_entries | Number of non-empty slots, dirty ones included          |
//! | 12-15 | p                | Sampling probability as float                           |
//! | 16-23 | theta            | Theta value as 64-bit integer                           |
//! | 24-   | slots            | `2^lg_arr_longs` 64-bit slots in table order            |
//!
//! # Compact image (family 3)
//!
//! | Byte | Field | Description |
//! |------|-------|-------------|
//! | 0 | preamble_longs | Number of 8-byte longs in preamble (1, 2, or 3) |
//! | 1 | serial_version | Serialization version (currently 3) |
//! | 2 | family_id | Family ID (3 for compact) |
//! | 3 | lg_k | Unused in compact format (0) |
//! | 4 | lg_resize | Unused in compact format (0) |
//! | 5 | flags | Bit flags (see below) |
//! | 6-7 | seed_hash | 16-bit hash of the seed |
//!
//! If preamble_longs >= 2:
//! | Byte 8-11 | retained_entries | Number of hash values stored |
//! | Byte 12-15 | p | Sampling probability as float (unused in compact, set to 1.0) |
//!
//! If preamble_longs >= 3:
//! | Byte 16-23 | theta | Theta value as 64-bit integer |
//!
//! Sorted hash values follow the preamble.
//!
//! ## Flags (Byte 5)
//!
//! | Bit | Name | Description |
//! |-----|------|-------------|
//! | 0 | BIG_ENDIAN | Not used (always 0 for little endian) |
//! | 1 | READ_ONLY | Sketch is read-only (always 1 for compact) |
//! | 2 | EMPTY | Sketch is empty |
//! | 3 | COMPACT | Sketch is in compact form |
//! | 4 | ORDERED | Hash values are sorted (always 1 for compact) |
//! | 5 | SINGLE_ITEM | Compact image holding exactly one hash behind one preamble long |

use crate::codec::Family;
use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::ensure_serial_version_is;
use crate::codec::insufficient_data;
use crate::common::ResizeFactor;
use crate::error::Error;
use crate::hash::compute_seed_hash;
use crate::theta::MAX_LG_K;
use crate::theta::MAX_THETA;
use crate::theta::MIN_LG_ARR_LONGS;
use crate::theta::MIN_LG_K;

pub const SERIAL_VERSION: u8 = 3;

pub const FLAG_READ_ONLY: u8 = 1 << 1;
pub const FLAG_EMPTY: u8 = 1 << 2;
pub const FLAG_COMPACT: u8 = 1 << 3;
pub const FLAG_ORDERED: u8 = 1 << 4;
pub const FLAG_SINGLE_ITEM: u8 = 1 << 5;

pub const PREAMBLE_LONGS_EMPTY: u8 = 1;
pub const PREAMBLE_LONGS_EXACT: u8 = 2;
pub const PREAMBLE_LONGS_ESTIMATION: u8 = 3;

pub const UPDATE_PREAMBLE_LONGS: u8 = 3;
pub const UPDATE_PREAMBLE_BYTES: usize = UPDATE_PREAMBLE_LONGS as usize * 8;

pub const HASH_SIZE_BYTES: usize = 8;
pub const DEFAULT_P_FLOAT_BITS: u32 = 0x3F80_0000;

// Offsets of the update preamble fields that change while a sketch is being updated.
pub(crate) const LG_ARR_LONGS_BYTE: usize = 4;
pub(crate) const FLAGS_BYTE: usize = 5;
pub(crate) const RETAINED_ENTRIES_INT: usize = 8;
pub(crate) const THETA_LONG: usize = 16;

const LG_RESIZE_FACTOR_SHIFT: u8 = 6;
const PREAMBLE_LONGS_MASK: u8 = 0x3F;

/// Decoded preamble of an update image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct UpdatePreamble {
    pub lg_nom_longs: u8,
    pub lg_arr_longs: u8,
    pub resize_factor: ResizeFactor,
    pub is_empty: bool,
    pub seed_hash: u16,
    pub num_entries: u32,
    pub sampling_probability: f32,
    pub theta: u64,
}

impl UpdatePreamble {
    pub fn write(&self, bytes: &mut SketchBytes) {
        bytes.write_u8(
            UPDATE_PREAMBLE_LONGS | (self.resize_factor.lg_value() << LG_RESIZE_FACTOR_SHIFT),
        );
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(Family::QUICKSELECT.id);
        bytes.write_u8(self.lg_nom_longs);
        bytes.write_u8(self.lg_arr_longs);
        bytes.write_u8(if self.is_empty { FLAG_EMPTY } else { 0 });
        bytes.write_u16_le(self.seed_hash);
        bytes.write_u32_le(self.num_entries);
        bytes.write_f32_le(self.sampling_probability);
        bytes.write_u64_le(self.theta);
    }

    /// Returns the encoded preamble.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = SketchBytes::with_capacity(UPDATE_PREAMBLE_BYTES);
        self.write(&mut bytes);
        bytes.into_bytes()
    }

    /// Reads the preamble at the start of `bytes` and validates it against `seed`.
    ///
    /// The slots that follow are not read.
    pub fn read(bytes: &[u8], seed: u64) -> Result<Self, Error> {
        let mut cursor = SketchSlice::new(bytes);
        let first_byte = cursor.read_u8().map_err(insufficient_data("preamble_longs"))?;
        let serial_version = cursor.read_u8().map_err(insufficient_data("serial_version"))?;
        let family_id = cursor.read_u8().map_err(insufficient_data("family_id"))?;
        let lg_nom_longs = cursor.read_u8().map_err(insufficient_data("lg_k"))?;
        let lg_arr_longs = cursor.read_u8().map_err(insufficient_data("lg_arr_longs"))?;
        let flags = cursor.read_u8().map_err(insufficient_data("flags"))?;
        let seed_hash = cursor.read_u16_le().map_err(insufficient_data("seed_hash"))?;
        let num_entries = cursor
            .read_u32_le()
            .map_err(insufficient_data("retained_entries"))?;
        let sampling_probability = cursor.read_f32_le().map_err(insufficient_data("p"))?;
        let theta = cursor.read_u64_le().map_err(insufficient_data("theta"))?;

        Family::QUICKSELECT.validate_id(family_id)?;
        Family::QUICKSELECT.validate_pre_longs(first_byte & PREAMBLE_LONGS_MASK)?;
        ensure_serial_version_is(SERIAL_VERSION, serial_version)?;

        let expected_seed_hash = compute_seed_hash(seed);
        if seed_hash != expected_seed_hash {
            return Err(Error::seed_hash_mismatch(expected_seed_hash, seed_hash));
        }

        if flags & FLAG_COMPACT != 0 {
            return Err(Error::deserial(
                "compact images cannot be read as update sketches",
            ));
        }
        if !(MIN_LG_K..=MAX_LG_K).contains(&lg_nom_longs) {
            return Err(Error::deserial(format!(
                "lg_k {lg_nom_longs} is out of range [{MIN_LG_K}, {MAX_LG_K}]"
            )));
        }
        if !(MIN_LG_ARR_LONGS..=lg_nom_longs + 1).contains(&lg_arr_longs) {
            return Err(Error::deserial(format!(
                "lg_arr_longs {lg_arr_longs} is out of range [{MIN_LG_ARR_LONGS}, {}]",
                lg_nom_longs + 1
            )));
        }
        if !(sampling_probability > 0.0 && sampling_probability <= 1.0) {
            return Err(Error::deserial(format!(
                "sampling probability {sampling_probability} is out of range (0.0, 1.0]"
            )));
        }
        if theta == 0 || theta > MAX_THETA {
            return Err(Error::deserial(format!(
                "theta {theta} is out of range [1, {MAX_THETA}]"
            )));
        }
        if u64::from(num_entries) > 1u64 << lg_arr_longs {
            return Err(Error::deserial(format!(
                "{num_entries} retained entries cannot fit in 2^{lg_arr_longs} slots"
            )));
        }

        Ok(Self {
            lg_nom_longs,
            lg_arr_longs,
            resize_factor: ResizeFactor::from_lg_value(first_byte >> LG_RESIZE_FACTOR_SHIFT),
            is_empty: flags & FLAG_EMPTY != 0,
            seed_hash,
            num_entries,
            sampling_probability,
            theta,
        })
    }

    /// Total image size: preamble plus every slot of the table.
    pub fn image_bytes(&self) -> usize {
        UPDATE_PREAMBLE_BYTES + (HASH_SIZE_BYTES << self.lg_arr_longs)
    }
}
