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

//! Storage strategies for the slots of a theta hash table.
//!
//! [`HeapStorage`] owns a growable vector. [`BufferStorage`] keeps the slots inside a
//! caller-owned byte buffer laid out as an update image, so the buffer is a valid serialized
//! sketch after every update.

use std::fmt;

use byteorder::ByteOrder;
use byteorder::LittleEndian;

use crate::error::Error;
use crate::theta::MAX_LG_K;
use crate::theta::serialization::FLAG_EMPTY;
use crate::theta::serialization::FLAGS_BYTE;
use crate::theta::serialization::HASH_SIZE_BYTES;
use crate::theta::serialization::LG_ARR_LONGS_BYTE;
use crate::theta::serialization::RETAINED_ENTRIES_INT;
use crate::theta::serialization::THETA_LONG;
use crate::theta::serialization::UPDATE_PREAMBLE_BYTES;

mod private {
    pub trait Sealed {}
}

/// Table metadata that changes while a sketch is updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableState {
    /// Log2 of the number of slots.
    pub lg_arr_longs: u8,
    /// Current theta.
    pub theta: u64,
    /// Number of non-empty slots, dirty ones included.
    pub num_entries: u32,
    /// Whether no update has been accepted yet.
    pub is_empty: bool,
}

/// Where the slots of a theta hash table live.
///
/// Slots are addressed by index in `[0, 2^lg_size())`. The trait is sealed: the crate provides
/// [`HeapStorage`] and [`BufferStorage`].
pub trait CacheStorage: private::Sealed {
    /// Log2 of the number of slots currently addressable.
    fn lg_size(&self) -> u8;

    /// Largest log2 size [`CacheStorage::try_reallocate`] can satisfy.
    fn max_lg_size(&self) -> u8;

    /// Reads the slot at `index`.
    fn get(&self, index: usize) -> u64;

    /// Writes the slot at `index`.
    fn set(&mut self, index: usize, value: u64);

    /// Zeroes every slot, keeping the current size.
    fn clear(&mut self);

    /// Replaces the slots with `2^lg_size` zeroed slots.
    ///
    /// On error the storage is left untouched.
    fn try_reallocate(&mut self, lg_size: u8) -> Result<(), Error>;

    /// Persists the table metadata next to the slots, if this storage keeps any.
    fn store_state(&mut self, _state: &TableState) {}
}

/// Slots in a privately owned vector.
#[derive(Debug, Clone, Default)]
pub struct HeapStorage {
    slots: Vec<u64>,
    lg_size: u8,
}

impl HeapStorage {
    /// Takes ownership of existing slots. `slots.len()` must be a power of two.
    pub(crate) fn from_slots(slots: Vec<u64>) -> Self {
        debug_assert!(slots.len().is_power_of_two());
        let lg_size = slots.len().trailing_zeros() as u8;
        Self { slots, lg_size }
    }
}

impl private::Sealed for HeapStorage {}

impl CacheStorage for HeapStorage {
    fn lg_size(&self) -> u8 {
        self.lg_size
    }

    fn max_lg_size(&self) -> u8 {
        MAX_LG_K + 1
    }

    fn get(&self, index: usize) -> u64 {
        self.slots[index]
    }

    fn set(&mut self, index: usize, value: u64) {
        self.slots[index] = value;
    }

    fn clear(&mut self) {
        self.slots.fill(0);
    }

    fn try_reallocate(&mut self, lg_size: u8) -> Result<(), Error> {
        if lg_size > self.max_lg_size() {
            return Err(Error::capacity_exhausted().with_context("lg_arr_longs", lg_size));
        }
        self.slots = vec![0; 1 << lg_size];
        self.lg_size = lg_size;
        Ok(())
    }
}

/// Slots inside a caller-owned byte buffer, following the update image layout.
///
/// The first [`UPDATE_PREAMBLE_BYTES`] bytes hold the preamble; slot `i` is the little-endian
/// u64 at byte `UPDATE_PREAMBLE_BYTES + 8 * i`. Every access goes through slice indexing and is
/// bounds checked.
pub struct BufferStorage<'a> {
    buffer: &'a mut [u8],
    lg_size: u8,
}

impl<'a> BufferStorage<'a> {
    /// Wraps `buffer` whose image currently holds `2^lg_size` slots.
    ///
    /// The caller guarantees the buffer is at least that large.
    pub(crate) fn new(buffer: &'a mut [u8], lg_size: u8) -> Self {
        debug_assert!(buffer.len() >= Self::bytes_for(lg_size));
        Self { buffer, lg_size }
    }

    /// Bytes needed for an image holding `2^lg_size` slots.
    pub(crate) fn bytes_for(lg_size: u8) -> usize {
        UPDATE_PREAMBLE_BYTES + (HASH_SIZE_BYTES << lg_size)
    }

    /// Largest log2 number of slots a buffer of `len` bytes can hold, if it can hold any.
    pub(crate) fn max_lg_size_for(len: usize) -> Option<u8> {
        let slots = len.checked_sub(UPDATE_PREAMBLE_BYTES)? / HASH_SIZE_BYTES;
        if slots == 0 {
            None
        } else {
            Some(slots.ilog2() as u8)
        }
    }

    /// Returns the image bytes currently in use.
    pub(crate) fn image(&self) -> &[u8] {
        &self.buffer[..Self::bytes_for(self.lg_size)]
    }

    fn slot_offset(index: usize) -> usize {
        UPDATE_PREAMBLE_BYTES + index * HASH_SIZE_BYTES
    }

    fn read_u64_at(&self, offset: usize) -> u64 {
        LittleEndian::read_u64(&self.buffer[offset..offset + 8])
    }

    fn write_u64_at(&mut self, offset: usize, value: u64) {
        LittleEndian::write_u64(&mut self.buffer[offset..offset + 8], value);
    }

    fn write_u32_at(&mut self, offset: usize, value: u32) {
        LittleEndian::write_u32(&mut self.buffer[offset..offset + 4], value);
    }
}

impl fmt::Debug for BufferStorage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferStorage")
            .field("capacity_bytes", &self.buffer.len())
            .field("lg_size", &self.lg_size)
            .finish()
    }
}

impl private::Sealed for BufferStorage<'_> {}

impl CacheStorage for BufferStorage<'_> {
    fn lg_size(&self) -> u8 {
        self.lg_size
    }

    fn max_lg_size(&self) -> u8 {
        Self::max_lg_size_for(self.buffer.len())
            .unwrap_or(0)
            .min(MAX_LG_K + 1)
    }

    fn get(&self, index: usize) -> u64 {
        debug_assert!(index < 1 << self.lg_size);
        self.read_u64_at(Self::slot_offset(index))
    }

    fn set(&mut self, index: usize, value: u64) {
        debug_assert!(index < 1 << self.lg_size);
        self.write_u64_at(Self::slot_offset(index), value);
    }

    fn clear(&mut self) {
        let end = Self::bytes_for(self.lg_size);
        self.buffer[UPDATE_PREAMBLE_BYTES..end].fill(0);
    }

    fn try_reallocate(&mut self, lg_size: u8) -> Result<(), Error> {
        if lg_size > self.max_lg_size() {
            return Err(Error::capacity_exhausted()
                .with_context("lg_arr_longs", lg_size)
                .with_context("buffer_bytes", self.buffer.len()));
        }
        self.lg_size = lg_size;
        self.clear();
        Ok(())
    }

    fn store_state(&mut self, state: &TableState) {
        self.buffer[LG_ARR_LONGS_BYTE] = state.lg_arr_longs;
        if state.is_empty {
            self.buffer[FLAGS_BYTE] |= FLAG_EMPTY;
        } else {
            self.buffer[FLAGS_BYTE] &= !FLAG_EMPTY;
        }
        self.write_u32_at(RETAINED_ENTRIES_INT, state.num_entries);
        self.write_u64_at(THETA_LONG, state.theta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_storage_reallocate() {
        let mut storage = HeapStorage::default();
        storage.try_reallocate(5).unwrap();
        assert_eq!(storage.lg_size(), 5);
        storage.set(31, 42);
        assert_eq!(storage.get(31), 42);

        storage.try_reallocate(6).unwrap();
        assert_eq!(storage.get(31), 0);
        assert!(storage.try_reallocate(MAX_LG_K + 2).is_err());
        assert_eq!(storage.lg_size(), 6);
    }

    #[test]
    fn test_buffer_max_lg_size() {
        assert_eq!(BufferStorage::max_lg_size_for(0), None);
        assert_eq!(BufferStorage::max_lg_size_for(UPDATE_PREAMBLE_BYTES + 7), None);
        assert_eq!(BufferStorage::max_lg_size_for(UPDATE_PREAMBLE_BYTES + 8), Some(0));
        assert_eq!(BufferStorage::max_lg_size_for(BufferStorage::bytes_for(5)), Some(5));
        assert_eq!(
            BufferStorage::max_lg_size_for(BufferStorage::bytes_for(5) + 8 * 31),
            Some(5)
        );
    }

    #[test]
    fn test_buffer_storage_slots_are_little_endian() {
        let mut buffer = vec![0xFFu8; BufferStorage::bytes_for(6)];
        let mut storage = BufferStorage::new(&mut buffer, 5);
        assert_eq!(storage.max_lg_size(), 6);

        storage.try_reallocate(5).unwrap();
        storage.set(1, 0x0102_0304_0506_0708);
        assert_eq!(storage.get(1), 0x0102_0304_0506_0708);
        assert_eq!(storage.get(0), 0);
        assert!(storage.try_reallocate(7).is_err());

        let offset = UPDATE_PREAMBLE_BYTES + 8;
        assert_eq!(&buffer[offset..offset + 2], &[0x08, 0x07]);
        // bytes past the active table are not touched
        assert_eq!(buffer[BufferStorage::bytes_for(5)], 0xFF);
    }

    #[test]
    fn test_buffer_storage_persists_state() {
        let mut buffer = vec![0u8; BufferStorage::bytes_for(5)];
        let mut storage = BufferStorage::new(&mut buffer, 5);
        storage.store_state(&TableState {
            lg_arr_longs: 5,
            theta: 12345,
            num_entries: 7,
            is_empty: true,
        });
        storage.store_state(&TableState {
            lg_arr_longs: 5,
            theta: 12345,
            num_entries: 8,
            is_empty: false,
        });
        assert_eq!(buffer[LG_ARR_LONGS_BYTE], 5);
        assert_eq!(buffer[FLAGS_BYTE] & FLAG_EMPTY, 0);
        assert_eq!(&buffer[RETAINED_ENTRIES_INT..RETAINED_ENTRIES_INT + 4], &[8, 0, 0, 0]);
        assert_eq!(LittleEndian::read_u64(&buffer[THETA_LONG..]), 12345);
    }
}
