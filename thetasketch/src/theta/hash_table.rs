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

use tracing::debug;
use tracing::warn;

use crate::common::ResizeFactor;
use crate::error::Error;
use crate::hash::compute_seed_hash;
use crate::hash::murmurhash3_x64_128;
use crate::theta::MAX_THETA;
use crate::theta::MIN_LG_ARR_LONGS;
use crate::theta::UpdateReturnState;
use crate::theta::quick_select;
use crate::theta::serialization::UpdatePreamble;
use crate::theta::slot::SlotState;
use crate::theta::slot::is_valid;
use crate::theta::storage::CacheStorage;
use crate::theta::storage::HeapStorage;
use crate::theta::storage::TableState;

/// Resize threshold (0.5 = 50% load factor): the table grows as soon as its occupied slots
/// reach this fraction.
const RESIZE_THRESHOLD: f64 = 0.5;

/// Rebuild threshold (3/4 = 75% load factor), applied once the table is at its maximum size:
/// reaching it runs QuickSelect and rebuilds back to k entries.
pub(crate) const REBUILD_THRESHOLD: f64 = 0.75;

/// Stride hash bits (7 bits for stride calculation)
const STRIDE_HASH_BITS: u8 = 7;

/// Stride mask
const STRIDE_MASK: u64 = (1 << STRIDE_HASH_BITS) - 1;

/// Outcome of probing the table for a hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    /// The hash is already retained.
    Duplicate,
    /// The hash is absent and the probe ended on this empty slot.
    Empty(usize),
    /// The hash is absent and this is the first dirty slot on its probe path.
    Dirty(usize),
    /// The hash is absent and every slot holds another valid hash.
    Full,
}

/// Specific hash table for theta sketch
///
/// Slots live in a [`CacheStorage`] and are classified on the fly by [`SlotState`]. The table
/// grows up to 2^lg_max_size slots:
/// * Before it reaches the max capacity, it will extend the array based on resize_factor, as far
///   as the storage allows.
/// * Once it cannot grow and the number of entries exceeds the threshold, it will rebuild the
///   table: only keep the min 2^lg_nom_size entries and update the theta to the k-th smallest
///   entry.
#[derive(Debug)]
pub(crate) struct ThetaHashTable<S> {
    storage: S,
    lg_start_size: u8,
    lg_nom_size: u8,
    lg_max_size: u8,
    resize_factor: ResizeFactor,
    sampling_probability: f32,
    hash_seed: u64,

    // Logical emptiness of the source set. This can be false even when `num_retained` is 0 (e.g.
    // all updates screened by theta).
    is_empty: bool,

    theta: u64,

    // Number of non-empty slots, dirty ones included.
    num_entries: usize,

    // Number of slots holding a hash at or above theta. Only images written with a lowered theta
    // carry these; resize and rebuild drop them.
    num_dirty: usize,
}

impl<S: CacheStorage> ThetaHashTable<S> {
    /// Create an empty table in `storage`.
    ///
    /// The starting size is reduced to what the storage can hold. Fails if that is less than
    /// 2^[`MIN_LG_ARR_LONGS`] slots.
    pub fn new(
        mut storage: S,
        lg_nom_size: u8,
        resize_factor: ResizeFactor,
        sampling_probability: f32,
        hash_seed: u64,
    ) -> Result<Self, Error> {
        let lg_start_size = starting_lg_size(lg_nom_size, resize_factor, &storage)?;
        storage.try_reallocate(lg_start_size)?;
        let mut table = Self {
            storage,
            lg_start_size,
            lg_nom_size,
            lg_max_size: lg_nom_size + 1,
            resize_factor,
            sampling_probability,
            hash_seed,
            is_empty: true,
            theta: starting_theta_from_sampling_probability(sampling_probability),
            num_entries: 0,
            num_dirty: 0,
        };
        table.store_state();
        Ok(table)
    }

    /// Adopt a table whose slots are already in `storage`, as described by `preamble`.
    ///
    /// The slots are scanned once to verify the stored entry count and to find dirty slots.
    pub fn from_image(
        storage: S,
        preamble: &UpdatePreamble,
        hash_seed: u64,
    ) -> Result<Self, Error> {
        debug_assert_eq!(storage.lg_size(), preamble.lg_arr_longs);
        let mut num_entries = 0;
        let mut num_dirty = 0;
        for index in 0..1usize << storage.lg_size() {
            match SlotState::classify(storage.get(index), preamble.theta) {
                SlotState::Empty => {}
                SlotState::Valid => num_entries += 1,
                SlotState::Dirty => {
                    num_entries += 1;
                    num_dirty += 1;
                }
            }
        }
        if num_entries != preamble.num_entries as usize {
            return Err(Error::deserial(format!(
                "image claims {} retained entries but holds {num_entries}",
                preamble.num_entries
            )));
        }
        if preamble.is_empty && num_entries > 0 {
            return Err(Error::deserial("empty image holds retained entries"));
        }

        let lg_start_size = starting_lg_size(preamble.lg_nom_longs, preamble.resize_factor, &storage)?;
        Ok(Self {
            storage,
            lg_start_size,
            lg_nom_size: preamble.lg_nom_longs,
            lg_max_size: preamble.lg_nom_longs + 1,
            resize_factor: preamble.resize_factor,
            sampling_probability: preamble.sampling_probability,
            hash_seed,
            is_empty: preamble.is_empty,
            theta: preamble.theta,
            num_entries,
            num_dirty,
        })
    }

    /// Hash raw bytes with the table seed and return the hash.
    pub fn hash_bytes(&self, bytes: &[u8]) -> u64 {
        let (h1, _) = murmurhash3_x64_128(bytes, self.hash_seed);
        h1 >> 1
    }

    /// Inserts a pre-hashed value into the table.
    pub fn try_insert_hash(&mut self, hash: u64) -> UpdateReturnState {
        if hash == 0 {
            return UpdateReturnState::RejectedNullOrEmpty;
        }
        if hash >= self.theta {
            return UpdateReturnState::RejectedOverTheta;
        }

        loop {
            match self.probe(hash) {
                Probe::Duplicate => return UpdateReturnState::RejectedDuplicate,
                Probe::Empty(index) => {
                    self.storage.set(index, hash);
                    self.num_entries += 1;
                    self.after_insert();
                    return UpdateReturnState::InsertedCountIncremented;
                }
                Probe::Dirty(index) => {
                    self.storage.set(index, hash);
                    self.num_dirty -= 1;
                    self.after_insert();
                    return UpdateReturnState::InsertedCountNotIncremented;
                }
                Probe::Full => {
                    if !self.resize() {
                        warn!(
                            lg_arr_longs = self.storage.lg_size(),
                            num_entries = self.num_entries,
                            "theta hash table is full and cannot grow"
                        );
                        return UpdateReturnState::RejectedFull;
                    }
                }
            }
        }
    }

    fn after_insert(&mut self) {
        self.is_empty = false;
        if self.num_entries >= self.get_capacity() {
            if self.can_grow() {
                self.resize();
            } else if self.num_retained() > self.nominal_entries() || self.num_dirty > 0 {
                self.rebuild();
            }
        }
        self.store_state();
    }

    /// Walks the probe path of `hash` until it finds the hash, an empty slot, or has visited
    /// every slot.
    fn probe(&self, hash: u64) -> Probe {
        let lg_size = self.storage.lg_size();
        let mask = (1usize << lg_size) - 1;
        let stride = Self::get_stride(hash, lg_size);
        let mut index = (hash as usize) & mask;
        let loop_index = index;
        let mut first_dirty = None;

        loop {
            let value = self.storage.get(index);
            match SlotState::classify(value, self.theta) {
                SlotState::Empty => return first_dirty.map_or(Probe::Empty(index), Probe::Dirty),
                SlotState::Valid if value == hash => return Probe::Duplicate,
                SlotState::Dirty if first_dirty.is_none() => first_dirty = Some(index),
                _ => {}
            }
            index = (index + stride) & mask;
            if index == loop_index {
                return first_dirty.map_or(Probe::Full, Probe::Dirty);
            }
        }
    }

    /// Puts a hash known to be absent into the first empty slot of its probe path.
    ///
    /// Only used while refilling a freshly cleared table that has room for it.
    fn place(&mut self, hash: u64) {
        let lg_size = self.storage.lg_size();
        let mask = (1usize << lg_size) - 1;
        let stride = Self::get_stride(hash, lg_size);
        let mut index = (hash as usize) & mask;
        while self.storage.get(index) != 0 {
            index = (index + stride) & mask;
        }
        self.storage.set(index, hash);
    }

    /// Get capacity threshold
    fn get_capacity(&self) -> usize {
        let lg_size = self.storage.lg_size();
        let fraction = if lg_size < self.lg_max_size {
            RESIZE_THRESHOLD
        } else {
            REBUILD_THRESHOLD
        };
        (fraction * (1usize << lg_size) as f64) as usize
    }

    fn can_grow(&self) -> bool {
        let lg_size = self.storage.lg_size();
        self.resize_factor != ResizeFactor::X1
            && lg_size < self.lg_max_size
            && lg_size < self.storage.max_lg_size()
    }

    /// Resize the hash table, dropping dirty slots.
    ///
    /// Returns false if the table cannot grow.
    fn resize(&mut self) -> bool {
        if !self.can_grow() {
            return false;
        }
        let lg_cur_size = self.storage.lg_size();
        let new_lg_size = (lg_cur_size + self.resize_factor.lg_value())
            .min(self.lg_max_size)
            .min(self.storage.max_lg_size());

        let entries: Vec<u64> = self.iter().collect();
        if let Err(err) = self.storage.try_reallocate(new_lg_size) {
            debug!(%err, lg_arr_longs = new_lg_size, "storage refused to grow");
            return false;
        }
        for &entry in &entries {
            self.place(entry);
        }
        self.num_entries = entries.len();
        self.num_dirty = 0;
        debug!(
            from_lg_arr_longs = lg_cur_size,
            to_lg_arr_longs = new_lg_size,
            num_entries = self.num_entries,
            "resized theta hash table"
        );
        true
    }

    /// Rebuild the hash table in place:
    /// dirty slots are dropped, and if more than k valid entries remain, theta becomes the
    /// (k+1)-th smallest of them and only the k smaller ones are kept.
    pub fn rebuild(&mut self) {
        let mut entries: Vec<u64> = self.iter().collect();
        let k = self.nominal_entries();
        if entries.len() > k {
            let kth = quick_select::select(&mut entries, k);
            debug_assert!(kth < self.theta);
            self.theta = kth;
            entries.truncate(k);
        }

        self.storage.clear();
        for &entry in &entries {
            self.place(entry);
        }
        debug!(
            theta = self.theta,
            num_entries = entries.len(),
            dropped_dirty = self.num_dirty,
            "rebuilt theta hash table"
        );
        self.num_entries = entries.len();
        self.num_dirty = 0;
        self.store_state();
    }

    /// Trim the table to nominal size k
    pub fn trim(&mut self) {
        if self.num_retained() > self.nominal_entries() || self.num_dirty > 0 {
            self.rebuild();
        }
    }

    /// Reset the table to empty state
    pub fn reset(&mut self) {
        // the starting size was accepted by this storage before
        let lg_start_size = self.lg_start_size;
        self.storage
            .try_reallocate(lg_start_size)
            .unwrap_or_else(|_| self.storage.clear());
        self.num_entries = 0;
        self.num_dirty = 0;
        self.theta = starting_theta_from_sampling_probability(self.sampling_probability);
        self.is_empty = true;
        self.store_state();
    }

    /// Return number of retained entries
    pub fn num_retained(&self) -> usize {
        self.num_entries - self.num_dirty
    }

    /// Get theta
    pub fn theta(&self) -> u64 {
        self.theta
    }

    /// Check if emptiness of the source set
    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    /// Get iterator over valid entries
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        let theta = self.theta;
        (0..1usize << self.storage.lg_size())
            .map(|index| self.storage.get(index))
            .filter(move |&value| is_valid(value, theta))
    }

    /// Get log2 of nominal size
    pub fn lg_nom_size(&self) -> u8 {
        self.lg_nom_size
    }

    /// Get log2 of the current number of slots
    pub fn lg_cur_size(&self) -> u8 {
        self.storage.lg_size()
    }

    pub fn resize_factor(&self) -> ResizeFactor {
        self.resize_factor
    }

    pub fn sampling_probability(&self) -> f32 {
        self.sampling_probability
    }

    /// Get the hash of the seed that was used to hash the input.
    pub fn seed_hash(&self) -> u16 {
        compute_seed_hash(self.hash_seed)
    }

    /// All slots in table order, empty and dirty ones included.
    pub fn slots(&self) -> impl Iterator<Item = u64> + '_ {
        (0..1usize << self.storage.lg_size()).map(|index| self.storage.get(index))
    }

    pub fn preamble(&self) -> UpdatePreamble {
        UpdatePreamble {
            lg_nom_longs: self.lg_nom_size,
            lg_arr_longs: self.storage.lg_size(),
            resize_factor: self.resize_factor,
            is_empty: self.is_empty,
            seed_hash: self.seed_hash(),
            num_entries: self.num_entries as u32,
            sampling_probability: self.sampling_probability,
            theta: self.theta,
        }
    }

    /// Copy the table, slot for slot, into heap storage.
    pub fn to_heap(&self) -> ThetaHashTable<HeapStorage> {
        ThetaHashTable {
            storage: HeapStorage::from_slots(self.slots().collect()),
            lg_start_size: starting_lg_size_unbounded(self.lg_nom_size, self.resize_factor),
            lg_nom_size: self.lg_nom_size,
            lg_max_size: self.lg_max_size,
            resize_factor: self.resize_factor,
            sampling_probability: self.sampling_probability,
            hash_seed: self.hash_seed,
            is_empty: self.is_empty,
            theta: self.theta,
            num_entries: self.num_entries,
            num_dirty: self.num_dirty,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn nominal_entries(&self) -> usize {
        1 << self.lg_nom_size
    }

    fn store_state(&mut self) {
        let state = TableState {
            lg_arr_longs: self.storage.lg_size(),
            theta: self.theta,
            num_entries: self.num_entries as u32,
            is_empty: self.is_empty,
        };
        self.storage.store_state(&state);
    }

    /// Get stride for hash table probing
    fn get_stride(key: u64, lg_size: u8) -> usize {
        (2 * ((key >> (lg_size)) & STRIDE_MASK) + 1) as usize
    }
}

/// Starting table size for a sketch of nominal size `2^lg_nom_size`, before storage limits.
fn starting_lg_size_unbounded(lg_nom_size: u8, resize_factor: ResizeFactor) -> u8 {
    starting_sub_multiple(
        lg_nom_size + 1,
        MIN_LG_ARR_LONGS,
        resize_factor.lg_value(),
    )
}

/// Starting table size, reduced to what `storage` can hold.
fn starting_lg_size<S: CacheStorage>(
    lg_nom_size: u8,
    resize_factor: ResizeFactor,
    storage: &S,
) -> Result<u8, Error> {
    let lg_size = starting_lg_size_unbounded(lg_nom_size, resize_factor).min(storage.max_lg_size());
    if lg_size < MIN_LG_ARR_LONGS {
        return Err(Error::config(format!(
            "storage holds 2^{} slots, at least 2^{MIN_LG_ARR_LONGS} are required",
            storage.max_lg_size()
        )));
    }
    Ok(lg_size)
}

/// Compute initial lg_size for hash table based on target lg_size, minimum lg_size, and resize
/// factor. Make sure `lg_target = lg_init + n * lg_resize_factor`, where `n` is an integer and
/// `lg_init >= lg_min`
fn starting_sub_multiple(lg_target: u8, lg_min: u8, lg_resize_factor: u8) -> u8 {
    if lg_target <= lg_min {
        lg_min
    } else if lg_resize_factor == 0 {
        lg_target
    } else {
        ((lg_target - lg_min) % lg_resize_factor) + lg_min
    }
}

/// Compute initial theta for hash table based on sampling probability.
pub(crate) fn starting_theta_from_sampling_probability(sampling_probability: f32) -> u64 {
    if sampling_probability < 1.0 {
        (MAX_THETA as f64 * sampling_probability as f64) as u64
    } else {
        MAX_THETA
    }
}
