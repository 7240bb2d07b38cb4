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

//! Updatable theta sketch.

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::insufficient_data;
use crate::common::NumStdDev;
use crate::common::ResizeFactor;
use crate::common::canonical_double;
use crate::common::check_probability;
use crate::common::exact_log2;
use crate::common::is_power_of_2;
use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::compute_seed_hash;
use crate::theta::CompactThetaSketch;
use crate::theta::DEFAULT_LG_K;
use crate::theta::DirectThetaSketch;
use crate::theta::MAX_LG_K;
use crate::theta::MAX_THETA;
use crate::theta::MIN_LG_K;
use crate::theta::UpdateReturnState;
use crate::theta::UpdateValue;
use crate::theta::estimation_mode;
use crate::theta::hash_table::ThetaHashTable;
use crate::theta::hash_table::starting_theta_from_sampling_probability;
use crate::theta::serialization::UPDATE_PREAMBLE_BYTES;
use crate::theta::serialization::UpdatePreamble;
use crate::theta::storage::CacheStorage;
use crate::theta::storage::HeapStorage;
use crate::theta::theta_fraction;

/// Mutable theta sketch.
///
/// The storage parameter selects where the hash table lives: [`HeapStorage`] (the default) owns
/// its slots, [`BufferStorage`](crate::theta::BufferStorage) keeps them in a caller-owned buffer
/// (see [`DirectThetaSketch`]).
///
/// A sketch is not synchronized. Updates need exclusive access (`&mut self`); queries may run
/// concurrently while no update is in flight.
#[derive(Debug)]
pub struct ThetaSketch<S: CacheStorage = HeapStorage> {
    pub(crate) table: ThetaHashTable<S>,
}

impl ThetaSketch {
    /// Create a new builder for ThetaSketch
    ///
    /// # Examples
    ///
    /// ```
    /// # use thetasketch::theta::ThetaSketch;
    /// let sketch = ThetaSketch::builder().lg_k(12).build().unwrap();
    /// assert_eq!(sketch.lg_k(), 12);
    /// ```
    pub fn builder() -> ThetaSketchBuilder {
        ThetaSketchBuilder::default()
    }

    /// Deserializes an update image hashed with the default seed.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Self::deserialize_with_seed(bytes, DEFAULT_UPDATE_SEED)
    }

    /// Deserializes an update image, checking that it was hashed with `seed`.
    ///
    /// # Errors
    ///
    /// Returns a [`SeedMismatch`](crate::error::ErrorKind::SeedMismatch) error if the image
    /// was built with another seed, and a
    /// [`MalformedDeserializeData`](crate::error::ErrorKind::MalformedDeserializeData) error if
    /// the image is truncated or inconsistent.
    ///
    /// # Examples
    ///
    /// ```
    /// # use thetasketch::theta::ThetaSketch;
    /// let mut sketch = ThetaSketch::builder().seed(7).build().unwrap();
    /// sketch.update_u64(1);
    /// let bytes = sketch.serialize();
    /// assert!(ThetaSketch::deserialize(&bytes).is_err());
    /// let restored = ThetaSketch::deserialize_with_seed(&bytes, 7).unwrap();
    /// assert_eq!(restored.estimate(), 1.0);
    /// ```
    pub fn deserialize_with_seed(bytes: &[u8], seed: u64) -> Result<Self, Error> {
        let preamble = UpdatePreamble::read(bytes, seed)?;
        let num_slots = 1usize << preamble.lg_arr_longs;

        let mut cursor = SketchSlice::new(&bytes[UPDATE_PREAMBLE_BYTES..]);
        let mut slots = Vec::with_capacity(num_slots);
        for _ in 0..num_slots {
            slots.push(cursor.read_u64_le().map_err(insufficient_data("slots"))?);
        }

        let table = ThetaHashTable::from_image(HeapStorage::from_slots(slots), &preamble, seed)?;
        Ok(ThetaSketch { table })
    }
}

impl<S: CacheStorage> ThetaSketch<S> {
    /// Update the sketch with a string, byte sequence or number
    ///
    /// Equivalent to the typed `update_*` method for the value's type: both retain the same
    /// hash, and empty strings or byte sequences return
    /// [`RejectedNullOrEmpty`](UpdateReturnState::RejectedNullOrEmpty).
    ///
    /// # Examples
    ///
    /// ```
    /// # use thetasketch::theta::ThetaSketch;
    /// # use thetasketch::theta::UpdateReturnState;
    /// let mut sketch = ThetaSketch::builder().build().unwrap();
    /// sketch.update("apple");
    /// assert_eq!(sketch.update_str("apple"), UpdateReturnState::RejectedDuplicate);
    /// assert_eq!(sketch.update(""), UpdateReturnState::RejectedNullOrEmpty);
    /// ```
    pub fn update<T: UpdateValue>(&mut self, value: T) -> UpdateReturnState {
        value.update_sketch(self)
    }

    /// Update the sketch with the little-endian bytes of an unsigned integer.
    pub fn update_u64(&mut self, value: u64) -> UpdateReturnState {
        self.update_bytes(&value.to_le_bytes())
    }

    /// Update the sketch with the little-endian bytes of a signed integer.
    pub fn update_i64(&mut self, value: i64) -> UpdateReturnState {
        self.update_bytes(&value.to_le_bytes())
    }

    /// Update the sketch with a f64 value
    ///
    /// `-0.0` counts as `0.0` and all NaNs count as one value.
    pub fn update_f64(&mut self, value: f64) -> UpdateReturnState {
        // Canonicalize double for compatibility with Java
        self.update_i64(canonical_double(value))
    }

    /// Update the sketch with a f32 value
    pub fn update_f32(&mut self, value: f32) -> UpdateReturnState {
        self.update_f64(value as f64)
    }

    /// Update the sketch with the UTF-8 bytes of a string. Empty strings are rejected.
    pub fn update_str(&mut self, value: &str) -> UpdateReturnState {
        self.update_bytes(value.as_bytes())
    }

    /// Update the sketch with raw bytes. Empty input is rejected.
    pub fn update_bytes(&mut self, value: &[u8]) -> UpdateReturnState {
        if value.is_empty() {
            return UpdateReturnState::RejectedNullOrEmpty;
        }
        let hash = self.table.hash_bytes(value);
        self.table.try_insert_hash(hash)
    }

    /// Update the sketch with an already computed 63-bit hash.
    ///
    /// The hash must have been derived with this sketch's seed for the estimate to be
    /// meaningful.
    pub fn update_hash(&mut self, hash: u64) -> UpdateReturnState {
        self.table.try_insert_hash(hash)
    }

    /// Return cardinality estimate
    pub fn estimate(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.num_retained() as f64 / self.theta()
    }

    /// Return theta as a fraction (0.0 to 1.0)
    pub fn theta(&self) -> f64 {
        theta_fraction(self.table.theta())
    }

    /// Return theta as u64
    pub fn theta64(&self) -> u64 {
        self.table.theta()
    }

    /// Check if sketch is empty
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Check if sketch is in estimation mode
    pub fn is_estimation_mode(&self) -> bool {
        estimation_mode(self.table.theta(), self.table.is_empty())
    }

    /// Return number of retained entries
    pub fn num_retained(&self) -> usize {
        self.table.num_retained()
    }

    /// Return lg_k
    pub fn lg_k(&self) -> u8 {
        self.table.lg_nom_size()
    }

    /// Return log2 of the current number of hash table slots
    pub fn lg_arr_longs(&self) -> u8 {
        self.table.lg_cur_size()
    }

    pub fn resize_factor(&self) -> ResizeFactor {
        self.table.resize_factor()
    }

    pub fn sampling_probability(&self) -> f32 {
        self.table.sampling_probability()
    }

    /// Return the 16-bit hash of the seed
    pub fn seed_hash(&self) -> u16 {
        self.table.seed_hash()
    }

    /// Drops dirty slots and, if more than k entries are retained, lowers theta so that exactly
    /// k remain.
    pub fn rebuild(&mut self) {
        self.table.trim();
    }

    /// Reset the sketch to empty state
    ///
    /// Theta goes back to its starting value; this starts a new lifetime of the sketch.
    pub fn reset(&mut self) {
        self.table.reset();
    }

    /// Return iterator over retained hash values
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.table.iter()
    }

    /// Returns the approximate lower error bound given the specified number of standard
    /// deviations.
    ///
    /// # Examples
    ///
    /// ```
    /// # use thetasketch::theta::ThetaSketch;
    /// # use thetasketch::common::NumStdDev;
    /// let mut sketch = ThetaSketch::builder().lg_k(5).build().unwrap();
    /// for i in 0..1000u64 {
    ///     sketch.update_u64(i);
    /// }
    /// assert!(sketch.lower_bound(NumStdDev::Two) <= sketch.estimate());
    /// ```
    pub fn lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        super::lower_bound(
            self.num_retained(),
            self.table.theta(),
            self.is_empty(),
            num_std_dev,
        )
    }

    /// Returns the approximate upper error bound given the specified number of standard
    /// deviations.
    pub fn upper_bound(&self, num_std_dev: NumStdDev) -> f64 {
        super::upper_bound(
            self.num_retained(),
            self.table.theta(),
            self.is_empty(),
            num_std_dev,
        )
    }

    /// Returns an immutable copy with the retained hashes sorted.
    pub fn compact(&self) -> CompactThetaSketch {
        let mut entries: Vec<u64> = self.iter().collect();
        entries.sort_unstable();
        let theta = if self.is_empty() {
            MAX_THETA
        } else {
            self.table.theta()
        };
        CompactThetaSketch::new(theta, entries, self.seed_hash(), self.is_empty())
    }

    /// Serializes the sketch as an update image: the preamble followed by every table slot.
    pub fn serialize(&self) -> Vec<u8> {
        let preamble = self.table.preamble();
        let mut bytes = SketchBytes::with_capacity(preamble.image_bytes());
        preamble.write(&mut bytes);
        for slot in self.table.slots() {
            bytes.write_u64_le(slot);
        }
        bytes.into_bytes()
    }

    /// Copies the sketch into heap storage.
    pub fn to_heap(&self) -> ThetaSketch {
        ThetaSketch {
            table: self.table.to_heap(),
        }
    }
}

/// Builder for ThetaSketch
#[derive(Debug, Clone)]
pub struct ThetaSketchBuilder {
    nominal_entries: u64,
    resize_factor: ResizeFactor,
    sampling_probability: f32,
    seed: u64,
}

impl Default for ThetaSketchBuilder {
    fn default() -> Self {
        Self {
            nominal_entries: 1 << DEFAULT_LG_K,
            resize_factor: ResizeFactor::X8,
            sampling_probability: 1.0,
            seed: DEFAULT_UPDATE_SEED,
        }
    }
}

impl ThetaSketchBuilder {
    /// Set lg_k (log2 of nominal size k), in `[MIN_LG_K, MAX_LG_K]`.
    pub fn lg_k(mut self, lg_k: u8) -> Self {
        self.nominal_entries = 1u64.checked_shl(u32::from(lg_k)).unwrap_or(0);
        self
    }

    /// Set the nominal number of entries k. Must be a power of two.
    pub fn nominal_entries(mut self, nominal_entries: u32) -> Self {
        self.nominal_entries = u64::from(nominal_entries);
        self
    }

    /// Set resize factor
    pub fn resize_factor(mut self, factor: ResizeFactor) -> Self {
        self.resize_factor = factor;
        self
    }

    /// Set sampling probability p, in `(0.0, 1.0]`.
    ///
    /// The sketch starts with theta = p, so only about a fraction p of the distinct values is
    /// ever retained.
    pub fn sampling_probability(mut self, probability: f32) -> Self {
        self.sampling_probability = probability;
        self
    }

    /// Set hash seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Build the ThetaSketch
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigInvalid`](crate::error::ErrorKind::ConfigInvalid) error if k is not a
    /// power of two in range, if p is outside `(0.0, 1.0]`, or if the seed hashes to zero.
    pub fn build(self) -> Result<ThetaSketch, Error> {
        let lg_k = self.validate()?;
        let table = ThetaHashTable::new(
            HeapStorage::default(),
            lg_k,
            self.resize_factor,
            self.sampling_probability,
            self.seed,
        )?;
        Ok(ThetaSketch { table })
    }

    /// Build the sketch inside `buffer`, which is overwritten with an empty update image.
    ///
    /// The table grows as far as the buffer allows; see
    /// [`DirectThetaSketch::required_bytes`] for the size that allows full growth.
    ///
    /// # Errors
    ///
    /// Same as [`ThetaSketchBuilder::build`], plus a
    /// [`ConfigInvalid`](crate::error::ErrorKind::ConfigInvalid) error if the buffer cannot hold
    /// the smallest table.
    pub fn build_direct(self, buffer: &mut [u8]) -> Result<DirectThetaSketch<'_>, Error> {
        let lg_k = self.validate()?;
        DirectThetaSketch::initialize(
            buffer,
            lg_k,
            self.resize_factor,
            self.sampling_probability,
            self.seed,
        )
    }

    /// Checks the configuration and returns lg_k.
    fn validate(&self) -> Result<u8, Error> {
        if !is_power_of_2(self.nominal_entries) {
            return Err(Error::config(format!(
                "nominal entries must be a power of 2, got {}",
                self.nominal_entries
            )));
        }
        let lg_k = exact_log2(self.nominal_entries);
        if !(MIN_LG_K..=MAX_LG_K).contains(&lg_k) {
            return Err(Error::config(format!(
                "lg_k must be in [{MIN_LG_K}, {MAX_LG_K}], got {lg_k}"
            )));
        }
        check_probability(self.sampling_probability, "sampling_probability")?;
        if starting_theta_from_sampling_probability(self.sampling_probability) == 0 {
            return Err(Error::config(format!(
                "sampling_probability {} is too small to accept any hash",
                self.sampling_probability
            )));
        }
        if compute_seed_hash(self.seed) == 0 {
            return Err(Error::config(format!(
                "seed {} hashes to 0, choose a different seed",
                self.seed
            )));
        }
        Ok(lg_k)
    }
}
