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

//! Theta sketch whose hash table lives in a caller-owned buffer.

use tracing::debug;

use crate::common::ResizeFactor;
use crate::error::Error;
use crate::hash::compute_seed_hash;
use crate::theta::MAX_LG_K;
use crate::theta::MIN_LG_ARR_LONGS;
use crate::theta::ThetaSketch;
use crate::theta::ThetaSketchBuilder;
use crate::theta::hash_table::ThetaHashTable;
use crate::theta::hash_table::starting_theta_from_sampling_probability;
use crate::theta::serialization::UPDATE_PREAMBLE_BYTES;
use crate::theta::serialization::UpdatePreamble;
use crate::theta::storage::BufferStorage;

/// A theta sketch stored in a caller-owned byte buffer.
///
/// The buffer always holds a valid update image: after any update it can be handed to
/// [`ThetaSketch::deserialize`] or wrapped again with [`DirectThetaSketch::wrap`]. The table
/// grows only as far as the buffer allows; once it cannot grow and is not due for a rebuild,
/// updates return [`RejectedFull`](crate::theta::UpdateReturnState::RejectedFull).
///
/// # Examples
///
/// ```
/// use thetasketch::theta::DirectThetaSketch;
/// use thetasketch::theta::ThetaSketch;
///
/// let mut buffer = vec![0u8; DirectThetaSketch::required_bytes(10)];
/// {
///     let mut sketch = ThetaSketch::builder().lg_k(10).build_direct(&mut buffer).unwrap();
///     for i in 0..100u64 {
///         sketch.update_u64(i);
///     }
/// }
/// let sketch = DirectThetaSketch::wrap(&mut buffer, 9001).unwrap();
/// assert_eq!(sketch.estimate(), 100.0);
/// ```
pub type DirectThetaSketch<'a> = ThetaSketch<BufferStorage<'a>>;

impl<'a> ThetaSketch<BufferStorage<'a>> {
    /// Builds an empty sketch configured by `builder` inside `buffer`.
    ///
    /// Equivalent to [`ThetaSketchBuilder::build_direct`].
    pub fn new(buffer: &'a mut [u8], builder: ThetaSketchBuilder) -> Result<Self, Error> {
        builder.build_direct(buffer)
    }

    /// Bytes a buffer needs so that a sketch of nominal size `2^lg_k` can reach its full table
    /// size.
    pub fn required_bytes(lg_k: u8) -> usize {
        BufferStorage::bytes_for(lg_k.min(MAX_LG_K) + 1)
    }

    pub(crate) fn initialize(
        buffer: &'a mut [u8],
        lg_k: u8,
        resize_factor: ResizeFactor,
        sampling_probability: f32,
        seed: u64,
    ) -> Result<Self, Error> {
        let min_bytes = BufferStorage::bytes_for(MIN_LG_ARR_LONGS);
        if buffer.len() < min_bytes {
            return Err(Error::config(format!(
                "buffer of {} bytes is smaller than the minimum of {min_bytes} bytes",
                buffer.len()
            )));
        }

        let preamble = UpdatePreamble {
            lg_nom_longs: lg_k,
            lg_arr_longs: MIN_LG_ARR_LONGS,
            resize_factor,
            is_empty: true,
            seed_hash: compute_seed_hash(seed),
            num_entries: 0,
            sampling_probability,
            theta: starting_theta_from_sampling_probability(sampling_probability),
        };
        buffer[..UPDATE_PREAMBLE_BYTES].copy_from_slice(&preamble.to_bytes());

        let capacity = buffer.len();
        let storage = BufferStorage::new(buffer, MIN_LG_ARR_LONGS);
        let table = ThetaHashTable::new(storage, lg_k, resize_factor, sampling_probability, seed)?;
        debug!(
            lg_k,
            lg_arr_longs = table.lg_cur_size(),
            buffer_bytes = capacity,
            "initialized direct theta sketch"
        );
        Ok(ThetaSketch { table })
    }

    /// Adopts the update image in `buffer`, checking that it was hashed with `seed`.
    ///
    /// Later updates modify the buffer in place.
    ///
    /// # Errors
    ///
    /// Returns a [`SeedMismatch`](crate::error::ErrorKind::SeedMismatch) error if the image was
    /// built with another seed, and a
    /// [`MalformedDeserializeData`](crate::error::ErrorKind::MalformedDeserializeData) error if
    /// the buffer does not hold a consistent update image.
    pub fn wrap(buffer: &'a mut [u8], seed: u64) -> Result<Self, Error> {
        let preamble = UpdatePreamble::read(buffer, seed)?;
        if buffer.len() < preamble.image_bytes() {
            return Err(Error::insufficient_data("slots")
                .with_context("expected_bytes", preamble.image_bytes())
                .with_context("actual_bytes", buffer.len()));
        }

        let capacity = buffer.len();
        let storage = BufferStorage::new(buffer, preamble.lg_arr_longs);
        let table = ThetaHashTable::from_image(storage, &preamble, seed)?;
        debug!(
            lg_k = preamble.lg_nom_longs,
            lg_arr_longs = preamble.lg_arr_longs,
            num_entries = preamble.num_entries,
            buffer_bytes = capacity,
            "wrapped direct theta sketch"
        );
        Ok(ThetaSketch { table })
    }

    /// Returns the update image currently held by the buffer.
    pub fn as_bytes(&self) -> &[u8] {
        self.table.storage().image()
    }
}
