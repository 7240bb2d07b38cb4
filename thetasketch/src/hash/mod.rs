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

//! Seeded hashing for theta sketch updates.

mod murmurhash;

pub use self::murmurhash::MurmurHash3X64128;
pub use self::murmurhash::murmurhash3_x64_128;

/// The default update seed shared by every DataSketches implementation.
///
/// Sketches can only be compared or merged when they were built with the same seed.
pub const DEFAULT_UPDATE_SEED: u64 = 9001;

/// Computes the 16-bit fingerprint of a seed stored in sketch images instead of the seed.
///
/// The result may be zero; callers that build sketches must reject such seeds.
pub fn compute_seed_hash(seed: u64) -> u16 {
    let (h1, _) = murmurhash3_x64_128(&seed.to_le_bytes(), 0);
    (h1 & 0xFFFF) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_seed_hash() {
        assert_eq!(compute_seed_hash(DEFAULT_UPDATE_SEED), 0x93CC);
    }

    #[test]
    fn test_seed_hash_differs_between_seeds() {
        assert_ne!(compute_seed_hash(1), compute_seed_hash(2));
        assert_ne!(compute_seed_hash(DEFAULT_UPDATE_SEED), compute_seed_hash(9002));
    }

    #[test]
    fn test_some_seeds_hash_to_zero() {
        assert_eq!(compute_seed_hash(50541), 0);
        assert_eq!(compute_seed_hash(104725), 0);
    }
}
