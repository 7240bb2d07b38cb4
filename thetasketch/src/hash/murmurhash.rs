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

use std::hash::Hasher;

use byteorder::ByteOrder;
use byteorder::LittleEndian;

const C1: u64 = 0x87c37b91114253d5;
const C2: u64 = 0x4cf5ad432745937f;

/// Streaming MurmurHash3 x64/128 keyed with a 64-bit seed.
///
/// Feeding bytes through [`Hasher::write`] in any chunking yields the same result as
/// [`murmurhash3_x64_128`] over their concatenation.
#[derive(Debug, Clone)]
pub struct MurmurHash3X64128 {
    h1: u64,
    h2: u64,
    total_len: u64,
    buffer: [u8; 16],
    buffer_len: usize,
}

impl MurmurHash3X64128 {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            h1: seed,
            h2: seed,
            total_len: 0,
            buffer: [0; 16],
            buffer_len: 0,
        }
    }

    /// Returns both 64-bit halves of the hash of everything written so far.
    pub fn finish128(&self) -> (u64, u64) {
        let mut h1 = self.h1;
        let mut h2 = self.h2;
        let tail = &self.buffer[..self.buffer_len];

        if tail.len() > 8 {
            let mut k2 = 0u64;
            for (i, &b) in tail[8..].iter().enumerate() {
                k2 |= (b as u64) << (8 * i);
            }
            h2 ^= mix_k2(k2);
        }
        if !tail.is_empty() {
            let mut k1 = 0u64;
            for (i, &b) in tail[..tail.len().min(8)].iter().enumerate() {
                k1 |= (b as u64) << (8 * i);
            }
            h1 ^= mix_k1(k1);
        }

        h1 ^= self.total_len;
        h2 ^= self.total_len;
        h1 = h1.wrapping_add(h2);
        h2 = h2.wrapping_add(h1);
        h1 = fmix64(h1);
        h2 = fmix64(h2);
        h1 = h1.wrapping_add(h2);
        h2 = h2.wrapping_add(h1);
        (h1, h2)
    }

    fn process_block(&mut self, block: &[u8]) {
        let k1 = LittleEndian::read_u64(&block[..8]);
        let k2 = LittleEndian::read_u64(&block[8..16]);

        self.h1 ^= mix_k1(k1);
        self.h1 = self
            .h1
            .rotate_left(27)
            .wrapping_add(self.h2)
            .wrapping_mul(5)
            .wrapping_add(0x52dce729);

        self.h2 ^= mix_k2(k2);
        self.h2 = self
            .h2
            .rotate_left(31)
            .wrapping_add(self.h1)
            .wrapping_mul(5)
            .wrapping_add(0x38495ab5);
    }
}

impl Hasher for MurmurHash3X64128 {
    fn finish(&self) -> u64 {
        self.finish128().0
    }

    fn write(&mut self, mut bytes: &[u8]) {
        self.total_len += bytes.len() as u64;

        if self.buffer_len > 0 {
            let take = (16 - self.buffer_len).min(bytes.len());
            self.buffer[self.buffer_len..self.buffer_len + take].copy_from_slice(&bytes[..take]);
            self.buffer_len += take;
            bytes = &bytes[take..];
            if self.buffer_len < 16 {
                return;
            }
            let block = self.buffer;
            self.process_block(&block);
            self.buffer_len = 0;
        }

        let mut chunks = bytes.chunks_exact(16);
        for block in &mut chunks {
            self.process_block(block);
        }
        let rest = chunks.remainder();
        self.buffer[..rest.len()].copy_from_slice(rest);
        self.buffer_len = rest.len();
    }
}

/// One-shot MurmurHash3 x64/128 of `bytes` keyed with `seed`.
pub fn murmurhash3_x64_128(bytes: &[u8], seed: u64) -> (u64, u64) {
    let mut hasher = MurmurHash3X64128::with_seed(seed);
    hasher.write(bytes);
    hasher.finish128()
}

#[inline]
fn mix_k1(k1: u64) -> u64 {
    k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2)
}

#[inline]
fn mix_k2(k2: u64) -> u64 {
    k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1)
}

#[inline]
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51afd7ed558ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ceb9fe1a85ec53);
    k ^ (k >> 33)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remainder() {
        // remainder > 8
        let key = "The quick brown fox jumps over the lazy dog";
        let (h1, h2) = murmurhash3_x64_128(key.as_bytes(), 0);
        assert_eq!(h1, 0xe34bbc7bbc071b6c);
        assert_eq!(h2, 0x7a433ca9c49a9347);

        // change one bit
        let key = "The quick brown fox jumps over the lazy eog";
        let (h1, h2) = murmurhash3_x64_128(key.as_bytes(), 0);
        assert_eq!(h1, 0x362108102c62d1c9);
        assert_eq!(h2, 0x3285cd100292b305);

        // test a remainder < 8
        let key = "The quick brown fox jumps over the lazy dogdogdog";
        let (h1, h2) = murmurhash3_x64_128(key.as_bytes(), 0);
        assert_eq!(h1, 0x9c8205300e612fc4);
        assert_eq!(h2, 0xcbc0af6136aa3df9);

        // test a remainder = 8
        let key = "The quick brown fox jumps over the lazy1";
        let (h1, h2) = murmurhash3_x64_128(key.as_bytes(), 0);
        assert_eq!(h1, 0xe3301a827e5cdfe3);
        assert_eq!(h2, 0xbdbf05f8da0f0392);

        // test a remainder = 0
        let key = "The quick brown fox jumps over t";
        let (h1, h2) = murmurhash3_x64_128(key.as_bytes(), 0);
        assert_eq!(h1, 0xdf6af91bb29bdacf);
        assert_eq!(h2, 0x91a341c58df1f3a6);
    }

    #[test]
    fn test_matches_reference_for_32_bit_seeds() {
        let data: Vec<u8> = (0..=255u8).collect();
        for len in [0, 1, 7, 8, 9, 15, 16, 17, 31, 32, 33, 100, 256] {
            for seed in [0u32, 1, 9001, u32::MAX] {
                assert_eq!(
                    murmurhash3_x64_128(&data[..len], seed as u64),
                    mur3::murmurhash3_x64_128(&data[..len], seed),
                    "len={len} seed={seed}"
                );
            }
        }
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let data: Vec<u8> = (0..100u8).collect();
        let expected = murmurhash3_x64_128(&data, 9001);
        for split in [1, 3, 15, 16, 17, 40] {
            let mut hasher = MurmurHash3X64128::with_seed(9001);
            for chunk in data.chunks(split) {
                hasher.write(chunk);
            }
            assert_eq!(hasher.finish128(), expected, "split={split}");
        }
    }

    #[test]
    fn test_high_seed_bits_change_the_hash() {
        let low = murmurhash3_x64_128(b"value", 1);
        let high = murmurhash3_x64_128(b"value", 1 | (1 << 40));
        assert_ne!(low, high);
    }
}
