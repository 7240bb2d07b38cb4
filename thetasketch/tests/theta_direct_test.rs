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

//! Tests for theta sketches kept in caller-owned buffers

use googletest::assert_that;
use googletest::prelude::contains_substring;
use thetasketch::common::ResizeFactor;
use thetasketch::error::ErrorKind;
use thetasketch::theta::DirectThetaSketch;
use thetasketch::theta::MAX_THETA;
use thetasketch::theta::ThetaSketch;
use thetasketch::theta::UpdateReturnState;

const FLAGS_BYTE: usize = 5;
const FLAG_EMPTY: u8 = 1 << 2;

#[test]
fn test_direct_matches_heap() {
    for (lg_k, count) in [(5u8, 20u64), (8, 1000), (10, 50_000)] {
        let mut heap = ThetaSketch::builder().lg_k(lg_k).build().unwrap();
        let mut buffer = vec![0u8; DirectThetaSketch::required_bytes(lg_k)];
        let mut direct = ThetaSketch::builder()
            .lg_k(lg_k)
            .build_direct(&mut buffer)
            .unwrap();

        for i in 0..count {
            assert_eq!(direct.update_u64(i), heap.update_u64(i));
        }
        assert_eq!(direct.lg_arr_longs(), heap.lg_arr_longs());
        assert_eq!(direct.num_retained(), heap.num_retained());
        assert_eq!(direct.theta64(), heap.theta64());
        assert_eq!(direct.estimate(), heap.estimate());
        assert_eq!(direct.serialize(), heap.serialize());
        assert_eq!(direct.as_bytes(), heap.serialize().as_slice());
    }
}

#[test]
fn test_capacity_exhausted() {
    // room for 2^5 slots only, and X1 never asks for more
    let mut buffer = vec![0u8; 24 + 8 * 32];
    let mut sketch = ThetaSketch::builder()
        .lg_k(12)
        .resize_factor(ResizeFactor::X1)
        .build_direct(&mut buffer)
        .unwrap();
    assert_eq!(sketch.lg_arr_longs(), 5);

    for i in 1..=32u64 {
        assert_eq!(
            sketch.update_hash(i << 20),
            UpdateReturnState::InsertedCountIncremented
        );
    }
    let state = sketch.update_hash(33 << 20);
    assert_eq!(state, UpdateReturnState::RejectedFull);
    assert!(state.is_error());

    let err = state.into_result().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CapacityExhausted);

    // a full table still answers queries and deduplicates
    assert_eq!(sketch.num_retained(), 32);
    assert_eq!(sketch.estimate(), 32.0);
    assert_eq!(
        sketch.update_hash(1 << 20),
        UpdateReturnState::RejectedDuplicate
    );
}

#[test]
fn test_wrap_continues_sketching() {
    let mut buffer = vec![0u8; DirectThetaSketch::required_bytes(9)];
    {
        let mut sketch = ThetaSketch::builder()
            .lg_k(9)
            .build_direct(&mut buffer)
            .unwrap();
        for i in 0..3000u64 {
            sketch.update_u64(i);
        }
    }

    let mut sketch = DirectThetaSketch::wrap(&mut buffer, 9001).unwrap();
    assert!(sketch.is_estimation_mode());
    for i in 3000..6000u64 {
        sketch.update_u64(i);
    }

    let mut heap = ThetaSketch::builder().lg_k(9).build().unwrap();
    for i in 0..6000u64 {
        heap.update_u64(i);
    }
    assert_eq!(sketch.theta64(), heap.theta64());
    assert_eq!(sketch.num_retained(), heap.num_retained());
    assert_eq!(sketch.estimate(), heap.estimate());
}

#[test]
fn test_wrap_with_wrong_seed() {
    let mut buffer = vec![0u8; DirectThetaSketch::required_bytes(5)];
    {
        let mut sketch = ThetaSketch::builder()
            .lg_k(5)
            .seed(42)
            .build_direct(&mut buffer)
            .unwrap();
        sketch.update_str("apple");
    }

    let err = DirectThetaSketch::wrap(&mut buffer, 9001).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SeedMismatch);
    assert_that!(err.message(), contains_substring("incompatible seed hash"));

    let sketch = DirectThetaSketch::wrap(&mut buffer, 42).unwrap();
    assert_eq!(sketch.estimate(), 1.0);
}

#[test]
fn test_to_heap_detaches_from_buffer() {
    let mut buffer = vec![0u8; DirectThetaSketch::required_bytes(6)];
    let mut direct = ThetaSketch::builder()
        .lg_k(6)
        .build_direct(&mut buffer)
        .unwrap();
    for i in 0..50u64 {
        direct.update_u64(i);
    }

    let mut heap = direct.to_heap();
    assert_eq!(heap.serialize(), direct.serialize());

    heap.update_u64(1000);
    assert_eq!(heap.num_retained(), 51);
    assert_eq!(direct.num_retained(), 50);
}

#[test]
fn test_reset_rewrites_preamble() {
    let mut buffer = vec![0u8; DirectThetaSketch::required_bytes(5)];
    let mut sketch = ThetaSketch::builder()
        .lg_k(5)
        .build_direct(&mut buffer)
        .unwrap();
    assert_ne!(sketch.as_bytes()[FLAGS_BYTE] & FLAG_EMPTY, 0);

    for i in 0..100u64 {
        sketch.update_u64(i);
    }
    assert_eq!(sketch.as_bytes()[FLAGS_BYTE] & FLAG_EMPTY, 0);

    sketch.reset();
    assert!(sketch.is_empty());
    assert_eq!(sketch.theta64(), MAX_THETA);
    assert_eq!(sketch.num_retained(), 0);

    let bytes = sketch.as_bytes();
    assert_ne!(bytes[FLAGS_BYTE] & FLAG_EMPTY, 0);
    assert_eq!(&bytes[8..12], &0u32.to_le_bytes());
    assert_eq!(&bytes[16..24], &MAX_THETA.to_le_bytes());
    assert!(bytes[24..].iter().all(|&b| b == 0));
}

#[test]
fn test_direct_with_sampling() {
    let mut buffer = vec![0u8; DirectThetaSketch::required_bytes(12)];
    let mut direct = ThetaSketch::builder()
        .sampling_probability(0.25)
        .build_direct(&mut buffer)
        .unwrap();
    let mut heap = ThetaSketch::builder()
        .sampling_probability(0.25)
        .build()
        .unwrap();
    assert!(direct.is_empty());
    assert_eq!(direct.estimate(), 0.0);
    assert_eq!(direct.theta64(), heap.theta64());

    for i in 0..2000u64 {
        direct.update_u64(i);
        heap.update_u64(i);
    }
    assert!(direct.is_estimation_mode());
    assert_eq!(direct.num_retained(), heap.num_retained());
    assert_eq!(direct.estimate(), heap.estimate());

    let restored = ThetaSketch::deserialize(direct.as_bytes()).unwrap();
    assert_eq!(restored.sampling_probability(), 0.25);
    assert_eq!(restored.estimate(), heap.estimate());
}

#[test]
fn test_new_rejects_invalid_config() {
    let mut buffer = vec![0u8; DirectThetaSketch::required_bytes(12)];
    let err = DirectThetaSketch::new(&mut buffer, ThetaSketch::builder().lg_k(30)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

    let err = DirectThetaSketch::new(
        &mut buffer,
        ThetaSketch::builder().sampling_probability(1.5),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
}
