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

use googletest::assert_that;
use googletest::prelude::ge;
use googletest::prelude::le;
use googletest::prelude::lt;
use thetasketch::common::NumStdDev;
use thetasketch::common::ResizeFactor;
use thetasketch::theta::MAX_THETA;
use thetasketch::theta::ThetaSketch;
use thetasketch::theta::UpdateReturnState;

#[test]
fn test_basic_update() {
    let mut sketch = ThetaSketch::builder().lg_k(12).build().unwrap();
    assert!(sketch.is_empty());
    assert_eq!(sketch.estimate(), 0.0);

    sketch.update_str("value1");
    assert!(!sketch.is_empty());
    assert_eq!(sketch.estimate(), 1.0);

    sketch.update_str("value2");
    assert_eq!(sketch.estimate(), 2.0);
}

#[test]
fn test_update_various_types() {
    let mut sketch = ThetaSketch::builder().lg_k(12).build().unwrap();

    sketch.update_str("string");
    sketch.update_i64(-42);
    sketch.update_u64(42);
    sketch.update_f64(3.15);
    sketch.update_f64(3.15);
    sketch.update_f32(3.15);
    sketch.update_f32(3.15);
    sketch.update_bytes(&[1u8, 2, 3]);
    assert_eq!(sketch.estimate(), 6.0);

    // the generic entry point hashes like the typed ones
    assert_eq!(
        sketch.update([1u8, 2, 3]),
        UpdateReturnState::RejectedDuplicate
    );
    assert_eq!(sketch.update("string"), UpdateReturnState::RejectedDuplicate);
    assert_eq!(sketch.update(-42i64), UpdateReturnState::RejectedDuplicate);
    assert_eq!(sketch.update(42u32), UpdateReturnState::RejectedDuplicate);
    assert_eq!(sketch.update(3.15f32), UpdateReturnState::RejectedDuplicate);

    assert!(!sketch.is_empty());
    assert_eq!(sketch.estimate(), 6.0);
}

#[test]
fn test_duplicate_is_idempotent() {
    let mut sketch = ThetaSketch::builder().lg_k(12).build().unwrap();

    assert_eq!(
        sketch.update_str("A"),
        UpdateReturnState::InsertedCountIncremented
    );
    assert_eq!(sketch.num_retained(), 1);
    assert_eq!(sketch.update_str("A"), UpdateReturnState::RejectedDuplicate);
    assert_eq!(sketch.num_retained(), 1);

    for _ in 0..100 {
        sketch.update_str("A");
    }
    assert_eq!(sketch.estimate(), 1.0);
}

#[test]
fn test_empty_input_is_rejected() {
    let mut sketch = ThetaSketch::builder().build().unwrap();
    assert_eq!(
        sketch.update_str(""),
        UpdateReturnState::RejectedNullOrEmpty
    );
    assert_eq!(
        sketch.update_bytes(&[]),
        UpdateReturnState::RejectedNullOrEmpty
    );
    assert_eq!(sketch.update(""), UpdateReturnState::RejectedNullOrEmpty);
    assert_eq!(
        sketch.update(String::new()),
        UpdateReturnState::RejectedNullOrEmpty
    );
    assert_eq!(
        sketch.update(Vec::<u8>::new()),
        UpdateReturnState::RejectedNullOrEmpty
    );
    assert!(sketch.is_empty());
    assert_eq!(sketch.estimate(), 0.0);
}

#[test]
fn test_exact_mode() {
    let mut sketch = ThetaSketch::builder().lg_k(12).build().unwrap();
    for i in 0..1000u64 {
        assert!(sketch.update_u64(i).is_inserted());
    }

    assert!(!sketch.is_estimation_mode());
    assert_eq!(sketch.estimate(), 1000.0);
    assert_eq!(sketch.lower_bound(NumStdDev::Three), 1000.0);
    assert_eq!(sketch.upper_bound(NumStdDev::Three), 1000.0);
    assert_eq!(sketch.theta64(), MAX_THETA);
}

#[test]
fn test_theta_reduction() {
    let mut sketch = ThetaSketch::builder().lg_k(5).build().unwrap();
    assert!(!sketch.is_estimation_mode());

    for i in 0..1000 {
        sketch.update(format!("value_{}", i));
    }

    assert!(sketch.is_estimation_mode());
    assert!(sketch.theta() < 1.0);
    assert_that!(sketch.estimate(), ge(sketch.lower_bound(NumStdDev::One)));
    assert_that!(sketch.estimate(), le(sketch.upper_bound(NumStdDev::One)));
}

#[test]
fn test_invariants_hold_after_every_update() {
    let mut sketch = ThetaSketch::builder()
        .lg_k(6)
        .resize_factor(ResizeFactor::X2)
        .build()
        .unwrap();

    let mut last_theta = sketch.theta64();
    for i in 0..5000u64 {
        sketch.update_u64(i);

        let theta = sketch.theta64();
        assert_that!(theta, le(last_theta));
        last_theta = theta;

        assert_that!(sketch.num_retained(), le(1usize << sketch.lg_arr_longs()));
        assert!(sketch.iter().all(|hash| hash > 0 && hash < theta));
    }
    assert_eq!(sketch.iter().count(), sketch.num_retained());
}

#[test]
fn test_rebuild() {
    let mut sketch = ThetaSketch::builder().lg_k(5).build().unwrap();
    for i in 0..1000 {
        sketch.update(format!("value_{}", i));
    }

    let theta_before = sketch.theta64();
    let before = sketch.num_retained();
    sketch.rebuild();
    assert!(sketch.num_retained() <= before);
    assert_eq!(sketch.num_retained(), 32);
    assert_that!(sketch.theta64(), le(theta_before));

    // nothing left to trim
    let theta = sketch.theta64();
    sketch.rebuild();
    assert_eq!(sketch.num_retained(), 32);
    assert_eq!(sketch.theta64(), theta);
}

#[test]
fn test_reset() {
    let mut sketch = ThetaSketch::builder().lg_k(5).build().unwrap();
    for i in 0..1000 {
        sketch.update(format!("value_{}", i));
    }
    assert!(!sketch.is_empty());
    assert!(sketch.is_estimation_mode());
    assert!(sketch.theta() < 1.0);

    sketch.reset();
    assert!(sketch.is_empty());
    assert_eq!(sketch.estimate(), 0.0);
    assert_eq!(sketch.theta(), 1.0);
    assert_eq!(sketch.num_retained(), 0);
    assert!(!sketch.is_estimation_mode());
    assert_eq!(sketch.lower_bound(NumStdDev::One), 0.0);
    assert_eq!(sketch.upper_bound(NumStdDev::One), 0.0);
}

#[test]
fn test_iterator() {
    let mut sketch = ThetaSketch::builder().lg_k(12).build().unwrap();
    for i in 0..10u64 {
        sketch.update_u64(i);
    }

    let mut hashes: Vec<u64> = sketch.iter().collect();
    assert_eq!(hashes.len(), 10);
    hashes.sort_unstable();
    hashes.dedup();
    assert_eq!(hashes.len(), 10);
    assert!(hashes.iter().all(|&h| h > 0 && h < MAX_THETA));
}

#[test]
fn test_sampling_threshold_is_strict() {
    let mut sketch = ThetaSketch::builder()
        .sampling_probability(0.5)
        .build()
        .unwrap();
    let theta = sketch.theta64();
    assert_eq!(theta, (MAX_THETA as f64 * 0.5) as u64);

    // p < 1 starts in estimation mode only once something is accepted
    assert!(!sketch.is_estimation_mode());
    assert_eq!(
        sketch.update_hash(theta),
        UpdateReturnState::RejectedOverTheta
    );
    assert!(sketch.is_empty());
    assert_eq!(
        sketch.update_hash(theta - 1),
        UpdateReturnState::InsertedCountIncremented
    );
    assert!(sketch.is_estimation_mode());
    assert_eq!(sketch.estimate(), 2.0);
}

#[test]
fn test_sampling_estimate() {
    let mut sketch = ThetaSketch::builder()
        .lg_k(12)
        .sampling_probability(0.25)
        .build()
        .unwrap();
    for i in 0..2000u64 {
        sketch.update_u64(i);
    }
    assert!(sketch.is_estimation_mode());
    assert_that!(sketch.num_retained(), lt(1000));
    assert_that!(2000.0, ge(sketch.lower_bound(NumStdDev::Three)));
    assert_that!(2000.0, le(sketch.upper_bound(NumStdDev::Three)));
}

#[test]
fn test_compact() {
    let mut sketch = ThetaSketch::builder().lg_k(5).build().unwrap();
    for i in 0..1000u64 {
        sketch.update_u64(i);
    }

    let compact = sketch.compact();
    assert_eq!(compact.num_retained(), sketch.num_retained());
    assert_eq!(compact.theta64(), sketch.theta64());
    assert_eq!(compact.estimate(), sketch.estimate());
    assert_eq!(
        compact.lower_bound(NumStdDev::Two),
        sketch.lower_bound(NumStdDev::Two)
    );
    let hashes: Vec<u64> = compact.iter().collect();
    assert!(hashes.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_no_growth_heap_sketch() {
    let mut sketch = ThetaSketch::builder()
        .lg_k(6)
        .resize_factor(ResizeFactor::X1)
        .build()
        .unwrap();
    assert_eq!(sketch.lg_arr_longs(), 7);
    for i in 0..10_000u64 {
        assert!(!sketch.update_u64(i).is_error());
    }
    assert_eq!(sketch.lg_arr_longs(), 7);
    assert!(sketch.is_estimation_mode());
}
