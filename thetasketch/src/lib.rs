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

//! Theta sketches for approximate distinct counting.
//!
//! A theta sketch estimates the number of distinct values in a stream using a fixed amount of
//! memory, with error bounds that depend only on the nominal size `k`. This crate provides the
//! update engine:
//!
//! - [`theta::ThetaSketch`]: updatable sketch backed by a heap-allocated hash table.
//! - [`theta::DirectThetaSketch`]: the same sketch kept inside a caller-owned byte buffer.
//! - [`theta::CompactThetaSketch`]: immutable sorted form for storage and transfer.
//!
//! Sketches are hashed with a seed ([`hash::DEFAULT_UPDATE_SEED`] unless configured otherwise).
//! Serialized images carry a 16-bit hash of that seed and refuse to deserialize under another
//! seed.
//!
//! # Usage
//!
//! ```
//! use thetasketch::common::NumStdDev;
//! use thetasketch::theta::ThetaSketch;
//!
//! let mut sketch = ThetaSketch::builder().lg_k(12).build().unwrap();
//! for i in 0..10_000u64 {
//!     sketch.update_u64(i);
//! }
//! assert!(sketch.is_estimation_mode());
//! let estimate = sketch.estimate();
//! assert!(sketch.lower_bound(NumStdDev::Two) <= estimate);
//! assert!(estimate <= sketch.upper_bound(NumStdDev::Two));
//!
//! let bytes = sketch.serialize();
//! let restored = ThetaSketch::deserialize(&bytes).unwrap();
//! assert_eq!(restored.estimate(), estimate);
//! ```

pub mod codec;
pub mod common;
pub mod error;
pub mod hash;
pub mod theta;
