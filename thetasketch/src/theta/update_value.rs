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

//! Values accepted by [`ThetaSketch::update`].

use crate::theta::CacheStorage;
use crate::theta::ThetaSketch;
use crate::theta::UpdateReturnState;

mod private {
    pub trait Sealed {}
}

/// A value [`ThetaSketch::update`] can sketch directly.
///
/// Each implementation forwards to the matching typed entry point, so `update(x)` and the
/// `update_*` method for the type of `x` retain the same hash. Integers are widened to 64 bits,
/// floats go through [`ThetaSketch::update_f64`], and strings and byte sequences hash their raw
/// bytes; empty strings and byte sequences are rejected with
/// [`RejectedNullOrEmpty`](UpdateReturnState::RejectedNullOrEmpty).
///
/// This trait is sealed.
pub trait UpdateValue: private::Sealed {
    #[doc(hidden)]
    fn update_sketch<S: CacheStorage>(&self, sketch: &mut ThetaSketch<S>) -> UpdateReturnState;
}

impl<T: UpdateValue + ?Sized> private::Sealed for &T {}

impl<T: UpdateValue + ?Sized> UpdateValue for &T {
    fn update_sketch<S: CacheStorage>(&self, sketch: &mut ThetaSketch<S>) -> UpdateReturnState {
        (**self).update_sketch(sketch)
    }
}

macro_rules! impl_signed {
    ($($ty:ty),*) => {$(
        impl private::Sealed for $ty {}
        impl UpdateValue for $ty {
            fn update_sketch<S: CacheStorage>(&self, sketch: &mut ThetaSketch<S>) -> UpdateReturnState {
                sketch.update_i64(i64::from(*self))
            }
        }
    )*};
}

macro_rules! impl_unsigned {
    ($($ty:ty),*) => {$(
        impl private::Sealed for $ty {}
        impl UpdateValue for $ty {
            fn update_sketch<S: CacheStorage>(&self, sketch: &mut ThetaSketch<S>) -> UpdateReturnState {
                sketch.update_u64(u64::from(*self))
            }
        }
    )*};
}

impl_signed!(i8, i16, i32, i64);
impl_unsigned!(u8, u16, u32, u64);

impl private::Sealed for isize {}
impl UpdateValue for isize {
    fn update_sketch<S: CacheStorage>(&self, sketch: &mut ThetaSketch<S>) -> UpdateReturnState {
        sketch.update_i64(*self as i64)
    }
}

impl private::Sealed for usize {}
impl UpdateValue for usize {
    fn update_sketch<S: CacheStorage>(&self, sketch: &mut ThetaSketch<S>) -> UpdateReturnState {
        sketch.update_u64(*self as u64)
    }
}

impl private::Sealed for f64 {}
impl UpdateValue for f64 {
    fn update_sketch<S: CacheStorage>(&self, sketch: &mut ThetaSketch<S>) -> UpdateReturnState {
        sketch.update_f64(*self)
    }
}

impl private::Sealed for f32 {}
impl UpdateValue for f32 {
    fn update_sketch<S: CacheStorage>(&self, sketch: &mut ThetaSketch<S>) -> UpdateReturnState {
        sketch.update_f32(*self)
    }
}

impl private::Sealed for str {}
impl UpdateValue for str {
    fn update_sketch<S: CacheStorage>(&self, sketch: &mut ThetaSketch<S>) -> UpdateReturnState {
        sketch.update_str(self)
    }
}

impl private::Sealed for String {}
impl UpdateValue for String {
    fn update_sketch<S: CacheStorage>(&self, sketch: &mut ThetaSketch<S>) -> UpdateReturnState {
        sketch.update_str(self)
    }
}

impl private::Sealed for [u8] {}
impl UpdateValue for [u8] {
    fn update_sketch<S: CacheStorage>(&self, sketch: &mut ThetaSketch<S>) -> UpdateReturnState {
        sketch.update_bytes(self)
    }
}

impl<const N: usize> private::Sealed for [u8; N] {}
impl<const N: usize> UpdateValue for [u8; N] {
    fn update_sketch<S: CacheStorage>(&self, sketch: &mut ThetaSketch<S>) -> UpdateReturnState {
        sketch.update_bytes(self)
    }
}

impl private::Sealed for Vec<u8> {}
impl UpdateValue for Vec<u8> {
    fn update_sketch<S: CacheStorage>(&self, sketch: &mut ThetaSketch<S>) -> UpdateReturnState {
        sketch.update_bytes(self)
    }
}
