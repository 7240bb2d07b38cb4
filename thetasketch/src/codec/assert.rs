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

use crate::error::Error;

/// Maps a short read of the field named `tag` into a deserialization error.
pub(crate) fn insufficient_data(tag: &'static str) -> impl FnOnce(std::io::Error) -> Error {
    move |err| Error::insufficient_data(tag).set_source(err)
}

pub(crate) fn ensure_serial_version_is(expected: u8, actual: u8) -> Result<(), Error> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::unsupported_serial_version(expected, actual))
    }
}

pub(crate) fn ensure_preamble_longs_in(expected: &[u8], actual: u8) -> Result<(), Error> {
    if expected.contains(&actual) {
        Ok(())
    } else {
        Err(Error::invalid_preamble_longs(expected, actual))
    }
}
