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

/// Defines the families of theta sketch images.
///
/// A family defines a set of classes that share fundamental algorithms and behaviors. The classes
/// within a family may still differ by how they are stored and accessed.
#[derive(Debug)]
pub struct Family {
    /// The byte ID for this family.
    pub id: u8,
    /// The name for this family.
    pub name: &'static str,
    /// The minimum preamble size for this family in longs (8-bytes integer).
    pub min_pre_longs: u8,
    /// The maximum preamble size for this family in longs (8-bytes integer).
    pub max_pre_longs: u8,
}

impl Family {
    /// The updatable QuickSelect theta sketch: the full hash table behind a three-long preamble.
    pub const QUICKSELECT: Family = Family {
        id: 2,
        name: "QUICKSELECT",
        min_pre_longs: 3,
        max_pre_longs: 3,
    };

    /// The immutable compact theta sketch: sorted retained hashes only.
    pub const COMPACT: Family = Family {
        id: 3,
        name: "COMPACT",
        min_pre_longs: 1,
        max_pre_longs: 3,
    };
}

impl Family {
    pub fn validate_id(&self, family_id: u8) -> Result<(), Error> {
        if family_id != self.id {
            Err(Error::invalid_family(self.id, family_id, self.name))
        } else {
            Ok(())
        }
    }

    pub fn validate_pre_longs(&self, pre_longs: u8) -> Result<(), Error> {
        if (self.min_pre_longs..=self.max_pre_longs).contains(&pre_longs) {
            Ok(())
        } else {
            Err(Error::deserial(format!(
                "invalid preamble longs for {}: expected [{}, {}], got {pre_longs}",
                self.name, self.min_pre_longs, self.max_pre_longs
            )))
        }
    }
}
