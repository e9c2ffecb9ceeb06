//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! The wire-format string cache.
//!
//! When the cache capability is negotiated, frequently repeated strings
//! (destinations, connection ids) are sent once in full together with a
//! small index, and as the bare index afterwards. Both peers maintain the
//! same table, filled in insertion order and bounded by the negotiated
//! maximum; when full, the insertion cursor wraps and the oldest slot is
//! replaced on both sides alike.

use std::collections::HashMap;

/// Result of offering a value to the encode side of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Value already cached; send only the index.
    Hit(u16),
    /// Value newly cached at this index; send the index and the full value.
    New(u16),
}

/// One side of the symmetric marshal cache.
#[derive(Debug)]
pub struct MarshalCache {
    capacity: usize,
    slots: Vec<Option<String>>,
    index_of: HashMap<String, u16>,
    cursor: usize,
}

impl MarshalCache {
    /// Creates a cache with `capacity` slots (clamped to the u16 index space).
    pub fn new(capacity: i32) -> Self {
        let capacity = capacity.clamp(1, u16::MAX as i32) as usize;
        Self {
            capacity,
            slots: vec![None; capacity],
            index_of: HashMap::new(),
            cursor: 0,
        }
    }

    /// Encode side: resolves a value to its index, inserting on first sight.
    pub fn resolve(&mut self, value: &str) -> CacheOutcome {
        if let Some(&index) = self.index_of.get(value) {
            return CacheOutcome::Hit(index);
        }
        let index = (self.cursor % self.capacity) as u16;
        if let Some(old) = self.slots[index as usize].take() {
            self.index_of.remove(&old);
        }
        self.slots[index as usize] = Some(value.to_string());
        self.index_of.insert(value.to_string(), index);
        self.cursor += 1;
        CacheOutcome::New(index)
    }

    /// Decode side: stores the value a peer announced at `index`.
    pub fn store(&mut self, index: u16, value: String) {
        let slot = index as usize % self.capacity;
        if let Some(old) = self.slots[slot].take() {
            self.index_of.remove(&old);
        }
        self.index_of.insert(value.clone(), index);
        self.slots[slot] = Some(value);
    }

    /// Decode side: looks up a bare index.
    pub fn lookup(&self, index: u16) -> Option<&str> {
        self.slots
            .get(index as usize % self.capacity)
            .and_then(|slot| slot.as_deref())
    }

    /// Drops every entry, e.g. after renegotiation changed the settings.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.index_of.clear();
        self.cursor = 0;
    }
}
