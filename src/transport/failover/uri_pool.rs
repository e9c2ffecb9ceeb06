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

//! Candidate broker URI pool.
//!
//! Randomized pools are shuffled once at construction and picked from
//! uniformly; ordered pools advance round-robin so every candidate gets its
//! turn across reconnect attempts.

use crate::util::uri::ConnectUri;
use rand::seq::SliceRandom;
use rand::Rng;

/// The reconnect candidates and the cursor over them.
#[derive(Debug)]
pub struct UriPool {
    uris: Vec<ConnectUri>,
    cursor: usize,
    randomize: bool,
}

impl UriPool {
    /// Creates a pool; shuffles it when `randomize` is set.
    pub fn new(mut uris: Vec<ConnectUri>, randomize: bool) -> Self {
        if randomize {
            uris.shuffle(&mut rand::thread_rng());
        }
        Self {
            uris,
            cursor: 0,
            randomize,
        }
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.uris.len()
    }

    /// True when there are no candidates.
    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }

    /// Picks the next candidate: uniformly random when randomized,
    /// round-robin otherwise.
    pub fn next(&mut self) -> Option<ConnectUri> {
        self.next_excluding(&[])
    }

    /// Picks the next candidate that is not in `exclude`.
    pub fn next_excluding(&mut self, exclude: &[&ConnectUri]) -> Option<ConnectUri> {
        let candidates: Vec<usize> = self
            .uris
            .iter()
            .enumerate()
            .filter(|(_, uri)| !exclude.contains(uri))
            .map(|(index, _)| index)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        if self.randomize {
            let pick = candidates[rand::thread_rng().gen_range(0..candidates.len())];
            return Some(self.uris[pick].clone());
        }
        // Round-robin: advance from the cursor to the next allowed index.
        for step in 0..self.uris.len() {
            let index = (self.cursor + step) % self.uris.len();
            if candidates.contains(&index) {
                self.cursor = index + 1;
                return Some(self.uris[index].clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uris(raw: &[&str]) -> Vec<ConnectUri> {
        raw.iter().map(|u| u.parse().unwrap()).collect()
    }

    #[test]
    fn test_round_robin_cycles() {
        let mut pool = UriPool::new(uris(&["tcp://a:1", "tcp://b:1", "tcp://c:1"]), false);
        let picks: Vec<String> = (0..6)
            .map(|_| pool.next().unwrap().authority())
            .collect();
        assert_eq!(picks, ["a:1", "b:1", "c:1", "a:1", "b:1", "c:1"]);
    }

    #[test]
    fn test_excluding_skips_candidate() {
        let all = uris(&["tcp://a:1", "tcp://b:1"]);
        let mut pool = UriPool::new(all.clone(), false);
        let connected = &all[0];
        for _ in 0..4 {
            let pick = pool.next_excluding(&[connected]).unwrap();
            assert_eq!(pick.authority(), "b:1");
        }
    }

    #[test]
    fn test_excluding_everything_yields_none() {
        let all = uris(&["tcp://a:1"]);
        let mut pool = UriPool::new(all.clone(), false);
        assert!(pool.next_excluding(&[&all[0]]).is_none());
    }

    #[test]
    fn test_randomized_pool_covers_all_candidates() {
        let all = uris(&["tcp://a:1", "tcp://b:1", "tcp://c:1"]);
        let mut pool = UriPool::new(all, true);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(pool.next().unwrap().authority());
        }
        assert_eq!(seen.len(), 3);
    }
}
