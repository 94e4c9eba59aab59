// Copyright 2019 Karl Sundequist Blomdahl <karl.sundequist.blomdahl@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The inference cache: a sharded, thread-safe map from a
//! canonical (symmetry-normalized) position to its `(policy, value)`
//! evaluator output, so games that reach symmetric positions share one
//! evaluation instead of paying for it twice.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use dg_position::{BoardSize, Color, Symmetry, ZobristHash};

/// `(to_move, canonical_symmetry, canonical_stone_hash)`. Only
/// positions with `canonical_symmetry = Some(_)` are ever looked up; a node
/// with no canonical form (its 8 symmetry-hashes are not all distinct)
/// never constructs a key at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub to_move: Color,
    pub canonical_symmetry: Symmetry,
    pub canonical_stone_hash: ZobristHash
}

/// A `(policy, value)` pair, stored and exchanged in whatever symmetry frame
/// the caller specifies.
#[derive(Clone, Debug)]
pub struct CacheValue {
    pub policy: Vec<f32>,
    pub value: f32
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64
}

struct Entry {
    value: CacheValue,
    observations: u32
}

struct LruShard {
    capacity: usize,
    entries: HashMap<CacheKey, Entry>,
    /// Recency order, most-recently-used at the back. Kept duplicate-free by
    /// always removing a key's old position before pushing it again.
    order: VecDeque<CacheKey>
}

impl LruShard {
    fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: HashMap::new(), order: VecDeque::new() }
    }

    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }

        self.order.push_back(*key);
    }

    fn get(&mut self, key: &CacheKey) -> Option<CacheValue> {
        if self.entries.contains_key(key) {
            self.touch(key);
            self.entries.get(key).map(|e| e.value.clone())
        } else {
            None
        }
    }

    fn put_or_merge(&mut self, key: CacheKey, value: CacheValue) -> CacheValue {
        let merged = match self.entries.get_mut(&key) {
            Some(entry) => {
                let n = entry.observations as f32;
                let weight_new = 1.0 / (n + 1.0);

                for (stored, fresh) in entry.value.policy.iter_mut().zip(value.policy.iter()) {
                    *stored += (fresh - *stored) * weight_new;
                }
                entry.value.value += (value.value - entry.value.value) * weight_new;
                entry.observations += 1;

                entry.value.clone()
            },
            None => {
                self.entries.insert(key, Entry { value: value.clone(), observations: 1 });
                value
            }
        };

        self.touch(&key);
        self.evict_if_needed();

        merged
    }

    fn evict_if_needed(&mut self) {
        while self.entries.len() > self.capacity {
            if let Some(victim) = self.order.pop_front() {
                self.entries.remove(&victim);
            } else {
                break;
            }
        }
    }
}

pub struct InferenceCache {
    board_size: BoardSize,
    shards: Vec<Mutex<LruShard>>,
    hits: AtomicU64,
    misses: AtomicU64
}

/// A rough per-entry footprint (policy floats + value + key/bookkeeping
/// overhead), used only to size shard capacity from `cache_size_mb`.
fn estimated_entry_bytes(board_size: BoardSize) -> usize {
    board_size.num_moves() * std::mem::size_of::<f32>() + 64
}

impl InferenceCache {
    /// `cache_shards` is clamped to `1..=max_games`: more shards than
    /// concurrently running games would only waste buckets.
    pub fn new(board_size: BoardSize, cache_size_mb: usize, cache_shards: usize, max_games: usize) -> Self {
        let shards = cache_shards.clamp(1, max_games.max(1));
        let total_entries = (cache_size_mb * 1_000_000) / estimated_entry_bytes(board_size).max(1);
        let per_shard = (total_entries / shards).max(1);

        Self {
            board_size,
            shards: (0..shards).map(|_| Mutex::new(LruShard::new(per_shard))).collect(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0)
        }
    }

    fn shard_for(&self, key: &CacheKey) -> &Mutex<LruShard> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        use std::hash::{Hash, Hasher};
        key.hash(&mut hasher);

        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Transforms `policy` (board points only, `board_size.num_moves() - 1`
    /// entries, followed by the untouched pass entry) by `transform`.
    fn transform_policy(&self, transform: Symmetry, policy: &mut [f32]) {
        let n = self.board_size.side();
        let points = n * n;
        debug_assert_eq!(policy.len(), points + 1);

        let src = policy[..points].to_vec();
        let mut dst = vec![0.0f32; points];
        transform.apply(n, 1, &src, &mut dst);
        policy[..points].copy_from_slice(&dst);
        // the pass entry, policy[points], is never symmetry-transformed.
    }

    /// On hit, transforms the stored canonical-form output into
    /// `inference_sym` and writes it into `out`, returning `true`.
    pub fn try_get(&self, key: &CacheKey, inference_sym: Symmetry, out: &mut CacheValue) -> bool {
        let shard = self.shard_for(key);
        let found = shard.lock().expect("inference cache shard poisoned").get(key);

        match found {
            Some(mut value) => {
                let transform = inference_sym.concat(key.canonical_symmetry.inverse());
                self.transform_policy(transform, &mut value.policy);

                *out = value;
                self.hits.fetch_add(1, Ordering::Relaxed);
                true
            },
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Transforms `out` from `inference_sym` back to canonical form, merges
    /// it into the shard (averaging with any existing observation), then
    /// overwrites `out` with the merged value transformed back to
    /// `inference_sym`.
    pub fn merge(&self, key: &CacheKey, inference_sym: Symmetry, out: &mut CacheValue) {
        let to_canonical = key.canonical_symmetry.concat(inference_sym.inverse());
        let mut canonical = out.clone();
        self.transform_policy(to_canonical, &mut canonical.policy);

        let shard = self.shard_for(key);
        let merged = shard.lock().expect("inference cache shard poisoned").put_or_merge(*key, canonical);

        let mut merged = merged;
        let back = inference_sym.concat(key.canonical_symmetry.inverse());
        self.transform_policy(back, &mut merged.policy);

        *out = merged;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dg_position::symmetry::ALL;

    fn uniform_value(board_size: BoardSize, v: f32) -> CacheValue {
        CacheValue { policy: vec![1.0 / (board_size.num_moves() as f32); board_size.num_moves()], value: v }
    }

    #[test]
    fn miss_then_hit() {
        let cache = InferenceCache::new(BoardSize::Nine, 64, 2, 4);
        let key = CacheKey { to_move: Color::Black, canonical_symmetry: Symmetry::Identity, canonical_stone_hash: 1234 };
        let mut out = uniform_value(BoardSize::Nine, 0.0);

        assert!(!cache.try_get(&key, Symmetry::Identity, &mut out));
        assert_eq!(cache.stats().misses, 1);

        cache.merge(&key, Symmetry::Identity, &mut out);

        assert!(cache.try_get(&key, Symmetry::Identity, &mut out));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn symmetric_positions_share_one_cache_entry() {
        // Two positions symmetric to each other key to exactly the same
        // (canonical) cache state.
        let cache = InferenceCache::new(BoardSize::Nine, 64, 1, 4);
        let canonical_hash = 777;
        let key = CacheKey { to_move: Color::Black, canonical_symmetry: Symmetry::Identity, canonical_stone_hash: canonical_hash };

        let mut first = uniform_value(BoardSize::Nine, 0.2);
        first.policy[0] = 0.9;
        cache.merge(&key, Symmetry::Rot90, &mut first);

        for &inference_sym in ALL.iter() {
            let mut out = uniform_value(BoardSize::Nine, 0.0);
            assert!(cache.try_get(&key, inference_sym, &mut out));

            // re-deriving the same symmetry transform from the canonical
            // value must agree with what merge() handed back directly.
            let mut expected = CacheValue { policy: first.policy.clone(), value: first.value };
            // undo the Rot90 frame merge() stored it in, then move to inference_sym
            let to_canonical = key.canonical_symmetry.concat(Symmetry::Rot90.inverse());
            cache.transform_policy(to_canonical, &mut expected.policy);
            let to_out = inference_sym.concat(key.canonical_symmetry.inverse());
            cache.transform_policy(to_out, &mut expected.policy);

            assert_eq!(out.policy, expected.policy);
        }
    }

    #[test]
    fn shard_count_is_clamped_to_max_games() {
        let cache = InferenceCache::new(BoardSize::Nineteen, 4096, 64, 4);

        assert_eq!(cache.shards.len(), 4);
    }
}
