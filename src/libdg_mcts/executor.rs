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

//! The "cooperative batching" sharded executor: a fixed number of shards
//! execute one closure in parallel and the caller blocks until every shard
//! is done. Shared by every worker thread so that `ExecuteSharded` calls
//! from different workers serialize against each other when
//! `parallel_search > 1` -- the pipelining barrier that lets one worker's
//! CPU-bound tree search overlap another worker's GPU-bound inference call.
//!
//! Deliberately a scoped thread pool rather than an async task scheduler:
//! the barrier semantics this pipeline depends on fall out of
//! `std::thread::scope` joining before returning, with no extra
//! synchronization needed.

use std::sync::Mutex;

pub struct ShardedExecutor {
    num_shards: usize,
    lock: Mutex<()>
}

impl ShardedExecutor {
    pub fn new(num_shards: usize) -> Self {
        Self { num_shards: num_shards.max(1), lock: Mutex::new(()) }
    }

    pub fn num_shards(&self) -> usize {
        self.num_shards
    }

    /// Splits `items` into `num_shards` contiguous chunks and runs
    /// `f(shard_idx, chunk)` for each chunk on its own thread, blocking until
    /// every shard finishes. A single shard (or a caller with fewer items
    /// than shards) runs inline on the calling thread without spawning.
    ///
    /// Calls from different workers are mutually exclusive: the lock is held
    /// for the whole call, so only one worker's shards run at a time when
    /// `num_shards > 1`.
    pub fn execute_sharded<T, F>(&self, items: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync
    {
        let _guard = self.lock.lock().expect("sharded executor lock poisoned");

        if self.num_shards <= 1 || items.len() <= 1 {
            f(0, items);
            return;
        }

        let chunk_size = (items.len() + self.num_shards - 1) / self.num_shards;

        std::thread::scope(|scope| {
            let mut shard_idx = 0;

            for chunk in items.chunks_mut(chunk_size.max(1)) {
                let f = &f;
                let idx = shard_idx;

                scope.spawn(move || f(idx, chunk));
                shard_idx += 1;
            }
        });
    }
}
