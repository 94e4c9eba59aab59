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

//! The worker thread (L6): owns a vector of concurrent game drivers, one
//! evaluator handle drawn from the coordinator's pool, and a shared
//! reference to the inference cache. Each iteration gathers leaves across
//! all of its games, runs one evaluator batch, and plays any move that has
//! reached its readout target.

use std::sync::Arc;

use dg_position::Position;

use crate::coordinator::Coordinator;
use crate::evaluator::ModelOutput;
use crate::executor::ShardedExecutor;
use crate::game::{GameDriver, QueuedLeaf};
use crate::inference_cache::InferenceCache;
use crate::node::NodeId;
use crate::options::SelfPlayOptions;

/// One worker thread's share of the self-play run. `run` consumes `self`
/// and returns once its game vector becomes permanently empty (the
/// coordinator's budget is exhausted and every in-flight game has finished).
pub struct WorkerThread<P: Position> {
    games: Vec<GameDriver<P>>,
    coordinator: Arc<Coordinator<P>>,
    cache: Arc<InferenceCache>,
    executor: Arc<ShardedExecutor>,
    options: Arc<SelfPlayOptions>
}

impl<P: Position + Send + 'static> WorkerThread<P> {
    pub fn new(coordinator: Arc<Coordinator<P>>, cache: Arc<InferenceCache>, executor: Arc<ShardedExecutor>) -> Self {
        let options = coordinator.options().clone();

        Self { games: Vec::with_capacity(options.concurrent_games_per_thread), coordinator, cache, executor, options }
    }

    /// For each empty slot, asks the coordinator for a new game; once the
    /// coordinator has none left to give, simply stops trying this round --
    /// any slot that later frees up (a game finishing in `play_moves`, which
    /// removes it by swapping with the last element) is topped up on the
    /// next call instead.
    fn start_new_games(&mut self) {
        while self.games.len() < self.options.concurrent_games_per_thread {
            match self.coordinator.start_new_game(false) {
                Some(driver) => self.games.push(driver),
                None => break
            }
        }
    }

    pub fn run(mut self) {
        loop {
            self.start_new_games();

            if self.games.is_empty() {
                break;
            }

            self.run_iteration();
        }
    }

    fn run_iteration(&mut self) {
        let mut batches = self.select_leaves_sharded();
        let (model_name, results) = self.run_inferences(&mut batches);

        for (game, game_results) in self.games.iter_mut().zip(results.into_iter()) {
            game.process_inferences(&model_name, &game_results);
        }

        self.play_moves();
    }

    /// Partitions the worker's games across `parallel_search` shards on the
    /// shared executor; each shard calls `select_leaves` on its own subset
    /// of games into its own inference buffer, so the executor's barrier is
    /// the only synchronization needed between this worker's shards and any
    /// concurrently running worker's inference call.
    fn select_leaves_sharded(&mut self) -> Vec<Vec<QueuedLeaf<P>>> {
        let mut batches: Vec<Vec<QueuedLeaf<P>>> = self.games.iter().map(|_| Vec::new()).collect();
        let mut work: Vec<(&mut GameDriver<P>, &mut Vec<QueuedLeaf<P>>)> =
            self.games.iter_mut().zip(batches.iter_mut()).collect();

        let cache = &*self.cache;

        self.executor.execute_sharded(&mut work, |_shard_idx, chunk| {
            for (game, batch) in chunk.iter_mut() {
                game.select_leaves(cache, batch);
            }
        });

        batches
    }

    /// Concatenates every game's queued leaves into one evaluator batch,
    /// acquires a handle from the coordinator's pool for the call, merges
    /// each result into the shared cache, then slices the (possibly
    /// cache-averaged) outputs back out per game.
    fn run_inferences(&self, batches: &mut [Vec<QueuedLeaf<P>>]) -> (String, Vec<Vec<(NodeId, ModelOutput)>>) {
        let mut inputs = Vec::new();
        let mut offsets = Vec::with_capacity(batches.len());

        for batch in batches.iter() {
            offsets.push((inputs.len(), batch.len()));
            inputs.extend(batch.iter().map(|q| q.input.clone()));
        }

        let num_moves = self.options.board_size.num_moves();
        let mut outputs = vec![ModelOutput::zeroed(num_moves); inputs.len()];

        let model_name = if inputs.is_empty() {
            String::new()
        } else {
            let handle = self.coordinator.acquire_model();
            let name = handle.evaluator.run_many(&inputs, &mut outputs);
            self.coordinator.release_model(handle);
            name
        };

        for (batch, &(start, len)) in batches.iter().zip(offsets.iter()) {
            for (i, queued) in batch.iter().enumerate().take(len) {
                if let Some(key) = &queued.cache_key {
                    let mut merged = crate::inference_cache::CacheValue {
                        policy: outputs[start + i].policy.clone(),
                        value: outputs[start + i].value
                    };
                    self.cache.merge(key, queued.inference_sym, &mut merged);
                    outputs[start + i].policy = merged.policy;
                    outputs[start + i].value = merged.value;
                }
            }
        }

        let results = batches.iter().zip(offsets.iter())
            .map(|(batch, &(start, len))| {
                batch.iter().enumerate().take(len)
                    .map(|(i, q)| (q.leaf, outputs[start + i].clone()))
                    .collect()
            })
            .collect();

        (model_name, results)
    }

    /// Plays a move on every game whose root has reached its readout
    /// target; any game that thereby finishes is handed to the
    /// coordinator's output queue and its slot removed by swapping with the
    /// last element (the "swap-with-last" removal the component design
    /// calls for).
    fn play_moves(&mut self) {
        let mut i = 0;

        while i < self.games.len() {
            let played = self.games[i].maybe_play_move();

            if played && self.games[i].is_finished() {
                let finished = self.games.swap_remove(i).into_finished_game();
                self.coordinator.end_game(finished);
            } else {
                i += 1;
            }
        }
    }
}
