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

//! The per-game driver: one game's tree, its own RNG, and the
//! scheduling state (readout budget, fastplay, deferred noise injection,
//! the pass-alive restriction latch) that turns a bare `MctsTree` into a
//! self-playing game.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use dg_position::{Coord, Position, PositionExt};

use crate::evaluator::ModelOutput;
use crate::inference_cache::{CacheValue, InferenceCache};
use crate::node::NodeId;
use crate::options::SelfPlayOptions;
use crate::tree::MctsTree;
use crate::evaluator::ModelInput;

/// One leaf queued for evaluation: everything `WorkerThread` needs to build
/// the evaluator's input batch and, once results come back, route them to
/// both the cache and the originating tree.
pub struct QueuedLeaf<P: Position> {
    pub leaf: NodeId,
    pub cache_key: Option<crate::inference_cache::CacheKey>,
    pub inference_sym: dg_position::Symmetry,
    pub input: ModelInput<P>
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SelectStats {
    pub queued: usize,
    pub terminal: usize,
    pub cache_hits: usize
}

/// A move as actually played, together with the (post-reshape, if
/// applicable) visit distribution used as this move's training target.
#[derive(Clone, Debug)]
pub struct PlayedMove {
    pub coord: Coord,
    pub visit_distribution: Vec<u32>,
    pub fastplay: bool
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameOverReason {
    PassPass,
    Resign
}

/// The record a finished game hands to the output queue. Carries
/// everything a collaborator serializer (SGF, training examples) would need
/// without this crate knowing anything about either format.
#[derive(Clone, Debug)]
pub struct FinishedGame<P: Position> {
    pub game_id: u64,
    pub moves: Vec<PlayedMove>,
    pub terminal_position: P,
    pub reason: GameOverReason,
    pub model_names: Vec<String>,
    pub is_holdout: bool,
    pub komi: f32,
    pub duration: Duration
}

pub struct GameDriver<P: Position> {
    game_id: u64,
    tree: MctsTree<P>,
    rng: SmallRng,
    options: Arc<SelfPlayOptions>,

    target_readouts: u32,
    fastplay: bool,
    deferred_noise: bool,

    /// Consecutive-pass latch driving `restrict_pass_alive_play_threshold`.
    /// Stops incrementing once the threshold is reached and is never reset
    /// by a non-pass move.
    opponent_pass_count: usize,

    model_names: Vec<String>,
    moves: Vec<PlayedMove>,

    resign_threshold: f32,
    resign_disabled: bool,
    is_holdout: bool,

    game_over: Option<GameOverReason>,
    started_at: Instant
}

impl<P: Position> GameDriver<P> {
    pub fn new(
        game_id: u64,
        stream_id: u64,
        position: P,
        options: Arc<SelfPlayOptions>,
        resign_threshold: f32,
        resign_disabled: bool,
        is_holdout: bool
    ) -> Self {
        let seed = options.seed ^ mix_stream_id(stream_id);

        Self {
            game_id,
            tree: MctsTree::new(position, options.komi),
            rng: SmallRng::seed_from_u64(seed),
            target_readouts: options.num_readouts as u32,
            fastplay: false,
            // The very first move's search injects noise once the root is
            // expanded, same as every other normal turn.
            deferred_noise: true,
            opponent_pass_count: 0,
            model_names: Vec::new(),
            moves: Vec::new(),
            resign_threshold,
            resign_disabled,
            is_holdout,
            game_over: None,
            started_at: Instant::now(),
            options
        }
    }

    pub fn game_id(&self) -> u64 {
        self.game_id
    }

    pub fn is_finished(&self) -> bool {
        self.game_over.is_some()
    }

    /// Gathers up to `virtual_losses` new leaves into `out_batch`, resolving
    /// terminal and cache-hit leaves immediately. Stops early after queueing
    /// the root itself, so the next call can inject root noise once it
    /// comes back expanded.
    pub fn select_leaves(&mut self, cache: &InferenceCache, out_batch: &mut Vec<QueuedLeaf<P>>) -> SelectStats {
        if self.deferred_noise && self.tree.is_expanded(self.tree.root()) {
            self.tree.inject_noise(&mut self.rng, self.options.dirichlet_alpha, self.options.noise_mix);
            self.deferred_noise = false;
        }

        let mut stats = SelectStats::default();
        let root = self.tree.root();

        loop {
            if stats.queued >= self.options.virtual_losses {
                break;
            }
            if self.tree.visit_count(root) >= self.target_readouts {
                break;
            }

            let leaf = match self.tree.select_leaf(self.options.allow_pass) {
                Some(leaf) => leaf,
                None => break
            };

            if self.tree.is_game_over(leaf) {
                self.tree.backup_terminal(leaf);
                stats.terminal += 1;
                continue;
            }

            let inference_sym = self.tree.inference_symmetry(leaf);
            let cache_key = self.tree.cache_key(leaf);

            if let Some(key) = cache_key {
                let num_moves = self.tree.board_size().num_moves();
                let mut out = CacheValue { policy: vec![0.0; num_moves], value: 0.0 };

                if cache.try_get(&key, inference_sym, &mut out) {
                    self.tree.incorporate_results(leaf, &out.policy, out.value, self.options.value_init_penalty);
                    stats.cache_hits += 1;
                    continue;
                }
            }

            let history = self.tree.ancestor_positions(leaf, self.options.history_len);
            let input = ModelInput { symmetry: inference_sym, history };

            self.tree.add_virtual_loss(leaf);
            out_batch.push(QueuedLeaf { leaf, cache_key, inference_sym, input });
            stats.queued += 1;

            if leaf == root {
                break;
            }
        }

        stats
    }

    /// Incorporates this worker iteration's share of a merged inference
    /// batch, reverting virtual loss on every leaf it touches, and records
    /// `model_name` if it differs from the last one recorded.
    pub fn process_inferences(&mut self, model_name: &str, results: &[(NodeId, ModelOutput)]) {
        for (leaf, output) in results {
            self.tree.incorporate_results(*leaf, &output.policy, output.value, self.options.value_init_penalty);
            self.tree.revert_virtual_loss(*leaf);
        }

        if self.model_names.last().map(|s| s.as_str()) != Some(model_name) {
            self.model_names.push(model_name.to_string());
        }
    }

    /// Picks and plays a move once the root has reached its readout target,
    /// returning whether a move was played this call. A played move may
    /// immediately end the game (resignation, double pass, or a whole-board
    /// pass-alive position playing itself out).
    pub fn maybe_play_move(&mut self) -> bool {
        if self.is_finished() {
            return false;
        }
        if self.tree.visit_count(self.tree.root()) < self.target_readouts {
            return false;
        }

        let to_play_sign = self.side_to_play_sign();
        let q = self.tree.root_edge().q() * to_play_sign;

        if self.options.resign_enabled && !self.resign_disabled && q < self.resign_threshold {
            self.finish(GameOverReason::Resign);
            return true;
        }

        let restrict_pass_alive = self.opponent_pass_count >= self.options.restrict_pass_alive_play_threshold;
        let pass_alive_points = self.tree.node(self.tree.root()).position.calculate_pass_alive_regions();

        let coord = self.tree.pick_move(
            &mut self.rng,
            self.options.soft_pick_enabled,
            self.options.soft_pick_cutoff,
            self.options.policy_softmax_temp,
            restrict_pass_alive,
            &pass_alive_points
        );

        // ReshapeFinalVisits only applies to trainable (non-fastplay) moves.
        if !self.fastplay {
            self.tree.reshape_final_visits(restrict_pass_alive, &pass_alive_points);
        }

        self.record_and_play(coord, restrict_pass_alive);
        true
    }

    fn record_and_play(&mut self, coord: Coord, _restrict_pass_alive: bool) {
        let board_size = self.tree.board_size();
        let visit_distribution = self.tree.root_visit_distribution();
        self.moves.push(PlayedMove { coord, visit_distribution, fastplay: self.fastplay });

        self.tree.play_move(coord);

        if coord.is_pass(board_size) {
            if self.opponent_pass_count < self.options.restrict_pass_alive_play_threshold {
                self.opponent_pass_count += 1;
            }
        }
        // A non-pass move deliberately does not reset the latch.

        if self.tree.is_game_over(self.tree.root()) {
            self.finish(GameOverReason::PassPass);
            return;
        }

        if self.tree.node(self.tree.root()).position.calculate_whole_board_pass_alive() {
            self.play_out_remaining_passes();
            return;
        }

        self.schedule_next_turn();
    }

    /// Once the whole board is pass-alive, nothing but passing is ever worth
    /// doing -- play passes until the double-pass terminal fires.
    fn play_out_remaining_passes(&mut self) {
        let board_size = self.tree.board_size();
        let pass = Coord::pass(board_size);

        loop {
            self.moves.push(PlayedMove { coord: pass, visit_distribution: Vec::new(), fastplay: true });
            self.tree.play_move(pass);

            if self.tree.is_game_over(self.tree.root()) {
                self.finish(GameOverReason::PassPass);
                return;
            }
        }
    }

    fn schedule_next_turn(&mut self) {
        let current_n = self.tree.visit_count(self.tree.root());

        if self.rng.gen::<f32>() < self.options.fastplay_frequency {
            self.fastplay = true;
            self.target_readouts = current_n + self.options.fastplay_readouts as u32;
            self.deferred_noise = false;
        } else {
            self.fastplay = false;
            self.target_readouts = current_n + self.options.num_readouts as u32;
            self.deferred_noise = true;

            // Tree reuse is cleared entering a normal turn after a run of
            // fastplay turns, not on every normal turn: with playout-cap
            // oscillation disabled (fastplay_frequency == 0) every turn is
            // "normal" and reuse must survive across all of them.
            if self.options.fastplay_frequency > 0.0 {
                self.tree.clear_subtrees();
            }
        }
    }

    fn side_to_play_sign(&self) -> f32 {
        self.tree.node(self.tree.root()).position.side_to_play().sign()
    }

    fn finish(&mut self, reason: GameOverReason) {
        self.game_over = Some(reason);
    }

    pub fn into_finished_game(self) -> FinishedGame<P> {
        let reason = self.game_over.expect("into_finished_game called on an unfinished game");
        let terminal_position = self.tree.node(self.tree.root()).position.clone();

        FinishedGame {
            game_id: self.game_id,
            moves: self.moves,
            terminal_position,
            reason,
            model_names: self.model_names,
            is_holdout: self.is_holdout,
            komi: self.tree.komi(),
            duration: self.started_at.elapsed()
        }
    }
}

/// Mixes a per-game stream id into the global seed so every game's RNG is
/// deterministic given `(seed, stream_id)` but distinct across games.
fn mix_stream_id(stream_id: u64) -> u64 {
    const LARGE_PRIME: u64 = 0x9E3779B97F4A7C15;
    stream_id.wrapping_mul(LARGE_PRIME).rotate_left(17)
}
