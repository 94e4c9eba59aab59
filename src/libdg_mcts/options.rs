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

//! The self-play configuration table, as a plain struct constructed by
//! the caller -- CLI/flag parsing is out of scope, so there is no parser
//! here, only the recognized options and their defaults.

use dg_position::BoardSize;

#[derive(Clone, Debug)]
pub struct SelfPlayOptions {
    pub board_size: BoardSize,
    pub komi: f32,

    /// Readouts per normal move.
    pub num_readouts: usize,

    /// Playout-cap oscillation: with this probability, a move uses
    /// `fastplay_readouts` instead of `num_readouts`, with no root noise and
    /// no tree reuse.
    pub fastplay_frequency: f32,
    pub fastplay_readouts: usize,

    /// Size of one leaf-selection batch per game.
    pub virtual_losses: usize,

    /// Child `Q` prior offset, typically clamped to `[0, 2]`.
    pub value_init_penalty: f32,

    pub dirichlet_alpha: f32,
    pub noise_mix: f32,

    /// Soft-pick exponent (also used as the training target temperature).
    pub policy_softmax_temp: f32,

    /// Move index beyond which `PickMove` stops soft-picking.
    pub soft_pick_cutoff: usize,
    pub soft_pick_enabled: bool,

    /// Consecutive opponent passes after which play in pass-alive regions is
    /// disallowed.
    pub restrict_pass_alive_play_threshold: usize,

    /// If false, pass is only selected when it is the only legal move.
    pub allow_pass: bool,

    pub resign_enabled: bool,
    pub resign_threshold_min: f32,
    pub resign_threshold_max: f32,

    pub holdout_pct: f32,
    pub disable_resign_pct: f32,

    /// Number of ancestor positions (including the leaf itself) fed to the
    /// evaluator per input, most-recent-first.
    pub history_len: usize,

    pub cache_size_mb: usize,
    pub cache_shards: usize,

    pub selfplay_threads: usize,
    pub concurrent_games_per_thread: usize,
    pub parallel_search: usize,
    pub parallel_inference: usize,
    pub output_threads: usize,

    /// A finite game budget; mutually exclusive with `run_forever`.
    pub num_games: Option<usize>,
    pub run_forever: bool,

    /// `0` means time-based; any other value is mixed with a per-game stream
    /// id to seed that game's RNG.
    pub seed: u64
}

impl SelfPlayOptions {
    /// Fatal configuration mismatches: checked once, before any worker
    /// starts. These are contract violations on the caller's part, so --
    /// like the rest of the core's error handling -- they abort via
    /// `assert!` rather than returning a `Result`.
    pub fn validate(&self) {
        assert!(
            !(self.num_games.is_some() && self.run_forever),
            "num_games and run_forever are mutually exclusive"
        );
        assert!(
            self.resign_threshold_min <= self.resign_threshold_max,
            "resign_threshold_min must not exceed resign_threshold_max"
        );
    }
}

impl Default for SelfPlayOptions {
    fn default() -> Self {
        Self {
            board_size: BoardSize::Nineteen,
            komi: 7.5,
            num_readouts: 800,
            fastplay_frequency: 0.75,
            fastplay_readouts: 100,
            virtual_losses: 8,
            value_init_penalty: 0.0,
            dirichlet_alpha: 0.03,
            noise_mix: 0.25,
            policy_softmax_temp: 0.98,
            soft_pick_cutoff: 30,
            soft_pick_enabled: true,
            restrict_pass_alive_play_threshold: 2,
            allow_pass: true,
            resign_enabled: true,
            resign_threshold_min: -0.9,
            resign_threshold_max: -0.8,
            holdout_pct: 0.05,
            disable_resign_pct: 0.1,
            history_len: 8,
            cache_size_mb: *dg_utils::config::CACHE_SIZE_MB,
            cache_shards: *dg_utils::config::CACHE_SHARDS,
            selfplay_threads: *dg_utils::config::NUM_THREADS,
            concurrent_games_per_thread: 16,
            parallel_search: 1,
            parallel_inference: 1,
            output_threads: 1,
            num_games: Some(1),
            run_forever: false,
            seed: *dg_utils::config::SEED
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "mutually exclusive")]
    fn rejects_num_games_and_run_forever_together() {
        let mut options = SelfPlayOptions::default();
        options.num_games = Some(10);
        options.run_forever = true;

        options.validate();
    }
}
