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

//! Process-wide tunables that are genuinely global (thread-pool sizes, cache
//! sizing, the RNG seed) rather than per-game. Everything else lives in
//! `dg_mcts::options::SelfPlayOptions`, constructed by the caller.
//!
//! Values are read once from the environment at first access and cached,
//! mirroring how the original tool picked up `NUM_THREADS`-style overrides
//! without a dedicated flag parser.

use std::env;
use std::str::FromStr;
use std::thread;

/// Parses an environment variable, falling back to `default` if it is unset
/// or fails to parse. A malformed value is a configuration mistake, not a
/// recoverable runtime condition, so we fall back silently rather than abort
/// -- the caller is free to validate further if it cares.
fn from_env<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

lazy_static! {
    /// Number of `selfplay_threads` worker threads, absent an explicit
    /// `SelfPlayOptions::selfplay_threads`.
    pub static ref NUM_THREADS: usize = from_env("NUM_THREADS", num_cpus());

    /// Default neural network batch size used when sizing the evaluator
    /// pool's internal buffers.
    pub static ref BATCH_SIZE: usize = from_env("BATCH_SIZE", 16);

    /// Default inference cache size, in megabytes, split evenly across
    /// `cache_shards`.
    pub static ref CACHE_SIZE_MB: usize = from_env("CACHE_SIZE_MB", 2048);

    /// Default number of independent, individually-locked cache shards.
    pub static ref CACHE_SHARDS: usize = from_env("CACHE_SHARDS", 8);

    /// `0` means "seed from the current time"; any other value is used
    /// verbatim and mixed with each per-game stream id.
    pub static ref SEED: u64 = from_env("SEED", 0);

    /// How often, in seconds, the `run_forever` abort-file watcher polls.
    pub static ref ABORT_FILE_POLL_SECS: u64 = from_env("ABORT_FILE_POLL_SECS", 5);
}

fn num_cpus() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_for_missing_var() {
        assert_eq!(from_env::<usize>("DG_CONFIG_TEST_DOES_NOT_EXIST", 42), 42);
    }

    #[test]
    fn falls_back_to_default_for_malformed_var() {
        env::set_var("DG_CONFIG_TEST_MALFORMED", "not-a-number");
        assert_eq!(from_env::<usize>("DG_CONFIG_TEST_MALFORMED", 7), 7);
        env::remove_var("DG_CONFIG_TEST_MALFORMED");
    }
}
