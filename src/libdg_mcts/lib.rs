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

//! The parallel self-play core: a PUCT tree over an arena of nodes, a
//! symmetry-canonicalized inference cache shared by every concurrent game,
//! and the worker / coordinator / output-writer layers that drive many
//! games to completion across a thread pool.
//!
//! `Position` (Go rules, legality, scoring) is a black box this crate is
//! generic over -- see `dg_position`. Feature encoding, device placement,
//! and the network itself are likewise external, behind the `Evaluator`
//! trait. Nothing here parses flags, writes SGF, or speaks GTP; those are
//! collaborators behind `GameSink`.

pub mod asm;
pub mod coordinator;
pub mod dirichlet;
pub mod evaluator;
pub mod executor;
pub mod game;
pub mod inference_cache;
pub mod node;
pub mod options;
pub mod output;
pub mod tree;
pub mod worker;
pub mod zobrist;

pub use self::coordinator::{Coordinator, EvaluatorPool, ModelHandle};
pub use self::evaluator::{Evaluator, ModelInput, ModelOutput};
pub use self::executor::ShardedExecutor;
pub use self::game::{FinishedGame, GameDriver, GameOverReason, PlayedMove};
pub use self::inference_cache::{CacheKey, CacheStats, CacheValue, InferenceCache};
pub use self::node::{Edge, Node, NodeId};
pub use self::options::SelfPlayOptions;
pub use self::output::{GameSink, OutputWriter};
pub use self::tree::MctsTree;
pub use self::worker::WorkerThread;
