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

//! The outermost boundary of the engine: the `Position` rules interface the
//! core treats as an external black box, and the D4 symmetry kit used both
//! for cache canonicalization and for feature augmentation.
//!
//! No Go rules are implemented in this crate -- legality, scoring, and
//! pass-alive detection are the responsibility of whatever implements
//! `Position`. This crate only fixes the vocabulary (`Coord`, `Color`,
//! `Symmetry`) that the rest of the engine is generic over.

pub mod color;
pub mod coord;
pub mod position;
pub mod symmetry;

pub use self::color::Color;
pub use self::coord::{Coord, BoardSize, MAX_NUM_MOVES};
pub use self::position::{Position, PositionExt, ZobristHash, ZobristHistory};
pub use self::symmetry::Symmetry;
