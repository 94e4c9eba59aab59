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

//! The `Position` service is a black box: rules, legality,
//! superko, scoring, and pass-alive detection all live on the other side of
//! this trait. The engine never implements Go rules itself.

use crate::color::Color;
use crate::coord::{BoardSize, Coord};

/// A Zobrist stone-hash. Equality of two hashes is the engine's only notion
/// of "same position" -- superko detection and cache canonicalization both
/// reduce to hash comparisons.
pub type ZobristHash = u64;

/// Capability the tree hands to `Position::play_move` so the rules layer can
/// ask "has this exact stone arrangement occurred before on this game's
/// history path" without the `Position` needing to know anything about how
/// the tree stores its ancestry as a sparse ancestor index.
pub trait ZobristHistory {
    /// Walks up the path from the current node to the game root (inclusive),
    /// consulting each ancestor's sparse superko cache, and reports whether
    /// `hash` has appeared before.
    fn has_position_been_played_before(&self, hash: ZobristHash) -> bool;
}

/// An immutable position snapshot. Implementations own all Go rules
/// (captures, liberties, ko) -- this crate only fixes the contract the core
/// MCTS engine programs against.
pub trait Position: Clone {
    fn board_size(&self) -> BoardSize;

    /// Whose turn it is to play next.
    fn side_to_play(&self) -> Color;

    /// The move number since the start of the game (used to bound
    /// `history_len` ancestor features and soft-pick's `soft_pick_cutoff`).
    fn move_number(&self) -> usize;

    /// Whether `coord` is a legal move for `side_to_play()`. Pass is always
    /// legal.
    fn legal_move(&self, coord: Coord) -> bool;

    /// A dense legality bitmap, one entry per `Coord::to_index`, sized
    /// `board_size().num_moves()`.
    fn legal_moves(&self) -> Vec<bool> {
        let n = self.board_size().num_moves();

        (0..n).map(|i| self.legal_move(Coord::from_index(i))).collect()
    }

    /// Plays `coord` for `side`, consulting `history` to resolve positional
    /// superko, and returns the resulting position. Panics (a
    /// programmer-contract violation) if the move is illegal.
    fn play_move(&self, coord: Coord, side: Color, history: &dyn ZobristHistory) -> Self;

    /// The Zobrist hash of the stones on the board (not including side to
    /// play), used both for superko and for cache canonicalization.
    fn stone_hash(&self) -> ZobristHash;

    /// Black score minus White score under area scoring with the given komi;
    /// positive favors Black.
    fn calculate_score(&self, komi: f32) -> f32;

    /// The set of points that belong to a pass-alive region, for either
    /// color. Used to implement `restrict_pass_alive_play_threshold`.
    fn calculate_pass_alive_regions(&self) -> Vec<Coord>;

    /// Whether every point on the board belongs to some pass-alive region --
    /// i.e. the game is effectively decided and only passes remain useful.
    fn calculate_whole_board_pass_alive(&self) -> bool;

    /// A dense, row-major snapshot of the stones on the board (`None` for an
    /// empty point), width `board_size().side()^2`. Used only by the engine's
    /// own process-wide Zobrist table to derive the eight symmetry-hashes
    /// needed for canonical-symmetry detection -- this is a
    /// read-only view, never a second source of truth for rules.
    fn stones(&self) -> Vec<Option<Color>>;
}

/// Convenience helpers derived from `Position` that do not need to be
/// reimplemented by every rules engine.
pub trait PositionExt: Position {
    /// Two consecutive passes or a resignation -- the terminal condition
    /// `leaf.game_over()` refers to. `Position` itself has no
    /// notion of "previous move", so this takes it explicitly.
    fn is_game_over(&self, last_move: Option<Coord>, second_to_last_move: Option<Coord>) -> bool {
        let board_size = self.board_size();
        let both_passed = match (last_move, second_to_last_move) {
            (Some(a), Some(b)) => a.is_pass(board_size) && b.is_pass(board_size),
            _ => false
        };
        let resigned = last_move.map(|m| m.is_resign()).unwrap_or(false);

        both_passed || resigned
    }
}

impl<T: Position> PositionExt for T {}
