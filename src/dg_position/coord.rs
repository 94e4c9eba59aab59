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

/// The two supported board sizes. `kNumMoves` is `side*side + 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoardSize {
    Nine,
    Nineteen
}

impl BoardSize {
    pub fn side(self) -> usize {
        match self {
            BoardSize::Nine => 9,
            BoardSize::Nineteen => 19
        }
    }

    /// `kNumMoves` -- the width of every `Edge` array.
    pub fn num_moves(self) -> usize {
        self.side() * self.side() + 1
    }
}

/// The largest `kNumMoves` across supported board sizes, i.e. 19×19 + pass.
/// Used to size sentinel values that must never collide with a real index.
pub const MAX_NUM_MOVES: usize = 19 * 19 + 1;

/// A move: a board point, the pass move, resign, or the invalid sentinel
/// used for the game-root's `move` field. Board points and pass
/// are packed row-major indices in `0..board_size.num_moves()`; resign and
/// invalid live above `MAX_NUM_MOVES` so they can never alias a real point
/// regardless of board size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coord(u16);

const RESIGN_BITS: u16 = MAX_NUM_MOVES as u16;
const INVALID_BITS: u16 = MAX_NUM_MOVES as u16 + 1;

impl Coord {
    pub fn from_point(board_size: BoardSize, x: usize, y: usize) -> Self {
        let side = board_size.side();
        assert!(x < side && y < side, "point ({}, {}) is out of bounds for a {}x{} board", x, y, side, side);

        Coord((y * side + x) as u16)
    }

    pub fn pass(board_size: BoardSize) -> Self {
        Coord(board_size.num_moves() as u16 - 1)
    }

    pub fn resign() -> Self {
        Coord(RESIGN_BITS)
    }

    pub fn invalid() -> Self {
        Coord(INVALID_BITS)
    }

    pub fn is_pass(self, board_size: BoardSize) -> bool {
        self.0 as usize == board_size.num_moves() - 1
    }

    pub fn is_resign(self) -> bool {
        self.0 == RESIGN_BITS
    }

    pub fn is_invalid(self) -> bool {
        self.0 == INVALID_BITS
    }

    pub fn is_point(self, board_size: BoardSize) -> bool {
        (self.0 as usize) < board_size.num_moves() - 1
    }

    pub fn x(self, board_size: BoardSize) -> usize {
        debug_assert!(self.is_point(board_size));
        self.0 as usize % board_size.side()
    }

    pub fn y(self, board_size: BoardSize) -> usize {
        debug_assert!(self.is_point(board_size));
        self.0 as usize / board_size.side()
    }

    /// The packed index into an `Edge` array of width `board_size.num_moves()`.
    /// Only valid for points and pass -- resign and invalid never select an
    /// edge slot.
    pub fn to_index(self, board_size: BoardSize) -> usize {
        debug_assert!((self.0 as usize) < board_size.num_moves());
        self.0 as usize
    }

    pub fn from_index(index: usize) -> Self {
        assert!(index < MAX_NUM_MOVES, "index {} cannot be represented as a Coord", index);
        Coord(index as u16)
    }
}
