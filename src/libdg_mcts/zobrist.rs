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

//! The process-wide Zobrist table used to derive the eight symmetry-hashes
//! of a position for canonical-symmetry detection. Initialized once,
//! before any worker runs. This is entirely separate from `Position`'s own
//! `stone_hash()`, which is an opaque value the rules engine uses for
//! superko -- this table only exists so the engine itself can tell whether a
//! position looks the same under two different symmetries without asking
//! the (symmetry-oblivious) `Position` black box to do it.

use dg_position::{BoardSize, Color, Position, Symmetry, ZobristHash};
use dg_position::symmetry::ALL;

struct Table {
    black: Vec<u64>,
    white: Vec<u64>
}

impl Table {
    fn new() -> Self {
        // A small xorshift-style stream seeded from a fixed constant, so the
        // table is deterministic across processes (required: two runs on
        // symmetric boards must key into the same cache entry).
        let mut state = 0x9E3779B97F4A7C15u64;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        let points = 19 * 19;
        let black = (0..points).map(|_| next()).collect();
        let white = (0..points).map(|_| next()).collect();

        Self { black, white }
    }

    fn entry(&self, color: Color, point: usize) -> u64 {
        match color {
            Color::Black => self.black[point],
            Color::White => self.white[point]
        }
    }
}

lazy_static::lazy_static! {
    static ref TABLE: Table = Table::new();
}

/// Hashes `stones` (row-major, `board_size.side()^2` entries) as seen under
/// `sym`, without materializing the transformed board -- the symmetry is
/// folded directly into the point index used to look up each stone's table
/// entry.
fn hash_stones_under(sym: Symmetry, board_size: BoardSize, stones: &[Option<Color>]) -> ZobristHash {
    let side = board_size.side();
    debug_assert_eq!(stones.len(), side * side);

    let mut hash = 0u64;

    for y in 0..side {
        for x in 0..side {
            if let Some(color) = stones[y * side + x] {
                let coord = dg_position::Coord::from_point(board_size, x, y);
                let transformed = sym.apply_coord(board_size, coord);
                let point = transformed.y(board_size) * side + transformed.x(board_size);

                hash ^= TABLE.entry(color, point);
            }
        }
    }

    hash
}

/// If `position`'s eight symmetry-hashes are all distinct, returns the
/// inverse of the symmetry whose hash is strictly minimal -- the symmetry
/// that maps `position` back to that minimal, canonical form. Otherwise
/// returns `None`: the position has some self-symmetry and can never
/// safely share a cache entry.
pub fn canonical_symmetry<P: Position>(position: &P) -> Option<Symmetry> {
    let board_size = position.board_size();
    let stones = position.stones();
    let hashes: Vec<(Symmetry, ZobristHash)> = ALL.iter()
        .map(|&sym| (sym, hash_stones_under(sym, board_size, &stones)))
        .collect();

    let mut distinct = true;
    for i in 0..hashes.len() {
        for j in (i + 1)..hashes.len() {
            if hashes[i].1 == hashes[j].1 {
                distinct = false;
            }
        }
    }

    if !distinct {
        return None;
    }

    hashes.iter().min_by_key(|&&(_, hash)| hash).map(|&(sym, _)| sym.inverse())
}

/// The hash of `position` under its own `canonical_symmetry` -- two positions
/// that are symmetric images of each other always produce the same value
/// here, which is what lets the inference cache share one entry between them.
pub fn canonical_hash<P: Position>(position: &P, canonical_symmetry: Symmetry) -> ZobristHash {
    hash_stones_under(canonical_symmetry.inverse(), position.board_size(), &position.stones())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty(side: usize) -> Vec<Option<Color>> {
        vec![None; side * side]
    }

    #[test]
    fn empty_board_has_no_canonical_symmetry() {
        let side = 9;
        let board_size = BoardSize::Nine;
        let stones = empty(side);

        for &sym in ALL.iter() {
            assert_eq!(
                hash_stones_under(sym, board_size, &stones),
                hash_stones_under(Symmetry::Identity, board_size, &stones)
            );
        }
    }

    #[test]
    fn asymmetric_position_yields_distinct_hashes() {
        let board_size = BoardSize::Nine;
        let side = board_size.side();
        let mut stones = empty(side);
        // three stones in a scalene arrangement -- no symmetry of the square
        // maps this set of points back onto itself.
        stones[0 * side + 0] = Some(Color::Black);
        stones[1 * side + 2] = Some(Color::Black);
        stones[4 * side + 7] = Some(Color::White);

        let hashes: Vec<ZobristHash> = ALL.iter()
            .map(|&sym| hash_stones_under(sym, board_size, &stones))
            .collect();

        for i in 0..hashes.len() {
            for j in (i + 1)..hashes.len() {
                assert_ne!(hashes[i], hashes[j], "symmetry {} and {} collided", i, j);
            }
        }
    }
}
