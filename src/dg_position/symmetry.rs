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

//! The symmetry kit: the eight symmetries of the square,
//! used both to canonicalize positions for the inference cache key and to
//! randomly augment features before they are handed to the evaluator.

use crate::coord::{BoardSize, Coord};

/// The eight symmetries of the square: identity, the three non-trivial
/// rotations, the transpose, and the transpose composed with each rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Symmetry {
    Identity,
    Rot90,
    Rot180,
    Rot270,
    Transpose,
    TransposeRot90,
    TransposeRot180,
    TransposeRot270
}

/// All eight symmetries, in the order used to index `CONCAT`/`INVERSE`.
pub const ALL: [Symmetry; 8] = [
    Symmetry::Identity,
    Symmetry::Rot90,
    Symmetry::Rot180,
    Symmetry::Rot270,
    Symmetry::Transpose,
    Symmetry::TransposeRot90,
    Symmetry::TransposeRot180,
    Symmetry::TransposeRot270
];

impl Symmetry {
    fn index(self) -> usize {
        match self {
            Symmetry::Identity => 0,
            Symmetry::Rot90 => 1,
            Symmetry::Rot180 => 2,
            Symmetry::Rot270 => 3,
            Symmetry::Transpose => 4,
            Symmetry::TransposeRot90 => 5,
            Symmetry::TransposeRot180 => 6,
            Symmetry::TransposeRot270 => 7
        }
    }

    /// Maps an `(x, y)` point on an `n`×`n` board to the point it moves to
    /// under this symmetry.
    fn apply_xy(self, n: usize, x: usize, y: usize) -> (usize, usize) {
        let m = n - 1;

        match self {
            Symmetry::Identity => (x, y),
            Symmetry::Rot90 => (y, m - x),
            Symmetry::Rot180 => (m - x, m - y),
            Symmetry::Rot270 => (m - y, x),
            Symmetry::Transpose => (y, x),             // main-diagonal flip
            Symmetry::TransposeRot90 => (x, m - y),     // flip about the horizontal axis
            Symmetry::TransposeRot180 => (m - y, m - x), // anti-diagonal flip
            Symmetry::TransposeRot270 => (m - x, y)     // flip about the vertical axis
        }
    }

    /// The symmetry that undoes `self`: `apply(inverse(s), apply(s, x)) == x`.
    pub fn inverse(self) -> Symmetry {
        match self {
            Symmetry::Identity => Symmetry::Identity,
            Symmetry::Rot90 => Symmetry::Rot270,
            Symmetry::Rot180 => Symmetry::Rot180,
            Symmetry::Rot270 => Symmetry::Rot90,
            Symmetry::Transpose => Symmetry::Transpose,
            Symmetry::TransposeRot90 => Symmetry::TransposeRot90,
            Symmetry::TransposeRot180 => Symmetry::TransposeRot180,
            Symmetry::TransposeRot270 => Symmetry::TransposeRot270
        }
    }

    /// The single symmetry equivalent to applying `self` then `other`.
    pub fn concat(self, other: Symmetry) -> Symmetry {
        CONCAT[self.index()][other.index()]
    }

    /// Applies this symmetry to a board coordinate. Pass, resign, and the
    /// invalid sentinel are left unchanged.
    pub fn apply_coord(self, board_size: BoardSize, coord: Coord) -> Coord {
        if !coord.is_point(board_size) {
            return coord;
        }

        let n = board_size.side();
        let (x, y) = self.apply_xy(n, coord.x(board_size), coord.y(board_size));

        Coord::from_point(board_size, x, y)
    }

    /// Applies this symmetry to an `n`×`n` board with `c` interleaved
    /// channels per point, writing the result into `dst`.
    pub fn apply<T: Copy>(self, n: usize, c: usize, src: &[T], dst: &mut [T]) {
        assert_eq!(src.len(), n * n * c);
        assert_eq!(dst.len(), n * n * c);

        for y in 0..n {
            for x in 0..n {
                let (tx, ty) = self.apply_xy(n, x, y);
                let src_base = (y * n + x) * c;
                let dst_base = (ty * n + tx) * c;

                dst[dst_base..dst_base + c].copy_from_slice(&src[src_base..src_base + c]);
            }
        }
    }
}

/// `CONCAT[a][b]` is the symmetry equivalent to applying `a` then `b`.
/// Precomputed once at startup from the underlying `(x, y)` mapping so the
/// hot path (cache key transforms) never has to recompose transforms.
lazy_static::lazy_static! {
    static ref CONCAT: [[Symmetry; 8]; 8] = {
        const PROBE_N: usize = 3;
        let mut table = [[Symmetry::Identity; 8]; 8];

        for &a in ALL.iter() {
            for &b in ALL.iter() {
                // find the symmetry `c` such that apply(c, p) == apply(b, apply(a, p))
                // for every point `p` on a `PROBE_N`×`PROBE_N` board.
                let mut found = None;

                for &c in ALL.iter() {
                    let matches = (0..PROBE_N).all(|y| {
                        (0..PROBE_N).all(|x| {
                            let (ax, ay) = a.apply_xy(PROBE_N, x, y);
                            let (abx, aby) = b.apply_xy(PROBE_N, ax, ay);
                            let (cx, cy) = c.apply_xy(PROBE_N, x, y);

                            (abx, aby) == (cx, cy)
                        })
                    });

                    if matches {
                        found = Some(c);
                        break;
                    }
                }

                table[a.index()][b.index()] = found.expect("D4 is closed under composition");
            }
        }

        table
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_points(n: usize) -> Vec<(usize, usize)> {
        (0..n).flat_map(|y| (0..n).map(move |x| (x, y))).collect()
    }

    #[test]
    fn inverse_undoes_apply_for_coords() {
        let n = 9;

        for &s in ALL.iter() {
            for (x, y) in all_points(n) {
                let coord = Coord::from_point(BoardSize::Nine, x, y);
                let forward = s.apply_coord(BoardSize::Nine, coord);
                let back = s.inverse().apply_coord(BoardSize::Nine, forward);

                assert_eq!(back, coord, "symmetry {:?} did not invert", s);
            }
        }
    }

    #[test]
    fn inverse_undoes_apply_for_arrays() {
        let n = 5;
        let c = 2;
        let src: Vec<f32> = (0..n * n * c).map(|i| i as f32).collect();

        for &s in ALL.iter() {
            let mut forward = vec![0.0f32; n * n * c];
            s.apply(n, c, &src, &mut forward);

            let mut back = vec![0.0f32; n * n * c];
            s.inverse().apply(n, c, &forward, &mut back);

            assert_eq!(back, src, "symmetry {:?} did not invert", s);
        }
    }

    #[test]
    fn concat_matches_sequential_application() {
        let n = 7;

        for &a in ALL.iter() {
            for &b in ALL.iter() {
                let c = a.concat(b);

                for (x, y) in all_points(n) {
                    let coord = Coord::from_point(BoardSize::Nineteen, x, y);
                    let direct = c.apply_coord(BoardSize::Nineteen, coord);
                    let sequential = b.apply_coord(BoardSize::Nineteen, a.apply_coord(BoardSize::Nineteen, coord));

                    assert_eq!(direct, sequential, "concat({:?}, {:?}) mismatch", a, b);
                }
            }
        }
    }

    #[test]
    fn pass_is_never_transformed() {
        for &s in ALL.iter() {
            let pass = Coord::pass(BoardSize::Nineteen);
            assert_eq!(s.apply_coord(BoardSize::Nineteen, pass), pass);

            let resign = Coord::resign();
            assert_eq!(s.apply_coord(BoardSize::Nineteen, resign), resign);
        }
    }
}
