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

//! Hot-path arithmetic kernels: the PUCT child action score (scalar and
//! four-wide variants) and the finite-sum / normalize helpers used when
//! renormalizing a policy over legal moves.

use crate::node::Edge;

/// `2 * (ln((1 + N(n) + 19652) / 19652) + 1.25)` -- the exploration scale
/// shared by every child of a node with `n_parent` total visits.
pub fn u_scale(n_parent: u32) -> f32 {
    2.0 * (((1.0 + n_parent as f64 + 19652.0) / 19652.0).ln() as f32 + 1.25)
}

const ILLEGAL_PENALTY: f32 = 1000.0;

/// The child action score for a single edge.
///
/// `to_play_sign` is `+1` for Black, `-1` for White. `sqrt_term` is
/// `sqrt(max(1, N(n) - 1))`, precomputed once per node since it does not
/// vary across edges.
pub fn action_score(edge: &Edge, legal: bool, u_scale: f32, sqrt_term: f32, to_play_sign: f32) -> f32 {
    let q = edge.q() * to_play_sign;
    let illegal_penalty = if legal { 0.0 } else { ILLEGAL_PENALTY };
    let u = u_scale * edge.p * sqrt_term / (1.0 + edge.n as f32);

    q - illegal_penalty + u
}

/// Bit-hack single-precision reciprocal approximation, refined by one
/// Newton-Raphson step. Models the accuracy of a hardware approximate
/// reciprocal instruction (e.g. SSE `rcpps`, whose documented worst-case
/// relative error is `1.5 * 2^-12`) rather than computing `1.0 / x` exactly.
/// Used only by [`action_score_simd4`] so the scalar and four-wide paths are
/// bit-identical outside of this single divergence.
fn approx_recip(x: f32) -> f32 {
    debug_assert!(x > 0.0 && x.is_finite());

    let seed = f32::from_bits(0x7EF312ACu32.wrapping_sub(x.to_bits()));

    seed * (2.0 - x * seed)
}

/// The four-wide chunked variant of [`action_score`]. Processes edges in
/// groups of four using [`approx_recip`] in place of exact division; any
/// remainder edges (when the edge count is not a multiple of four) are
/// scored with the exact scalar formula.
pub fn action_score_simd4(
    edges: &[Edge],
    legal_mask: &[bool],
    u_scale: f32,
    sqrt_term: f32,
    to_play_sign: f32,
    out: &mut [f32]
) {
    debug_assert_eq!(edges.len(), legal_mask.len());
    debug_assert_eq!(edges.len(), out.len());

    let chunks = edges.len() / 4;

    for c in 0..chunks {
        let base = c * 4;

        for lane in 0..4 {
            let i = base + lane;
            let edge = &edges[i];
            let q = edge.q() * to_play_sign;
            let illegal_penalty = if legal_mask[i] { 0.0 } else { ILLEGAL_PENALTY };
            let recip = approx_recip(1.0 + edge.n as f32);
            let u = u_scale * edge.p * sqrt_term * recip;

            out[i] = q - illegal_penalty + u;
        }
    }

    for i in (chunks * 4)..edges.len() {
        out[i] = action_score(&edges[i], legal_mask[i], u_scale, sqrt_term, to_play_sign);
    }
}

/// Sums `policy`, treating non-finite entries (the `-inf` illegal-move
/// marker some callers use before the legal-mask based renormalization
/// runs) as zero.
pub fn sum_finite_f32(policy: &[f32]) -> f32 {
    policy.iter().filter(|p| p.is_finite()).sum()
}

/// Divides every finite entry of `policy` by `sum`, in place.
pub fn normalize_finite_f32(policy: &mut [f32], sum: f32) {
    let recip = sum.recip();

    for p in policy.iter_mut() {
        if p.is_finite() {
            *p *= recip;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u_scale_matches_reference_at_one_visit() {
        // N(root) = 1.
        let got = u_scale(1);
        let expected = 2.0 * (((1.0 + 1.0 + 19652.0) / 19652.0_f64).ln() as f32 + 1.25);

        assert!((got - expected).abs() < 1e-6);
    }

    #[test]
    fn illegal_moves_are_unselectable() {
        let mut legal = Edge::new();
        legal.p = 0.5;
        let mut illegal = Edge::new();
        illegal.p = 0.5;
        illegal.w = 100.0; // even a very attractive looking W cannot win
        illegal.n = 0;

        let scale = u_scale(10);
        let sqrt_term = 3.0f32;

        let legal_score = action_score(&legal, true, scale, sqrt_term, 1.0);
        let illegal_score = action_score(&illegal, false, scale, sqrt_term, 1.0);

        assert!(legal_score > illegal_score);
    }

    #[test]
    fn simd4_matches_scalar_within_documented_tolerance() {
        let edges: Vec<Edge> = (0..9).map(|i| {
            let mut e = Edge::new();
            e.n = i * 3;
            e.w = (i as f32) * 0.37 - 1.0;
            e.p = 1.0 / 9.0;
            e
        }).collect();
        let legal_mask = vec![true; edges.len()];
        let scale = u_scale(42);
        let sqrt_term = (42.0f32 - 1.0).max(1.0).sqrt();

        let scalar: Vec<f32> = edges.iter().zip(legal_mask.iter())
            .map(|(e, &l)| action_score(e, l, scale, sqrt_term, 1.0))
            .collect();

        let mut simd = vec![0.0f32; edges.len()];
        action_score_simd4(&edges, &legal_mask, scale, sqrt_term, 1.0, &mut simd);

        for (a, b) in scalar.iter().zip(simd.iter()) {
            let rel_error = ((a - b) / a).abs();
            assert!(rel_error < 1.5 * 2f32.powi(-12), "scalar={} simd={} rel_error={}", a, b, rel_error);
        }
    }

    #[test]
    fn sum_finite_ignores_negative_infinity() {
        let policy = vec![0.2, f32::NEG_INFINITY, 0.3, 0.5];

        assert!((sum_finite_f32(&policy) - 1.0).abs() < 1e-6);
    }
}
