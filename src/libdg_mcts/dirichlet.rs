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

//! Root policy noise: `P(i) <- (1 - mix) * P(i) + mix * noise(i)`
//! where `noise` is `Dirichlet(alpha)` renormalized over legal moves only.

use rand::Rng;
use rand_distr::Distribution;
use rand_distr::Dirichlet;

/// Mixes Dirichlet(`alpha`) noise into `p`, a policy over `legal_mask.len()`
/// edges, renormalized to the legal moves only. `p[i]` for illegal `i` is
/// left untouched -- it is expected to already be (and remain) zero.
pub fn add<R: Rng>(rng: &mut R, p: &mut [f32], legal_mask: &[bool], alpha: f32, mix: f32) {
    debug_assert_eq!(p.len(), legal_mask.len());

    let legal_indices: Vec<usize> = legal_mask.iter().enumerate()
        .filter(|&(_, &legal)| legal)
        .map(|(i, _)| i)
        .collect();

    if legal_indices.len() < 2 {
        // a Dirichlet distribution needs at least two categories; with zero
        // or one legal move there is nothing to diversify.
        return;
    }

    let concentrations = vec![alpha as f64; legal_indices.len()];
    let dirichlet = Dirichlet::new(&concentrations).expect("alpha must be positive");
    let noise: Vec<f64> = dirichlet.sample(rng);

    for (&i, &eta) in legal_indices.iter().zip(noise.iter()) {
        p[i] = (1.0 - mix) * p[i] + mix * (eta as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn noise_keeps_mass_on_legal_moves_only() {
        let mut rng = SmallRng::seed_from_u64(42);
        let legal_mask = vec![true, false, true, true, false];
        let mut p = vec![0.25, 0.0, 0.25, 0.5, 0.0];

        add(&mut rng, &mut p, &legal_mask, 0.03, 0.25);

        assert_eq!(p[1], 0.0);
        assert_eq!(p[4], 0.0);

        let sum: f32 = p.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4, "sum = {}", sum);
    }

    #[test]
    fn single_legal_move_is_left_alone() {
        let mut rng = SmallRng::seed_from_u64(1);
        let legal_mask = vec![false, true, false];
        let mut p = vec![0.0, 1.0, 0.0];

        add(&mut rng, &mut p, &legal_mask, 0.03, 0.25);

        assert_eq!(p, vec![0.0, 1.0, 0.0]);
    }
}
