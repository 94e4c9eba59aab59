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

//! The sole hard external dependency: a pure function from a batch of
//! feature tensors to a batch of `(policy, value)` outputs. Feature
//! encoding, device placement, and the network itself are all collaborator
//! concerns -- this module only fixes the call boundary the core programs
//! against.

use dg_position::{Position, Symmetry};

/// One leaf's worth of evaluator input: the symmetry its features should be
/// presented in, and a short, most-recent-first window of ancestor
/// positions (shorter than the caller's configured history length only near
/// the start of a game, where there simply are no older ancestors).
#[derive(Clone)]
pub struct ModelInput<P: Position> {
    pub symmetry: Symmetry,
    pub history: Vec<P>
}

/// One leaf's worth of evaluator output: a policy over `kNumMoves` entries
/// and a value in `[-1, +1]`, both already in `symmetry`'s frame.
#[derive(Clone, Debug)]
pub struct ModelOutput {
    pub policy: Vec<f32>,
    pub value: f32
}

impl ModelOutput {
    pub fn zeroed(num_moves: usize) -> Self {
        Self { policy: vec![0.0; num_moves], value: 0.0 }
    }
}

/// Contract: pure, may be called from any thread on a given handle but only
/// by one caller at a time; `outputs[i]` corresponds to `inputs[i]`. Batch
/// size is chosen by the caller; symmetry transforms are the caller's
/// responsibility (the evaluator itself neither knows nor cares that a
/// symmetry was applied).
pub trait Evaluator<P: Position>: Send {
    /// Runs the batch and reports the name of the model that produced it --
    /// used by the coordinator's evaluator pool to detect a model rollover
    /// and by each game driver to track which models touched it.
    fn run_many(&self, inputs: &[ModelInput<P>], outputs: &mut [ModelOutput]) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use dg_position::{BoardSize, Color, Coord, ZobristHistory};

    #[derive(Clone)]
    struct StubPosition;

    impl Position for StubPosition {
        fn board_size(&self) -> BoardSize { BoardSize::Nine }
        fn side_to_play(&self) -> Color { Color::Black }
        fn move_number(&self) -> usize { 0 }
        fn legal_move(&self, _coord: Coord) -> bool { true }
        fn play_move(&self, _coord: Coord, _side: Color, _history: &dyn ZobristHistory) -> Self { self.clone() }
        fn stone_hash(&self) -> u64 { 0 }
        fn calculate_score(&self, _komi: f32) -> f32 { 0.0 }
        fn calculate_pass_alive_regions(&self) -> Vec<Coord> { Vec::new() }
        fn calculate_whole_board_pass_alive(&self) -> bool { false }
        fn stones(&self) -> Vec<Option<Color>> { vec![None; 81] }
    }

    struct ConstantEvaluator;

    impl Evaluator<StubPosition> for ConstantEvaluator {
        fn run_many(&self, inputs: &[ModelInput<StubPosition>], outputs: &mut [ModelOutput]) -> String {
            for out in outputs.iter_mut().take(inputs.len()) {
                out.value = 0.5;
            }
            "constant-v1".to_string()
        }
    }

    #[test]
    fn outputs_align_with_inputs() {
        let evaluator = ConstantEvaluator;
        let inputs = vec![
            ModelInput { symmetry: Symmetry::Identity, history: vec![StubPosition] },
            ModelInput { symmetry: Symmetry::Rot90, history: vec![StubPosition] }
        ];
        let mut outputs = vec![ModelOutput::zeroed(82); inputs.len()];

        let name = evaluator.run_many(&inputs, &mut outputs);

        assert_eq!(name, "constant-v1");
        assert!(outputs.iter().all(|o| o.value == 0.5));
    }
}
