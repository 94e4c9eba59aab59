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

//! The output writer (L8): drains finished games off the coordinator's
//! output queue and hands each one to a `GameSink`. What a sink actually
//! does with a game -- SGF, a training-example format, a network upload --
//! is entirely out of scope here; this module only fixes the draining loop
//! and its shutdown contract.

use std::sync::Arc;

use crossbeam_channel::Receiver;

use dg_position::Position;

use crate::game::FinishedGame;

/// A collaborator-supplied consumer of finished games. `Send + Sync` so one
/// sink can be shared across every `OutputWriter` thread.
pub trait GameSink<P: Position>: Send + Sync {
    fn write(&self, game: &FinishedGame<P>);
}

/// Pops games off `receiver` until it sees the `None` shutdown sentinel (or
/// the channel disconnects, which only happens if every `Coordinator`
/// reference was dropped without calling `shutdown`). `output_threads` many
/// writers share one `Receiver` -- crossbeam's MPMC semantics mean each
/// popped item, sentinel included, goes to exactly one writer.
pub struct OutputWriter<P: Position> {
    receiver: Receiver<Option<FinishedGame<P>>>,
    sink: Arc<dyn GameSink<P>>
}

impl<P: Position> OutputWriter<P> {
    pub fn new(receiver: Receiver<Option<FinishedGame<P>>>, sink: Arc<dyn GameSink<P>>) -> Self {
        Self { receiver, sink }
    }

    pub fn run(self) {
        loop {
            match self.receiver.recv() {
                Ok(Some(game)) => self.sink.write(&game),
                Ok(None) => break,
                Err(_) => break
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use dg_position::{BoardSize, Color, Coord, ZobristHistory};

    use crate::game::GameOverReason;

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

    struct RecordingSink {
        seen: Mutex<Vec<u64>>
    }

    impl GameSink<StubPosition> for RecordingSink {
        fn write(&self, game: &FinishedGame<StubPosition>) {
            self.seen.lock().expect("recording sink lock poisoned").push(game.game_id);
        }
    }

    fn finished_game(game_id: u64) -> FinishedGame<StubPosition> {
        FinishedGame {
            game_id,
            moves: Vec::new(),
            terminal_position: StubPosition,
            reason: GameOverReason::PassPass,
            model_names: vec!["test-model".to_string()],
            is_holdout: false,
            komi: 7.5,
            duration: Duration::from_secs(0)
        }
    }

    #[test]
    fn run_drains_every_game_before_the_sentinel() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = Arc::new(RecordingSink { seen: Mutex::new(Vec::new()) });
        let writer = OutputWriter::new(rx, sink.clone());

        tx.send(Some(finished_game(0))).unwrap();
        tx.send(Some(finished_game(1))).unwrap();
        tx.send(None).unwrap();

        writer.run();

        assert_eq!(*sink.seen.lock().unwrap(), vec![0, 1]);
    }

    #[test]
    fn run_stops_on_disconnect_even_without_a_sentinel() {
        let (tx, rx) = crossbeam_channel::unbounded::<Option<FinishedGame<StubPosition>>>();
        let sink = Arc::new(RecordingSink { seen: Mutex::new(Vec::new()) });
        let writer = OutputWriter::new(rx, sink);

        drop(tx);

        writer.run();
    }
}
