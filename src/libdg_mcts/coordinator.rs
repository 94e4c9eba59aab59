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

//! The self-play coordinator (L7): owns the global game counter (or
//! "forever" mode with an abort-file watcher), the RNG used to draw
//! per-game resign-disable / holdout decisions, the evaluator pool, and
//! the output queue that finished games are handed to.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use dg_position::Position;

use crate::evaluator::Evaluator;
use crate::game::FinishedGame;
use crate::game::GameDriver;
use crate::options::SelfPlayOptions;

/// One evaluator handle as it travels through the pool: the model name it
/// was loaded from (used to detect a rollover) and the evaluator itself.
#[derive(Clone)]
pub struct ModelHandle<P: Position> {
    pub name: String,
    pub evaluator: Arc<dyn Evaluator<P>>
}

/// A bounded concurrent queue of evaluator handles, acquired and released
/// exactly like the teacher's own `pool.rs` worker pool hands out work --
/// except here what is handed out is a network handle rather than a search
/// task. `acquire_model` blocks until a handle is free; `release_model`
/// returns it, discarding any handle whose name no longer matches the
/// current model (a graceful rollover: in-flight inferences on the old
/// model are allowed to finish, but their handles are not recirculated).
pub struct EvaluatorPool<P: Position> {
    sender: Sender<ModelHandle<P>>,
    receiver: Receiver<ModelHandle<P>>,
    active_name: Mutex<String>
}

impl<P: Position> EvaluatorPool<P> {
    pub fn new(handles: Vec<ModelHandle<P>>) -> Self {
        assert!(!handles.is_empty(), "an evaluator pool needs at least one handle");

        let active_name = handles[0].name.clone();
        let (sender, receiver) = crossbeam_channel::bounded(handles.len());

        for handle in handles {
            sender.send(handle).expect("evaluator pool channel unexpectedly closed");
        }

        Self { sender, receiver, active_name: Mutex::new(active_name) }
    }

    /// Blocks until a handle is free.
    pub fn acquire(&self) -> ModelHandle<P> {
        self.receiver.recv().expect("evaluator pool channel unexpectedly closed")
    }

    /// Returns `handle` to the pool, unless a newer model has since become
    /// active, in which case the stale handle is simply dropped.
    pub fn release(&self, handle: ModelHandle<P>) {
        let active = self.active_name.lock().expect("evaluator pool lock poisoned");

        if handle.name == *active {
            // the channel is sized to exactly the number of handles ever
            // inserted, so this can only fail if the pool itself has been
            // dropped -- nothing useful to do about that here.
            let _ = self.sender.send(handle);
        }
    }

    /// Marks `name` as the active model and enqueues its handles, to be
    /// called by whatever external collaborator performs model discovery
    /// and hot-reload (out of scope for this crate).
    pub fn set_active(&self, name: String, handles: Vec<ModelHandle<P>>) {
        *self.active_name.lock().expect("evaluator pool lock poisoned") = name;

        for handle in handles {
            let _ = self.sender.send(handle);
        }
    }
}

/// Owns everything that is genuinely global across a self-play run: the
/// game budget, the evaluator pool, and the output queue. Workers hold a
/// shared reference to exactly one `Coordinator` and never mutate it except
/// through these methods, each of which is individually synchronized.
pub struct Coordinator<P: Position> {
    options: Arc<SelfPlayOptions>,
    new_position: Box<dyn Fn() -> P + Send + Sync>,
    evaluator_pool: EvaluatorPool<P>,
    output_tx: Sender<Option<FinishedGame<P>>>,
    output_rx: Receiver<Option<FinishedGame<P>>>,
    games_started: AtomicUsize,
    rng: Mutex<SmallRng>,
    abort_file: Option<PathBuf>,
    aborted: Arc<AtomicBool>
}

impl<P: Position + 'static> Coordinator<P> {
    pub fn new(
        options: Arc<SelfPlayOptions>,
        new_position: Box<dyn Fn() -> P + Send + Sync>,
        evaluator_handles: Vec<ModelHandle<P>>,
        abort_file: Option<PathBuf>
    ) -> Self {
        options.validate();

        let (output_tx, output_rx) = crossbeam_channel::unbounded();

        Self {
            evaluator_pool: EvaluatorPool::new(evaluator_handles),
            new_position,
            output_tx,
            output_rx,
            games_started: AtomicUsize::new(0),
            rng: Mutex::new(SmallRng::seed_from_u64(options.seed)),
            abort_file,
            aborted: Arc::new(AtomicBool::new(false)),
            options
        }
    }

    pub fn options(&self) -> &Arc<SelfPlayOptions> {
        &self.options
    }

    /// The receiving end of the output queue, to be handed to one or more
    /// `OutputWriter`s.
    pub fn output_receiver(&self) -> Receiver<Option<FinishedGame<P>>> {
        self.output_rx.clone()
    }

    /// Draws a fresh game off the budget and returns a driver for it, or
    /// `None` once the budget is exhausted (or the abort-file watcher has
    /// fired). A finite `num_games` budget and `run_forever` are mutually
    /// exclusive, enforced once at construction by `SelfPlayOptions::validate`.
    pub fn start_new_game(&self, verbose: bool) -> Option<GameDriver<P>> {
        if self.aborted.load(Ordering::Acquire) {
            return None;
        }

        let game_id = self.games_started.fetch_add(1, Ordering::AcqRel) as u64;

        if !self.options.run_forever {
            if let Some(num_games) = self.options.num_games {
                if game_id as usize >= num_games {
                    return None;
                }
            }
        }

        let (resign_threshold, resign_disabled, is_holdout) = {
            let mut rng = self.rng.lock().expect("coordinator rng lock poisoned");
            let resign_threshold = rng.gen_range(
                self.options.resign_threshold_min..=self.options.resign_threshold_max
            );
            let resign_disabled = rng.gen::<f32>() < self.options.disable_resign_pct;
            let is_holdout = rng.gen::<f32>() < self.options.holdout_pct;

            (resign_threshold, resign_disabled, is_holdout)
        };

        if verbose {
            eprintln!("starting game {}", game_id);
        }

        let position = (self.new_position)();

        Some(GameDriver::new(game_id, game_id, position, self.options.clone(), resign_threshold, resign_disabled, is_holdout))
    }

    /// Pushes a finished game onto the output queue.
    pub fn end_game(&self, game: FinishedGame<P>) {
        let _ = self.output_tx.send(Some(game));
    }

    /// Pushes one shutdown sentinel per output thread, per the "a null
    /// sentinel per output thread signals shutdown" contract.
    pub fn shutdown(&self) {
        for _ in 0..self.options.output_threads {
            let _ = self.output_tx.send(None);
        }
    }

    pub fn acquire_model(&self) -> ModelHandle<P> {
        self.evaluator_pool.acquire()
    }

    pub fn release_model(&self, handle: ModelHandle<P>) {
        self.evaluator_pool.release(handle)
    }

    pub fn set_active_model(&self, name: String, handles: Vec<ModelHandle<P>>) {
        self.evaluator_pool.set_active(name, handles)
    }

    /// Spawns the `run_forever` abort-file poll thread, if an abort file was
    /// configured. Polls every `ABORT_FILE_POLL_SECS` seconds; presence is a
    /// fatal external signal, not a recoverable condition, so detection
    /// aborts the whole process rather than attempting an in-flight-game
    /// drain.
    pub fn spawn_abort_watcher(coordinator: &Arc<Self>) -> Option<JoinHandle<()>> {
        let path = coordinator.abort_file.clone()?;
        let aborted = coordinator.aborted.clone();
        let poll = Duration::from_secs(*dg_utils::config::ABORT_FILE_POLL_SECS);

        Some(thread::spawn(move || {
            loop {
                if path.exists() {
                    aborted.store(true, Ordering::Release);
                    dg_utils::fatal!("abort file `{}` detected", path.display());
                }

                thread::sleep(poll);
            }
        }))
    }
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

    struct StubEvaluator;

    impl Evaluator<StubPosition> for StubEvaluator {
        fn run_many(&self, inputs: &[crate::evaluator::ModelInput<StubPosition>], outputs: &mut [crate::evaluator::ModelOutput]) -> String {
            for out in outputs.iter_mut().take(inputs.len()) {
                out.value = 0.0;
            }
            "stub-v1".to_string()
        }
    }

    fn handles(name: &str, n: usize) -> Vec<ModelHandle<StubPosition>> {
        (0..n).map(|_| ModelHandle { name: name.to_string(), evaluator: Arc::new(StubEvaluator) }).collect()
    }

    fn options(overrides: impl FnOnce(&mut SelfPlayOptions)) -> Arc<SelfPlayOptions> {
        let mut options = SelfPlayOptions::default();
        options.board_size = BoardSize::Nine;
        overrides(&mut options);
        Arc::new(options)
    }

    #[test]
    fn start_new_game_respects_the_finite_budget() {
        let options = options(|o| { o.num_games = Some(2); o.run_forever = false; });
        let coordinator = Coordinator::new(options, Box::new(|| StubPosition), handles("m", 1), None);

        assert!(coordinator.start_new_game(false).is_some());
        assert!(coordinator.start_new_game(false).is_some());
        assert!(coordinator.start_new_game(false).is_none());
    }

    #[test]
    fn run_forever_never_exhausts_the_budget() {
        let options = options(|o| { o.num_games = None; o.run_forever = true; });
        let coordinator = Coordinator::new(options, Box::new(|| StubPosition), handles("m", 1), None);

        for _ in 0..10 {
            assert!(coordinator.start_new_game(false).is_some());
        }
    }

    #[test]
    fn acquire_and_release_round_trips_a_handle() {
        let options = options(|_| {});
        let coordinator = Coordinator::new(options, Box::new(|| StubPosition), handles("m", 1), None);

        let handle = coordinator.acquire_model();
        assert_eq!(handle.name, "m");
        coordinator.release_model(handle);

        // the handle must have come back -- a second acquire must not block.
        let _ = coordinator.acquire_model();
    }

    #[test]
    fn stale_handles_are_discarded_on_rollover() {
        let options = options(|_| {});
        let coordinator = Coordinator::new(options, Box::new(|| StubPosition), handles("m1", 1), None);

        let stale = coordinator.acquire_model();
        coordinator.set_active_model("m2".to_string(), handles("m2", 1));
        coordinator.release_model(stale); // must be discarded, not recirculated

        let handle = coordinator.acquire_model();
        assert_eq!(handle.name, "m2");
    }

    #[test]
    fn shutdown_pushes_one_sentinel_per_output_thread() {
        let options = options(|o| { o.output_threads = 2; });
        let coordinator = Coordinator::new(options, Box::new(|| StubPosition), handles("m", 1), None);
        let receiver = coordinator.output_receiver();

        coordinator.shutdown();

        assert!(receiver.recv().unwrap().is_none());
        assert!(receiver.recv().unwrap().is_none());
    }

    #[test]
    fn end_game_pushes_onto_the_output_queue() {
        let options = options(|_| {});
        let coordinator = Coordinator::new(options, Box::new(|| StubPosition), handles("m", 1), None);
        let receiver = coordinator.output_receiver();

        let finished = FinishedGame {
            game_id: 0,
            moves: Vec::new(),
            terminal_position: StubPosition,
            reason: crate::game::GameOverReason::PassPass,
            model_names: vec!["m".to_string()],
            is_holdout: false,
            komi: 7.5,
            duration: Duration::from_secs(0)
        };

        coordinator.end_game(finished);
        assert!(receiver.recv().unwrap().is_some());
    }
}
