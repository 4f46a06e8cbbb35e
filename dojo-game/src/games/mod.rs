//! The mini-game contract and its implementations.
//!
//! A [`MiniGame`] owns its targets, physics and termination predicate. It
//! never touches score, lives or phase directly; it reports what happened
//! through [`GameEvent`]s and the session applies them.

mod balance;
mod breathing;
mod distance;
mod memory;
mod reflex;
mod rhythm;

pub use balance::BalanceGame;
pub use breathing::BreathingGame;
pub use distance::DistanceGame;
pub use memory::MemoryGame;
pub use reflex::ReflexGame;
pub use rhythm::RhythmGame;

use rand::rngs::SmallRng;
use serde::Serialize;
use std::fmt;

use crate::data::dilemma_bank;
use crate::input::{Action, TimedAction};
use crate::scoring::Tier;
use crate::session::GameId;
use crate::tuning::{GameTuning, KiReward};

/// Physics step handed to [`MiniGame::advance`].
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub elapsed_ms: u64,
    pub dt_ms: u64,
    pub held: &'a [Action],
}

impl Frame<'_> {
    #[must_use]
    pub fn holds(&self, action: Action) -> bool {
        self.held.contains(&action)
    }
}

/// Something a game reports to its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    Scored { tier: Tier, at_ms: u64 },
    LifeLost { at_ms: u64 },
    RoundComplete { round: u32, at_ms: u64 },
    /// The round was failed and replays once feedback is over.
    RoundRetry { round: u32, at_ms: u64 },
}

/// Termination predicate result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Success,
    Fail,
}

/// Observable state for renderers and scripted players.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "game", rename_all = "snake_case")]
pub enum GameView {
    Balance {
        tilt_deg: f32,
        distance_m: f32,
        goal_m: f32,
    },
    Rhythm {
        next_beat_ms: Option<u64>,
        judged: u32,
        total: u32,
    },
    Memory {
        round: u32,
        /// Pose currently on display with its index in the sequence.
        showing: Option<(usize, Action)>,
        input_open: bool,
        entered: usize,
        sequence_len: usize,
    },
    Breathing {
        next_boundary_ms: Option<u64>,
        expected: Option<Action>,
        judged: u32,
        total: u32,
    },
    Reflex {
        round: u32,
        dilemma_id: Option<String>,
        options: usize,
        deadline_ms: Option<u64>,
    },
    Distance {
        distance: f32,
        remaining_ms: u64,
    },
}

/// Contract every mini-game implements.
pub trait MiniGame: fmt::Debug {
    fn id(&self) -> GameId;

    /// Actions the game listens to, used to build default bindings.
    fn actions(&self) -> Vec<Action>;

    /// Starting lives, `None` for games without a lives counter.
    fn lives(&self) -> Option<u8> {
        None
    }

    fn reward(&self) -> KiReward;

    /// Return to the initial state of a run, regenerating targets.
    fn reset(&mut self, rng: &mut SmallRng);

    /// A round begins (or resumes after feedback) at `at_ms`.
    fn begin_round(&mut self, _at_ms: u64) {}

    fn advance(&mut self, frame: &Frame<'_>, rng: &mut SmallRng, events: &mut Vec<GameEvent>);

    fn on_action(&mut self, action: TimedAction, events: &mut Vec<GameEvent>);

    fn verdict(&self) -> Verdict;

    fn view(&self) -> GameView;
}

/// Build a game with its canonical tuning.
#[must_use]
pub fn build_game(id: GameId, tuning: &GameTuning) -> Box<dyn MiniGame> {
    match id {
        GameId::Balance => Box::new(BalanceGame::new(tuning.balance.clone())),
        GameId::Rhythm => Box::new(RhythmGame::new(tuning.rhythm.clone())),
        GameId::Memory => Box::new(MemoryGame::new(tuning.memory.clone())),
        GameId::Breathing => Box::new(BreathingGame::new(tuning.breathing.clone())),
        GameId::Reflex => Box::new(ReflexGame::new(
            tuning.reflex.clone(),
            dilemma_bank().to_vec(),
        )),
        GameId::Distance => Box::new(DistanceGame::new(tuning.distance.clone())),
    }
}

/// Share of non-miss judgements meets `pass_pct`.
pub(crate) fn passes(hits: u32, judged: u32, pass_pct: u8) -> bool {
    crate::numbers::percent_of(u64::from(hits), u64::from(judged)) >= pass_pct
}
