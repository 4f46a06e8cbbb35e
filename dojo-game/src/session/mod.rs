//! Per-run game state machine.
//!
//! A [`GameSession`] wraps one [`crate::games::MiniGame`] with the generic
//! lifecycle `intro → playing → (feedback) → finished | failed`, the score
//! ledger, lives and the terminal [`GameResult`].

mod phase;
mod result;
#[allow(clippy::module_inception)]
mod session;

pub use phase::{GamePhase, PhaseInput, reduce};
pub use result::{GameId, GameResult, Outcome, UnknownGameId};
pub use session::{GameSession, SessionTuning};
