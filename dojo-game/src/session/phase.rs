//! Tagged-union lifecycle and its pure reducer.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum GamePhase {
    /// Mounted, waiting for an explicit start.
    Intro,
    Playing,
    /// Between rounds of a multi-round game; resumes at `until_ms`.
    Feedback { round: u32, until_ms: u64 },
    Finished { at_ms: u64 },
    Failed { at_ms: u64 },
}

impl GamePhase {
    #[must_use]
    pub const fn is_playing(self) -> bool {
        matches!(self, Self::Playing)
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Failed { .. })
    }
}

/// Everything that can move a session between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseInput {
    Start,
    /// Clock advanced to `at_ms`.
    Tick { at_ms: u64 },
    RoundComplete { round: u32, at_ms: u64, feedback_ms: u64 },
    Succeeded { at_ms: u64 },
    Failed { at_ms: u64 },
    Restart,
}

/// Pure transition function. Inputs that make no sense in the current
/// phase leave it unchanged.
#[must_use]
pub fn reduce(phase: GamePhase, input: PhaseInput) -> GamePhase {
    match (phase, input) {
        (GamePhase::Intro, PhaseInput::Start) => GamePhase::Playing,
        (GamePhase::Playing, PhaseInput::RoundComplete {
            round,
            at_ms,
            feedback_ms,
        }) if feedback_ms > 0 => GamePhase::Feedback {
            round,
            until_ms: at_ms.saturating_add(feedback_ms),
        },
        (GamePhase::Feedback { until_ms, .. }, PhaseInput::Tick { at_ms }) if at_ms >= until_ms => {
            GamePhase::Playing
        }
        (GamePhase::Playing | GamePhase::Feedback { .. }, PhaseInput::Succeeded { at_ms }) => {
            GamePhase::Finished { at_ms }
        }
        (GamePhase::Playing | GamePhase::Feedback { .. }, PhaseInput::Failed { at_ms }) => {
            GamePhase::Failed { at_ms }
        }
        (
            GamePhase::Playing
            | GamePhase::Feedback { .. }
            | GamePhase::Finished { .. }
            | GamePhase::Failed { .. },
            PhaseInput::Restart,
        ) => GamePhase::Playing,
        (current, _) => current,
    }
}
