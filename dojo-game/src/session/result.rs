//! Game identities and terminal run results.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::scoring::ScoreLedger;
use crate::tuning::KiReward;

/// Stable identifier of a mini-game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameId {
    Balance,
    Rhythm,
    Memory,
    Breathing,
    Reflex,
    Distance,
}

impl GameId {
    pub const ALL: [Self; 6] = [
        Self::Balance,
        Self::Rhythm,
        Self::Memory,
        Self::Breathing,
        Self::Reflex,
        Self::Distance,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Balance => "balance",
            Self::Rhythm => "rhythm",
            Self::Memory => "memory",
            Self::Breathing => "breathing",
            Self::Reflex => "reflex",
            Self::Distance => "distance",
        }
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown game id '{0}'")]
pub struct UnknownGameId(pub String);

impl FromStr for GameId {
    type Err = UnknownGameId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == needle)
            .ok_or_else(|| UnknownGameId(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Fail,
}

/// Immutable summary of one finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
    pub game_id: GameId,
    /// Zero-based attempt number within the session.
    pub run: u32,
    pub score: u64,
    pub ki_earned: u32,
    pub perfect_count: u32,
    pub good_count: u32,
    pub miss_count: u32,
    pub best_streak: u32,
    pub duration_ms: u64,
    pub outcome: Outcome,
}

impl GameResult {
    /// Build the result of a run. Only successful runs earn Ki.
    #[must_use]
    pub fn from_ledger(
        game_id: GameId,
        run: u32,
        ledger: &ScoreLedger,
        reward: KiReward,
        duration_ms: u64,
        outcome: Outcome,
    ) -> Self {
        let ki_earned = match outcome {
            Outcome::Success => reward
                .completion
                .saturating_add(ledger.perfect_count().saturating_mul(reward.per_perfect)),
            Outcome::Fail => 0,
        };
        Self {
            game_id,
            run,
            score: ledger.score(),
            ki_earned,
            perfect_count: ledger.perfect_count(),
            good_count: ledger.good_count(),
            miss_count: ledger.miss_count(),
            best_streak: ledger.best_streak(),
            duration_ms,
            outcome,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success)
    }
}
