//! Challenge, completion and stats records as exchanged with the backend.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{GameId, GameResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    Virtue,
    Technique,
}

/// A daily challenge. Immutable for a given day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: String,
    pub kind: ChallengeKind,
    pub xp_value: u32,
    #[serde(default)]
    pub requires_guardian_approval: bool,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    /// Game whose successful result counts as evidence, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<GameId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    PendingValidation,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub challenge_id: String,
    pub user_id: String,
    pub completed_at: DateTime<Utc>,
    pub status: CompletionStatus,
}

impl CompletionRecord {
    #[must_use]
    pub fn day(&self) -> NaiveDate {
        self.completed_at.date_naive()
    }

    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self.status, CompletionStatus::Confirmed)
    }
}

/// Server view of a user's progress. Replaces the local slice wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    #[serde(default)]
    pub completed_today: Vec<CompletionRecord>,
    #[serde(default)]
    pub total_points: u64,
    #[serde(default)]
    pub mastered_techniques: u32,
    #[serde(default)]
    pub session_count: u32,
}

/// Proof that a challenge was done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Evidence {
    Game(GameResult),
    /// In-person report such as a guardian watching a kata.
    InPerson { note: Option<String> },
}

impl Evidence {
    #[must_use]
    pub const fn in_person() -> Self {
        Self::InPerson { note: None }
    }
}

/// Body of `POST /challenges/complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub challenge_id: String,
    pub user_id: String,
    pub completed_at: DateTime<Utc>,
    pub requires_guardian_approval: bool,
    pub evidence: Evidence,
}

/// Per-challenge status for today as the UI shows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Available,
    PendingValidation,
    Completed,
}

impl From<CompletionStatus> for ChallengeStatus {
    fn from(status: CompletionStatus) -> Self {
        match status {
            CompletionStatus::PendingValidation => Self::PendingValidation,
            CompletionStatus::Confirmed => Self::Completed,
        }
    }
}
