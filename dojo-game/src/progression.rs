//! Belt progression derived from total points.
//!
//! Rank is a pure function of points over a monotonic threshold table, so
//! it can never decrease as points grow.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

use crate::numbers::percent_of;

pub(crate) const DEFAULT_BELT_DATA: &str = include_str!("../data/belts.json");

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressionError {
    #[error("belt table JSON invalid: {0}")]
    Parse(String),
    #[error("belt table is empty")]
    Empty,
    #[error("first belt must start at 0 points, got {0}")]
    NonZeroBase(u64),
    #[error("belt '{name}' threshold {threshold} does not exceed the previous {previous}")]
    NotMonotonic {
        name: String,
        threshold: u64,
        previous: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Belt {
    pub name: String,
    pub threshold: u64,
}

#[derive(Debug, Deserialize)]
struct BeltDocument {
    belts: Vec<Belt>,
}

/// Validated, strictly increasing threshold table starting at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BeltTable {
    belts: Vec<Belt>,
}

/// Where a point total sits in the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeltRank {
    pub rank: usize,
    pub name: String,
    pub threshold: u64,
    /// `None` at the top rank.
    pub next_threshold: Option<u64>,
}

impl BeltTable {
    /// # Errors
    ///
    /// Returns an error if the table is empty, does not start at zero or is
    /// not strictly increasing.
    pub fn new(belts: Vec<Belt>) -> Result<Self, ProgressionError> {
        let first = belts.first().ok_or(ProgressionError::Empty)?;
        if first.threshold != 0 {
            return Err(ProgressionError::NonZeroBase(first.threshold));
        }
        for pair in belts.windows(2) {
            if pair[1].threshold <= pair[0].threshold {
                return Err(ProgressionError::NotMonotonic {
                    name: pair[1].name.clone(),
                    threshold: pair[1].threshold,
                    previous: pair[0].threshold,
                });
            }
        }
        Ok(Self { belts })
    }

    /// Table with generated names, mostly for tests and tuning experiments.
    ///
    /// # Errors
    ///
    /// Same as [`Self::new`].
    pub fn from_thresholds(thresholds: &[u64]) -> Result<Self, ProgressionError> {
        Self::new(
            thresholds
                .iter()
                .enumerate()
                .map(|(rank, threshold)| Belt {
                    name: format!("rank-{rank}"),
                    threshold: *threshold,
                })
                .collect(),
        )
    }

    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the table is invalid.
    pub fn from_json(json: &str) -> Result<Self, ProgressionError> {
        let doc: BeltDocument =
            serde_json::from_str(json).map_err(|err| ProgressionError::Parse(err.to_string()))?;
        Self::new(doc.belts)
    }

    /// The shipped belt table.
    #[must_use]
    pub fn default_table() -> &'static Self {
        static TABLE: OnceLock<BeltTable> = OnceLock::new();
        TABLE.get_or_init(|| {
            Self::from_json(DEFAULT_BELT_DATA).unwrap_or_else(|err| {
                log::warn!("embedded belt table rejected, using built-in: {err}");
                Self::builtin()
            })
        })
    }

    fn builtin() -> Self {
        let belts = [
            ("white", 0),
            ("yellow", 200),
            ("orange", 600),
            ("green", 1_200),
            ("blue", 2_000),
            ("brown", 3_000),
            ("black", 4_500),
        ]
        .into_iter()
        .map(|(name, threshold)| Belt {
            name: name.to_string(),
            threshold,
        })
        .collect();
        Self { belts }
    }

    #[must_use]
    pub fn belts(&self) -> &[Belt] {
        &self.belts
    }

    /// Rank for `points`. Reaching a threshold exactly earns that belt.
    #[must_use]
    pub fn rank_for(&self, points: u64) -> BeltRank {
        let rank = self
            .belts
            .partition_point(|belt| belt.threshold <= points)
            .saturating_sub(1);
        let (name, threshold) = self
            .belts
            .get(rank)
            .map_or((String::new(), 0), |belt| (belt.name.clone(), belt.threshold));
        BeltRank {
            rank,
            name,
            threshold,
            next_threshold: self.belts.get(rank + 1).map(|belt| belt.threshold),
        }
    }
}

/// Belt for a point total on the shipped table.
#[must_use]
pub fn compute_belt(points: u64) -> BeltRank {
    BeltTable::default_table().rank_for(points)
}

/// Progress from `current` towards `next`, clamped to `0..=100`. The top
/// rank (no next threshold) is always 100.
#[must_use]
pub fn compute_percent(points: u64, current: u64, next: Option<u64>) -> u8 {
    let Some(next) = next else {
        return 100;
    };
    if next <= current || points >= next {
        return 100;
    }
    percent_of(points.saturating_sub(current), next - current)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub total_points: u64,
    pub belt: BeltRank,
    pub percent_to_next: u8,
    pub mastered_technique_count: u32,
    pub session_count: u32,
}

/// Derive the dashboard progress view. Pure; depends only on its inputs.
#[must_use]
pub fn snapshot(total_points: u64, mastered_technique_count: u32, session_count: u32) -> ProgressSnapshot {
    let belt = compute_belt(total_points);
    let percent_to_next = compute_percent(total_points, belt.threshold, belt.next_threshold);
    ProgressSnapshot {
        total_points,
        belt,
        percent_to_next,
        mastered_technique_count,
        session_count,
    }
}
