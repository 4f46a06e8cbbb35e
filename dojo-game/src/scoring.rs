//! Deviation-from-target classification and combo scoring.
//!
//! Timing games measure `|actual - expected|` in milliseconds, positional
//! games measure a continuous value against bands; both reduce to a
//! [`Tier`] through [`Classify`]. The [`ScoreLedger`] applies the combo rule:
//! an event is worth `points(tier) * (1 + streak_before)`, a non-miss extends
//! the streak afterwards and a miss resets it to zero.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_GOOD_POINTS, DEFAULT_PERFECT_POINTS};

/// Discrete quality of one judged input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Perfect,
    Good,
    Miss,
}

impl Tier {
    #[must_use]
    pub const fn is_hit(self) -> bool {
        !matches!(self, Self::Miss)
    }
}

/// Classifies a deviation into a tier. `None` means the value is neutral
/// and produces no scoring event.
pub trait Classify {
    type Deviation;

    fn classify(&self, deviation: Self::Deviation) -> Option<Tier>;
}

/// Expected event on the session timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedTarget {
    pub at_ms: u64,
}

/// Millisecond timing windows. Both boundaries are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingWindows {
    pub perfect_ms: u64,
    pub good_ms: u64,
}

impl TimingWindows {
    #[must_use]
    pub const fn new(perfect_ms: u64, good_ms: u64) -> Self {
        Self {
            perfect_ms,
            good_ms,
        }
    }

    /// Grade an input at `actual_ms` against `expected`.
    #[must_use]
    pub fn evaluate(&self, expected: TimedTarget, actual_ms: u64) -> Tier {
        self.classify(expected.at_ms.abs_diff(actual_ms))
            .unwrap_or(Tier::Miss)
    }

    /// Whether a target has slipped past the good window at `now_ms`.
    #[must_use]
    pub const fn expired(&self, expected: TimedTarget, now_ms: u64) -> bool {
        now_ms > expected.at_ms.saturating_add(self.good_ms)
    }
}

impl Default for TimingWindows {
    fn default() -> Self {
        Self::new(200, 400)
    }
}

impl Classify for TimingWindows {
    type Deviation = u64;

    fn classify(&self, deviation: u64) -> Option<Tier> {
        Some(if deviation <= self.perfect_ms {
            Tier::Perfect
        } else if deviation <= self.good_ms {
            Tier::Good
        } else {
            Tier::Miss
        })
    }
}

/// Magnitude windows for continuous deviations such as a tilt angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MagnitudeWindows {
    pub perfect: f32,
    pub good: f32,
}

impl Classify for MagnitudeWindows {
    type Deviation = f32;

    fn classify(&self, deviation: f32) -> Option<Tier> {
        let magnitude = deviation.abs();
        if !magnitude.is_finite() {
            return Some(Tier::Miss);
        }
        Some(if magnitude <= self.perfect {
            Tier::Perfect
        } else if magnitude <= self.good {
            Tier::Good
        } else {
            Tier::Miss
        })
    }
}

/// Band a maintained distance falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceBand {
    Danger,
    Good,
    Acceptable,
    Neutral,
}

impl DistanceBand {
    #[must_use]
    pub const fn tier(self) -> Option<Tier> {
        match self {
            Self::Danger => Some(Tier::Miss),
            Self::Good => Some(Tier::Perfect),
            Self::Acceptable => Some(Tier::Good),
            Self::Neutral => None,
        }
    }
}

/// Banded thresholds for maintain-distance games.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistanceBands {
    pub danger_below: f32,
    pub good_min: f32,
    pub good_max: f32,
    pub acceptable_max: f32,
}

impl Default for DistanceBands {
    fn default() -> Self {
        Self {
            danger_below: 40.0,
            good_min: 60.0,
            good_max: 100.0,
            acceptable_max: 140.0,
        }
    }
}

impl DistanceBands {
    #[must_use]
    pub fn band(&self, distance: f32) -> DistanceBand {
        if !distance.is_finite() || distance < self.danger_below {
            DistanceBand::Danger
        } else if (self.good_min..=self.good_max).contains(&distance) {
            DistanceBand::Good
        } else if distance <= self.acceptable_max {
            DistanceBand::Acceptable
        } else {
            DistanceBand::Neutral
        }
    }
}

impl Classify for DistanceBands {
    type Deviation = f32;

    fn classify(&self, distance: f32) -> Option<Tier> {
        self.band(distance).tier()
    }
}

/// Base points per tier. A miss is always worth zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierPoints {
    #[serde(default = "TierPoints::default_perfect")]
    pub perfect: u32,
    #[serde(default = "TierPoints::default_good")]
    pub good: u32,
}

impl TierPoints {
    const fn default_perfect() -> u32 {
        DEFAULT_PERFECT_POINTS
    }

    const fn default_good() -> u32 {
        DEFAULT_GOOD_POINTS
    }

    #[must_use]
    pub const fn base(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Perfect => self.perfect,
            Tier::Good => self.good,
            Tier::Miss => 0,
        }
    }
}

impl Default for TierPoints {
    fn default() -> Self {
        Self {
            perfect: Self::default_perfect(),
            good: Self::default_good(),
        }
    }
}

/// One scored input, kept for replay and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEvent {
    pub seq: u32,
    pub at_ms: u64,
    pub tier: Tier,
    pub base_points: u32,
    pub multiplier: u32,
    pub points: u64,
    pub streak_after: u32,
}

/// Running score, streak and tier counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreLedger {
    score: u64,
    streak: u32,
    best_streak: u32,
    perfect: u32,
    good: u32,
    miss: u32,
    events: Vec<ScoreEvent>,
}

impl ScoreLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Score one tier at `at_ms` and return the emitted event.
    pub fn record(&mut self, tier: Tier, at_ms: u64, points: &TierPoints) -> ScoreEvent {
        let base_points = points.base(tier);
        let multiplier = self.streak.saturating_add(1);
        let awarded = u64::from(base_points) * u64::from(multiplier);
        self.score = self.score.saturating_add(awarded);
        match tier {
            Tier::Perfect => self.perfect += 1,
            Tier::Good => self.good += 1,
            Tier::Miss => self.miss += 1,
        }
        self.streak = if tier.is_hit() {
            self.streak.saturating_add(1)
        } else {
            0
        };
        self.best_streak = self.best_streak.max(self.streak);
        let event = ScoreEvent {
            seq: u32::try_from(self.events.len()).unwrap_or(u32::MAX),
            at_ms,
            tier,
            base_points,
            multiplier,
            points: awarded,
            streak_after: self.streak,
        };
        self.events.push(event);
        event
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub const fn score(&self) -> u64 {
        self.score
    }

    #[must_use]
    pub const fn streak(&self) -> u32 {
        self.streak
    }

    #[must_use]
    pub const fn best_streak(&self) -> u32 {
        self.best_streak
    }

    #[must_use]
    pub const fn perfect_count(&self) -> u32 {
        self.perfect
    }

    #[must_use]
    pub const fn good_count(&self) -> u32 {
        self.good
    }

    #[must_use]
    pub const fn miss_count(&self) -> u32 {
        self.miss
    }

    #[must_use]
    pub fn judged(&self) -> u32 {
        self.perfect + self.good + self.miss
    }

    #[must_use]
    pub fn events(&self) -> &[ScoreEvent] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_boundaries_are_inclusive() {
        let windows = TimingWindows::new(200, 400);
        let target = TimedTarget { at_ms: 1_000 };
        assert_eq!(windows.evaluate(target, 1_200), Tier::Perfect);
        assert_eq!(windows.evaluate(target, 800), Tier::Perfect);
        assert_eq!(windows.evaluate(target, 1_201), Tier::Good);
        assert_eq!(windows.evaluate(target, 1_400), Tier::Good);
        assert_eq!(windows.evaluate(target, 1_401), Tier::Miss);
        assert!(!windows.expired(target, 1_400));
        assert!(windows.expired(target, 1_401));
    }

    #[test]
    fn distance_bands_cover_every_range() {
        let bands = DistanceBands::default();
        assert_eq!(bands.band(39.9), DistanceBand::Danger);
        assert_eq!(bands.band(50.0), DistanceBand::Acceptable);
        assert_eq!(bands.band(60.0), DistanceBand::Good);
        assert_eq!(bands.band(100.0), DistanceBand::Good);
        assert_eq!(bands.band(140.0), DistanceBand::Acceptable);
        assert_eq!(bands.band(140.5), DistanceBand::Neutral);
        assert_eq!(bands.classify(20.0), Some(Tier::Miss));
        assert_eq!(bands.classify(300.0), None);
        assert_eq!(bands.band(f32::NAN), DistanceBand::Danger);
    }

    #[test]
    fn magnitude_windows_use_absolute_value() {
        let windows = MagnitudeWindows {
            perfect: 8.0,
            good: 20.0,
        };
        assert_eq!(windows.classify(-8.0), Some(Tier::Perfect));
        assert_eq!(windows.classify(15.0), Some(Tier::Good));
        assert_eq!(windows.classify(-21.0), Some(Tier::Miss));
    }

    #[test]
    fn streak_multiplies_and_miss_resets() {
        let points = TierPoints::default();
        let mut ledger = ScoreLedger::new();
        let first = ledger.record(Tier::Perfect, 850, &points);
        assert_eq!((first.multiplier, first.points, first.streak_after), (1, 100, 1));
        let second = ledger.record(Tier::Good, 1_700, &points);
        assert_eq!((second.multiplier, second.points), (2, 100));
        let miss = ledger.record(Tier::Miss, 2_500, &points);
        assert_eq!((miss.multiplier, miss.points, miss.streak_after), (3, 0, 0));
        let after = ledger.record(Tier::Perfect, 3_200, &points);
        assert_eq!((after.multiplier, after.points), (1, 100));
        assert_eq!(ledger.score(), 300);
        assert_eq!(ledger.best_streak(), 2);
        assert_eq!(ledger.judged(), 4);
    }

    #[test]
    fn multiplier_is_one_plus_streak_before_for_any_sequence() {
        let points = TierPoints::default();
        let tiers = [
            Tier::Good,
            Tier::Good,
            Tier::Perfect,
            Tier::Miss,
            Tier::Miss,
            Tier::Perfect,
            Tier::Good,
            Tier::Miss,
            Tier::Perfect,
        ];
        let mut ledger = ScoreLedger::new();
        let mut last_score = 0;
        for tier in tiers {
            let streak_before = ledger.streak();
            let event = ledger.record(tier, 0, &points);
            assert_eq!(event.multiplier, streak_before + 1);
            if tier == Tier::Miss {
                assert_eq!(ledger.streak(), 0);
            }
            assert!(ledger.score() >= last_score);
            last_score = ledger.score();
        }
        let replayed: u64 = ledger.events().iter().map(|event| event.points).sum();
        assert_eq!(replayed, ledger.score());
    }

    #[test]
    fn reset_clears_all_counters() {
        let mut ledger = ScoreLedger::new();
        ledger.record(Tier::Perfect, 10, &TierPoints::default());
        ledger.reset();
        assert_eq!(ledger, ScoreLedger::default());
    }
}
