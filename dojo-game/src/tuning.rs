//! Data-driven tuning for the scheduler, scoring and every mini-game.
//!
//! Each block deserializes from camelCase JSON with per-field defaults, so a
//! partial document only overrides what it names. The embedded
//! `data/tuning.json` is the shipped configuration; compiled defaults are
//! used when it cannot be parsed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{DEFAULT_FEEDBACK_MS, DEFAULT_FRAME_HZ, MAX_FRAME_HZ, MIN_FRAME_HZ};
use crate::numbers::u64_to_f64;
use crate::scoring::{DistanceBands, MagnitudeWindows, TierPoints, TimingWindows};

pub(crate) const DEFAULT_TUNING_DATA: &str = include_str!("../data/tuning.json");

/// Errors raised when tuning invariants are violated.
#[derive(Debug, Error, PartialEq)]
pub enum TuningError {
    #[error("tuning JSON invalid: {0}")]
    Parse(String),
    #[error("frame rate {hz} Hz outside {min}..={max}")]
    FrameRate { hz: u32, min: u32, max: u32 },
    #[error("{game}: perfect window {perfect} exceeds good window {good}")]
    WindowOrder {
        game: &'static str,
        perfect: f64,
        good: f64,
    },
    #[error("{game}: {field} must be at least {min} (got {value})")]
    MinViolation {
        game: &'static str,
        field: &'static str,
        min: f64,
        value: f64,
    },
    #[error("distance bands must be ordered (danger {danger} <= good {good_min}..={good_max} <= acceptable {acceptable})")]
    BandOrder {
        danger: f32,
        good_min: f32,
        good_max: f32,
        acceptable: f32,
    },
}

/// Ki paid out for a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KiReward {
    #[serde(default = "KiReward::default_completion")]
    pub completion: u32,
    #[serde(default = "KiReward::default_per_perfect")]
    pub per_perfect: u32,
}

impl KiReward {
    const fn default_completion() -> u32 {
        10
    }

    const fn default_per_perfect() -> u32 {
        1
    }

    #[must_use]
    pub const fn new(completion: u32, per_perfect: u32) -> Self {
        Self {
            completion,
            per_perfect,
        }
    }
}

impl Default for KiReward {
    fn default() -> Self {
        Self::new(Self::default_completion(), Self::default_per_perfect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BalanceTuning {
    pub lives: u8,
    pub goal_distance_m: f32,
    pub walk_speed_mps: f32,
    pub sample_interval_ms: u64,
    pub fall_angle_deg: f32,
    pub windows: MagnitudeWindows,
    pub gust_max_deg_s2: f32,
    pub gust_interval_ms: u64,
    pub instability: f32,
    pub correction_deg_s2: f32,
    pub damping: f32,
    pub reward: KiReward,
}

impl Default for BalanceTuning {
    fn default() -> Self {
        Self {
            lives: 3,
            goal_distance_m: 100.0,
            walk_speed_mps: 2.0,
            sample_interval_ms: 500,
            fall_angle_deg: 45.0,
            windows: MagnitudeWindows {
                perfect: 8.0,
                good: 20.0,
            },
            gust_max_deg_s2: 30.0,
            gust_interval_ms: 900,
            instability: 1.5,
            correction_deg_s2: 90.0,
            damping: 1.2,
            reward: KiReward::new(15, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RhythmTuning {
    pub first_beat_ms: u64,
    pub beat_interval_ms: u64,
    pub beats: u32,
    /// Randomly stretch some gaps by half a beat.
    pub shuffle: bool,
    pub windows: TimingWindows,
    pub pass_pct: u8,
    pub reward: KiReward,
}

impl Default for RhythmTuning {
    fn default() -> Self {
        Self {
            first_beat_ms: 800,
            beat_interval_ms: 800,
            beats: 12,
            shuffle: false,
            windows: TimingWindows::new(200, 400),
            pass_pct: 60,
            reward: KiReward::new(10, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryTuning {
    pub lives: u8,
    pub start_length: u32,
    pub rounds: u32,
    pub show_ms: u64,
    pub perfect_latency_ms: u64,
    pub reward: KiReward,
}

impl Default for MemoryTuning {
    fn default() -> Self {
        Self {
            lives: 3,
            start_length: 3,
            rounds: 5,
            show_ms: 600,
            perfect_latency_ms: 1_000,
            reward: KiReward::new(12, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BreathingTuning {
    pub first_boundary_ms: u64,
    pub phase_ms: u64,
    pub cycles: u32,
    pub windows: TimingWindows,
    pub pass_pct: u8,
    pub reward: KiReward,
}

impl Default for BreathingTuning {
    fn default() -> Self {
        Self {
            first_boundary_ms: 1_000,
            phase_ms: 4_000,
            cycles: 5,
            windows: TimingWindows::new(300, 700),
            pass_pct: 50,
            reward: KiReward::new(8, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReflexTuning {
    pub lives: u8,
    pub rounds: u32,
    pub countdown_ms: u64,
    pub perfect_latency_ms: u64,
    pub reward: KiReward,
}

impl Default for ReflexTuning {
    fn default() -> Self {
        Self {
            lives: 3,
            rounds: 5,
            countdown_ms: 8_000,
            perfect_latency_ms: 3_000,
            reward: KiReward::new(12, 2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DistanceTuning {
    pub lives: u8,
    pub duration_ms: u64,
    pub start_distance: f32,
    pub max_distance: f32,
    pub sample_interval_ms: u64,
    pub bands: DistanceBands,
    pub player_speed: f32,
    pub opponent_min_speed: f32,
    pub opponent_max_speed: f32,
    pub opponent_change_ms: u64,
    pub reward: KiReward,
}

impl Default for DistanceTuning {
    fn default() -> Self {
        Self {
            lives: 3,
            duration_ms: 30_000,
            start_distance: 80.0,
            max_distance: 300.0,
            sample_interval_ms: 500,
            bands: DistanceBands::default(),
            player_speed: 70.0,
            opponent_min_speed: -30.0,
            opponent_max_speed: 45.0,
            opponent_change_ms: 700,
            reward: KiReward::new(10, 1),
        }
    }
}

/// Complete runtime tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameTuning {
    #[serde(default = "GameTuning::default_frame_hz")]
    pub frame_hz: u32,
    #[serde(default = "GameTuning::default_feedback_ms")]
    pub feedback_ms: u64,
    #[serde(default)]
    pub points: TierPoints,
    #[serde(default)]
    pub balance: BalanceTuning,
    #[serde(default)]
    pub rhythm: RhythmTuning,
    #[serde(default)]
    pub memory: MemoryTuning,
    #[serde(default)]
    pub breathing: BreathingTuning,
    #[serde(default)]
    pub reflex: ReflexTuning,
    #[serde(default)]
    pub distance: DistanceTuning,
}

impl Default for GameTuning {
    fn default() -> Self {
        Self {
            frame_hz: Self::default_frame_hz(),
            feedback_ms: Self::default_feedback_ms(),
            points: TierPoints::default(),
            balance: BalanceTuning::default(),
            rhythm: RhythmTuning::default(),
            memory: MemoryTuning::default(),
            breathing: BreathingTuning::default(),
            reflex: ReflexTuning::default(),
            distance: DistanceTuning::default(),
        }
    }
}

fn check_windows(game: &'static str, perfect: f64, good: f64) -> Result<(), TuningError> {
    if perfect > good {
        return Err(TuningError::WindowOrder {
            game,
            perfect,
            good,
        });
    }
    Ok(())
}

fn check_min(game: &'static str, field: &'static str, min: f64, value: f64) -> Result<(), TuningError> {
    if value < min || value.is_nan() {
        return Err(TuningError::MinViolation {
            game,
            field,
            min,
            value,
        });
    }
    Ok(())
}

impl GameTuning {
    const fn default_frame_hz() -> u32 {
        DEFAULT_FRAME_HZ
    }

    const fn default_feedback_ms() -> u64 {
        DEFAULT_FEEDBACK_MS
    }

    /// Parse and validate a tuning document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or an invariant is violated.
    pub fn from_json(json: &str) -> Result<Self, TuningError> {
        let tuning: Self =
            serde_json::from_str(json).map_err(|err| TuningError::Parse(err.to_string()))?;
        tuning.validate()?;
        Ok(tuning)
    }

    /// Shipped tuning, falling back to compiled defaults.
    #[must_use]
    pub fn load_default() -> Self {
        match Self::from_json(DEFAULT_TUNING_DATA) {
            Ok(tuning) => tuning,
            Err(err) => {
                log::warn!("embedded tuning rejected, using compiled defaults: {err}");
                Self::default()
            }
        }
    }

    /// Check every cross-field invariant.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), TuningError> {
        if !(MIN_FRAME_HZ..=MAX_FRAME_HZ).contains(&self.frame_hz) {
            return Err(TuningError::FrameRate {
                hz: self.frame_hz,
                min: MIN_FRAME_HZ,
                max: MAX_FRAME_HZ,
            });
        }

        let balance = &self.balance;
        check_windows(
            "balance",
            f64::from(balance.windows.perfect),
            f64::from(balance.windows.good),
        )?;
        check_windows(
            "balance",
            f64::from(balance.windows.good),
            f64::from(balance.fall_angle_deg),
        )?;
        check_min("balance", "lives", 1.0, f64::from(balance.lives))?;
        check_min("balance", "goalDistanceM", 1.0, f64::from(balance.goal_distance_m))?;
        check_min("balance", "walkSpeedMps", 0.1, f64::from(balance.walk_speed_mps))?;
        check_min("balance", "sampleIntervalMs", 50.0, u64_to_f64(balance.sample_interval_ms))?;

        let rhythm = &self.rhythm;
        check_windows(
            "rhythm",
            u64_to_f64(rhythm.windows.perfect_ms),
            u64_to_f64(rhythm.windows.good_ms),
        )?;
        check_min("rhythm", "beats", 1.0, f64::from(rhythm.beats))?;
        check_min(
            "rhythm",
            "beatIntervalMs",
            u64_to_f64(rhythm.windows.good_ms),
            u64_to_f64(rhythm.beat_interval_ms),
        )?;

        let memory = &self.memory;
        check_min("memory", "lives", 1.0, f64::from(memory.lives))?;
        check_min("memory", "startLength", 1.0, f64::from(memory.start_length))?;
        check_min("memory", "rounds", 1.0, f64::from(memory.rounds))?;

        let breathing = &self.breathing;
        check_windows(
            "breathing",
            u64_to_f64(breathing.windows.perfect_ms),
            u64_to_f64(breathing.windows.good_ms),
        )?;
        check_min("breathing", "cycles", 1.0, f64::from(breathing.cycles))?;
        check_min(
            "breathing",
            "phaseMs",
            u64_to_f64(breathing.windows.good_ms) * 2.0,
            u64_to_f64(breathing.phase_ms),
        )?;

        let reflex = &self.reflex;
        check_min("reflex", "lives", 1.0, f64::from(reflex.lives))?;
        check_min("reflex", "rounds", 1.0, f64::from(reflex.rounds))?;
        check_windows(
            "reflex",
            u64_to_f64(reflex.perfect_latency_ms),
            u64_to_f64(reflex.countdown_ms),
        )?;

        let distance = &self.distance;
        check_min("distance", "lives", 1.0, f64::from(distance.lives))?;
        check_min("distance", "durationMs", 1_000.0, u64_to_f64(distance.duration_ms))?;
        check_min("distance", "sampleIntervalMs", 50.0, u64_to_f64(distance.sample_interval_ms))?;
        let bands = distance.bands;
        if !(bands.danger_below <= bands.good_min
            && bands.good_min <= bands.good_max
            && bands.good_max <= bands.acceptable_max)
        {
            return Err(TuningError::BandOrder {
                danger: bands.danger_below,
                good_min: bands.good_min,
                good_max: bands.good_max,
                acceptable: bands.acceptable_max,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_tuning_parses_and_validates() {
        let tuning = GameTuning::from_json(DEFAULT_TUNING_DATA).expect("embedded tuning");
        assert_eq!(tuning.rhythm.windows, TimingWindows::new(200, 400));
        assert_eq!(tuning.points, TierPoints::default());
        assert_eq!(GameTuning::load_default(), tuning);
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let tuning = GameTuning::from_json(r#"{ "rhythm": { "beats": 4 } }"#).unwrap();
        assert_eq!(tuning.rhythm.beats, 4);
        assert_eq!(tuning.rhythm.first_beat_ms, 800);
        assert_eq!(tuning.balance, BalanceTuning::default());
        assert_eq!(tuning.frame_hz, 60);
    }

    #[test]
    fn inverted_windows_are_rejected() {
        let err = GameTuning::from_json(
            r#"{ "rhythm": { "windows": { "perfectMs": 500, "goodMs": 100 } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, TuningError::WindowOrder { game: "rhythm", .. }));
    }

    #[test]
    fn frame_rate_bounds_are_enforced() {
        let err = GameTuning::from_json(r#"{ "frameHz": 1000 }"#).unwrap_err();
        assert!(matches!(err, TuningError::FrameRate { hz: 1000, .. }));
    }

    #[test]
    fn malformed_json_reports_parse_error() {
        assert!(matches!(
            GameTuning::from_json("{ not json"),
            Err(TuningError::Parse(_))
        ));
    }

    #[test]
    fn unordered_bands_are_rejected() {
        let mut tuning = GameTuning::default();
        tuning.distance.bands.good_min = 200.0;
        assert!(matches!(
            tuning.validate(),
            Err(TuningError::BandOrder { .. })
        ));
    }
}
