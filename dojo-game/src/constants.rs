//! Centralized tuning and key constants for the Dojo runtime.
//!
//! Per-game balance values live in [`crate::tuning`] so they can be loaded
//! from data; the values here are structural and only change with code.

// Logging ------------------------------------------------------------------
pub(crate) const DEBUG_ENV_VAR: &str = "DOJO_DEBUG_LOGS";

// Scheduler ----------------------------------------------------------------
pub(crate) const DEFAULT_FRAME_HZ: u32 = 60;
pub(crate) const MIN_FRAME_HZ: u32 = 10;
pub(crate) const MAX_FRAME_HZ: u32 = 240;

// Scoring ------------------------------------------------------------------
pub(crate) const DEFAULT_PERFECT_POINTS: u32 = 100;
pub(crate) const DEFAULT_GOOD_POINTS: u32 = 50;
pub(crate) const DEFAULT_FEEDBACK_MS: u64 = 1_200;

// Seeding domain tags -------------------------------------------------------
pub(crate) const SEED_TAG_RUN: &[u8] = b"dojo-run";

// Local storage keys ---------------------------------------------------------
pub(crate) const STORE_KEY_VISITOR_MODE: &str = "dojo.visitor-mode";
pub(crate) const STORE_KEY_TUTORIAL_SEEN: &str = "dojo.tutorial-seen";
pub(crate) const STORE_KEY_BEST_SCORE_PREFIX: &str = "dojo.best-score.";
pub(crate) const STORE_KEY_OFFLINE_KI: &str = "dojo.offline-ki";
pub(crate) const STORE_KEY_CHALLENGE_CACHE: &str = "dojo.challenges.cache";
pub(crate) const STORE_KEY_EXERCISES: &str = "dojo.exercises.today";
pub(crate) const STORE_KEY_STATS_CACHE: &str = "dojo.stats.cache";
