//! Local persistence port and the typed facade every caller goes through.
//!
//! Platforms provide a [`KeyValueStore`] (browser local storage, a file, an
//! in-memory map); nothing else in the crate reads or writes keys directly.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;
use std::rc::Rc;
use thiserror::Error;

use crate::challenge::{Challenge, StatsSnapshot};
use crate::constants::{
    STORE_KEY_BEST_SCORE_PREFIX, STORE_KEY_CHALLENGE_CACHE, STORE_KEY_EXERCISES,
    STORE_KEY_OFFLINE_KI, STORE_KEY_STATS_CACHE, STORE_KEY_TUTORIAL_SEEN, STORE_KEY_VISITOR_MODE,
};
use crate::session::{GameId, GameResult};

/// Narrow key/value persistence port.
pub trait KeyValueStore {
    type Error: std::error::Error + 'static;

    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<Value>, Self::Error>;

    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &str, value: Value) -> Result<(), Self::Error>;

    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), Self::Error>;

    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn clear(&self) -> Result<(), Self::Error>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend failed: {0}")]
    Backend(String),
    #[error("stored value has the wrong shape: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// In-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<BTreeMap<String, Value>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    type Error = Infallible;

    fn get(&self, key: &str) -> Result<Option<Value>, Self::Error> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), Self::Error> {
        self.entries.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Self::Error> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), Self::Error> {
        self.entries.borrow_mut().clear();
        Ok(())
    }
}

/// Who is looking at the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitorMode {
    Student,
    Parent,
    #[default]
    Guest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CachedChallenges {
    pub day: NaiveDate,
    pub challenges: Vec<Challenge>,
}

/// Today's self-reported exercise checklist. Never goes through guardian
/// approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseChecklist {
    pub day: NaiveDate,
    #[serde(default)]
    pub done: BTreeSet<String>,
}

/// Typed facade over a [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct LocalState<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> LocalState<S> {
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let value = self
            .store
            .get(key)
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        value
            .map(serde_json::from_value)
            .transpose()
            .map_err(StoreError::from)
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        self.store
            .set(key, value)
            .map_err(|err| StoreError::Backend(err.to_string()))
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read or holds a malformed value.
    pub fn visitor_mode(&self) -> Result<VisitorMode, StoreError> {
        Ok(self.read(STORE_KEY_VISITOR_MODE)?.unwrap_or_default())
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn set_visitor_mode(&self, mode: VisitorMode) -> Result<(), StoreError> {
        self.write(STORE_KEY_VISITOR_MODE, &mode)
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read or holds a malformed value.
    pub fn tutorial_seen(&self, game: GameId) -> Result<bool, StoreError> {
        let seen: BTreeSet<GameId> = self.read(STORE_KEY_TUTORIAL_SEEN)?.unwrap_or_default();
        Ok(seen.contains(&game))
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub fn mark_tutorial_seen(&self, game: GameId) -> Result<(), StoreError> {
        let mut seen: BTreeSet<GameId> = self.read(STORE_KEY_TUTORIAL_SEEN)?.unwrap_or_default();
        if seen.insert(game) {
            self.write(STORE_KEY_TUTORIAL_SEEN, &seen)?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read or holds a malformed value.
    pub fn best_score(&self, game: GameId) -> Result<Option<u64>, StoreError> {
        self.read(&format!("{STORE_KEY_BEST_SCORE_PREFIX}{game}"))
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read or holds a malformed value.
    pub fn offline_ki(&self) -> Result<u64, StoreError> {
        Ok(self.read(STORE_KEY_OFFLINE_KI)?.unwrap_or(0))
    }

    /// Fold a finished run into local progress: best score for any run,
    /// Ki only for a success. Returns whether the best score improved.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub fn record_game_result(&self, result: &GameResult) -> Result<bool, StoreError> {
        let key = format!("{STORE_KEY_BEST_SCORE_PREFIX}{}", result.game_id);
        let best: Option<u64> = self.read(&key)?;
        let improved = best.is_none_or(|best| result.score > best);
        if improved {
            self.write(&key, &result.score)?;
        }
        if result.is_success() && result.ki_earned > 0 {
            let ki = self.offline_ki()?.saturating_add(u64::from(result.ki_earned));
            self.write(STORE_KEY_OFFLINE_KI, &ki)?;
        }
        Ok(improved)
    }

    /// Challenge list cached for `day`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn cached_challenges(&self, day: NaiveDate) -> Result<Option<Vec<Challenge>>, StoreError> {
        let cached: Option<CachedChallenges> = self.read(STORE_KEY_CHALLENGE_CACHE)?;
        Ok(cached
            .filter(|cached| cached.day == day)
            .map(|cached| cached.challenges))
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn cache_challenges(&self, day: NaiveDate, challenges: &[Challenge]) -> Result<(), StoreError> {
        self.write(
            STORE_KEY_CHALLENGE_CACHE,
            &CachedChallenges {
                day,
                challenges: challenges.to_vec(),
            },
        )
    }

    /// Last stats snapshot received from the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn cached_stats(&self) -> Result<Option<StatsSnapshot>, StoreError> {
        self.read(STORE_KEY_STATS_CACHE)
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn cache_stats(&self, stats: &StatsSnapshot) -> Result<(), StoreError> {
        self.write(STORE_KEY_STATS_CACHE, stats)
    }

    /// Today's checklist; a checklist from an earlier day reads as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn exercises(&self, day: NaiveDate) -> Result<ExerciseChecklist, StoreError> {
        let stored: Option<ExerciseChecklist> = self.read(STORE_KEY_EXERCISES)?;
        Ok(stored
            .filter(|list| list.day == day)
            .unwrap_or_else(|| ExerciseChecklist {
                day,
                done: BTreeSet::new(),
            }))
    }

    /// Tick an exercise off today's list. Returns `false` if it was already done.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub fn check_exercise(&self, day: NaiveDate, exercise: &str) -> Result<bool, StoreError> {
        let mut list = self.exercises(day)?;
        if !list.done.insert(exercise.to_string()) {
            return Ok(false);
        }
        self.write(STORE_KEY_EXERCISES, &list)?;
        Ok(true)
    }

    /// Forget everything this device stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be cleared.
    pub fn reset(&self) -> Result<(), StoreError> {
        self.store
            .clear()
            .map_err(|err| StoreError::Backend(err.to_string()))
    }
}
