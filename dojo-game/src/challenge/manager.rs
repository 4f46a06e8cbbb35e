//! Challenge completion and validation state machine.
//!
//! Server responses are authoritative: stats replace the local slice
//! wholesale. A `RefCell` borrow of the board is never held across an
//! await, and a response that resolves after [`ChallengeManager::detach`]
//! is discarded by epoch check.

use chrono::{DateTime, Days, NaiveDate, Utc};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use thiserror::Error;

use super::api::{ApiError, ChallengeApi};
use super::model::{
    Challenge, ChallengeKind, ChallengeStatus, CompletionRecord, CompletionRequest,
    CompletionStatus, Evidence, StatsSnapshot,
};
use crate::data::builtin_challenges;
use crate::progression::{ProgressSnapshot, snapshot};
use crate::storage::{KeyValueStore, LocalState, StoreError};

/// Source of the calendar used for day boundaries.
pub trait WallClock {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock; clones share the same instant.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Rc<Cell<DateTime<Utc>>>,
}

impl FixedClock {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(Cell::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.now.set(now);
    }

    pub fn advance_days(&self, days: u64) {
        let now = self.now.get();
        self.now
            .set(now.checked_add_days(Days::new(days)).unwrap_or(now));
    }
}

impl WallClock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

/// Shared epoch. Cutting it invalidates every response still in flight.
#[derive(Debug, Clone, Default)]
pub struct Lifeline {
    epoch: Rc<Cell<u64>>,
}

impl Lifeline {
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.get()
    }

    pub fn cut(&self) {
        self.epoch.set(self.epoch.get().wrapping_add(1));
    }

    #[must_use]
    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch.get() == epoch
    }
}

#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("unknown challenge '{0}'")]
    UnknownChallenge(String),
    #[error("evidence does not qualify for challenge '{0}'")]
    NotEligible(String),
    #[error("backend unavailable, retry later: {0}")]
    RetryLater(#[source] ApiError),
    #[error("no completion awaiting validation for '{0}'")]
    NotPending(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a completion attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// A new record was created.
    Recorded(CompletionRecord),
    /// A record already exists for today; returned unchanged.
    AlreadyCompleted(CompletionRecord),
    /// Another completion for the same challenge has not resolved yet.
    InFlight,
    /// The response arrived after the manager was detached.
    Discarded,
}

#[derive(Debug, Default)]
struct Board {
    day: Option<NaiveDate>,
    challenges: Vec<Challenge>,
    records: BTreeMap<String, CompletionRecord>,
    total_points: u64,
    mastered_techniques: u32,
    session_count: u32,
    in_flight: BTreeSet<String>,
}

#[derive(Debug)]
pub struct ChallengeManager<A, S, C>
where
    A: ChallengeApi,
    S: KeyValueStore,
    C: WallClock,
{
    api: A,
    local: LocalState<S>,
    clock: C,
    user_id: String,
    board: RefCell<Board>,
    lifeline: Lifeline,
}

impl<A, S, C> ChallengeManager<A, S, C>
where
    A: ChallengeApi,
    S: KeyValueStore,
    C: WallClock,
{
    /// Build a manager, seeding totals from the last cached stats.
    pub fn new(api: A, store: S, clock: C, user_id: impl Into<String>) -> Self {
        let local = LocalState::new(store);
        let manager = Self {
            api,
            local,
            clock,
            user_id: user_id.into(),
            board: RefCell::new(Board::default()),
            lifeline: Lifeline::default(),
        };
        match manager.local.cached_stats() {
            Ok(Some(stats)) => manager.apply_stats(&stats),
            Ok(None) => {}
            Err(err) => log::warn!("ignoring unreadable cached stats: {err}"),
        }
        manager
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub const fn local(&self) -> &LocalState<S> {
        &self.local
    }

    /// Handle for components that must observe the manager's epoch.
    #[must_use]
    pub fn lifeline(&self) -> Lifeline {
        self.lifeline.clone()
    }

    /// Clear today's records when the calendar day changed.
    fn roll_day(&self) -> NaiveDate {
        let today = self.clock.today();
        let mut board = self.board.borrow_mut();
        if board.day != Some(today) {
            if board.day.is_some() {
                log::debug!("day rolled over to {today}; clearing completions");
            }
            board.day = Some(today);
            board.records.clear();
            board.challenges.clear();
        }
        today
    }

    /// Today's challenges. Falls back to today's cache, then to the built-in
    /// set; never empty.
    pub async fn list_today(&self) -> Vec<Challenge> {
        let today = self.roll_day();
        let epoch = self.lifeline.epoch();
        let fetched = self.api.daily_challenges().await;
        if !self.lifeline.is_current(epoch) {
            log::warn!("daily challenges resolved after detach; discarded");
            return self.fallback_list(today);
        }
        let list = match fetched {
            Ok(list) if !list.is_empty() => {
                if let Err(err) = self.local.cache_challenges(today, &list) {
                    log::warn!("could not cache daily challenges: {err}");
                }
                list
            }
            Ok(_) => {
                log::warn!("backend returned no challenges; using fallback");
                self.fallback_list(today)
            }
            Err(err) => {
                log::warn!("daily challenges unavailable ({err}); using fallback");
                self.fallback_list(today)
            }
        };
        self.board.borrow_mut().challenges.clone_from(&list);
        list
    }

    fn fallback_list(&self, today: NaiveDate) -> Vec<Challenge> {
        match self.local.cached_challenges(today) {
            Ok(Some(list)) if !list.is_empty() => list,
            Ok(_) => builtin_challenges().to_vec(),
            Err(err) => {
                log::warn!("challenge cache unreadable: {err}");
                builtin_challenges().to_vec()
            }
        }
    }

    /// Challenges currently on the board, or the built-in set before the
    /// first fetch.
    #[must_use]
    pub fn challenges(&self) -> Vec<Challenge> {
        let board = self.board.borrow();
        if board.challenges.is_empty() {
            builtin_challenges().to_vec()
        } else {
            board.challenges.clone()
        }
    }

    fn find_challenge(&self, challenge_id: &str) -> Option<Challenge> {
        let board = self.board.borrow();
        board
            .challenges
            .iter()
            .chain(builtin_challenges())
            .find(|challenge| challenge.id == challenge_id)
            .cloned()
    }

    /// Pull `GET /stats/{user}` and replace the local slice with it.
    /// Returns `None` when the response arrived after a detach.
    ///
    /// # Errors
    ///
    /// Returns [`ChallengeError::RetryLater`] if the backend is unreachable.
    pub async fn refresh_stats(&self) -> Result<Option<StatsSnapshot>, ChallengeError> {
        self.roll_day();
        let epoch = self.lifeline.epoch();
        let stats = self
            .api
            .stats(&self.user_id)
            .await
            .map_err(ChallengeError::RetryLater)?;
        if !self.lifeline.is_current(epoch) {
            log::warn!("stats resolved after detach; discarded");
            return Ok(None);
        }
        self.apply_stats(&stats);
        self.local.cache_stats(&stats)?;
        Ok(Some(stats))
    }

    fn apply_stats(&self, stats: &StatsSnapshot) {
        let today = self.clock.today();
        let mut board = self.board.borrow_mut();
        board.day = Some(today);
        board.records = stats
            .completed_today
            .iter()
            .filter(|record| record.day() == today && record.user_id == self.user_id)
            .map(|record| (record.challenge_id.clone(), record.clone()))
            .collect();
        board.total_points = stats.total_points;
        board.mastered_techniques = stats.mastered_techniques;
        board.session_count = stats.session_count;
    }

    /// Submit evidence for a challenge.
    ///
    /// # Errors
    ///
    /// Returns [`ChallengeError::UnknownChallenge`] or
    /// [`ChallengeError::NotEligible`] without contacting the backend, and
    /// [`ChallengeError::RetryLater`] when the backend cannot be reached.
    pub async fn complete(
        &self,
        challenge_id: &str,
        evidence: Evidence,
    ) -> Result<CompletionOutcome, ChallengeError> {
        self.roll_day();
        let challenge = self
            .find_challenge(challenge_id)
            .ok_or_else(|| ChallengeError::UnknownChallenge(challenge_id.to_string()))?;
        if let Evidence::Game(result) = &evidence {
            // A challenge without a mini-game never accepts a run as proof.
            let wrong_game = challenge.game != Some(result.game_id);
            if !result.is_success() || wrong_game {
                return Err(ChallengeError::NotEligible(challenge_id.to_string()));
            }
        }

        {
            let mut board = self.board.borrow_mut();
            if let Some(record) = board.records.get(challenge_id) {
                return Ok(CompletionOutcome::AlreadyCompleted(record.clone()));
            }
            if !board.in_flight.insert(challenge_id.to_string()) {
                return Ok(CompletionOutcome::InFlight);
            }
        }

        let request = CompletionRequest {
            challenge_id: challenge.id.clone(),
            user_id: self.user_id.clone(),
            completed_at: self.clock.now(),
            requires_guardian_approval: challenge.requires_guardian_approval,
            evidence,
        };
        let epoch = self.lifeline.epoch();
        let response = self.api.complete(&request).await;
        // After a detach the in-flight entry may belong to a newer request.
        if !self.lifeline.is_current(epoch) {
            log::warn!("completion of '{challenge_id}' resolved after detach; discarded");
            return Ok(CompletionOutcome::Discarded);
        }
        self.board.borrow_mut().in_flight.remove(challenge_id);

        match response {
            Ok(record) => {
                let mut board = self.board.borrow_mut();
                if record.is_confirmed() {
                    Self::credit(&mut board, &challenge);
                }
                board.records.insert(challenge.id.clone(), record.clone());
                log::info!(
                    "challenge '{}' recorded as {:?}",
                    challenge.id,
                    record.status
                );
                Ok(CompletionOutcome::Recorded(record))
            }
            Err(ApiError::Duplicate) => {
                log::debug!("server already holds '{challenge_id}'; reconciling");
                self.refresh_stats().await?;
                let board = self.board.borrow();
                match board.records.get(challenge_id) {
                    Some(record) => Ok(CompletionOutcome::AlreadyCompleted(record.clone())),
                    None if !self.lifeline.is_current(epoch) => Ok(CompletionOutcome::Discarded),
                    None => Err(ChallengeError::RetryLater(ApiError::Duplicate)),
                }
            }
            Err(err) => {
                log::warn!("completion of '{challenge_id}' failed: {err}");
                Err(ChallengeError::RetryLater(err))
            }
        }
    }

    fn credit(board: &mut Board, challenge: &Challenge) {
        board.total_points = board
            .total_points
            .saturating_add(u64::from(challenge.xp_value));
        if challenge.kind == ChallengeKind::Technique {
            board.mastered_techniques = board.mastered_techniques.saturating_add(1);
        }
    }

    /// Apply an external guardian approval. Confirming an already confirmed
    /// record is a no-op that returns it unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ChallengeError::NotPending`] if there is no record for today.
    pub fn confirm_validation(&self, challenge_id: &str) -> Result<CompletionRecord, ChallengeError> {
        self.roll_day();
        let challenge = self
            .find_challenge(challenge_id)
            .ok_or_else(|| ChallengeError::UnknownChallenge(challenge_id.to_string()))?;
        let mut board = self.board.borrow_mut();
        let Some(record) = board.records.get_mut(challenge_id) else {
            return Err(ChallengeError::NotPending(challenge_id.to_string()));
        };
        if record.status == CompletionStatus::Confirmed {
            return Ok(record.clone());
        }
        record.status = CompletionStatus::Confirmed;
        let confirmed = record.clone();
        Self::credit(&mut board, &challenge);
        log::info!("challenge '{challenge_id}' confirmed by guardian");
        Ok(confirmed)
    }

    /// Self-reported exercise for today. Bypasses guardian approval and
    /// never touches points.
    ///
    /// # Errors
    ///
    /// Returns [`ChallengeError::Store`] if local storage fails.
    pub fn self_report_exercise(&self, exercise: &str) -> Result<bool, ChallengeError> {
        let today = self.roll_day();
        Ok(self.local.check_exercise(today, exercise)?)
    }

    /// Invalidate every response still in flight.
    pub fn detach(&self) {
        self.lifeline.cut();
        self.board.borrow_mut().in_flight.clear();
        log::debug!("challenge manager detached");
    }

    #[must_use]
    pub fn status(&self, challenge_id: &str) -> ChallengeStatus {
        self.roll_day();
        self.board
            .borrow()
            .records
            .get(challenge_id)
            .map_or(ChallengeStatus::Available, |record| record.status.into())
    }

    #[must_use]
    pub fn record(&self, challenge_id: &str) -> Option<CompletionRecord> {
        self.roll_day();
        self.board.borrow().records.get(challenge_id).cloned()
    }

    #[must_use]
    pub fn records(&self) -> Vec<CompletionRecord> {
        self.roll_day();
        self.board.borrow().records.values().cloned().collect()
    }

    #[must_use]
    pub fn total_points(&self) -> u64 {
        self.board.borrow().total_points
    }

    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        let board = self.board.borrow();
        snapshot(
            board.total_points,
            board.mastered_techniques,
            board.session_count,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::MemoryBackend;
    use crate::session::{GameId, GameResult, Outcome};
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    type Manager = ChallengeManager<MemoryBackend, MemoryStore, FixedClock>;

    fn setup() -> (Manager, MemoryBackend, FixedClock) {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 16, 0, 0).unwrap();
        let clock = FixedClock::new(now);
        let backend = MemoryBackend::new(builtin_challenges().to_vec()).with_today(now.date_naive());
        let manager = ChallengeManager::new(backend.clone(), MemoryStore::new(), clock.clone(), "kid");
        (manager, backend, clock)
    }

    fn game_result(game_id: GameId, outcome: Outcome) -> GameResult {
        GameResult {
            game_id,
            run: 0,
            score: 1_200,
            ki_earned: 20,
            perfect_count: 8,
            good_count: 2,
            miss_count: 2,
            best_streak: 6,
            duration_ms: 12_000,
            outcome,
        }
    }

    #[tokio::test]
    async fn completing_twice_credits_once() {
        let (manager, backend, _) = setup();
        let first = manager.complete("salut", Evidence::in_person()).await.unwrap();
        let CompletionOutcome::Recorded(record) = first else {
            panic!("expected a new record, got {first:?}");
        };
        assert_eq!(record.status, CompletionStatus::Confirmed);
        assert_eq!(manager.total_points(), 10);

        let calls = backend.calls();
        let second = manager.complete("salut", Evidence::in_person()).await.unwrap();
        assert_eq!(second, CompletionOutcome::AlreadyCompleted(record));
        assert_eq!(manager.total_points(), 10);
        assert_eq!(backend.calls(), calls);
    }

    #[tokio::test]
    async fn guardian_approval_applies_points_once() {
        let (manager, _, _) = setup();
        manager
            .complete("help-home", Evidence::in_person())
            .await
            .unwrap();
        assert_eq!(manager.status("help-home"), ChallengeStatus::PendingValidation);
        assert_eq!(manager.total_points(), 0);

        let confirmed = manager.confirm_validation("help-home").unwrap();
        assert_eq!(confirmed.status, CompletionStatus::Confirmed);
        assert_eq!(manager.total_points(), 20);
        manager.confirm_validation("help-home").unwrap();
        assert_eq!(manager.total_points(), 20);
        assert_eq!(manager.status("help-home"), ChallengeStatus::Completed);
    }

    #[tokio::test]
    async fn failed_or_foreign_game_results_are_not_eligible() {
        let (manager, backend, _) = setup();
        let failed = Evidence::Game(game_result(GameId::Balance, Outcome::Fail));
        assert!(matches!(
            manager.complete("balance-walk", failed).await,
            Err(ChallengeError::NotEligible(_))
        ));
        let foreign = Evidence::Game(game_result(GameId::Rhythm, Outcome::Success));
        assert!(matches!(
            manager.complete("balance-walk", foreign).await,
            Err(ChallengeError::NotEligible(_))
        ));
        assert_eq!(backend.calls(), 0);

        let gameless = Evidence::Game(game_result(GameId::Balance, Outcome::Success));
        assert!(matches!(
            manager.complete("salut", gameless).await,
            Err(ChallengeError::NotEligible(_))
        ));
        assert_eq!(manager.status("salut"), ChallengeStatus::Available);
        assert_eq!(backend.calls(), 0);

        let good = Evidence::Game(game_result(GameId::Balance, Outcome::Success));
        let outcome = manager.complete("balance-walk", good).await.unwrap();
        assert!(matches!(outcome, CompletionOutcome::Recorded(_)));
        assert_eq!(manager.progress().mastered_technique_count, 1);
    }

    #[tokio::test]
    async fn unknown_challenge_is_rejected() {
        let (manager, _, _) = setup();
        assert!(matches!(
            manager.complete("moonwalk", Evidence::in_person()).await,
            Err(ChallengeError::UnknownChallenge(_))
        ));
    }

    #[tokio::test]
    async fn transport_failure_leaves_state_untouched() {
        let (manager, backend, _) = setup();
        backend.fail_next(1);
        assert!(matches!(
            manager.complete("salut", Evidence::in_person()).await,
            Err(ChallengeError::RetryLater(ApiError::Transport(_)))
        ));
        assert_eq!(manager.status("salut"), ChallengeStatus::Available);
        assert_eq!(manager.total_points(), 0);
        assert!(matches!(
            manager.complete("salut", Evidence::in_person()).await,
            Ok(CompletionOutcome::Recorded(_))
        ));
    }

    #[tokio::test]
    async fn server_duplicate_reconciles_to_already_completed() {
        let (manager, backend, clock) = setup();
        let other_device = ChallengeManager::new(
            backend.clone(),
            MemoryStore::new(),
            clock.clone(),
            "kid",
        );
        other_device
            .complete("salut", Evidence::in_person())
            .await
            .unwrap();

        let outcome = manager.complete("salut", Evidence::in_person()).await.unwrap();
        assert!(matches!(outcome, CompletionOutcome::AlreadyCompleted(_)));
        assert_eq!(manager.total_points(), 10);
    }

    #[tokio::test]
    async fn concurrent_completion_reports_in_flight() {
        let (manager, backend, _) = setup();
        backend.set_latency(2);
        let (first, second) = tokio::join!(
            manager.complete("salut", Evidence::in_person()),
            manager.complete("salut", Evidence::in_person()),
        );
        assert!(matches!(first, Ok(CompletionOutcome::Recorded(_))));
        assert_eq!(second.unwrap(), CompletionOutcome::InFlight);
        assert_eq!(manager.total_points(), 10);
    }

    #[tokio::test]
    async fn responses_after_detach_are_discarded() {
        let (manager, backend, _) = setup();
        backend.set_latency(2);
        let (outcome, ()) = tokio::join!(manager.complete("salut", Evidence::in_person()), async {
            tokio::task::yield_now().await;
            manager.detach();
        });
        assert_eq!(outcome.unwrap(), CompletionOutcome::Discarded);
        assert_eq!(manager.total_points(), 0);
        assert_eq!(manager.status("salut"), ChallengeStatus::Available);
        // The server did record it; the next refresh picks it up.
        assert!(manager.refresh_stats().await.unwrap().is_some());
        assert_eq!(manager.total_points(), 10);
    }

    #[tokio::test]
    async fn stale_completion_leaves_newer_request_in_flight() {
        let (manager, backend, _) = setup();
        backend.set_latency(2);
        let (stale, (newer, repeat)) = tokio::join!(
            manager.complete("salut", Evidence::in_person()),
            async {
                tokio::task::yield_now().await;
                manager.detach();
                backend.set_latency(12);
                tokio::join!(manager.complete("salut", Evidence::in_person()), async {
                    for _ in 0..5 {
                        tokio::task::yield_now().await;
                    }
                    manager.complete("salut", Evidence::in_person()).await
                })
            }
        );
        assert_eq!(stale.unwrap(), CompletionOutcome::Discarded);
        assert_eq!(repeat.unwrap(), CompletionOutcome::InFlight);
        // The stale request reached the server first.
        assert!(matches!(newer, Ok(CompletionOutcome::AlreadyCompleted(_))));
        assert_eq!(manager.total_points(), 10);
    }

    #[tokio::test]
    async fn list_today_falls_back_and_is_never_empty() {
        let (manager, backend, _) = setup();
        backend.fail_next(1);
        let list = manager.list_today().await;
        assert_eq!(list, builtin_challenges().to_vec());

        let fresh = manager.list_today().await;
        assert!(!fresh.is_empty());

        backend.serve_malformed_list(true);
        let cached = manager.list_today().await;
        assert_eq!(cached, fresh);
    }

    #[tokio::test]
    async fn refresh_replaces_rather_than_merges() {
        let (manager, backend, _) = setup();
        manager
            .complete("help-home", Evidence::in_person())
            .await
            .unwrap();
        manager.confirm_validation("help-home").unwrap();
        assert_eq!(manager.total_points(), 20);

        // The server never saw the approval, so it wins.
        manager.refresh_stats().await.unwrap();
        assert_eq!(manager.total_points(), 0);
        assert_eq!(manager.status("help-home"), ChallengeStatus::PendingValidation);

        backend.approve("kid", "help-home");
        manager.refresh_stats().await.unwrap();
        assert_eq!(manager.total_points(), 20);
        assert_eq!(manager.status("help-home"), ChallengeStatus::Completed);
    }

    #[tokio::test]
    async fn day_rollover_clears_completions() {
        let (manager, backend, clock) = setup();
        manager.complete("salut", Evidence::in_person()).await.unwrap();
        clock.advance_days(1);
        backend.set_today(clock.today());
        assert_eq!(manager.status("salut"), ChallengeStatus::Available);
        assert!(matches!(
            manager.complete("salut", Evidence::in_person()).await,
            Ok(CompletionOutcome::Recorded(_))
        ));
        assert_eq!(manager.total_points(), 20);
    }

    #[tokio::test]
    async fn exercises_bypass_approval() {
        let (manager, backend, _) = setup();
        assert!(manager.self_report_exercise("stretching").unwrap());
        assert!(!manager.self_report_exercise("stretching").unwrap());
        assert_eq!(manager.total_points(), 0);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn cached_stats_seed_a_new_manager() {
        let (manager, backend, clock) = setup();
        let store = MemoryStore::new();
        let online = ChallengeManager::new(backend.clone(), store.clone(), clock.clone(), "kid");
        online.complete("salut", Evidence::in_person()).await.unwrap();
        online.refresh_stats().await.unwrap();
        drop(manager);

        let offline = ChallengeManager::new(backend, store, clock, "kid");
        assert_eq!(offline.total_points(), 10);
        assert_eq!(offline.status("salut"), ChallengeStatus::Completed);
    }
}
