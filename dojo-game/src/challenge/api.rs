//! Backend port and an in-process backend for tests and the tester.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::future::poll_fn;
use std::rc::Rc;
use std::task::Poll;
use thiserror::Error;

use super::model::{
    Challenge, ChallengeKind, CompletionRecord, CompletionRequest, CompletionStatus, StatsSnapshot,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network request failed: {0}")]
    Transport(String),
    /// The server already holds a completion for this challenge today.
    #[error("completion already recorded")]
    Duplicate,
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// The three backend calls the core relies on.
#[async_trait(?Send)]
pub trait ChallengeApi {
    /// `GET /challenges/daily`
    async fn daily_challenges(&self) -> Result<Vec<Challenge>, ApiError>;

    /// `GET /stats/{user_id}`
    async fn stats(&self, user_id: &str) -> Result<StatsSnapshot, ApiError>;

    /// `POST /challenges/complete`
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionRecord, ApiError>;
}

#[derive(Debug, Default)]
struct BackendState {
    challenges: Vec<Challenge>,
    records: Vec<CompletionRecord>,
    points: BTreeMap<String, u64>,
    mastered: BTreeMap<String, u32>,
    sessions: BTreeMap<String, u32>,
}

/// In-memory backend. Clones share state, so a test can keep a handle for
/// failure injection and guardian approval while the manager owns another.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    state: Rc<RefCell<BackendState>>,
    today: Rc<Cell<Option<NaiveDate>>>,
    transport_failures: Rc<Cell<u32>>,
    malformed_list: Rc<Cell<bool>>,
    latency_yields: Rc<Cell<u32>>,
    calls: Rc<Cell<u32>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new(challenges: Vec<Challenge>) -> Self {
        Self {
            state: Rc::new(RefCell::new(BackendState {
                challenges,
                ..BackendState::default()
            })),
            today: Rc::new(Cell::new(None)),
            transport_failures: Rc::new(Cell::new(0)),
            malformed_list: Rc::new(Cell::new(false)),
            latency_yields: Rc::new(Cell::new(0)),
            calls: Rc::new(Cell::new(0)),
        }
    }

    /// Pin the server's calendar day; otherwise the current UTC date is used.
    #[must_use]
    pub fn with_today(self, day: NaiveDate) -> Self {
        self.today.set(Some(day));
        self
    }

    pub fn set_today(&self, day: NaiveDate) {
        self.today.set(Some(day));
    }

    /// Fail the next `count` calls with a transport error.
    pub fn fail_next(&self, count: u32) {
        self.transport_failures.set(count);
    }

    /// Make the daily list endpoint answer with garbage.
    pub fn serve_malformed_list(&self, malformed: bool) {
        self.malformed_list.set(malformed);
    }

    /// Suspend each call `yields` times before answering.
    pub fn set_latency(&self, yields: u32) {
        self.latency_yields.set(yields);
    }

    /// Number of calls received, failed ones included.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.get()
    }

    /// Record a played session for a user's stats.
    pub fn log_session(&self, user_id: &str) {
        let mut state = self.state.borrow_mut();
        *state.sessions.entry(user_id.to_string()).or_default() += 1;
    }

    /// Guardian approval on the server side. Returns `false` if nothing was
    /// pending.
    pub fn approve(&self, user_id: &str, challenge_id: &str) -> bool {
        let day = self.day();
        let mut state = self.state.borrow_mut();
        let Some(xp) = state
            .challenges
            .iter()
            .find(|c| c.id == challenge_id)
            .map(|c| (c.xp_value, c.kind))
        else {
            return false;
        };
        let Some(record) = state.records.iter_mut().find(|r| {
            r.user_id == user_id
                && r.challenge_id == challenge_id
                && r.day() == day
                && r.status == CompletionStatus::PendingValidation
        }) else {
            return false;
        };
        record.status = CompletionStatus::Confirmed;
        Self::credit(&mut state, user_id, xp);
        true
    }

    #[must_use]
    pub fn total_points(&self, user_id: &str) -> u64 {
        self.state
            .borrow()
            .points
            .get(user_id)
            .copied()
            .unwrap_or(0)
    }

    fn day(&self) -> NaiveDate {
        self.today.get().unwrap_or_else(|| Utc::now().date_naive())
    }

    fn credit(state: &mut BackendState, user_id: &str, (xp, kind): (u32, ChallengeKind)) {
        *state.points.entry(user_id.to_string()).or_default() += u64::from(xp);
        if kind == ChallengeKind::Technique {
            *state.mastered.entry(user_id.to_string()).or_default() += 1;
        }
    }

    async fn round_trip(&self) -> Result<(), ApiError> {
        self.calls.set(self.calls.get() + 1);
        let mut remaining = self.latency_yields.get();
        poll_fn(|cx| {
            if remaining == 0 {
                return Poll::Ready(());
            }
            remaining -= 1;
            cx.waker().wake_by_ref();
            Poll::Pending
        })
        .await;
        let failures = self.transport_failures.get();
        if failures > 0 {
            self.transport_failures.set(failures - 1);
            return Err(ApiError::Transport("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl ChallengeApi for MemoryBackend {
    async fn daily_challenges(&self) -> Result<Vec<Challenge>, ApiError> {
        self.round_trip().await?;
        if self.malformed_list.get() {
            return Err(ApiError::Malformed("expected a challenge array".to_string()));
        }
        Ok(self.state.borrow().challenges.clone())
    }

    async fn stats(&self, user_id: &str) -> Result<StatsSnapshot, ApiError> {
        self.round_trip().await?;
        let day = self.day();
        let state = self.state.borrow();
        Ok(StatsSnapshot {
            completed_today: state
                .records
                .iter()
                .filter(|r| r.user_id == user_id && r.day() == day)
                .cloned()
                .collect(),
            total_points: state.points.get(user_id).copied().unwrap_or(0),
            mastered_techniques: state.mastered.get(user_id).copied().unwrap_or(0),
            session_count: state.sessions.get(user_id).copied().unwrap_or(0),
        })
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionRecord, ApiError> {
        self.round_trip().await?;
        let mut state = self.state.borrow_mut();
        let Some((xp, kind, needs_approval)) = state
            .challenges
            .iter()
            .find(|c| c.id == request.challenge_id)
            .map(|c| (c.xp_value, c.kind, c.requires_guardian_approval))
        else {
            return Err(ApiError::Malformed(format!(
                "unknown challenge '{}'",
                request.challenge_id
            )));
        };
        let day = request.completed_at.date_naive();
        if state.records.iter().any(|r| {
            r.user_id == request.user_id && r.challenge_id == request.challenge_id && r.day() == day
        }) {
            return Err(ApiError::Duplicate);
        }
        let status = if needs_approval {
            CompletionStatus::PendingValidation
        } else {
            CompletionStatus::Confirmed
        };
        let record = CompletionRecord {
            challenge_id: request.challenge_id.clone(),
            user_id: request.user_id.clone(),
            completed_at: request.completed_at,
            status,
        };
        state.records.push(record.clone());
        if status == CompletionStatus::Confirmed {
            Self::credit(&mut state, &request.user_id, (xp, kind));
        }
        Ok(record)
    }
}
