//! Dojo Game Engine
//!
//! Platform-agnostic core for the Dojo learning app: the real-time
//! mini-game runtime, the challenge completion/validation state machine and
//! belt progression. Presentation, the REST transport and local storage are
//! reached only through the ports defined here.

pub mod arcade;
pub mod challenge;
pub mod clock;
pub(crate) mod constants;
pub mod data;
pub mod games;
pub mod input;
pub mod numbers;
pub mod progression;
pub mod scoring;
pub mod seed;
pub mod session;
pub mod storage;
pub mod tuning;

// Re-export commonly used types
pub use arcade::{Arcade, SessionId};
pub use challenge::{
    ApiError, Challenge, ChallengeApi, ChallengeError, ChallengeKind, ChallengeManager,
    ChallengeStatus, CompletionOutcome, CompletionRecord, CompletionRequest, CompletionStatus,
    Evidence, FixedClock, Lifeline, MemoryBackend, StatsSnapshot, SystemClock, WallClock,
};
pub use clock::{Clock, FrameScheduler, ManualTime, MonotonicTime, SubscriptionId, Tick, TimeSource};
pub use data::{Dilemma, DilemmaBank, builtin_challenges, dilemma_bank};
pub use games::{Frame, GameEvent, GameView, MiniGame, Verdict, build_game};
pub use input::{
    Action, HeldActions, InputEdge, InputMapper, PhysicalInput, RawInput, TimedAction, TouchButton,
};
pub use progression::{
    BeltRank, BeltTable, ProgressSnapshot, ProgressionError, compute_belt, compute_percent,
    snapshot,
};
pub use scoring::{
    Classify, DistanceBand, DistanceBands, MagnitudeWindows, ScoreEvent, ScoreLedger, Tier,
    TierPoints, TimedTarget, TimingWindows,
};
pub use seed::{derive_stream_seed, run_rng, run_seed};
pub use session::{GameId, GamePhase, GameResult, GameSession, Outcome, SessionTuning};
pub use storage::{KeyValueStore, LocalState, MemoryStore, StoreError, VisitorMode};
pub use tuning::{GameTuning, KiReward, TuningError};
