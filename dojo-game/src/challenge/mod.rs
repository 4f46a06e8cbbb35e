//! Daily challenges: the backend port, the completion/validation state
//! machine and the records they exchange.

mod api;
mod manager;
mod model;

pub use api::{ApiError, ChallengeApi, MemoryBackend};
pub use manager::{
    ChallengeError, ChallengeManager, CompletionOutcome, FixedClock, Lifeline, SystemClock,
    WallClock,
};
pub use model::{
    Challenge, ChallengeKind, ChallengeStatus, CompletionRecord, CompletionRequest,
    CompletionStatus, Evidence, StatsSnapshot,
};
