use thiserror::Error;
use uuid::Uuid;

use crate::stage::Stage;

/// Errors surfaced by pipeline operations. Each is scoped to one call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("deal {deal_id} is closed as {stage}; use an administrative override")]
    InvalidTransition { deal_id: Uuid, stage: Stage },
    #[error("moving to {stage} requires a sub-reason")]
    MissingSubReason { stage: Stage },
    #[error("deal {deal_id} was modified concurrently; reload and retry")]
    ConflictRetry { deal_id: Uuid },
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),
    #[error("actor {actor} lacks administrative capability")]
    Unauthorized { actor: Uuid },
    #[error("deal {0} not found")]
    NotFound(Uuid),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl PipelineError {
    /// Stable machine-readable code for API layers.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::InvalidTransition { .. } => "INVALID_TRANSITION",
            PipelineError::MissingSubReason { .. } => "MISSING_SUB_REASON",
            PipelineError::ConflictRetry { .. } => "CONFLICT_RETRY",
            PipelineError::PersistenceUnavailable(_) => "PERSISTENCE_UNAVAILABLE",
            PipelineError::Unauthorized { .. } => "UNAUTHORIZED",
            PipelineError::NotFound(_) => "NOT_FOUND",
            PipelineError::InvalidInput(_) => "INVALID_INPUT",
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failures reported by a [`DealStore`](crate::store::DealStore).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("deal {0} not found")]
    NotFound(Uuid),
    #[error("deal {deal_id} expected version {expected}, found {actual:?}")]
    VersionConflict {
        deal_id: Uuid,
        expected: i64,
        actual: Option<i64>,
    },
    #[error("duplicate record: {0}")]
    Duplicate(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for PipelineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => PipelineError::NotFound(id),
            StoreError::VersionConflict { deal_id, .. } => PipelineError::ConflictRetry { deal_id },
            StoreError::Duplicate(msg) => {
                PipelineError::PersistenceUnavailable(format!("duplicate record: {msg}"))
            }
            StoreError::Unavailable(msg) => PipelineError::PersistenceUnavailable(msg),
        }
    }
}
