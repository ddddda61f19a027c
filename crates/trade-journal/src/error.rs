use signal_core::{OutcomeCategory, PlanStatus, ValidationError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Plan {0} not found")]
    PlanNotFound(i64),

    #[error("Illegal status transition for plan {plan_id}: {from} -> {to}")]
    InvalidTransition {
        plan_id: i64,
        from: PlanStatus,
        to: PlanStatus,
    },

    #[error("Plan {plan_id} is {status}, outcomes require EXECUTED")]
    PlanNotExecuted { plan_id: i64, status: PlanStatus },

    #[error("Outcome {outcome} contradicts realized R multiple {r_multiple}")]
    InconsistentOutcome {
        outcome: OutcomeCategory,
        r_multiple: f64,
    },

    #[error("Plan {0} already has an outcome")]
    DuplicateOutcome(i64),

    #[error("Learning review {0} not found")]
    ReviewNotFound(i64),

    #[error("Plan references unknown configuration version {0}")]
    UnknownConfigVersion(i64),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl JournalError {
    /// Busy or locked database, pool exhaustion, and I/O failures. Everything
    /// else is a definitive answer and must not be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            JournalError::Sqlx(e) => match e {
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
                sqlx::Error::Database(db) => db
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    // primary result code lives in the low byte
                    .map(|code| matches!(code & 0xff, 5 | 6))
                    .unwrap_or(false),
                _ => false,
            },
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, JournalError>;
