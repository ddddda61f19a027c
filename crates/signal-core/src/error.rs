use thiserror::Error;

/// Malformed input rejected before anything is persisted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Observation has no timestamp")]
    MissingTimestamp,

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Unknown HTF trend: {0}")]
    UnknownTrend(String),

    #[error("Unknown liquidity event type: {0}")]
    UnknownLiquidityEvent(String),

    #[error("Unknown plan status: {0}")]
    UnknownStatus(String),

    #[error("Unknown outcome category: {0}")]
    UnknownOutcome(String),

    #[error("Unknown direction: {0}")]
    UnknownDirection(String),

    #[error("Field {field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("Field {field} must be non-negative, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("Field {field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Checks that a value is finite.
pub fn ensure_finite(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ValidationError::NonFinite { field })
    }
}

/// Checks that a value is finite and >= 0.
pub fn ensure_non_negative(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    let value = ensure_finite(field, value)?;
    if value < 0.0 {
        return Err(ValidationError::Negative { field, value });
    }
    Ok(value)
}

/// Checks that a value is finite and > 0.
pub fn ensure_positive(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    let value = ensure_finite(field, value)?;
    if value <= 0.0 {
        return Err(ValidationError::NonPositive { field, value });
    }
    Ok(value)
}
