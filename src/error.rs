//! Error taxonomy for the scoring and aggregation core.
//!
//! Every error is returned to the caller as a value. Nothing here is
//! retried internally; retry policy belongs to whoever owns the store.

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{RecordId, Scope};

/// Malformed or out-of-range reflection input. The teacher can correct and resubmit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: value {value} is outside the allowed range {allowed_range}")]
    OutOfRange {
        field: String,
        value: String,
        allowed_range: String,
    },

    #[error("{field}: missing")]
    Missing { field: String },

    #[error("date: {date} is after the submission date {submitted_on}")]
    FutureDate {
        date: NaiveDate,
        submitted_on: NaiveDate,
    },

    #[error("{field}: not a rated field")]
    UnknownField { field: String },

    #[error("{field}: value {value} has the wrong kind, expected {allowed_range}")]
    WrongKind {
        field: String,
        value: String,
        allowed_range: String,
    },
}

impl ValidationError {
    pub fn field(&self) -> &str {
        match self {
            ValidationError::OutOfRange { field, .. }
            | ValidationError::Missing { field }
            | ValidationError::UnknownField { field }
            | ValidationError::WrongKind { field, .. } => field,
            ValidationError::FutureDate { .. } => "date",
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::OutOfRange { .. } => "out of range",
            ValidationError::Missing { .. } => "missing",
            ValidationError::FutureDate { .. } => "future date",
            ValidationError::UnknownField { .. } => "unknown field",
            ValidationError::WrongKind { .. } => "wrong kind",
        }
    }
}

/// A record already exists for the same scope and date.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("a reflection for {scope} on {date} is already recorded as #{existing}; retract it first")]
pub struct ConflictError {
    pub scope: Scope,
    pub date: NaiveDate,
    pub existing: RecordId,
}

/// Misuse of the aggregator by its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("mixed scope: expected {expected}, found {found}")]
    MixedScope { expected: Scope, found: Scope },

    #[error("series out of order: {next} follows {previous}")]
    Unsorted { previous: NaiveDate, next: NaiveDate },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no sessions recorded yet for {scope}")]
pub struct NotFoundError {
    pub scope: Scope,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("record #{0} does not exist")]
    UnknownRecord(RecordId),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("failed to serialize reflection input: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(conflict) => CoreError::Conflict(conflict),
            other => CoreError::Store(other),
        }
    }
}
