//! Error types for Meterbook
//!
//! Provides a unified error type and domain-specific error variants

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias using MeterbookError
pub type Result<T> = std::result::Result<T, MeterbookError>;

/// Unified error type for Meterbook operations
#[derive(Debug, Error)]
pub enum MeterbookError {
    // Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // Source key errors
    #[error("Source key error: {0}")]
    SourceKey(#[from] SourceKeyError),

    // Lookup errors
    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    // Metrics source errors
    #[error("Metrics source error: {0}")]
    MetricsSource(#[from] MetricsSourceError),

    // Storage errors, kept intact so constraint codes stay inspectable
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    // Range ingestion stopped early
    #[error("Report range aborted at {at} after {completed} completed hour(s): {source}")]
    RangeAborted {
        completed: usize,
        at: DateTime<Utc>,
        #[source]
        source: Box<MeterbookError>,
    },

    // ERP reconciler errors
    #[error("Reconciler error: {0}")]
    Reconciler(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MeterbookError {
    /// SQLSTATE of a database constraint violation, if this error carries one.
    ///
    /// `23P01` is an exclusion violation (overlapping validity), `23514` a
    /// failed check constraint and `23505` a unique violation.
    pub fn constraint_code(&self) -> Option<String> {
        match self {
            MeterbookError::Storage(sqlx::Error::Database(db)) => {
                db.code().map(|code| code.into_owned())
            }
            MeterbookError::RangeAborted { source, .. } => source.constraint_code(),
            _ => None,
        }
    }

    /// Whether this is a lookup failure (query, product or discount not found)
    pub fn is_not_found(&self) -> bool {
        match self {
            MeterbookError::NotFound(_) => true,
            MeterbookError::RangeAborted { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Input validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("timestamp {0} must be truncated to the hour (UTC)")]
    UnalignedTimestamp(DateTime<Utc>),

    #[error("expected sample to contain label '{0}'")]
    MissingLabel(String),

    #[error("expected metrics query to return a vector, got {0}")]
    UnexpectedResultType(String),

    #[error("unknown month {0}")]
    InvalidMonth(u32),

    #[error("sample value {value} of query '{query}' for product '{product}' is not a finite number")]
    NonFiniteValue {
        query: String,
        product: String,
        value: f64,
    },

    #[error("validity range {0} must have an inclusive start and an exclusive end")]
    RangeBounds(String),

    #[error("invalid range: {from} is not before {until}")]
    InvalidRange {
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    },
}

/// Source key parse errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceKeyError {
    #[error("expected key with 4 to 5 elements separated by `:` got {count} in '{raw}'")]
    SegmentCount { raw: String, count: usize },
}

/// Lookup errors
#[derive(Debug, Error)]
pub enum NotFoundError {
    #[error("no query named '{name}' valid at {at}")]
    Query { name: String, at: DateTime<Utc> },

    #[error("no {table} record matching '{key}' valid at {at}")]
    Record {
        table: &'static str,
        key: String,
        at: DateTime<Utc>,
    },
}

/// Metrics source errors
#[derive(Debug, Error)]
pub enum MetricsSourceError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("query failed with {error_type}: {message}")]
    Api { error_type: String, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("query timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<serde_json::Error> for MeterbookError {
    fn from(err: serde_json::Error) -> Self {
        MeterbookError::MetricsSource(MetricsSourceError::Decode(err.to_string()))
    }
}
