//! Metrics source
//!
//! Ingestion only needs one capability from the metrics backend: evaluate a
//! query at an instant and return labelled samples.

mod prometheus;

pub use self::prometheus::PrometheusSource;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meterbook_common::{Result, Sample};

/// Evaluates instant queries
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Evaluate `query` at `at`. Looks backwards from `at`, so usage of the
    /// hour starting at `T` is queried at `T + 1h`.
    async fn query(&self, query: &str, at: DateTime<Utc>) -> Result<Vec<Sample>>;
}
