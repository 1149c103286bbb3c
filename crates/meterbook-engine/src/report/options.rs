//! Report run options

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::metrics::ReportMetrics;

/// Progress of a range run, reported after each completed hour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Hour that just completed
    pub timestamp: DateTime<Utc>,
    /// Hours completed so far
    pub count: usize,
}

pub type ProgressReporter = Arc<dyn Fn(Progress) + Send + Sync>;

/// Optional knobs for `run` and `run_range`
#[derive(Clone, Default)]
pub struct ReportOptions {
    pub(crate) query_timeout: Option<Duration>,
    pub(crate) progress: Option<ProgressReporter>,
    pub(crate) metrics: Option<Arc<ReportMetrics>>,
}

impl ReportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound each metrics source query. Database calls are not affected.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    pub fn with_progress<F>(mut self, reporter: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(reporter));
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ReportMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

impl fmt::Debug for ReportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportOptions")
            .field("query_timeout", &self.query_timeout)
            .field("progress", &self.progress.is_some())
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}
