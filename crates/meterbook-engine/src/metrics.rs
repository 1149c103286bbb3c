//! Prometheus metrics for report ingestion

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};

/// Counters and timings of report runs
#[derive(Debug, Clone)]
pub struct ReportMetrics {
    pub runs_total: IntCounter,
    pub failures_total: IntCounter,
    pub facts_upserted_total: IntCounter,
    pub metrics_query_duration_seconds: Histogram,
}

impl ReportMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            runs_total: IntCounter::new(
                "meterbook_report_runs_total",
                "Total successful report runs (one per hour and query)",
            )?,
            failures_total: IntCounter::new(
                "meterbook_report_failures_total",
                "Total failed report runs",
            )?,
            facts_upserted_total: IntCounter::new(
                "meterbook_facts_upserted_total",
                "Total facts inserted or updated",
            )?,
            metrics_query_duration_seconds: Histogram::with_opts(
                HistogramOpts::new(
                    "meterbook_metrics_query_duration_seconds",
                    "Duration of metrics source queries",
                )
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.runs_total.clone()))?;
        registry.register(Box::new(self.failures_total.clone()))?;
        registry.register(Box::new(self.facts_upserted_total.clone()))?;
        registry.register(Box::new(self.metrics_query_duration_seconds.clone()))?;
        Ok(())
    }
}
