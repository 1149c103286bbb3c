//! # Meterbook Engine
//!
//! Usage reporting and invoicing on top of [`meterbook_store`].
//!
//! ## Pipeline
//!
//! ```text
//! metrics source --(report::run, hourly)--> facts --(invoice::generate, monthly)--> invoices
//! ```
//!
//! - [`report`]: ingest one query at one hour, or a range of hours
//! - [`invoice`]: aggregate a month of facts into per-tenant invoices
//! - [`reconcile`]: sync category targets with an ERP through an injected
//!   [`reconcile::CategoryReconciler`]
//! - [`source`]: the [`source::MetricsSource`] capability and its Prometheus client

pub mod invoice;
pub mod metrics;
pub mod reconcile;
pub mod report;
pub mod source;

pub use metrics::ReportMetrics;
pub use reconcile::{CategoryMapping, CategoryReconciler, ReconcileSummary};
pub use report::{Progress, ReportOptions};
pub use source::{MetricsSource, PrometheusSource};
