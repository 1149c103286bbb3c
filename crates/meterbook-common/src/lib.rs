//! # Meterbook Common
//!
//! Shared types and errors for Meterbook, the usage reporting and invoicing
//! pipeline.
//!
//! ## Core Types
//!
//! - [`SourceKey`]: hierarchical `query:zone:tenant:namespace[:class]` identifier
//!   and its priority-ordered wildcard lookup keys
//! - [`Validity`]: half-open `[start, end)` interval of a catalog row
//! - [`Sample`]: labelled value returned by the metrics source
//! - [`Invoice`]: tenant invoice with categories, items and sub-items
//!
//! ## Errors
//!
//! - [`MeterbookError`]: unified error, see [`error`] for the taxonomy

pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{
    MeterbookError, MetricsSourceError, NotFoundError, Result, SourceKeyError, ValidationError,
};
pub use types::{
    invoice::{Invoice, InvoiceCategory, Item, ProductRef, SubItem, TenantRef},
    period::{ensure_hour_aligned, hours, BillingMonth, HourBucket},
    sample::{Sample, CATEGORY_LABEL, PRODUCT_LABEL, TENANT_LABEL},
    source_key::SourceKey,
    validity::Validity,
};

/// Meterbook version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
