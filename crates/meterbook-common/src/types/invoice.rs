//! Invoice Types - per tenant, per category, per line item
//!
//! An invoice is a tree:
//! - Invoice: one tenant, one calendar month
//! - Category: one `zone:namespace` the tenant used
//! - Item: one (query, product, discount) combination, priced
//! - SubItem: supplementary detail from a sub-query of the item's query
//!
//! Totals roll up: item -> category -> invoice.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Invoice for a single tenant and month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub tenant: TenantRef,
    /// Midnight of the first day of the month (UTC)
    pub period_start: DateTime<Utc>,
    /// Midnight of the last day of the month (UTC)
    pub period_end: DateTime<Utc>,
    pub categories: Vec<InvoiceCategory>,
    /// Sum of all category totals
    pub total: Decimal,
}

/// Tenant reference with its external (ERP) identifier
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TenantRef {
    pub source: String,
    pub target: String,
}

/// A category of the invoice, i.e. a namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceCategory {
    pub source: String,
    pub target: String,
    pub items: Vec<Item>,
    /// Sum of the item totals
    pub total: Decimal,
}

/// Product reference with its external article identifier
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductRef {
    pub source: String,
    pub target: String,
}

/// A priced line of the invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub description: String,
    /// Name of the query that produced this line
    pub query_name: String,
    pub product: ProductRef,
    /// Summed quantity over all hours
    pub quantity: f64,
    pub quantity_min: f64,
    pub quantity_avg: f64,
    pub quantity_max: f64,
    /// Unit of the quantity, e.g. MiB
    pub unit: String,
    pub price_per_unit: Decimal,
    /// Discount fraction; 0.3 means 70% of the list price is charged
    pub discount: Decimal,
    /// Sum over the hourly rows of quantity * price * (1 - discount)
    pub total: Decimal,
    pub sub_items: Vec<SubItem>,
}

/// Detail produced by a sub-query of an item's query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubItem {
    pub description: String,
    pub query_name: String,
    pub quantity: f64,
    pub quantity_min: f64,
    pub quantity_avg: f64,
    pub quantity_max: f64,
    pub unit: String,
}

impl InvoiceCategory {
    /// Build a category and compute its total from the items
    pub fn new(source: String, target: String, items: Vec<Item>) -> Self {
        let total = items.iter().map(|i| i.total).sum();
        Self {
            source,
            target,
            items,
            total,
        }
    }
}

impl Invoice {
    /// Build an invoice and compute its total from the categories
    pub fn new(
        tenant: TenantRef,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        categories: Vec<InvoiceCategory>,
    ) -> Self {
        let total = categories.iter().map(|c| c.total).sum();
        Self {
            tenant,
            period_start,
            period_end,
            categories,
            total,
        }
    }
}
