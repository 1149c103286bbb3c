//! Row models
//!
//! One struct per table, decoded with `sqlx::FromRow`. Validity columns are
//! `tstzrange` and decode into [`Validity`].

use chrono::{DateTime, Utc};
use meterbook_common::{Result, Validity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::types::PgRange;
use sqlx::{FromRow, PgConnection};
use tracing::debug;
use uuid::Uuid;

type TimeRange = PgRange<DateTime<Utc>>;

/// Named, versioned metrics query
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Query {
    pub id: Uuid,
    /// Set for sub-queries
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub description: String,
    /// Query text sent to the metrics source
    pub query: String,
    pub unit: String,
    #[sqlx(try_from = "TimeRange")]
    pub during: Validity,
}

/// Pricing record, keyed by a source key that may contain wildcards
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub source: String,
    /// External article identifier
    pub target: Option<String>,
    pub amount: Decimal,
    pub unit: String,
    #[sqlx(try_from = "TimeRange")]
    pub during: Validity,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Discount {
    pub id: Uuid,
    pub source: String,
    /// Fraction in `[0, 1]`
    pub discount: Decimal,
    #[sqlx(try_from = "TimeRange")]
    pub during: Validity,
}

/// Organization, identified by the `tenant` label
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub source: String,
    pub target: Option<String>,
}

/// `zone:namespace`, identified by the `category` label
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub source: String,
    pub target: Option<String>,
}

/// Calendar decomposition of an hour bucket
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DateTimeRow {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub hour: i32,
}

/// One resolved hourly measurement
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Fact {
    pub id: Uuid,
    pub date_time_id: Uuid,
    pub query_id: Uuid,
    pub tenant_id: Uuid,
    pub category_id: Uuid,
    pub product_id: Uuid,
    pub discount_id: Uuid,
    pub quantity: f64,
}

/// Dimension ids identifying a fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FactKey {
    pub date_time_id: Uuid,
    pub query_id: Uuid,
    pub tenant_id: Uuid,
    pub category_id: Uuid,
    pub product_id: Uuid,
    pub discount_id: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct NewQuery {
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub query: String,
    pub unit: String,
    pub during: Validity,
}

#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub source: String,
    pub target: Option<String>,
    pub amount: Decimal,
    pub unit: String,
    pub during: Validity,
}

#[derive(Debug, Clone, Default)]
pub struct NewDiscount {
    pub source: String,
    pub discount: Decimal,
    pub during: Validity,
}

/// Insert a query. Overlapping validity for the same name fails with `23P01`.
pub async fn create_query(conn: &mut PgConnection, new: &NewQuery) -> Result<Query> {
    let query = sqlx::query_as::<_, Query>(
        r#"
        INSERT INTO queries (parent_id, name, description, query, unit, during)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(new.parent_id)
    .bind(&new.name)
    .bind(&new.description)
    .bind(&new.query)
    .bind(&new.unit)
    .bind(TimeRange::from(new.during))
    .fetch_one(&mut *conn)
    .await?;

    debug!(id = %query.id, name = %query.name, "Created query");
    Ok(query)
}

/// Insert a product. Overlapping validity for the same source fails with `23P01`.
pub async fn create_product(conn: &mut PgConnection, new: &NewProduct) -> Result<Product> {
    let product = sqlx::query_as::<_, Product>(
        r#"
        INSERT INTO products (source, target, amount, unit, during)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(&new.source)
    .bind(&new.target)
    .bind(new.amount)
    .bind(&new.unit)
    .bind(TimeRange::from(new.during))
    .fetch_one(&mut *conn)
    .await?;

    debug!(id = %product.id, source = %product.source, "Created product");
    Ok(product)
}

/// Insert a discount. Fractions outside `[0, 1]` fail with `23514`.
pub async fn create_discount(conn: &mut PgConnection, new: &NewDiscount) -> Result<Discount> {
    let discount = sqlx::query_as::<_, Discount>(
        r#"
        INSERT INTO discounts (source, discount, during)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(&new.source)
    .bind(new.discount)
    .bind(TimeRange::from(new.during))
    .fetch_one(&mut *conn)
    .await?;

    debug!(id = %discount.id, source = %discount.source, "Created discount");
    Ok(discount)
}
