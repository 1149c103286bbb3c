//! Temporal catalog lookups and lock-free dimension upserts
//!
//! ## Lookups
//!
//! Products and discounts are resolved from a priority-ordered list of source
//! keys (see [`SourceKey::lookup_keys`](meterbook_common::SourceKey::lookup_keys)).
//! The first key with a row valid at the timestamp wins; database row order
//! never matters.
//!
//! ## Upserts
//!
//! Tenants, categories and date-times are created on first sight with a single
//! conditional insert. Existing rows are returned untouched and never locked,
//! so runs for different hours do not serialize on shared dimensions.

use chrono::{DateTime, Utc};
use meterbook_common::{HourBucket, MeterbookError, NotFoundError, Result};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::QueryAs;
use sqlx::{FromRow, PgConnection, Postgres};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Category, DateTimeRow, Discount, Fact, FactKey, Product, Query, Tenant};

/// Lookup statement for a table with `source` and `during` columns.
///
/// `$1` is the ordered key list, `$2` the point in time.
macro_rules! lookup_by_source_keys {
    ($table:literal) => {
        concat!(
            "WITH keys AS (",
            " SELECT key, prio FROM unnest($1::text[]) WITH ORDINALITY AS k(key, prio)",
            ") SELECT ",
            $table,
            ".* FROM ",
            $table,
            " INNER JOIN keys ON (keys.key = ",
            $table,
            ".source) WHERE ",
            $table,
            ".during @> $2::timestamptz ORDER BY keys.prio LIMIT 1"
        )
    };
}

/// Conditional insert by `source` returning either the new or the existing row
macro_rules! insert_or_select_by_source {
    ($table:literal) => {
        concat!(
            "WITH ins AS (INSERT INTO ",
            $table,
            " (source) VALUES ($1) ON CONFLICT (source) DO NOTHING RETURNING *)",
            " SELECT * FROM ins UNION ALL SELECT * FROM ",
            $table,
            " WHERE source = $1 LIMIT 1"
        )
    };
}

/// A catalog table whose rows are valid during a time interval and are keyed
/// by a (possibly wildcarded) source key
pub trait TemporalTable: for<'r> FromRow<'r, PgRow> + Send + Unpin {
    /// Table name, used in errors and logs
    const TABLE: &'static str;
    /// Statement selecting the highest-priority row valid at a timestamp
    const LOOKUP: &'static str;
}

impl TemporalTable for Product {
    const TABLE: &'static str = "products";
    const LOOKUP: &'static str = lookup_by_source_keys!("products");
}

impl TemporalTable for Discount {
    const TABLE: &'static str = "discounts";
    const LOOKUP: &'static str = lookup_by_source_keys!("discounts");
}

/// First row matching one of `keys` (in order) valid at `at`
pub async fn find_by_source_keys<T: TemporalTable>(
    conn: &mut PgConnection,
    keys: &[String],
    at: DateTime<Utc>,
) -> Result<T> {
    sqlx::query_as::<_, T>(T::LOOKUP)
        .bind(keys)
        .bind(at)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| {
            NotFoundError::Record {
                table: T::TABLE,
                key: keys.first().cloned().unwrap_or_default(),
                at,
            }
            .into()
        })
}

/// The query named `name` valid at `at`
pub async fn find_query_at(conn: &mut PgConnection, name: &str, at: DateTime<Utc>) -> Result<Query> {
    sqlx::query_as::<_, Query>("SELECT * FROM queries WHERE name = $1 AND during @> $2::timestamptz")
        .bind(name)
        .bind(at)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| {
            NotFoundError::Query {
                name: name.to_string(),
                at,
            }
            .into()
        })
}

/// Direct sub-queries of `parent_id` valid at `at`, ordered by name
pub async fn sub_queries_at(
    conn: &mut PgConnection,
    parent_id: Uuid,
    at: DateTime<Utc>,
) -> Result<Vec<Query>> {
    let queries = sqlx::query_as::<_, Query>(
        r#"
        SELECT * FROM queries
        WHERE parent_id = $1 AND during @> $2::timestamptz
        ORDER BY name, id
        "#,
    )
    .bind(parent_id)
    .bind(at)
    .fetch_all(&mut *conn)
    .await?;
    Ok(queries)
}

/// Run a conditional insert, retrying once when a concurrent insert of the
/// same key committed after the statement snapshot was taken.
async fn insert_or_select<'q, T, F>(
    conn: &mut PgConnection,
    table: &'static str,
    key: &str,
    build: F,
) -> Result<T>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    F: Fn() -> QueryAs<'q, Postgres, T, PgArguments>,
{
    for attempt in 0..2 {
        if let Some(row) = build().fetch_optional(&mut *conn).await? {
            return Ok(row);
        }
        warn!(table, key, attempt, "Row inserted concurrently, retrying upsert");
    }
    Err(MeterbookError::Internal(format!(
        "upsert of {table} '{key}' returned no row"
    )))
}

/// Tenant by source, created if absent. An existing target is kept.
pub async fn upsert_tenant(conn: &mut PgConnection, source: &str) -> Result<Tenant> {
    let tenant = insert_or_select(conn, "tenants", source, || {
        sqlx::query_as::<_, Tenant>(insert_or_select_by_source!("tenants")).bind(source)
    })
    .await?;
    debug!(id = %tenant.id, source, "Upserted tenant");
    Ok(tenant)
}

/// Category by source, created if absent. An existing target is kept.
pub async fn upsert_category(conn: &mut PgConnection, source: &str) -> Result<Category> {
    let category = insert_or_select(conn, "categories", source, || {
        sqlx::query_as::<_, Category>(insert_or_select_by_source!("categories")).bind(source)
    })
    .await?;
    debug!(id = %category.id, source, "Upserted category");
    Ok(category)
}

/// Date-time row of an hour bucket, created if absent
pub async fn upsert_date_time(conn: &mut PgConnection, bucket: &HourBucket) -> Result<DateTimeRow> {
    let key = bucket.timestamp.to_rfc3339();
    insert_or_select(conn, "date_times", &key, || {
        sqlx::query_as::<_, DateTimeRow>(
            r#"
            WITH ins AS (
                INSERT INTO date_times ("timestamp", year, month, day, hour)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (year, month, day, hour) DO NOTHING
                RETURNING *
            )
            SELECT * FROM ins
            UNION ALL
            SELECT * FROM date_times WHERE year = $2 AND month = $3 AND day = $4 AND hour = $5
            LIMIT 1
            "#,
        )
        .bind(bucket.timestamp)
        .bind(bucket.year)
        .bind(bucket.month)
        .bind(bucket.day)
        .bind(bucket.hour)
    })
    .await
}

/// Insert the fact or overwrite the quantity of the existing one
pub async fn upsert_fact(conn: &mut PgConnection, key: &FactKey, quantity: f64) -> Result<Fact> {
    let fact = sqlx::query_as::<_, Fact>(
        r#"
        INSERT INTO facts
            (date_time_id, query_id, tenant_id, category_id, product_id, discount_id, quantity)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (date_time_id, query_id, tenant_id, category_id, product_id, discount_id)
            DO UPDATE SET quantity = EXCLUDED.quantity
        RETURNING *
        "#,
    )
    .bind(key.date_time_id)
    .bind(key.query_id)
    .bind(key.tenant_id)
    .bind(key.category_id)
    .bind(key.product_id)
    .bind(key.discount_id)
    .bind(quantity)
    .fetch_one(&mut *conn)
    .await?;
    Ok(fact)
}

/// All categories ordered by source
pub async fn list_categories(conn: &mut PgConnection) -> Result<Vec<Category>> {
    let categories = sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY source")
        .fetch_all(&mut *conn)
        .await?;
    Ok(categories)
}

/// Set the external target of a category, returns the number of rows changed
pub async fn update_category_target(
    conn: &mut PgConnection,
    id: Uuid,
    target: Option<&str>,
) -> Result<u64> {
    let result = sqlx::query("UPDATE categories SET target = $2 WHERE id = $1")
        .bind(id)
        .bind(target)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_statement_per_table() {
        assert!(Product::LOOKUP.contains("SELECT products.* FROM products"));
        assert!(Product::LOOKUP.contains("ORDER BY keys.prio LIMIT 1"));
        assert!(Discount::LOOKUP.contains("INNER JOIN keys ON (keys.key = discounts.source)"));
        assert!(!Discount::LOOKUP.contains("products"));
    }

    #[test]
    fn test_conditional_insert_never_updates() {
        let sql = insert_or_select_by_source!("tenants");
        assert!(sql.contains("ON CONFLICT (source) DO NOTHING"));
        assert!(!sql.contains("DO UPDATE"));
    }
}
