//! Reporting data completeness check

use meterbook_common::Result;
use serde::Serialize;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

/// A row lacking data required for invoicing
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct MissingField {
    pub table: String,
    pub id: Uuid,
    pub source: String,
    pub missing_field: String,
}

const MISSING_SQL: &str = r#"
WITH missing AS (
    SELECT 'categories' AS "table", id, source, 'target' AS missing_field
        FROM categories WHERE target IS NULL OR target = ''
    UNION ALL
    SELECT 'tenants', id, source, 'target'
        FROM tenants WHERE target IS NULL OR target = ''
    UNION ALL
    SELECT 'products', id, source, 'target'
        FROM products WHERE target IS NULL OR target = ''
    UNION ALL
    SELECT 'products', id, source, 'amount'
        FROM products WHERE amount = 0
    UNION ALL
    SELECT 'products', id, source, 'unit'
        FROM products WHERE unit = ''
)
SELECT * FROM missing ORDER BY "table", missing_field, source
"#;

/// Categories and tenants without target, products without target, amount or
/// unit. Ordered by table, field and source.
pub async fn missing(conn: &mut PgConnection) -> Result<Vec<MissingField>> {
    let rows = sqlx::query_as::<_, MissingField>(MISSING_SQL)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows)
}
