//! Invoice aggregation
//!
//! Builds one invoice per tenant for a calendar month from the stored facts.
//! Facts are grouped by (query, product, discount) per tenant and category.
//! Groups of sub-queries nest under the group of their parent query with the
//! same product and discount; groups without such a parent are dropped.
//!
//! Generation only reads and runs in a read-only transaction.

use std::collections::HashMap;

use meterbook_common::{
    BillingMonth, Invoice, InvoiceCategory, Item, ProductRef, Result, SubItem, TenantRef,
};
use meterbook_store::{Category, Store, Tenant};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Generate the invoices of `year`-`month`, ordered by tenant source
#[instrument(skip(store))]
pub async fn generate(store: &Store, year: i32, month: u32) -> Result<Vec<Invoice>> {
    let period = BillingMonth::new(year, month)?;
    let mut tx = store.begin_read_only().await?;
    let invoices = generate_in_tx(&mut *tx, period).await?;
    tx.commit().await?;

    info!(invoices = invoices.len(), "Generated invoices");
    Ok(invoices)
}

/// Generate invoices inside a caller-owned transaction
pub async fn generate_in_tx(conn: &mut PgConnection, period: BillingMonth) -> Result<Vec<Invoice>> {
    let tenants = tenants_for_period(conn, period).await?;

    let mut invoices = Vec::with_capacity(tenants.len());
    for tenant in tenants {
        invoices.push(invoice_for_tenant(conn, &tenant, period).await?);
    }
    Ok(invoices)
}

async fn tenants_for_period(conn: &mut PgConnection, period: BillingMonth) -> Result<Vec<Tenant>> {
    let tenants = sqlx::query_as::<_, Tenant>(
        r#"
        SELECT DISTINCT tenants.*
        FROM tenants
            INNER JOIN facts ON (facts.tenant_id = tenants.id)
            INNER JOIN date_times ON (facts.date_time_id = date_times.id)
        WHERE date_times.year = $1 AND date_times.month = $2
        ORDER BY tenants.source
        "#,
    )
    .bind(period.year)
    .bind(period.month as i32)
    .fetch_all(&mut *conn)
    .await?;
    Ok(tenants)
}

async fn invoice_for_tenant(
    conn: &mut PgConnection,
    tenant: &Tenant,
    period: BillingMonth,
) -> Result<Invoice> {
    let categories = sqlx::query_as::<_, Category>(
        r#"
        SELECT DISTINCT categories.*
        FROM categories
            INNER JOIN facts ON (facts.category_id = categories.id)
            INNER JOIN date_times ON (facts.date_time_id = date_times.id)
        WHERE date_times.year = $1 AND date_times.month = $2
            AND facts.tenant_id = $3
        ORDER BY categories.source
        "#,
    )
    .bind(period.year)
    .bind(period.month as i32)
    .bind(tenant.id)
    .fetch_all(&mut *conn)
    .await?;

    let mut invoice_categories = Vec::with_capacity(categories.len());
    for category in categories {
        let rows = items_for_category(conn, tenant, &category, period).await?;
        let items = build_item_hierarchy(rows);
        debug!(tenant = %tenant.source, category = %category.source, items = items.len(), "Built category");
        invoice_categories.push(InvoiceCategory::new(
            category.source,
            category.target.unwrap_or_default(),
            items,
        ));
    }

    Ok(Invoice::new(
        TenantRef {
            source: tenant.source.clone(),
            target: tenant.target.clone().unwrap_or_default(),
        },
        period.period_start(),
        period.period_end(),
        invoice_categories,
    ))
}

/// One (query, product, discount) group of a tenant's category
#[derive(Debug, Clone, FromRow)]
struct RawItem {
    query_id: Uuid,
    parent_query_id: Option<Uuid>,
    product_id: Uuid,
    discount_id: Uuid,

    description: String,
    query_name: String,
    quantity: f64,
    quantity_min: f64,
    quantity_avg: f64,
    quantity_max: f64,
    unit: String,
    price_per_unit: Decimal,
    discount: Decimal,
    product_source: String,
    product_target: String,
    total: Decimal,
}

async fn items_for_category(
    conn: &mut PgConnection,
    tenant: &Tenant,
    category: &Category,
    period: BillingMonth,
) -> Result<Vec<RawItem>> {
    let rows = sqlx::query_as::<_, RawItem>(
        r#"
        SELECT
            queries.id AS query_id,
            queries.parent_id AS parent_query_id,
            products.id AS product_id,
            discounts.id AS discount_id,
            queries.description,
            queries.name AS query_name,
            SUM(facts.quantity) AS quantity,
            MIN(facts.quantity) AS quantity_min,
            AVG(facts.quantity) AS quantity_avg,
            MAX(facts.quantity) AS quantity_max,
            queries.unit,
            products.amount AS price_per_unit,
            discounts.discount,
            products.source AS product_source,
            COALESCE(products.target, '') AS product_target,
            SUM(facts.quantity::numeric * products.amount * (1 - discounts.discount)) AS total
        FROM facts
            INNER JOIN queries    ON (facts.query_id = queries.id)
            INNER JOIN products   ON (facts.product_id = products.id)
            INNER JOIN discounts  ON (facts.discount_id = discounts.id)
            INNER JOIN date_times ON (facts.date_time_id = date_times.id)
        WHERE date_times.year = $1 AND date_times.month = $2
            AND facts.tenant_id = $3
            AND facts.category_id = $4
        GROUP BY queries.id, products.id, discounts.id
        ORDER BY queries.name, products.source, queries.id, products.id, discounts.id
        "#,
    )
    .bind(period.year)
    .bind(period.month as i32)
    .bind(tenant.id)
    .bind(category.id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// Nest sub-query rows under their main item, keeping the order of the main
/// rows. Sub rows without a main item of the parent query, product and
/// discount are dropped.
fn build_item_hierarchy(rows: Vec<RawItem>) -> Vec<Item> {
    let (mains, subs): (Vec<_>, Vec<_>) =
        rows.into_iter().partition(|r| r.parent_query_id.is_none());

    let mut items = Vec::with_capacity(mains.len());
    let mut index: HashMap<(Uuid, Uuid, Uuid), usize> = HashMap::new();
    for row in mains {
        index.insert((row.query_id, row.product_id, row.discount_id), items.len());
        items.push(row.into_item());
    }

    for row in subs {
        let Some(parent) = row.parent_query_id else {
            continue;
        };
        match index.get(&(parent, row.product_id, row.discount_id)) {
            Some(&i) => items[i].sub_items.push(row.into_sub_item()),
            None => debug!(query = %row.query_name, product = %row.product_source, "Dropping sub item without main item"),
        }
    }
    items
}

impl RawItem {
    fn into_item(self) -> Item {
        Item {
            description: self.description,
            query_name: self.query_name,
            product: ProductRef {
                source: self.product_source,
                target: self.product_target,
            },
            quantity: self.quantity,
            quantity_min: self.quantity_min,
            quantity_avg: self.quantity_avg,
            quantity_max: self.quantity_max,
            unit: self.unit,
            price_per_unit: self.price_per_unit,
            discount: self.discount,
            total: self.total,
            sub_items: Vec::new(),
        }
    }

    fn into_sub_item(self) -> SubItem {
        SubItem {
            description: self.description,
            query_name: self.query_name,
            quantity: self.quantity,
            quantity_min: self.quantity_min,
            quantity_avg: self.quantity_avg,
            quantity_max: self.quantity_max,
            unit: self.unit,
        }
    }
}
