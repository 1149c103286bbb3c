//! Report ingestion
//!
//! A report run turns the samples of one named query at one hour into facts:
//!
//! 1. Resolve the query valid at the hour
//! 2. Evaluate it at `hour + 1h` (the source looks backwards)
//! 3. Per sample: upsert tenant and category, resolve product and discount by
//!    lookup keys, upsert the date-time and the fact
//! 4. Repeat 2-3 for every sub-query valid at the hour
//!
//! A run is one transaction. A range is one run per hour, strictly in order,
//! and stops at the first failing hour.

mod options;

pub use options::{Progress, ProgressReporter, ReportOptions};

use std::future::Future;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use meterbook_common::{
    ensure_hour_aligned, hours, HourBucket, MeterbookError, MetricsSourceError, Result, Sample,
    SourceKey, ValidationError, CATEGORY_LABEL, PRODUCT_LABEL, TENANT_LABEL,
};
use meterbook_store::dimension::{
    find_by_source_keys, find_query_at, sub_queries_at, upsert_category, upsert_date_time,
    upsert_fact, upsert_tenant,
};
use meterbook_store::{Discount, FactKey, Product, Query, Store};
use sqlx::PgConnection;
use tracing::{debug, info, instrument, warn};

use crate::source::MetricsSource;

/// Metrics source queries slower than this are logged
const SLOW_QUERY: std::time::Duration = std::time::Duration::from_secs(10);

/// Ingest `query_name` at hour `ts` in its own transaction.
///
/// Returns the number of facts written. Nothing is written on error.
#[instrument(skip(store, source, opts), fields(query = query_name, ts = %ts))]
pub async fn run(
    store: &Store,
    source: &dyn MetricsSource,
    query_name: &str,
    ts: DateTime<Utc>,
    opts: &ReportOptions,
) -> Result<usize> {
    ensure_hour_aligned(ts)?;

    let result = async {
        let mut tx = store.begin().await?;
        let facts = run_in_tx(&mut *tx, source, query_name, ts, opts).await?;
        tx.commit().await?;
        Ok::<_, MeterbookError>(facts)
    }
    .await;

    if let Some(metrics) = &opts.metrics {
        match &result {
            Ok(facts) => {
                metrics.runs_total.inc();
                metrics.facts_upserted_total.inc_by(*facts as u64);
            }
            Err(_) => metrics.failures_total.inc(),
        }
    }
    if let Ok(facts) = &result {
        info!(facts = *facts, "Report run complete");
    }
    result
}

/// Ingest `query_name` at hour `ts` inside a caller-owned transaction
pub async fn run_in_tx(
    conn: &mut PgConnection,
    source: &dyn MetricsSource,
    query_name: &str,
    ts: DateTime<Utc>,
    opts: &ReportOptions,
) -> Result<usize> {
    ensure_hour_aligned(ts)?;

    let query = find_query_at(conn, query_name, ts).await?;
    let mut facts = ingest_query(conn, source, &query, ts, opts).await?;

    for sub in sub_queries_at(conn, query.id, ts).await? {
        debug!(sub_query = %sub.name, "Running sub-query");
        facts += ingest_query(conn, source, &sub, ts, opts).await?;
    }
    Ok(facts)
}

/// Ingest every hour of `[from, until)` in order, one transaction per hour.
///
/// Returns the number of hours completed. On failure, returns
/// [`MeterbookError::RangeAborted`] with the hours completed before the
/// failing one; those stay committed.
#[instrument(skip(store, source, opts), fields(query = query_name, from = %from, until = %until))]
pub async fn run_range(
    store: &Store,
    source: &dyn MetricsSource,
    query_name: &str,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
    opts: &ReportOptions,
) -> Result<usize> {
    ensure_hour_aligned(from)?;
    if until < from {
        return Err(ValidationError::InvalidRange { from, until }.into());
    }

    let count = drive_hours(
        hours(from, until),
        |ts| run(store, source, query_name, ts, opts),
        opts.progress.as_deref(),
    )
    .await?;
    info!(count, "Report range complete");
    Ok(count)
}

/// Run `run_hour` for each hour in order, stopping at the first error
async fn drive_hours<I, F, Fut>(
    hours: I,
    mut run_hour: F,
    progress: Option<&(dyn Fn(Progress) + Send + Sync)>,
) -> Result<usize>
where
    I: IntoIterator<Item = DateTime<Utc>>,
    F: FnMut(DateTime<Utc>) -> Fut,
    Fut: Future<Output = Result<usize>>,
{
    let mut completed = 0;
    for ts in hours {
        if let Err(err) = run_hour(ts).await {
            warn!(%ts, completed, error = %err, "Report range aborted");
            return Err(MeterbookError::RangeAborted {
                completed,
                at: ts,
                source: Box::new(err),
            });
        }
        completed += 1;
        if let Some(report) = progress {
            report(Progress {
                timestamp: ts,
                count: completed,
            });
        }
    }
    Ok(completed)
}

async fn ingest_query(
    conn: &mut PgConnection,
    source: &dyn MetricsSource,
    query: &Query,
    ts: DateTime<Utc>,
    opts: &ReportOptions,
) -> Result<usize> {
    let samples = fetch_samples(source, query, ts + Duration::hours(1), opts).await?;
    debug!(query = %query.name, samples = samples.len(), "Fetched samples");

    let bucket = HourBucket::from_timestamp(ts);
    for sample in &samples {
        process_sample(conn, query, &bucket, sample).await?;
    }
    Ok(samples.len())
}

async fn fetch_samples(
    source: &dyn MetricsSource,
    query: &Query,
    at: DateTime<Utc>,
    opts: &ReportOptions,
) -> Result<Vec<Sample>> {
    let started = Instant::now();
    let samples = match opts.query_timeout {
        Some(limit) => tokio::time::timeout(limit, source.query(&query.query, at))
            .await
            .map_err(|_| MetricsSourceError::Timeout(limit))?,
        None => source.query(&query.query, at).await,
    };

    let elapsed = started.elapsed();
    if let Some(metrics) = &opts.metrics {
        metrics
            .metrics_query_duration_seconds
            .observe(elapsed.as_secs_f64());
    }
    if elapsed > SLOW_QUERY {
        warn!(query = %query.name, elapsed_ms = elapsed.as_millis() as u64, "Slow metrics source query");
    }
    samples
}

async fn process_sample(
    conn: &mut PgConnection,
    query: &Query,
    bucket: &HourBucket,
    sample: &Sample,
) -> Result<()> {
    let category = sample.label(CATEGORY_LABEL)?;
    let tenant = sample.label(TENANT_LABEL)?;
    let product_label = sample.label(PRODUCT_LABEL)?;
    let key = SourceKey::parse(product_label)?;
    ensure_finite(query, product_label, sample.value)?;

    let tenant = upsert_tenant(conn, tenant).await?;
    let category = upsert_category(conn, category).await?;

    let lookup = key.lookup_keys();
    let product: Product = find_by_source_keys(conn, &lookup, bucket.timestamp).await?;
    let discount: Discount = find_by_source_keys(conn, &lookup, bucket.timestamp).await?;

    let date_time = upsert_date_time(conn, bucket).await?;
    let fact = upsert_fact(
        conn,
        &FactKey {
            date_time_id: date_time.id,
            query_id: query.id,
            tenant_id: tenant.id,
            category_id: category.id,
            product_id: product.id,
            discount_id: discount.id,
        },
        sample.value,
    )
    .await?;

    debug!(
        fact = %fact.id,
        tenant = %tenant.source,
        category = %category.source,
        product = %product.source,
        quantity = fact.quantity,
        "Upserted fact"
    );
    Ok(())
}

/// NaN and infinities cannot be priced
fn ensure_finite(query: &Query, product: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        return Ok(());
    }
    Err(ValidationError::NonFiniteValue {
        query: query.name.clone(),
        product: product.to_string(),
        value,
    }
    .into())
}
