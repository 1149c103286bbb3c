//! Store tests against a live PostgreSQL (`DATABASE_URL`)

#![cfg(feature = "postgres-tests")]

use chrono::{DateTime, TimeZone, Utc};
use meterbook_common::{HourBucket, MeterbookError, Result, SourceKey, Validity};
use meterbook_store::dimension::{
    find_by_source_keys, find_query_at, sub_queries_at, upsert_category, upsert_date_time,
    upsert_tenant, update_category_target,
};
use meterbook_store::models::{create_discount, create_product, create_query};
use meterbook_store::{check, seeds, Discount, NewDiscount, NewProduct, NewQuery, Product};
use rust_decimal_macros::dec;
use sqlx::PgPool;

fn year(y: i32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap()
}

fn product(source: &str, during: Validity) -> NewProduct {
    NewProduct {
        source: source.to_string(),
        target: Some("article".to_string()),
        amount: dec!(1),
        unit: "MiB".to_string(),
        during,
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_product_validity_must_not_overlap(pool: PgPool) -> Result<()> {
    let mut conn = pool.acquire().await?;
    create_product(&mut conn, &product("p", Validity::between(year(2000), year(2020)))).await?;

    let err = create_product(&mut conn, &product("p", Validity::between(year(2019), year(2021))))
        .await
        .unwrap_err();
    assert_eq!(err.constraint_code().as_deref(), Some("23P01"));

    // Adjacent and different-source rows are fine
    create_product(&mut conn, &product("p", Validity::since(year(2020)))).await?;
    create_product(&mut conn, &product("q", Validity::unbounded())).await?;
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_discount_validity_and_range(pool: PgPool) -> Result<()> {
    let mut conn = pool.acquire().await?;
    let new = |discount, during| NewDiscount {
        source: "p".to_string(),
        discount,
        during,
    };
    create_discount(&mut conn, &new(dec!(0.5), Validity::until(year(2020)))).await?;

    let overlap = create_discount(&mut conn, &new(dec!(0.1), Validity::unbounded()))
        .await
        .unwrap_err();
    assert_eq!(overlap.constraint_code().as_deref(), Some("23P01"));

    let out_of_range = create_discount(&mut conn, &new(dec!(1.5), Validity::since(year(2020))))
        .await
        .unwrap_err();
    assert_eq!(out_of_range.constraint_code().as_deref(), Some("23514"));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_query_validity_must_not_overlap(pool: PgPool) -> Result<()> {
    let mut conn = pool.acquire().await?;
    let new = |during| NewQuery {
        name: "memory".to_string(),
        query: "up".to_string(),
        during,
        ..Default::default()
    };
    create_query(&mut conn, &new(Validity::until(year(2021)))).await?;
    let err = create_query(&mut conn, &new(Validity::since(year(2020))))
        .await
        .unwrap_err();
    assert_eq!(err.constraint_code().as_deref(), Some("23P01"));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_most_specific_product_wins(pool: PgPool) -> Result<()> {
    let mut conn = pool.acquire().await?;
    let generic = create_product(&mut conn, &product("p", Validity::unbounded())).await?;
    let wildcard = create_product(&mut conn, &product("p:*:t", Validity::unbounded())).await?;
    let exact = create_product(&mut conn, &product("p:c:t", Validity::unbounded())).await?;

    let at = year(2021);
    let keys = SourceKey::parse("p:c:t:ns")?.lookup_keys();
    let found: Product = find_by_source_keys(&mut conn, &keys, at).await?;
    assert_eq!(found.id, exact.id);

    let keys = SourceKey::parse("p:other:t:ns")?.lookup_keys();
    let found: Product = find_by_source_keys(&mut conn, &keys, at).await?;
    assert_eq!(found.id, wildcard.id);

    let keys = SourceKey::parse("p:c:other:ns")?.lookup_keys();
    let found: Product = find_by_source_keys(&mut conn, &keys, at).await?;
    assert_eq!(found.id, generic.id);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_lookup_respects_validity(pool: PgPool) -> Result<()> {
    let mut conn = pool.acquire().await?;
    let old = create_discount(
        &mut conn,
        &NewDiscount {
            source: "p".to_string(),
            discount: dec!(0),
            during: Validity::until(year(2021)),
        },
    )
    .await?;
    let keys = SourceKey::parse("p:c:t:ns")?.lookup_keys();

    let found: Discount = find_by_source_keys(&mut conn, &keys, year(2020)).await?;
    assert_eq!(found.id, old.id);

    let err = find_by_source_keys::<Discount>(&mut conn, &keys, year(2021))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_query_and_sub_queries_at(pool: PgPool) -> Result<()> {
    let mut conn = pool.acquire().await?;
    let parent = create_query(
        &mut conn,
        &NewQuery {
            name: "memory".to_string(),
            query: "up".to_string(),
            ..Default::default()
        },
    )
    .await?;
    create_query(
        &mut conn,
        &NewQuery {
            parent_id: Some(parent.id),
            name: "memory_sub".to_string(),
            query: "up".to_string(),
            during: Validity::since(year(2021)),
            ..Default::default()
        },
    )
    .await?;

    assert_eq!(find_query_at(&mut conn, "memory", year(2020)).await?.id, parent.id);
    assert!(matches!(
        find_query_at(&mut conn, "nope", year(2020)).await,
        Err(MeterbookError::NotFound(_))
    ));
    assert!(sub_queries_at(&mut conn, parent.id, year(2020)).await?.is_empty());
    assert_eq!(sub_queries_at(&mut conn, parent.id, year(2022)).await?.len(), 1);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_upserts_return_existing_rows(pool: PgPool) -> Result<()> {
    let mut conn = pool.acquire().await?;
    let tenant = upsert_tenant(&mut conn, "acme").await?;
    assert_eq!(upsert_tenant(&mut conn, "acme").await?.id, tenant.id);

    let category = upsert_category(&mut conn, "c:ns").await?;
    update_category_target(&mut conn, category.id, Some("erp-1")).await?;
    let again = upsert_category(&mut conn, "c:ns").await?;
    assert_eq!(again.id, category.id);
    assert_eq!(again.target.as_deref(), Some("erp-1"));

    let bucket = HourBucket::from_timestamp(year(2021));
    let dt = upsert_date_time(&mut conn, &bucket).await?;
    assert_eq!(upsert_date_time(&mut conn, &bucket).await?.id, dt.id);
    assert_eq!((dt.year, dt.month, dt.day, dt.hour), (2021, 1, 1, 0));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_seed_is_idempotent(pool: PgPool) -> Result<()> {
    let mut conn = pool.acquire().await?;
    assert_eq!(seeds::seed(&mut conn).await?.len(), seeds::DEFAULT_QUERIES.len());
    assert!(seeds::seed(&mut conn).await?.is_empty());

    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM queries")
        .fetch_one(&mut *conn)
        .await?;
    assert_eq!(count as usize, seeds::DEFAULT_QUERIES.len());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_missing_fields(pool: PgPool) -> Result<()> {
    let mut conn = pool.acquire().await?;
    upsert_tenant(&mut conn, "acme").await?;
    upsert_category(&mut conn, "c:ns").await?;
    create_product(
        &mut conn,
        &NewProduct {
            source: "p".to_string(),
            ..Default::default()
        },
    )
    .await?;
    create_product(&mut conn, &product("complete", Validity::unbounded())).await?;

    let missing = check::missing(&mut conn).await?;
    let summary: Vec<_> = missing
        .iter()
        .map(|m| (m.table.as_str(), m.missing_field.as_str(), m.source.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("categories", "target", "c:ns"),
            ("products", "amount", "p"),
            ("products", "target", "p"),
            ("products", "unit", "p"),
            ("tenants", "target", "acme"),
        ]
    );
    Ok(())
}
