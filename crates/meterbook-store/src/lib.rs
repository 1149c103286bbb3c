//! # Meterbook Store
//!
//! PostgreSQL persistence for the reporting pipeline.
//!
//! ## Tables
//!
//! - Catalog: `queries`, `products`, `discounts`, each with a `tstzrange`
//!   validity and an exclusion constraint against overlapping versions
//! - Dimensions: `tenants`, `categories`, `date_times`
//! - `facts`: one quantity per (hour, query, tenant, category, product, discount)
//!
//! All data access functions take a `&mut PgConnection`, so they run the same
//! on a pooled connection or inside a [`sqlx::Transaction`].

pub mod check;
pub mod dimension;
pub mod models;
pub mod seeds;

use std::time::Duration;

use meterbook_common::{MeterbookError, Result};
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, instrument};

pub use check::MissingField;
pub use dimension::TemporalTable;
pub use models::{
    Category, DateTimeRow, Discount, Fact, FactKey, NewDiscount, NewProduct, NewQuery, Product,
    Query, Tenant,
};

/// Embedded schema migrations
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Connection pool settings
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout_secs: 30,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(MeterbookError::Config(
                "max_connections must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Handle to the reporting database
#[derive(Debug, Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connect a new pool
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, config: &PoolConfig) -> Result<Self> {
        config.validate()?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(database_url)
            .await?;
        info!(max_connections = config.max_connections, "Connected to database");
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| MeterbookError::Storage(e.into()))?;
        info!("Database schema up to date");
        Ok(())
    }

    /// Start a read-write transaction. Rolls back when dropped uncommitted.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    /// Start a read-only transaction
    pub async fn begin_read_only(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}
