//! Meterbook - usage reporting and invoicing from Prometheus metrics

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use meterbook_common::MeterbookError;
use meterbook_engine::{invoice, report, PrometheusSource, Progress, ReportMetrics, ReportOptions};
use meterbook_store::{check, seeds, Store};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogSettings, MeterbookConfig};

#[derive(Debug, Parser)]
#[command(name = "meterbook", version, about)]
struct Cli {
    /// Config file, defaults to ./meterbook.toml if present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database URL, overrides the configured one
    #[arg(long, global = true, env = "DATABASE_URL")]
    db_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply pending schema migrations
    Migrate,
    /// Create the default queries if missing
    Seed,
    /// Ingest a query for one hour or a range of hours
    Report {
        /// Name of the query to run
        #[arg(long)]
        query_name: String,
        /// Hour to ingest (RFC 3339, truncated to the hour)
        #[arg(long)]
        begin: DateTime<Utc>,
        /// Ingest every hour from --begin up to this instant (exclusive)
        #[arg(long)]
        repeat_until: Option<DateTime<Utc>>,
        /// Prometheus URL, overrides the configured one
        #[arg(long)]
        prom_url: Option<String>,
        /// Timeout for each Prometheus query in seconds
        #[arg(long)]
        prom_query_timeout: Option<u64>,
    },
    /// Print the invoices of a month as JSON
    Invoice {
        #[arg(long)]
        year: i32,
        /// Month, 1-12
        #[arg(long)]
        month: u32,
    },
    /// List data missing for invoicing
    Check,
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let registry = tracing_subscriber::registry().with(filter);
    if log.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = MeterbookConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.db_url {
        cfg.database.url = url;
    }
    init_tracing(&cfg.log);

    let store = Store::connect(&cfg.database.url, &cfg.database.pool_config())
        .await
        .context("failed to connect to database")?;

    match cli.command {
        Command::Migrate => {
            store.migrate().await.context("migration failed")?;
        }
        Command::Seed => {
            let mut conn = store.pool().acquire().await?;
            let created = seeds::seed(&mut conn).await.context("seeding failed")?;
            println!("Created {} default queries", created.len());
        }
        Command::Report {
            query_name,
            begin,
            repeat_until,
            prom_url,
            prom_query_timeout,
        } => {
            if let Some(url) = prom_url {
                cfg.prometheus.url = url;
            }
            let timeout = prom_query_timeout
                .map(Duration::from_secs)
                .or_else(|| cfg.prometheus.query_timeout());
            run_report(&store, &cfg, &query_name, begin, repeat_until, timeout).await?;
        }
        Command::Invoice { year, month } => {
            let invoices = invoice::generate(&store, year, month)
                .await
                .with_context(|| format!("failed to generate invoices for {year}-{month:02}"))?;
            println!("{}", serde_json::to_string_pretty(&invoices)?);
        }
        Command::Check => {
            let mut conn = store.pool().acquire().await?;
            let missing = check::missing(&mut conn).await.context("check failed")?;
            for m in &missing {
                println!("{}\t{}\t{}\t{}", m.table, m.missing_field, m.source, m.id);
            }
            if !missing.is_empty() {
                bail!("{} fields missing", missing.len());
            }
        }
    }
    Ok(())
}

async fn run_report(
    store: &Store,
    cfg: &MeterbookConfig,
    query_name: &str,
    begin: DateTime<Utc>,
    repeat_until: Option<DateTime<Utc>>,
    timeout: Option<Duration>,
) -> Result<()> {
    let source = PrometheusSource::new(cfg.prometheus.url.clone());

    let registry = prometheus::Registry::new();
    let metrics = Arc::new(ReportMetrics::new()?);
    metrics.register(&registry)?;

    let mut opts = ReportOptions::new()
        .with_metrics(metrics.clone())
        .with_progress(|p: Progress| {
            info!(timestamp = %p.timestamp, count = p.count, "Report progress");
        });
    if let Some(timeout) = timeout {
        opts = opts.with_query_timeout(timeout);
    }

    match repeat_until {
        None => {
            let facts = report::run(store, &source, query_name, begin, &opts)
                .await
                .with_context(|| format!("report '{query_name}' at {begin} failed"))?;
            println!("Wrote {facts} facts for {begin}");
        }
        Some(until) => match report::run_range(store, &source, query_name, begin, until, &opts).await {
            Ok(count) => println!("Completed {count} hours"),
            Err(err @ MeterbookError::RangeAborted { completed, .. }) => {
                println!("Completed {completed} hours before failure");
                return Err(err).with_context(|| format!("report '{query_name}' aborted"));
            }
            Err(err) => return Err(err).context("report range failed"),
        },
    }

    info!(
        runs = metrics.runs_total.get(),
        facts = metrics.facts_upserted_total.get(),
        "Report finished"
    );
    Ok(())
}
