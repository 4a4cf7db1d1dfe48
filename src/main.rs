use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use taxi_etl::{
    config::EtlConfig,
    fetch,
    history::RunHistory,
    pipeline::Pipeline,
    runner::TaskRunner,
    storage::BlockRegistry,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Download monthly taxi trip CSVs, store them as parquet and upload them
/// to a bucket.
#[derive(Parser, Debug)]
#[command(name = "taxi-etl")]
struct Args {
    /// YAML config file; defaults reproduce green/2020/11
    #[arg(long)]
    config: Option<PathBuf>,

    /// YAML file with the named bucket blocks
    #[arg(long, default_value = "blocks.yaml")]
    blocks: PathBuf,

    #[arg(long)]
    color: Option<String>,

    #[arg(long)]
    year: Option<i32>,

    /// Comma-separated months, e.g. 1,2,3
    #[arg(long, value_delimiter = ',')]
    months: Option<Vec<u32>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configuration ────────────────────────────────────────────
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => EtlConfig::from_file(path)?,
        None => EtlConfig::default(),
    };
    if let Some(color) = args.color {
        config.color = color;
    }
    if let Some(year) = args.year {
        config.year = year;
    }
    if let Some(months) = args.months {
        config.months = months;
    }
    config.validate().context("invalid configuration")?;
    info!(color = %config.color, year = config.year, months = ?config.months, "configuration");

    // ─── 3) resolve the bucket block before touching the network ─────
    let registry = BlockRegistry::from_file(&args.blocks)?;
    let store = registry.resolve(&config.bucket_block).await?;

    // ─── 4) task runner + optional history ───────────────────────────
    let flow_run = format!("etl-web-to-gcs-{}", Utc::now().format("%Y%m%dT%H%M%S%3f"));
    let mut runner = TaskRunner::new(flow_run.clone())
        .with_retries(config.retries, config.retry_delay());
    if let Some(dir) = &config.history_dir {
        runner = runner.with_observer(Arc::new(RunHistory::new(dir)?));
    }

    // ─── 5) run the flow ─────────────────────────────────────────────
    let client = fetch::http_client(config.http_timeout())?;
    let pipeline = Pipeline::new(config, client, store, runner);
    let summary = pipeline.run().await?;

    for outcome in &summary.completed {
        info!(
            dataset = %outcome.dataset,
            rows = outcome.rows,
            object = %outcome.remote_key,
            "month done"
        );
    }
    info!(flow_run = %flow_run, "all done");
    Ok(())
}
