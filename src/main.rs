use std::env;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use block_replay_indexer::db::PostgresStore;
use block_replay_indexer::processor::builtin::register_handlers;
use block_replay_indexer::processor::ProcessorBuilder;
use block_replay_indexer::rpc::{RateLimitConfig, RetryConfig, RpcClient, RpcClientConfig};
use block_replay_indexer::source::{BlockSource, MemorySource, RpcSource};
use block_replay_indexer::types::config::indexer::{IndexerConfig, SourceConfig};

const DEFAULT_CONFIG_PATH: &str = "config/config.json";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Indexer stopped: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config_path = config_path_from_args(env::args().skip(1))?;
    let config = IndexerConfig::load(&config_path)?;
    load_required_env_vars(&config)?;

    tracing::info!(
        "Loaded config from {}: range {}, batch size {}",
        config_path.display(),
        config.block_range,
        config.batch_size
    );

    let database_url = env::var(&config.database_url_env_var)
        .with_context(|| format!("{} is not set", config.database_url_env_var))?;
    let store = PostgresStore::new(&database_url, config.max_connections)
        .await
        .context("Failed to connect to the database")?;
    store
        .run_migrations(&config.migrations_dir)
        .await
        .context("Failed to run migrations")?;

    let source = build_source(&config)?;

    let mut builder = ProcessorBuilder::new();
    builder
        .set_block_range(config.block_range)
        .set_batch_size(config.batch_size)?
        .set_poll_interval(Duration::from_millis(config.poll_interval_ms))
        .set_progress_interval(Duration::from_millis(config.progress_interval_ms))
        .set_follow_head(config.follow_head);
    register_handlers(&mut builder, &config.handlers)?;
    if builder.handler_count() == 0 {
        tracing::warn!("No handlers enabled in config, nothing will be indexed");
    }
    let processor = builder.build();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, finishing current block");
            let _ = shutdown_tx.send(true);
        }
    });

    processor.run(source.as_ref(), &store, shutdown_rx).await?;
    Ok(())
}

fn config_path_from_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<PathBuf> {
    let mut path = PathBuf::from(DEFAULT_CONFIG_PATH);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args.next().context("--config requires a path")?;
                path = PathBuf::from(value);
            }
            other => anyhow::bail!("Unknown argument: {}", other),
        }
    }
    Ok(path)
}

fn build_source(config: &IndexerConfig) -> anyhow::Result<Box<dyn BlockSource>> {
    match &config.source {
        SourceConfig::File { path } => Ok(Box::new(MemorySource::from_json_file(path)?)),
        SourceConfig::Rpc => {
            let url = env::var(&config.rpc_url_env_var)
                .with_context(|| format!("{} is not set", config.rpc_url_env_var))?;
            let url = url::Url::parse(&url).context("Invalid RPC URL")?;

            let mut client_config = RpcClientConfig::new(url)
                .with_concurrency(config.rpc.concurrency)
                .with_retry(RetryConfig::new(config.rpc.max_retries));
            if let Some(rps) = NonZeroU32::new(config.rpc.requests_per_second) {
                client_config = client_config.with_rate_limit(RateLimitConfig::per_second(rps));
            }

            let client = Arc::new(RpcClient::new(client_config));
            // headers only unless an EVM-log handler needs logs
            let source = RpcSource::new(client).with_logs_of(config.handlers.contracts())?;
            Ok(Box::new(source))
        }
    }
}

/// Ensures all required env vars are set, loading .env if needed.
fn load_required_env_vars(config: &IndexerConfig) -> anyhow::Result<()> {
    let mut required = vec![config.database_url_env_var.as_str()];
    if config.source == SourceConfig::Rpc {
        required.push(config.rpc_url_env_var.as_str());
    }

    let missing: Vec<&str> = required
        .iter()
        .filter(|var| env::var(var).is_err())
        .copied()
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    dotenvy::dotenv().with_context(|| {
        format!("Missing env vars {:?} and failed to load .env file", missing)
    })?;

    let still_missing: Vec<&str> = required
        .iter()
        .filter(|var| env::var(var).is_err())
        .copied()
        .collect();

    anyhow::ensure!(
        still_missing.is_empty(),
        "Missing required env vars after loading .env: {:?}",
        still_missing
    );

    Ok(())
}
