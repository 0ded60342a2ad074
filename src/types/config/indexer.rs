use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::types::config::handlers::HandlersConfig;
use crate::types::range::Range;

/// Where blocks come from.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// EVM JSON-RPC node, URL taken from `rpc_url_env_var`.
    #[default]
    Rpc,
    /// JSON file holding an array of blocks, relative to the config file.
    File { path: PathBuf },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Block requests in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            max_retries: default_max_retries(),
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default = "default_rpc_url_env_var")]
    pub rpc_url_env_var: String,

    /// PostgreSQL connection string environment variable.
    #[serde(default = "default_database_url_env_var")]
    pub database_url_env_var: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Directory of `*.sql` migrations, relative to the config file.
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,

    #[serde(default)]
    pub block_range: Range,

    /// Blocks requested from the source at once.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    #[serde(default = "default_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_interval_ms")]
    pub progress_interval_ms: u64,

    /// Keep polling for new blocks once an open-ended range has caught up.
    #[serde(default)]
    pub follow_head: bool,

    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub handlers: HandlersConfig,
}

impl IndexerConfig {
    /// Read and validate the config file. Relative paths inside it are
    /// resolved against the file's directory.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        let mut config: IndexerConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

        let base_dir = path.parent().unwrap_or(Path::new("."));
        config.migrations_dir = base_dir.join(&config.migrations_dir);
        if let SourceConfig::File { path } = &mut config.source {
            *path = base_dir.join(&*path);
        }

        if config.batch_size == 0 {
            anyhow::bail!("batch_size must be greater than zero");
        }
        Ok(config)
    }
}

fn default_rpc_url_env_var() -> String {
    "RPC_URL".to_string()
}

fn default_database_url_env_var() -> String {
    "DATABASE_URL".to_string()
}

fn default_max_connections() -> usize {
    16
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("../migrations")
}

fn default_batch_size() -> u64 {
    100
}

fn default_interval_ms() -> u64 {
    5000
}

fn default_requests_per_second() -> u32 {
    10
}

fn default_max_retries() -> u32 {
    5
}

fn default_concurrency() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: IndexerConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config.source, SourceConfig::Rpc);
        assert_eq!(config.block_range, Range::full());
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.rpc.max_retries, 5);
        assert!(!config.follow_head);
        assert!(config.handlers.erc20_transfers.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config: IndexerConfig = serde_json::from_str(
            r#"{
                "source": { "kind": "file", "path": "blocks.json" },
                "block_range": { "from": 17000000, "to": 17001000 },
                "batch_size": 50,
                "rpc": { "requests_per_second": 25 },
                "handlers": {
                    "block_headers": { "from": 17000000 },
                    "erc20_transfers": [
                        { "contract": "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", "range": { "from": 17000500 } }
                    ]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.source,
            SourceConfig::File {
                path: PathBuf::from("blocks.json")
            }
        );
        assert_eq!(config.block_range, Range::bounded(17_000_000, 17_001_000).unwrap());
        assert_eq!(config.rpc.requests_per_second, 25);
        assert_eq!(config.rpc.max_retries, 5);
        assert_eq!(config.handlers.block_headers, Some(Range::starting_at(17_000_000)));
        assert_eq!(config.handlers.erc20_transfers[0].range, Range::starting_at(17_000_500));
    }

    #[test]
    fn test_rejects_inverted_range() {
        let result: Result<IndexerConfig, _> =
            serde_json::from_str(r#"{ "block_range": { "from": 10, "to": 5 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = std::env::temp_dir().join(format!("indexer-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, r#"{ "source": { "kind": "file", "path": "blocks.json" } }"#).unwrap();

        let config = IndexerConfig::load(&path).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(config.source, SourceConfig::File { path: dir.join("blocks.json") });
        assert_eq!(config.migrations_dir, dir.join("../migrations"));
    }
}
