use std::future::{Future, IntoFuture};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use alloy::network::Ethereum;
use alloy::primitives::BlockNumber;
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::json_rpc::RpcError as JsonRpcError;
use alloy::rpc::types::{Block, BlockId, BlockNumberOrTag, Filter, Log};
use alloy::transports::{TransportError, TransportResult};
use futures::stream::{self, StreamExt, TryStreamExt};
use governor::clock::{QuantaClock, QuantaInstant};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Jitter, Quota, RateLimiter};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RpcError {
    /// The request did not get a JSON-RPC answer (connection, HTTP status).
    #[error("RPC transport error: {0}")]
    Transport(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// The node answered with an error or an unusable response.
    #[error("Provider error: {0}")]
    ProviderError(String),
}

/// JSON-RPC error codes nodes and hosted providers use for throttling.
const RATE_LIMIT_CODES: [i64; 2] = [429, -32005];

impl RpcError {
    /// Transport failures and throttling are retried; answers from the node
    /// are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::Transport(_) | RpcError::RateLimitExceeded(_))
    }
}

impl From<TransportError> for RpcError {
    fn from(err: TransportError) -> Self {
        match err {
            JsonRpcError::Transport(kind) => RpcError::Transport(kind.to_string()),
            JsonRpcError::ErrorResp(payload) if RATE_LIMIT_CODES.contains(&payload.code) => {
                RpcError::RateLimitExceeded(payload.to_string())
            }
            other => RpcError::ProviderError(other.to_string()),
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (2.0 doubles the delay each retry)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Calculate the delay for a given attempt number (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let delay_ms = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32 - 1);
        let delay = Duration::from_millis(delay_ms as u64);
        std::cmp::min(delay, self.max_delay)
    }
}

/// Execute an async operation with retry logic
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, RpcError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RpcError>>,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = config.delay_for_attempt(attempt);
            tracing::warn!(
                "RPC retry {}/{} for '{}' in {:?}",
                attempt,
                config.max_retries,
                operation_name,
                delay
            );
            tokio::time::sleep(delay).await;
        }

        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!("RPC '{}' succeeded after {} retries", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                tracing::warn!(
                    "RPC '{}' failed (attempt {}/{}): {}",
                    operation_name,
                    attempt + 1,
                    config.max_retries + 1,
                    e
                );
                attempt += 1;
            }
            Err(e) => {
                if attempt > 0 {
                    tracing::error!(
                        "RPC '{}' failed after {} attempts: {}",
                        operation_name,
                        attempt + 1,
                        e
                    );
                }
                return Err(e);
            }
        }
    }
}

pub type StandardRateLimiter =
    RateLimiter<NotKeyed, InMemoryState, QuantaClock, NoOpMiddleware<QuantaInstant>>;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_second: NonZeroU32,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
}

impl RateLimitConfig {
    pub fn per_second(requests_per_second: NonZeroU32) -> Self {
        Self {
            requests_per_second,
            jitter_min_ms: 5,
            jitter_max_ms: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub url: Url,
    /// Blocks requested concurrently by `get_blocks`.
    pub max_concurrency: usize,
    pub rate_limit: Option<RateLimitConfig>,
    pub retry: RetryConfig,
}

impl RpcClientConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            max_concurrency: 10,
            rate_limit: None,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.max_concurrency = concurrency.max(1);
        self
    }

    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }
}

/// Rate-limited, retrying JSON-RPC client.
pub struct RpcClient {
    provider: RootProvider<Ethereum>,
    config: RpcClientConfig,
    rate_limiter: Option<Arc<StandardRateLimiter>>,
    jitter: Option<Jitter>,
}

impl RpcClient {
    pub fn new(config: RpcClientConfig) -> Self {
        let provider = RootProvider::<Ethereum>::new_http(config.url.clone());

        let (rate_limiter, jitter) = match &config.rate_limit {
            Some(rate_config) => {
                let quota = Quota::per_second(rate_config.requests_per_second);
                let jitter = Jitter::new(
                    Duration::from_millis(rate_config.jitter_min_ms),
                    Duration::from_millis(rate_config.jitter_max_ms),
                );
                (Some(Arc::new(RateLimiter::direct(quota))), Some(jitter))
            }
            None => (None, None),
        };

        Self {
            provider,
            config,
            rate_limiter,
            jitter,
        }
    }

    pub fn from_url(url: &str) -> Result<Self, RpcError> {
        let url = Url::parse(url).map_err(|e| RpcError::InvalidUrl(e.to_string()))?;
        Ok(Self::new(RpcClientConfig::new(url)))
    }

    /// Send one request through the rate limiter, retrying transient
    /// failures.
    async fn request<T, F, Fut>(&self, name: &str, send: F) -> Result<T, RpcError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        with_retry(&self.config.retry, name, || async {
            if let (Some(limiter), Some(jitter)) = (&self.rate_limiter, &self.jitter) {
                limiter.until_ready_with_jitter(*jitter).await;
            }
            send().await.map_err(RpcError::from)
        })
        .await
    }

    pub async fn get_block_number(&self) -> Result<BlockNumber, RpcError> {
        self.request("eth_blockNumber", || self.provider.get_block_number())
            .await
    }

    /// Header-only block (transaction hashes, no bodies).
    pub async fn get_block_by_number(&self, number: BlockNumber) -> Result<Option<Block>, RpcError> {
        let name = format!("eth_getBlockByNumber({})", number);
        self.request(&name, || {
            self.provider
                .get_block(BlockId::Number(BlockNumberOrTag::Number(number)))
                .into_future()
        })
        .await
    }

    /// Fetch `numbers` with up to `max_concurrency` requests in flight.
    /// Results keep the order of `numbers`.
    pub async fn get_blocks(&self, numbers: &[BlockNumber]) -> Result<Vec<Option<Block>>, RpcError> {
        stream::iter(numbers.iter().copied())
            .map(|number| self.get_block_by_number(number))
            .buffered(self.config.max_concurrency)
            .try_collect()
            .await
    }

    pub async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, RpcError> {
        let name = format!(
            "eth_getLogs({:?}-{:?})",
            filter.get_from_block(),
            filter.get_to_block()
        );
        self.request(&name, || self.provider.get_logs(filter)).await
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("config", &self.config)
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use alloy::rpc::json_rpc::ErrorPayload;
    use alloy::transports::TransportErrorKind;

    use super::*;

    fn payload(code: i64, message: &'static str) -> ErrorPayload {
        ErrorPayload {
            code,
            message: message.into(),
            data: None,
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig::new(5).with_initial_delay(Duration::from_millis(100));

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(config.delay_for_attempt(20), Duration::from_secs(30));
    }

    #[test]
    fn test_transport_error_classification() {
        let transport: RpcError = TransportErrorKind::custom_str("connection reset").into();
        assert!(matches!(transport, RpcError::Transport(_)));
        assert!(transport.is_retryable());

        let throttled: RpcError = TransportError::ErrorResp(payload(429, "too many requests")).into();
        assert!(matches!(throttled, RpcError::RateLimitExceeded(_)));
        assert!(throttled.is_retryable());

        let too_wide: RpcError =
            TransportError::ErrorResp(payload(-32602, "query returned more than 10000 results")).into();
        assert!(matches!(too_wide, RpcError::ProviderError(_)));
        assert!(!too_wide.is_retryable());

        assert!(!RpcError::InvalidUrl("nope".into()).is_retryable());
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_transient_errors() {
        let config = RetryConfig::new(3).with_initial_delay(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = with_retry(&config, "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(RpcError::Transport("connection reset".into()))
            } else {
                Ok(7u64)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_stops_on_permanent_error() {
        let config = RetryConfig::new(3).with_initial_delay(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_retry(&config, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RpcError::InvalidUrl("bad".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
