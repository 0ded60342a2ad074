mod client;

pub use client::{
    with_retry, RateLimitConfig, RetryConfig, RpcClient, RpcClientConfig, RpcError,
};
