//! Block sources.
//!
//! A source delivers normalized [`BlockData`] for a height range. The
//! processor only relies on the [`BlockSource`] interface; [`RpcSource`]
//! reads EVM logs over JSON-RPC and [`MemorySource`] serves a fixed block
//! list (tests and replays of recorded data).

mod evm;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::rpc::RpcError;
use crate::types::block::BlockData;

pub use evm::RpcSource;
pub use memory::MemorySource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Block {0} not found")]
    BlockNotFound(u64),

    #[error("Source returned block {height} outside of the requested range {from}-{to}")]
    UnexpectedBlock { height: u64, from: u64, to: u64 },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Height of the newest block the source can deliver.
    async fn chain_height(&self) -> Result<u64, SourceError>;

    /// Blocks with heights in `from..=to`, strictly ascending. Heights the
    /// source has nothing for may be skipped.
    async fn fetch_blocks(&self, from: u64, to: u64) -> Result<Vec<BlockData>, SourceError>;
}
