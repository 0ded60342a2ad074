//! Handlers shipped with the indexer, enabled from configuration.
//!
//! Add new handler modules here and register them in `register_handlers`.

pub mod block_headers;
pub mod erc20_transfer;

use crate::types::config::handlers::HandlersConfig;

use super::builder::{BlockHookOptions, ProcessorBuilder};
use super::error::ConfigError;

/// Register every handler enabled in `config`.
pub fn register_handlers(builder: &mut ProcessorBuilder, config: &HandlersConfig) -> Result<(), ConfigError> {
    if config.is_empty() {
        tracing::warn!("No built-in handlers enabled");
    }

    if let Some(range) = config.block_headers {
        builder.add_pre_hook(BlockHookOptions { range }, block_headers::BlockHeaderHandler);
    }

    for transfer in &config.erc20_transfers {
        erc20_transfer::register(builder, transfer)?;
    }

    tracing::info!("Registered {} built-in handlers", builder.handler_count());
    Ok(())
}
