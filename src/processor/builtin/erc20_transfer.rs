use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;

use crate::db::DbValue;
use crate::processor::builder::{EvmLogHandlerOptions, ProcessorBuilder};
use crate::processor::context::BlockContext;
use crate::processor::error::{ConfigError, HandlerError};
use crate::processor::matching::{evm_log_address, evm_log_topics, TopicFilter};
use crate::processor::traits::EventHandler;
use crate::types::block::Event;
use crate::types::config::handlers::Erc20TransferConfig;

pub const TABLE: &str = "erc20_transfers";

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: &str = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// Records ERC-20 `Transfer` logs in the `erc20_transfers` table.
pub struct Erc20TransferHandler;

impl Erc20TransferHandler {
    /// `None` for logs that share the signature but are not ERC-20 transfers.
    fn decode(&self, event: &Event) -> Result<Option<Transfer>, HandlerError> {
        let topics = evm_log_topics(&event.args);
        // ERC-721 indexes the token id as a fourth topic.
        if topics.len() != 3 {
            tracing::debug!("Skipping Transfer log with {} topics", topics.len());
            return Ok(None);
        }

        let data = event
            .args
            .get("data")
            .and_then(|d| d.as_str())
            .ok_or_else(|| HandlerError::MissingField("data".to_string()))?;
        let data = hex::decode(data.trim_start_matches("0x"))
            .map_err(|e| HandlerError::DecodeError(format!("data is not hex: {}", e)))?;
        let value = U256::try_from_be_slice(&data)
            .ok_or_else(|| HandlerError::DecodeError(format!("{} bytes of data for uint256", data.len())))?;

        Ok(Some(Transfer {
            contract: evm_log_address(&event.args).ok_or_else(|| HandlerError::MissingField("address".to_string()))?,
            from: topic_address(&topics[1])?,
            to: topic_address(&topics[2])?,
            value,
            transaction_hash: event
                .args
                .get("transaction_hash")
                .and_then(|h| h.as_str())
                .map(str::to_string),
        }))
    }
}

struct Transfer {
    contract: String,
    from: Address,
    to: Address,
    value: U256,
    transaction_hash: Option<String>,
}

fn topic_address(topic: &str) -> Result<Address, HandlerError> {
    let word = topic
        .parse::<B256>()
        .map_err(|e| HandlerError::DecodeError(format!("invalid topic {}: {}", topic, e)))?;
    Ok(Address::from_word(word))
}

#[async_trait]
impl EventHandler for Erc20TransferHandler {
    fn name(&self) -> &'static str {
        "Erc20TransferHandler"
    }

    async fn handle(&self, ctx: &mut BlockContext<'_>, event: &Event) -> Result<(), HandlerError> {
        let Some(transfer) = self.decode(event)? else {
            return Ok(());
        };
        let timestamp = i64::try_from(ctx.block.timestamp).map_err(|_| {
            HandlerError::handler(self.name(), format!("timestamp {} out of range", ctx.block.timestamp))
        })?;

        tracing::trace!(
            "Transfer of {} from {} to {} on {}",
            transfer.value,
            transfer.from,
            transfer.to,
            transfer.contract
        );

        ctx.store.upsert(
            TABLE,
            &[
                "block_number",
                "log_index",
                "transaction_hash",
                "contract",
                "from_address",
                "to_address",
                "value",
                "timestamp",
            ],
            vec![
                DbValue::Uint64(ctx.height()),
                DbValue::Int64(i64::from(event.index)),
                transfer.transaction_hash.map_or(DbValue::Null, DbValue::Text),
                DbValue::Text(transfer.contract),
                DbValue::Text(format!("{:#x}", transfer.from)),
                DbValue::Text(format!("{:#x}", transfer.to)),
                DbValue::Numeric(transfer.value.to_string()),
                DbValue::Timestamp(timestamp),
            ],
            &["block_number", "log_index"],
            &[],
        );
        Ok(())
    }
}

pub fn register(builder: &mut ProcessorBuilder, config: &Erc20TransferConfig) -> Result<(), ConfigError> {
    builder.add_evm_log_handler(
        &config.contract,
        EvmLogHandlerOptions {
            range: config.range,
            filter: Some(TopicFilter::topic0(TRANSFER_TOPIC)),
        },
        Erc20TransferHandler,
    )?;
    Ok(())
}
