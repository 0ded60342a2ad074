use std::collections::BTreeMap;
use std::sync::Arc;

use alloy::primitives::Address;
use alloy::rpc::types::{Block, Filter, Log};
use async_trait::async_trait;
use serde_json::json;

use crate::processor::EVM_LOG;
use crate::rpc::RpcClient;
use crate::types::block::{BlockData, BlockHeader, BlockItem, Event};

use super::{BlockSource, SourceError};

/// Reads blocks and, optionally, their logs from an EVM JSON-RPC node.
///
/// Every height in the requested range is delivered, so block hooks run for
/// blocks without logs too. Logs become `EVM.Log` events in log-index order;
/// call traces are not fetched.
pub struct RpcSource {
    client: Arc<RpcClient>,
    logs: LogSelection,
}

/// Which logs `eth_getLogs` is asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LogSelection {
    HeadersOnly,
    Contracts(Vec<Address>),
    All,
}

impl RpcSource {
    /// A source delivering block headers only.
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self {
            client,
            logs: LogSelection::HeadersOnly,
        }
    }

    /// Also deliver the logs emitted by `addresses`.
    pub fn with_logs_of<'a>(mut self, addresses: impl IntoIterator<Item = &'a str>) -> Result<Self, SourceError> {
        let mut parsed = Vec::new();
        for address in addresses {
            let address = address
                .parse::<Address>()
                .map_err(|e| SourceError::Decode(format!("invalid address {}: {}", address, e)))?;
            if !parsed.contains(&address) {
                parsed.push(address);
            }
        }

        self.logs = match self.logs {
            LogSelection::All => LogSelection::All,
            LogSelection::HeadersOnly if parsed.is_empty() => LogSelection::HeadersOnly,
            LogSelection::HeadersOnly => LogSelection::Contracts(parsed),
            LogSelection::Contracts(mut existing) => {
                for address in parsed {
                    if !existing.contains(&address) {
                        existing.push(address);
                    }
                }
                LogSelection::Contracts(existing)
            }
        };
        Ok(self)
    }

    /// Deliver every log of every block.
    pub fn with_all_logs(mut self) -> Self {
        self.logs = LogSelection::All;
        self
    }

    fn log_filter(&self, from: u64, to: u64) -> Option<Filter> {
        let filter = Filter::new().from_block(from).to_block(to);
        match &self.logs {
            LogSelection::HeadersOnly => None,
            LogSelection::Contracts(addresses) => Some(filter.address(addresses.clone())),
            LogSelection::All => Some(filter),
        }
    }
}

#[async_trait]
impl BlockSource for RpcSource {
    async fn chain_height(&self) -> Result<u64, SourceError> {
        Ok(self.client.get_block_number().await?)
    }

    async fn fetch_blocks(&self, from: u64, to: u64) -> Result<Vec<BlockData>, SourceError> {
        if from > to {
            return Ok(Vec::new());
        }

        let logs_by_block = match self.log_filter(from, to) {
            Some(filter) => group_logs(self.client.get_logs(&filter).await?)?,
            None => BTreeMap::new(),
        };

        let heights: Vec<u64> = (from..=to).collect();
        let headers = self
            .client
            .get_blocks(&heights)
            .await?
            .iter()
            .map(|block| block.as_ref().map(header_of))
            .collect();
        let blocks = assemble(&heights, headers, logs_by_block)?;

        tracing::debug!(
            "Fetched blocks {}-{} with {} logs",
            from,
            to,
            blocks.iter().map(|b| b.items.len()).sum::<usize>()
        );
        Ok(blocks)
    }
}

/// Pair each height's header with its logs. A missing header is an error.
fn assemble(
    heights: &[u64],
    headers: Vec<Option<BlockHeader>>,
    mut logs_by_block: BTreeMap<u64, Vec<Event>>,
) -> Result<Vec<BlockData>, SourceError> {
    heights
        .iter()
        .zip(headers)
        .map(|(&height, header)| {
            let header = header.ok_or(SourceError::BlockNotFound(height))?;
            let items = logs_by_block
                .remove(&height)
                .unwrap_or_default()
                .into_iter()
                .map(BlockItem::Event)
                .collect();
            Ok(BlockData { header, items })
        })
        .collect()
}

fn header_of(block: &Block) -> BlockHeader {
    BlockHeader {
        height: block.header.number,
        hash: format!("{:#x}", block.header.hash),
        parent_hash: format!("{:#x}", block.header.parent_hash),
        timestamp: block.header.timestamp,
    }
}

/// Group logs by block number, ordered by log index within a block.
fn group_logs(logs: Vec<Log>) -> Result<BTreeMap<u64, Vec<Event>>, SourceError> {
    let mut grouped: BTreeMap<u64, Vec<Event>> = BTreeMap::new();
    for log in logs {
        let height = log
            .block_number
            .ok_or_else(|| SourceError::Decode("log without block number".to_string()))?;
        grouped.entry(height).or_default().push(log_event(&log)?);
    }
    for events in grouped.values_mut() {
        events.sort_by_key(|e| e.index);
    }
    Ok(grouped)
}

fn log_event(log: &Log) -> Result<Event, SourceError> {
    let index = log
        .log_index
        .ok_or_else(|| SourceError::Decode("log without log index".to_string()))?;
    let index = u32::try_from(index)
        .map_err(|_| SourceError::Decode(format!("log index {} out of range", index)))?;

    let topics: Vec<String> = log.topics().iter().map(|t| format!("{:#x}", t)).collect();
    let args = json!({
        "address": format!("{:#x}", log.address()),
        "topics": topics,
        "data": format!("0x{}", hex::encode(&log.data().data)),
        "transaction_hash": log.transaction_hash.map(|h| format!("{:#x}", h)),
        "log_index": index,
    });

    Ok(Event {
        name: EVM_LOG.to_string(),
        args,
        index,
    })
}
