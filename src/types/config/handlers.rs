//! Configuration of the built-in handlers.

use serde::Deserialize;

use crate::types::range::Range;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandlersConfig {
    /// Record block headers over this range.
    #[serde(default)]
    pub block_headers: Option<Range>,

    #[serde(default)]
    pub erc20_transfers: Vec<Erc20TransferConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Erc20TransferConfig {
    pub contract: String,
    #[serde(default)]
    pub range: Range,
}

impl HandlersConfig {
    /// Contracts whose logs the configured handlers need.
    pub fn contracts(&self) -> Vec<&str> {
        self.erc20_transfers
            .iter()
            .map(|t| t.contract.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.block_headers.is_none() && self.erc20_transfers.is_empty()
    }
}
