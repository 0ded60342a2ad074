use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;

use crate::types::block::BlockData;

use super::{BlockSource, SourceError};

/// Serves a fixed set of blocks.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    blocks: BTreeMap<u64, BlockData>,
    head: Option<u64>,
}

impl MemorySource {
    pub fn new(blocks: impl IntoIterator<Item = BlockData>) -> Self {
        Self {
            blocks: blocks.into_iter().map(|b| (b.height(), b)).collect(),
            head: None,
        }
    }

    /// Load a JSON array of blocks, as written by `serde_json` from
    /// `Vec<BlockData>`.
    pub fn from_json_file(path: &Path) -> Result<Self, SourceError> {
        let content = std::fs::read_to_string(path)?;
        let blocks: Vec<BlockData> = serde_json::from_str(&content)
            .map_err(|e| SourceError::Decode(format!("{}: {}", path.display(), e)))?;
        tracing::info!("Loaded {} blocks from {}", blocks.len(), path.display());
        Ok(Self::new(blocks))
    }

    /// Report `head` as the chain height instead of the highest stored block.
    pub fn with_head(mut self, head: u64) -> Self {
        self.head = Some(head);
        self
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[async_trait]
impl BlockSource for MemorySource {
    async fn chain_height(&self) -> Result<u64, SourceError> {
        Ok(self
            .head
            .or_else(|| self.blocks.keys().next_back().copied())
            .unwrap_or(0))
    }

    async fn fetch_blocks(&self, from: u64, to: u64) -> Result<Vec<BlockData>, SourceError> {
        if from > to {
            return Ok(Vec::new());
        }
        Ok(self.blocks.range(from..=to).map(|(_, b)| b.clone()).collect())
    }
}
