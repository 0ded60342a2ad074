use tracing::Span;

use crate::db::StoreTransaction;
use crate::types::block::{BlockHeader, BlockItem};

/// Shared by every handler invoked for one block.
pub struct BlockContext<'a> {
    pub block: &'a BlockHeader,
    /// The block's whole item log, in source order.
    pub items: &'a [BlockItem],
    pub store: &'a mut StoreTransaction,
    span: Span,
}

impl<'a> BlockContext<'a> {
    pub fn new(
        block: &'a BlockHeader,
        items: &'a [BlockItem],
        store: &'a mut StoreTransaction,
        span: Span,
    ) -> Self {
        Self {
            block,
            items,
            store,
            span,
        }
    }

    /// Logging span scoped to this block. Events recorded inside it carry the
    /// block height and hash.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn height(&self) -> u64 {
        self.block.height
    }
}
