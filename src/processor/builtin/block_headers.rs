use async_trait::async_trait;

use crate::db::DbValue;
use crate::processor::context::BlockContext;
use crate::processor::error::HandlerError;
use crate::processor::traits::BlockHandler;

pub const TABLE: &str = "blocks";

/// Records every block header in the `blocks` table.
pub struct BlockHeaderHandler;

#[async_trait]
impl BlockHandler for BlockHeaderHandler {
    fn name(&self) -> &'static str {
        "BlockHeaderHandler"
    }

    async fn handle(&self, ctx: &mut BlockContext<'_>) -> Result<(), HandlerError> {
        let block = ctx.block;
        let timestamp = i64::try_from(block.timestamp).map_err(|_| {
            HandlerError::handler(self.name(), format!("timestamp {} out of range", block.timestamp))
        })?;

        ctx.store.upsert(
            TABLE,
            &["number", "hash", "parent_hash", "timestamp"],
            vec![
                DbValue::Uint64(block.height),
                DbValue::from(block.hash.as_str()),
                DbValue::from(block.parent_hash.as_str()),
                DbValue::Timestamp(timestamp),
            ],
            &["number"],
            &["hash", "parent_hash", "timestamp"],
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DbOperation, StoreTransaction};
    use crate::types::block::BlockHeader;

    #[tokio::test]
    async fn test_upserts_header() {
        let header = BlockHeader {
            height: 42,
            hash: "0x2a".to_string(),
            parent_hash: "0x29".to_string(),
            timestamp: 1_700_000_000,
        };
        let mut tx = StoreTransaction::new();
        let mut ctx = BlockContext::new(&header, &[], &mut tx, tracing::Span::none());

        BlockHeaderHandler.handle(&mut ctx).await.unwrap();

        let [DbOperation::Upsert { table, values, conflict_columns, .. }] = tx.operations() else {
            panic!("expected a single upsert, got {:?}", tx.operations());
        };
        assert_eq!(table, TABLE);
        assert_eq!(values[0], DbValue::Uint64(42));
        assert_eq!(values[3], DbValue::Timestamp(1_700_000_000));
        assert_eq!(conflict_columns, &vec!["number".to_string()]);
    }
}
