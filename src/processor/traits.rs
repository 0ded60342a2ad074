//! Handler traits.
//!
//! Handlers are registered on a [`ProcessorBuilder`](super::ProcessorBuilder)
//! together with the block range they apply to. All handlers of a block run
//! sequentially and share one [`BlockContext`]; writes go into the block's
//! store transaction and are committed only if every handler succeeds.

use async_trait::async_trait;

use crate::types::block::{Call, Event};

use super::context::BlockContext;
use super::error::HandlerError;

/// Runs once per block, before (pre-hook) or after (post-hook) the item log.
#[async_trait]
pub trait BlockHandler: Send + Sync + 'static {
    /// Name used in logs and error reports.
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: &mut BlockContext<'_>) -> Result<(), HandlerError>;
}

/// Runs for every matching event, including the specialized kinds
/// (EVM logs, contract emitted events, Gear messages).
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: &mut BlockContext<'_>, event: &Event) -> Result<(), HandlerError>;
}

/// Runs for every matching call. Failed calls reach the handler only when it
/// was registered with `trigger_for_failed_calls`.
#[async_trait]
pub trait CallHandler: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: &mut BlockContext<'_>, call: &Call) -> Result<(), HandlerError>;
}
