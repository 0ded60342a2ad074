//! Block-by-block execution.

use std::cmp::{max, min};

use tokio::sync::watch;
use tracing::{Instrument, Span};

use crate::db::{Store, StoreTransaction};
use crate::source::{BlockSource, SourceError};
use crate::types::block::{BlockData, BlockItem};
use crate::types::range::Range;

use super::batch::{create_batches, Batch};
use super::builder::ProcessorSettings;
use super::context::BlockContext;
use super::error::{BlockError, ConfigError, HandlerError, ProcessorError};
use super::matching::{call_handlers, event_handlers};
use super::progress::ProgressTracker;
use super::registry::DataHandlers;

/// A sealed processor, ready to run.
pub struct Processor {
    registrations: Vec<Batch>,
    settings: ProcessorSettings,
}

/// How a batch ended.
enum Flow {
    Continue,
    /// Shutdown was requested.
    Stop,
    /// The chain head was reached and the head is not followed.
    CaughtUp,
}

impl Processor {
    pub(super) fn new(registrations: Vec<Batch>, settings: ProcessorSettings) -> Self {
        Self {
            registrations,
            settings,
        }
    }

    /// Batches covering `run_range`.
    pub fn batches(&self, run_range: &Range) -> Vec<Batch> {
        create_batches(self.registrations.clone(), run_range)
    }

    /// Process every block of the configured range that has handlers,
    /// committing each block before moving on to the next.
    ///
    /// Resumes after the store's committed height. Never asks the source for
    /// blocks above its chain height. Returns when the range is exhausted,
    /// when the chain head is reached and the head is not followed, or when
    /// `shutdown` turns true. A handler
    /// or commit failure stops the run with the failing block's height and
    /// hash; blocks committed before it stay committed.
    pub async fn run<S, D>(
        &self,
        source: &S,
        store: &D,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), ProcessorError>
    where
        S: BlockSource + ?Sized,
        D: Store + ?Sized,
    {
        let configured = self.settings.block_range;
        let committed = store.last_committed().await?;

        let start = match committed {
            Some(height) => match height.checked_add(1) {
                Some(next) => max(configured.from(), next),
                None => {
                    tracing::info!("Store is at the maximum height, nothing to do");
                    return Ok(());
                }
            },
            None => configured.from(),
        };

        if configured.to().is_some_and(|to| start > to) {
            tracing::info!(
                "Block range {} already processed (committed height {:?})",
                configured,
                committed
            );
            return Ok(());
        }

        let run_range = Range::new(start, configured.to()).map_err(ConfigError::from)?;
        let batches = self.batches(&run_range);

        if let Some(height) = committed {
            tracing::info!("Resuming after committed block {}", height);
        }
        tracing::info!(
            "Processing {} in {} batches",
            run_range,
            batches.len()
        );

        let mut runner = Runner {
            source,
            store,
            settings: &self.settings,
            shutdown,
            last_block: start.checked_sub(1),
            head: None,
            progress: ProgressTracker::new(&batches, self.settings.progress_interval),
        };

        for batch in &batches {
            match runner.process_batch(batch).await? {
                Flow::Continue => {}
                Flow::Stop => {
                    tracing::info!("Shutdown requested, stopping after block {:?}", runner.last_block);
                    return Ok(());
                }
                Flow::CaughtUp => {
                    match run_range.to() {
                        Some(to) => tracing::warn!(
                            "Stopped at chain head {:?} before the end of the block range (to {}), last block {:?}",
                            runner.head,
                            to,
                            runner.last_block
                        ),
                        None => tracing::info!(
                            "Caught up with chain head {:?}, last block {:?}",
                            runner.head,
                            runner.last_block
                        ),
                    }
                    return Ok(());
                }
            }
        }

        tracing::info!("Processing complete, last block {:?}", runner.last_block);
        Ok(())
    }
}

struct Runner<'a, S: ?Sized, D: ?Sized> {
    source: &'a S,
    store: &'a D,
    settings: &'a ProcessorSettings,
    shutdown: watch::Receiver<bool>,
    /// Height of the last committed block.
    last_block: Option<u64>,
    /// Latest chain height seen.
    head: Option<u64>,
    progress: ProgressTracker<'a>,
}

impl<'a, S, D> Runner<'a, S, D>
where
    S: BlockSource + ?Sized,
    D: Store + ?Sized,
{
    async fn process_batch(&mut self, batch: &Batch) -> Result<Flow, ProcessorError> {
        tracing::debug!("Starting batch {} ({:?})", batch.range, batch.handlers);
        let mut next = batch.range.from();

        loop {
            if self.stop_requested() {
                return Ok(Flow::Stop);
            }
            if batch.range.to().is_some_and(|to| next > to) {
                return Ok(Flow::Continue);
            }

            let head = self.head_at_least(next).await?;
            if next > head {
                if !self.settings.follow_head {
                    return Ok(Flow::CaughtUp);
                }
                if self.wait_for_new_blocks().await {
                    return Ok(Flow::Stop);
                }
                continue;
            }

            let end = batch.range.to().map_or(head, |to| min(to, head));
            let chunk_end = min(end, next.saturating_add(self.settings.batch_size - 1));
            let blocks = self.source.fetch_blocks(next, chunk_end).await?;

            for block in &blocks {
                if self.stop_requested() {
                    return Ok(Flow::Stop);
                }
                self.check_order(block.height())?;
                if block.height() < next || block.height() > chunk_end {
                    return Err(SourceError::UnexpectedBlock {
                        height: block.height(),
                        from: next,
                        to: chunk_end,
                    }
                    .into());
                }
                self.process_block(&batch.handlers, block).await?;
            }

            match chunk_end.checked_add(1) {
                Some(after) => next = after,
                None => return Ok(Flow::Continue),
            }
        }
    }

    /// Latest known chain height, asking the source again only when `height`
    /// lies beyond the last one seen.
    async fn head_at_least(&mut self, height: u64) -> Result<u64, ProcessorError> {
        match self.head {
            Some(head) if head >= height => Ok(head),
            _ => {
                let head = self.source.chain_height().await?;
                self.head = Some(head);
                Ok(head)
            }
        }
    }

    fn check_order(&self, height: u64) -> Result<(), ProcessorError> {
        match self.last_block {
            Some(last_block) if height <= last_block => {
                Err(ProcessorError::OrderingViolation { height, last_block })
            }
            _ => Ok(()),
        }
    }

    async fn process_block(&mut self, handlers: &DataHandlers, block: &BlockData) -> Result<(), ProcessorError> {
        let height = block.height();
        let span = tracing::info_span!("block", height, hash = %block.header.hash);

        commit_block(handlers, block, self.store, span.clone())
            .instrument(span)
            .await
            .map_err(|source| ProcessorError::Block {
                height,
                hash: block.header.hash.clone(),
                source,
            })?;

        self.last_block = Some(height);
        let target = self
            .settings
            .block_range
            .to()
            .or(self.head)
            .unwrap_or(height);
        self.progress.record(height, target);
        Ok(())
    }

    fn stop_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep for one poll interval. Returns true if shutdown was requested
    /// meanwhile.
    async fn wait_for_new_blocks(&mut self) -> bool {
        let poll_interval = self.settings.poll_interval;
        let changed = tokio::select! {
            _ = tokio::time::sleep(poll_interval) => None,
            changed = self.shutdown.changed() => Some(changed),
        };

        match changed {
            None => false,
            Some(Ok(())) => self.stop_requested(),
            // sender gone, nobody can request a shutdown anymore
            Some(Err(_)) => {
                tokio::time::sleep(poll_interval).await;
                false
            }
        }
    }
}

async fn commit_block<D: Store + ?Sized>(
    handlers: &DataHandlers,
    block: &BlockData,
    store: &D,
    span: Span,
) -> Result<(), BlockError> {
    let mut tx = StoreTransaction::new();
    dispatch_block(handlers, block, &mut tx, span).await?;

    let height = block.height();
    let operations = tx.into_operations();
    tracing::debug!("Committing {} operations", operations.len());
    store.transact(height, height, operations).await?;
    Ok(())
}

/// Run every applicable handler for `block`, buffering writes in `tx`.
///
/// Pre-hooks run first, then the handlers of each item in log order, then
/// post-hooks. The first handler error aborts the block.
pub async fn dispatch_block(
    handlers: &DataHandlers,
    block: &BlockData,
    tx: &mut StoreTransaction,
    span: Span,
) -> Result<(), BlockError> {
    let mut ctx = BlockContext::new(&block.header, &block.items, tx, span);

    for hook in &handlers.pre {
        let handler = &hook.handler;
        handler.handle(&mut ctx).await.map_err(failed(handler.name()))?;
    }

    for item in &block.items {
        match item {
            BlockItem::Event(event) => {
                for handler in event_handlers(handlers, event) {
                    handler.handle(&mut ctx, event).await.map_err(failed(handler.name()))?;
                }
            }
            BlockItem::Call(call) => {
                for handler in call_handlers(handlers, call) {
                    handler.handle(&mut ctx, call).await.map_err(failed(handler.name()))?;
                }
            }
        }
    }

    for hook in &handlers.post {
        let handler = &hook.handler;
        handler.handle(&mut ctx).await.map_err(failed(handler.name()))?;
    }

    Ok(())
}

fn failed(handler: &'static str) -> impl FnOnce(HandlerError) -> BlockError {
    move |source| BlockError::Handler { handler, source }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::processor::registry::{CallHandlerEntry, Registered};
    use crate::processor::testing::Recorder;
    use crate::types::block::{BlockHeader, Call, Event};

    fn block(height: u64, items: Vec<BlockItem>) -> BlockData {
        BlockData {
            header: BlockHeader {
                height,
                hash: format!("0x{:02x}", height),
                parent_hash: format!("0x{:02x}", height.saturating_sub(1)),
                timestamp: 0,
            },
            items,
        }
    }

    fn event(name: &str) -> BlockItem {
        BlockItem::Event(Event {
            name: name.to_string(),
            args: json!({}),
            index: 0,
        })
    }

    fn call(name: &str, success: bool) -> BlockItem {
        BlockItem::Call(Call {
            name: name.to_string(),
            args: json!({}),
            success,
            id: "1".to_string(),
        })
    }

    #[tokio::test]
    async fn test_dispatch_order() {
        let recorder = Recorder::new();
        let mut handlers = DataHandlers::new();
        handlers.pre.push(Registered::new(0, recorder.block("pre")));
        handlers.post.push(Registered::new(1, recorder.block("post")));
        handlers
            .events
            .insert("A.X".to_string(), vec![Registered::new(2, recorder.event("on-x"))]);
        handlers.calls.insert(
            "A.f".to_string(),
            vec![Registered::new(
                3,
                CallHandlerEntry {
                    handler: recorder.call("on-f"),
                    trigger_for_failed_calls: false,
                },
            )],
        );

        let block = block(
            7,
            vec![event("A.X"), call("A.f", false), call("A.f", true), event("A.Y"), event("A.X")],
        );
        let mut tx = StoreTransaction::new();
        dispatch_block(&handlers, &block, &mut tx, Span::none())
            .await
            .unwrap();

        assert_eq!(
            recorder.entries(),
            vec!["pre@7", "on-x@7:A.X", "on-f@7:A.f", "on-x@7:A.X", "post@7"]
        );
    }

    #[tokio::test]
    async fn test_dispatch_stops_at_first_error() {
        let recorder = Recorder::new();
        let mut handlers = DataHandlers::new();
        handlers.pre.push(Registered::new(0, recorder.failing_block("broken", 3)));
        handlers.post.push(Registered::new(1, recorder.block("post")));

        let mut tx = StoreTransaction::new();
        let err = dispatch_block(&handlers, &block(3, vec![]), &mut tx, Span::none())
            .await
            .unwrap_err();

        assert!(matches!(err, BlockError::Handler { handler: "broken", .. }));
        assert!(recorder.entries().is_empty());
    }
}
