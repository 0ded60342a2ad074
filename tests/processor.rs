//! End-to-end runs of the processor against the in-memory source and store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::watch;

use block_replay_indexer::db::{DbValue, MemoryStore, Store};
use block_replay_indexer::processor::{
    BlockContext, BlockError, BlockHandler, BlockHookOptions, EventHandler, EventHandlerOptions,
    HandlerError, ProcessorBuilder, ProcessorError,
};
use block_replay_indexer::source::{BlockSource, MemorySource, SourceError};
use block_replay_indexer::types::block::{BlockData, BlockHeader, BlockItem, Event};
use block_replay_indexer::types::range::Range;

type Log = Arc<Mutex<Vec<String>>>;

struct Recording {
    name: &'static str,
    log: Log,
    fail_at: Option<u64>,
}

impl Recording {
    fn new(name: &'static str, log: &Log) -> Self {
        Self {
            name,
            log: log.clone(),
            fail_at: None,
        }
    }

    fn failing_at(name: &'static str, log: &Log, height: u64) -> Self {
        Self {
            fail_at: Some(height),
            ..Self::new(name, log)
        }
    }

    fn record(&self, ctx: &mut BlockContext<'_>) -> Result<(), HandlerError> {
        let height = ctx.height();
        if self.fail_at == Some(height) {
            return Err(HandlerError::handler(self.name, "boom"));
        }
        self.log.lock().unwrap().push(format!("{}@{}", self.name, height));
        ctx.store.insert(
            "visits",
            &["handler", "block_number"],
            vec![DbValue::from(self.name), DbValue::Uint64(height)],
        );
        Ok(())
    }
}

#[async_trait]
impl BlockHandler for Recording {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn handle(&self, ctx: &mut BlockContext<'_>) -> Result<(), HandlerError> {
        self.record(ctx)
    }
}

#[async_trait]
impl EventHandler for Recording {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn handle(&self, ctx: &mut BlockContext<'_>, _event: &Event) -> Result<(), HandlerError> {
        self.record(ctx)
    }
}

fn block(height: u64, items: Vec<BlockItem>) -> BlockData {
    BlockData {
        header: BlockHeader {
            height,
            hash: format!("0x{:04x}", height),
            parent_hash: format!("0x{:04x}", height.saturating_sub(1)),
            timestamp: 1_700_000_000 + height,
        },
        items,
    }
}

fn transfer() -> BlockItem {
    BlockItem::Event(Event {
        name: "Balances.Transfer".to_string(),
        args: json!({ "from": "alice", "to": "bob", "amount": 10 }),
        index: 0,
    })
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn from(height: u64) -> BlockHookOptions {
    BlockHookOptions {
        range: Range::starting_at(height),
    }
}

/// Returns a fixed list of blocks whatever range is asked for.
struct ScriptedSource {
    blocks: Vec<BlockData>,
}

#[async_trait]
impl BlockSource for ScriptedSource {
    async fn chain_height(&self) -> Result<u64, SourceError> {
        Ok(self.blocks.iter().map(BlockData::height).max().unwrap_or(0))
    }

    async fn fetch_blocks(&self, _from: u64, _to: u64) -> Result<Vec<BlockData>, SourceError> {
        Ok(self.blocks.clone())
    }
}

/// Fails like a node does when asked for blocks above its head.
struct HeadLimitedSource {
    blocks: MemorySource,
    head: u64,
}

#[async_trait]
impl BlockSource for HeadLimitedSource {
    async fn chain_height(&self) -> Result<u64, SourceError> {
        Ok(self.head)
    }

    async fn fetch_blocks(&self, from: u64, to: u64) -> Result<Vec<BlockData>, SourceError> {
        if to > self.head {
            return Err(SourceError::BlockNotFound(self.head + 1));
        }
        self.blocks.fetch_blocks(from, to).await
    }
}

#[tokio::test]
async fn test_hooks_run_once_per_block_in_order() {
    let log = Log::default();
    let mut builder = ProcessorBuilder::new();
    builder.add_pre_hook(from(10), Recording::new("pre", &log));
    builder.add_post_hook(from(10), Recording::new("post", &log));
    let processor = builder.build();

    let source = MemorySource::new((10..=12).map(|h| block(h, vec![transfer()])));
    let store = MemoryStore::new();
    let (_tx, shutdown) = watch::channel(false);

    processor.run(&source, &store, shutdown).await.unwrap();

    assert_eq!(
        entries(&log),
        vec!["pre@10", "post@10", "pre@11", "post@11", "pre@12", "post@12"]
    );
    assert_eq!(store.last_committed().await.unwrap(), Some(12));

    let commits = store.commits().await;
    assert_eq!(commits.len(), 3);
    assert!(commits.iter().all(|c| c.from == c.to && c.operations.len() == 2));
}

#[tokio::test]
async fn test_failing_block_is_not_committed() {
    let log = Log::default();
    let mut builder = ProcessorBuilder::new();
    builder.add_pre_hook(from(10), Recording::new("pre", &log));
    builder.add_post_hook(from(10), Recording::failing_at("post", &log, 11));
    let processor = builder.build();

    let source = MemorySource::new((10..=12).map(|h| block(h, vec![])));
    let store = MemoryStore::new();
    let (_tx, shutdown) = watch::channel(false);

    let err = processor.run(&source, &store, shutdown).await.unwrap_err();

    match &err {
        ProcessorError::Block {
            height,
            hash,
            source: BlockError::Handler { handler, .. },
        } => {
            assert_eq!(*height, 11);
            assert_eq!(hash, "0x000b");
            assert_eq!(*handler, "post");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(err.block_height(), Some(11));
    assert_eq!(store.last_committed().await.unwrap(), Some(10));

    let commits = store.commits().await;
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].to, 10);
    // block 12 was never reached
    assert_eq!(entries(&log), vec!["pre@10", "post@10", "pre@11"]);
}

#[tokio::test]
async fn test_ordering_violation_is_fatal() {
    let log = Log::default();
    let mut builder = ProcessorBuilder::new();
    builder.add_pre_hook(from(10), Recording::new("pre", &log));
    builder.set_block_range(Range::bounded(10, 12).unwrap());
    let processor = builder.build();

    let source = ScriptedSource {
        blocks: vec![block(10, vec![]), block(12, vec![]), block(11, vec![])],
    };
    let store = MemoryStore::new();
    let (_tx, shutdown) = watch::channel(false);

    let err = processor.run(&source, &store, shutdown).await.unwrap_err();

    assert!(matches!(
        err,
        ProcessorError::OrderingViolation {
            height: 11,
            last_block: 12
        }
    ));
    assert_eq!(store.last_committed().await.unwrap(), Some(12));
}

#[tokio::test]
async fn test_block_outside_requested_range() {
    let log = Log::default();
    let mut builder = ProcessorBuilder::new();
    builder.add_pre_hook(from(10), Recording::new("pre", &log));
    builder.set_block_range(Range::bounded(10, 12).unwrap());
    let processor = builder.build();

    let source = ScriptedSource {
        blocks: vec![block(50, vec![])],
    };
    let store = MemoryStore::new();
    let (_tx, shutdown) = watch::channel(false);

    let err = processor.run(&source, &store, shutdown).await.unwrap_err();

    assert!(matches!(
        err,
        ProcessorError::Source(SourceError::UnexpectedBlock {
            height: 50,
            from: 10,
            to: 12
        })
    ));
    assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn test_resumes_after_committed_height() {
    let log = Log::default();
    let mut builder = ProcessorBuilder::new();
    builder.add_pre_hook(from(10), Recording::new("pre", &log));
    builder.set_block_range(Range::bounded(10, 14).unwrap());
    let processor = builder.build();

    let source = MemorySource::new((10..=14).map(|h| block(h, vec![])));
    let store = MemoryStore::at_height(11);
    let (_tx, shutdown) = watch::channel(false);

    processor.run(&source, &store, shutdown).await.unwrap();

    assert_eq!(entries(&log), vec!["pre@12", "pre@13", "pre@14"]);
    assert_eq!(store.commits().await[0].from, 12);
    assert_eq!(store.last_committed().await.unwrap(), Some(14));
}

#[tokio::test]
async fn test_finished_range_completes_immediately() {
    let log = Log::default();
    let mut builder = ProcessorBuilder::new();
    builder.add_pre_hook(from(10), Recording::new("pre", &log));
    builder.set_block_range(Range::bounded(10, 14).unwrap());
    let processor = builder.build();

    let source = MemorySource::new((10..=14).map(|h| block(h, vec![])));
    let store = MemoryStore::at_height(20);
    let (_tx, shutdown) = watch::channel(false);

    processor.run(&source, &store, shutdown).await.unwrap();

    assert!(entries(&log).is_empty());
    assert!(store.commits().await.is_empty());
}

#[tokio::test]
async fn test_overlapping_ranges_share_blocks_in_registration_order() {
    let log = Log::default();
    let mut builder = ProcessorBuilder::new();
    builder
        .add_event_handler(
            "Balances.Transfer",
            EventHandlerOptions {
                range: Range::bounded(0, 99).unwrap(),
            },
            Recording::new("a", &log),
        )
        .unwrap()
        .add_event_handler(
            "Balances.Transfer",
            EventHandlerOptions {
                range: Range::bounded(50, 150).unwrap(),
            },
            Recording::new("b", &log),
        )
        .unwrap();
    let processor = builder.build();

    assert_eq!(
        processor
            .batches(&Range::full())
            .iter()
            .map(|b| b.range)
            .collect::<Vec<_>>(),
        vec![
            Range::bounded(0, 49).unwrap(),
            Range::bounded(50, 99).unwrap(),
            Range::bounded(100, 150).unwrap(),
        ]
    );

    let source = MemorySource::new([49, 50, 99, 100, 151].map(|h| block(h, vec![transfer()])));
    let store = MemoryStore::new();
    let (_tx, shutdown) = watch::channel(false);

    processor.run(&source, &store, shutdown).await.unwrap();

    assert_eq!(
        entries(&log),
        vec!["a@49", "a@50", "b@50", "a@99", "b@99", "b@100"]
    );
    // 151 lies outside every batch
    assert_eq!(store.last_committed().await.unwrap(), Some(100));
}

#[tokio::test]
async fn test_follow_head_stops_on_shutdown() {
    let log = Log::default();
    let mut builder = ProcessorBuilder::new();
    builder
        .add_pre_hook(from(10), Recording::new("pre", &log))
        .set_follow_head(true)
        .set_poll_interval(Duration::from_millis(5));
    let processor = builder.build();

    let source = MemorySource::new((10..=11).map(|h| block(h, vec![])));
    let store = MemoryStore::new();
    let (tx, shutdown) = watch::channel(false);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
    });

    tokio::time::timeout(Duration::from_secs(5), processor.run(&source, &store, shutdown))
        .await
        .expect("processor did not stop")
        .unwrap();

    assert_eq!(entries(&log), vec!["pre@10", "pre@11"]);
    assert_eq!(store.last_committed().await.unwrap(), Some(11));
}

#[tokio::test]
async fn test_shutdown_before_start_processes_nothing() {
    let log = Log::default();
    let mut builder = ProcessorBuilder::new();
    builder.add_pre_hook(from(0), Recording::new("pre", &log));
    let processor = builder.build();

    let source = MemorySource::new((0..=3).map(|h| block(h, vec![])));
    let store = MemoryStore::new();
    let (_tx, shutdown) = watch::channel(true);

    processor.run(&source, &store, shutdown).await.unwrap();

    assert!(entries(&log).is_empty());
    assert_eq!(store.last_committed().await.unwrap(), None);
}

#[tokio::test]
async fn test_bounded_range_past_head_stops_at_head() {
    let log = Log::default();
    let mut builder = ProcessorBuilder::new();
    builder
        .add_pre_hook(from(10), Recording::new("pre", &log))
        .set_block_range(Range::bounded(10, 20).unwrap());
    let processor = builder.build();

    let source = HeadLimitedSource {
        blocks: MemorySource::new((10..=12).map(|h| block(h, vec![]))),
        head: 12,
    };
    let store = MemoryStore::new();
    let (_tx, shutdown) = watch::channel(false);

    processor.run(&source, &store, shutdown).await.unwrap();

    assert_eq!(entries(&log), vec!["pre@10", "pre@11", "pre@12"]);
    assert_eq!(store.last_committed().await.unwrap(), Some(12));
}

#[tokio::test]
async fn test_bounded_range_past_head_waits_for_new_blocks() {
    let log = Log::default();
    let mut builder = ProcessorBuilder::new();
    builder
        .add_pre_hook(from(10), Recording::new("pre", &log))
        .set_block_range(Range::bounded(10, 20).unwrap())
        .set_follow_head(true)
        .set_poll_interval(Duration::from_millis(5));
    let processor = builder.build();

    let source = HeadLimitedSource {
        blocks: MemorySource::new((10..=12).map(|h| block(h, vec![]))),
        head: 12,
    };
    let store = MemoryStore::new();
    let (tx, shutdown) = watch::channel(false);

    let run = processor.run(&source, &store, shutdown);
    tokio::pin!(run);

    // still polling for block 13
    assert!(tokio::time::timeout(Duration::from_millis(200), &mut run)
        .await
        .is_err());
    assert_eq!(entries(&log), vec!["pre@10", "pre@11", "pre@12"]);

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("processor did not stop")
        .unwrap();

    assert_eq!(store.last_committed().await.unwrap(), Some(12));
}
