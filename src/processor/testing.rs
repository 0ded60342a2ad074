//! Recording handlers shared by the processor's unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::types::block::{Call, Event};

use super::context::BlockContext;
use super::error::HandlerError;
use super::traits::{BlockHandler, CallHandler, EventHandler};

/// Collects `"<handler>@<height>"` entries from every handler it creates.
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn handler(&self, name: &'static str, fail_at: Option<u64>) -> Arc<RecordingHandler> {
        Arc::new(RecordingHandler {
            name,
            log: self.log.clone(),
            fail_at,
        })
    }

    pub(crate) fn block(&self, name: &'static str) -> Arc<dyn BlockHandler> {
        self.handler(name, None)
    }

    pub(crate) fn event(&self, name: &'static str) -> Arc<dyn EventHandler> {
        self.handler(name, None)
    }

    pub(crate) fn call(&self, name: &'static str) -> Arc<dyn CallHandler> {
        self.handler(name, None)
    }

    /// Block handler that fails on the block at `height`.
    pub(crate) fn failing_block(&self, name: &'static str, height: u64) -> Arc<dyn BlockHandler> {
        self.handler(name, Some(height))
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

pub(crate) struct RecordingHandler {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    fail_at: Option<u64>,
}

impl RecordingHandler {
    fn record(&self, ctx: &mut BlockContext<'_>, what: Option<&str>) -> Result<(), HandlerError> {
        let height = ctx.height();
        if self.fail_at == Some(height) {
            return Err(HandlerError::handler(self.name, format!("refusing block {}", height)));
        }
        let entry = match what {
            Some(what) => format!("{}@{}:{}", self.name, height, what),
            None => format!("{}@{}", self.name, height),
        };
        self.log.lock().unwrap().push(entry);
        Ok(())
    }
}

#[async_trait]
impl BlockHandler for RecordingHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn handle(&self, ctx: &mut BlockContext<'_>) -> Result<(), HandlerError> {
        self.record(ctx, None)
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn handle(&self, ctx: &mut BlockContext<'_>, event: &Event) -> Result<(), HandlerError> {
        self.record(ctx, Some(&event.name))
    }
}

#[async_trait]
impl CallHandler for RecordingHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn handle(&self, ctx: &mut BlockContext<'_>, call: &Call) -> Result<(), HandlerError> {
        self.record(ctx, Some(&call.name))
    }
}
