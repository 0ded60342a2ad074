//! Processor configuration.
//!
//! Handlers and settings are collected on a [`ProcessorBuilder`]; `build()`
//! consumes it and returns a [`Processor`] whose registrations can no longer
//! change.

use std::sync::Arc;
use std::time::Duration;

use crate::types::range::Range;

use super::batch::Batch;
use super::error::ConfigError;
use super::matching::{normalize_key, TopicFilter};
use super::registry::{CallHandlerEntry, DataHandlers, EvmLogHandlerEntry, Registered};
use super::runner::Processor;
use super::traits::{BlockHandler, CallHandler, EventHandler};

pub const DEFAULT_BATCH_SIZE: u64 = 100;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct BlockHookOptions {
    pub range: Range,
}

#[derive(Debug, Clone, Default)]
pub struct EventHandlerOptions {
    pub range: Range,
}

#[derive(Debug, Clone, Default)]
pub struct CallHandlerOptions {
    pub range: Range,
    /// Also run the handler for calls that did not succeed.
    pub trigger_for_failed_calls: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EvmLogHandlerOptions {
    pub range: Range,
    /// Without a filter every log of the contract matches.
    pub filter: Option<TopicFilter>,
}

/// Run-wide settings, fixed once the processor is built.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Heights to process. Registrations are clipped to it.
    pub block_range: Range,
    /// Maximum number of heights requested from the source at once.
    pub batch_size: u64,
    /// Delay between chain head polls while following the head.
    pub poll_interval: Duration,
    pub progress_interval: Duration,
    /// Keep polling for new blocks once an open-ended range has caught up
    /// with the chain head, instead of returning.
    pub follow_head: bool,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            block_range: Range::full(),
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            follow_head: false,
        }
    }
}

/// Collects handler registrations.
///
/// Each registration becomes a singleton batch tagged with its sequence
/// number; handlers sharing a key run in the order they were registered.
#[derive(Default)]
pub struct ProcessorBuilder {
    registrations: Vec<Batch>,
    settings: ProcessorSettings,
}

impl ProcessorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `handler` once per block, before any event or call handler.
    pub fn add_pre_hook<H: BlockHandler>(&mut self, options: BlockHookOptions, handler: H) -> &mut Self {
        let handler: Arc<dyn BlockHandler> = Arc::new(handler);
        self.register(options.range, |handlers, order| {
            handlers.pre.push(Registered::new(order, handler));
        })
    }

    /// Run `handler` once per block, after every event and call handler.
    pub fn add_post_hook<H: BlockHandler>(&mut self, options: BlockHookOptions, handler: H) -> &mut Self {
        let handler: Arc<dyn BlockHandler> = Arc::new(handler);
        self.register(options.range, |handlers, order| {
            handlers.post.push(Registered::new(order, handler));
        })
    }

    /// Run `handler` for every event named `name` (`Module.Event`, or `*` for
    /// all events).
    pub fn add_event_handler<H: EventHandler>(
        &mut self,
        name: &str,
        options: EventHandlerOptions,
        handler: H,
    ) -> Result<&mut Self, ConfigError> {
        let key = non_empty(name, "event name")?.to_string();
        let handler: Arc<dyn EventHandler> = Arc::new(handler);
        Ok(self.register(options.range, |handlers, order| {
            handlers
                .events
                .insert(key, vec![Registered::new(order, handler)]);
        }))
    }

    /// Run `handler` for every call named `name` (`Module.call`, or `*` for
    /// all calls).
    pub fn add_call_handler<H: CallHandler>(
        &mut self,
        name: &str,
        options: CallHandlerOptions,
        handler: H,
    ) -> Result<&mut Self, ConfigError> {
        let key = non_empty(name, "call name")?.to_string();
        let entry = CallHandlerEntry {
            handler: Arc::new(handler),
            trigger_for_failed_calls: options.trigger_for_failed_calls,
        };
        Ok(self.register(options.range, |handlers, order| {
            handlers.calls.insert(key, vec![Registered::new(order, entry)]);
        }))
    }

    /// Run `handler` for `EVM.Log` events emitted by `contract` whose topics
    /// pass the optional filter.
    pub fn add_evm_log_handler<H: EventHandler>(
        &mut self,
        contract: &str,
        options: EvmLogHandlerOptions,
        handler: H,
    ) -> Result<&mut Self, ConfigError> {
        let key = normalize_key(non_empty(contract, "EVM log contract")?);
        let entry = EvmLogHandlerEntry {
            handler: Arc::new(handler),
            filter: options.filter,
        };
        Ok(self.register(options.range, |handlers, order| {
            handlers.evm_logs.insert(key, vec![Registered::new(order, entry)]);
        }))
    }

    /// Run `handler` for `Contracts.ContractEmitted` events of `contract`.
    pub fn add_contracts_contract_emitted_handler<H: EventHandler>(
        &mut self,
        contract: &str,
        options: EventHandlerOptions,
        handler: H,
    ) -> Result<&mut Self, ConfigError> {
        let key = normalize_key(non_empty(contract, "contract address")?);
        let handler: Arc<dyn EventHandler> = Arc::new(handler);
        Ok(self.register(options.range, |handlers, order| {
            handlers
                .contracts_contract_emitted
                .insert(key, vec![Registered::new(order, handler)]);
        }))
    }

    /// Run `handler` for `Gear.MessageEnqueued` events sent to `program`.
    pub fn add_gear_message_enqueued_handler<H: EventHandler>(
        &mut self,
        program: &str,
        options: EventHandlerOptions,
        handler: H,
    ) -> Result<&mut Self, ConfigError> {
        let key = normalize_key(non_empty(program, "program id")?);
        let handler: Arc<dyn EventHandler> = Arc::new(handler);
        Ok(self.register(options.range, |handlers, order| {
            handlers
                .gear_message_enqueued
                .insert(key, vec![Registered::new(order, handler)]);
        }))
    }

    /// Run `handler` for `Gear.UserMessageSent` events sent by `program`.
    pub fn add_gear_user_message_sent_handler<H: EventHandler>(
        &mut self,
        program: &str,
        options: EventHandlerOptions,
        handler: H,
    ) -> Result<&mut Self, ConfigError> {
        let key = normalize_key(non_empty(program, "program id")?);
        let handler: Arc<dyn EventHandler> = Arc::new(handler);
        Ok(self.register(options.range, |handlers, order| {
            handlers
                .gear_user_message_sent
                .insert(key, vec![Registered::new(order, handler)]);
        }))
    }

    pub fn set_block_range(&mut self, range: Range) -> &mut Self {
        self.settings.block_range = range;
        self
    }

    pub fn set_batch_size(&mut self, batch_size: u64) -> Result<&mut Self, ConfigError> {
        if batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        self.settings.batch_size = batch_size;
        Ok(self)
    }

    pub fn set_poll_interval(&mut self, interval: Duration) -> &mut Self {
        self.settings.poll_interval = interval;
        self
    }

    pub fn set_progress_interval(&mut self, interval: Duration) -> &mut Self {
        self.settings.progress_interval = interval;
        self
    }

    pub fn set_follow_head(&mut self, follow_head: bool) -> &mut Self {
        self.settings.follow_head = follow_head;
        self
    }

    pub fn handler_count(&self) -> usize {
        self.registrations.len()
    }

    /// Seal the configuration.
    pub fn build(self) -> Processor {
        tracing::debug!(
            "Building processor with {} handler registrations over {}",
            self.registrations.len(),
            self.settings.block_range
        );
        Processor::new(self.registrations, self.settings)
    }

    fn register(&mut self, range: Range, fill: impl FnOnce(&mut DataHandlers, usize)) -> &mut Self {
        let order = self.registrations.len();
        let mut handlers = DataHandlers::new();
        fill(&mut handlers, order);
        self.registrations.push(Batch::new(range, handlers));
        self
    }
}

fn non_empty<'a>(key: &'a str, kind: &'static str) -> Result<&'a str, ConfigError> {
    if key.trim().is_empty() {
        return Err(ConfigError::EmptyKey { kind });
    }
    Ok(key)
}
