//! The batch scheduler and per-block dispatch engine.
//!
//! Handlers are registered on a [`ProcessorBuilder`], each scoped to its own
//! block range. Building the processor seals the registrations; running it
//! splits them into non-overlapping batches and replays the source's blocks
//! through each batch's handlers, committing every block in its own store
//! transaction.
//!
//! ```text
//! registrations --create_batches--> [batch, batch, ...]
//!                                     |
//!   source.fetch_blocks(from, to) --> dispatch_block --> store.transact
//! ```

pub mod batch;
pub mod builder;
pub mod builtin;
pub mod context;
pub mod error;
pub mod heap;
pub mod matching;
pub mod progress;
pub mod registry;
pub mod runner;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{count_blocks, create_batches, merge_batches, Batch};
pub use builder::{
    BlockHookOptions, CallHandlerOptions, EventHandlerOptions, EvmLogHandlerOptions, ProcessorBuilder,
    ProcessorSettings,
};
pub use context::BlockContext;
pub use error::{BlockError, ConfigError, HandlerError, ProcessorError};
pub use matching::{
    TopicFilter, TopicSelection, CONTRACTS_CONTRACT_EMITTED, EVM_LOG, GEAR_MESSAGE_ENQUEUED,
    GEAR_USER_MESSAGE_SENT, WILDCARD,
};
pub use registry::DataHandlers;
pub use runner::{dispatch_block, Processor};
pub use traits::{BlockHandler, CallHandler, EventHandler};
