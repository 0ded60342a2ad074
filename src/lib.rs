//! Block replay indexer.
//!
//! Replays a chain's blocks through handlers registered on a
//! [`processor::ProcessorBuilder`], each scoped to its own block range, and
//! commits the derived state block by block.

pub mod db;
pub mod processor;
pub mod rpc;
pub mod source;
pub mod types;
