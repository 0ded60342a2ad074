//! Normalized block data delivered by a block source.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    pub hash: String,
    pub parent_hash: String,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
}

/// A decoded event. `name` is the qualified `Module.Event` name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub args: JsonValue,
    /// Position of the event within the block.
    pub index: u32,
}

/// A decoded call. `name` is the qualified `Module.Call` name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub name: String,
    pub args: JsonValue,
    pub success: bool,
    pub id: String,
}

/// One entry of a block's unified item log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockItem {
    Event(Event),
    Call(Call),
}

/// A block header plus its unified item log.
///
/// The items are in the order the source produced them: events and calls
/// interleaved, child calls before their parent, and events deposited during a
/// call before that call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockData {
    pub header: BlockHeader,
    pub items: Vec<BlockItem>,
}

impl BlockData {
    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.items.iter().filter_map(|item| match item {
            BlockItem::Event(e) => Some(e),
            BlockItem::Call(_) => None,
        })
    }

    pub fn calls(&self) -> impl Iterator<Item = &Call> {
        self.items.iter().filter_map(|item| match item {
            BlockItem::Call(c) => Some(c),
            BlockItem::Event(_) => None,
        })
    }
}
