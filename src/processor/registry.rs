//! The mergeable handler aggregate.
//!
//! Every handler is stored with the sequence number of the registration that
//! created it. Lists are kept sorted by that number and merged with an
//! order-preserving merge, so the handlers for a key always run in
//! registration order, however batches were split and recombined.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use itertools::Itertools;

use super::matching::TopicFilter;
use super::traits::{BlockHandler, CallHandler, EventHandler};

/// A handler tagged with its registration sequence number.
#[derive(Clone)]
pub struct Registered<H> {
    pub order: usize,
    pub handler: H,
}

impl<H> Registered<H> {
    pub fn new(order: usize, handler: H) -> Self {
        Self { order, handler }
    }
}

pub type HandlerList<H> = Vec<Registered<H>>;
pub type KeyedHandlers<H> = HashMap<String, HandlerList<H>>;

#[derive(Clone)]
pub struct CallHandlerEntry {
    pub handler: Arc<dyn CallHandler>,
    pub trigger_for_failed_calls: bool,
}

#[derive(Clone)]
pub struct EvmLogHandlerEntry {
    pub handler: Arc<dyn EventHandler>,
    /// `None` matches every log of the contract.
    pub filter: Option<TopicFilter>,
}

/// All handlers that apply to one batch, grouped by trigger kind.
#[derive(Clone, Default)]
pub struct DataHandlers {
    pub pre: HandlerList<Arc<dyn BlockHandler>>,
    pub post: HandlerList<Arc<dyn BlockHandler>>,
    /// Qualified event name (or `*`) -> handlers
    pub events: KeyedHandlers<Arc<dyn EventHandler>>,
    /// Qualified call name (or `*`) -> handlers
    pub calls: KeyedHandlers<CallHandlerEntry>,
    /// Contract address -> handlers
    pub evm_logs: KeyedHandlers<EvmLogHandlerEntry>,
    /// Contract address -> handlers
    pub contracts_contract_emitted: KeyedHandlers<Arc<dyn EventHandler>>,
    /// Destination program id -> handlers
    pub gear_message_enqueued: KeyedHandlers<Arc<dyn EventHandler>>,
    /// Source program id -> handlers
    pub gear_user_message_sent: KeyedHandlers<Arc<dyn EventHandler>>,
}

impl DataHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Combine two handler sets into a new one. Neither input is modified.
    ///
    /// Unkeyed slots are merged list-wise and keyed slots key-wise; a key
    /// present on one side only passes through unchanged.
    pub fn merge(&self, other: &DataHandlers) -> DataHandlers {
        DataHandlers {
            pre: merge_lists(&self.pre, &other.pre),
            post: merge_lists(&self.post, &other.post),
            events: merge_keyed(&self.events, &other.events),
            calls: merge_keyed(&self.calls, &other.calls),
            evm_logs: merge_keyed(&self.evm_logs, &other.evm_logs),
            contracts_contract_emitted: merge_keyed(
                &self.contracts_contract_emitted,
                &other.contracts_contract_emitted,
            ),
            gear_message_enqueued: merge_keyed(
                &self.gear_message_enqueued,
                &other.gear_message_enqueued,
            ),
            gear_user_message_sent: merge_keyed(
                &self.gear_user_message_sent,
                &other.gear_user_message_sent,
            ),
        }
    }

    /// Registration sequence numbers of every handler in the set, ascending.
    pub fn registration_orders(&self) -> Vec<usize> {
        let mut orders: Vec<usize> = self
            .pre
            .iter()
            .map(|r| r.order)
            .chain(self.post.iter().map(|r| r.order))
            .chain(keyed_orders(&self.events))
            .chain(keyed_orders(&self.calls))
            .chain(keyed_orders(&self.evm_logs))
            .chain(keyed_orders(&self.contracts_contract_emitted))
            .chain(keyed_orders(&self.gear_message_enqueued))
            .chain(keyed_orders(&self.gear_user_message_sent))
            .collect();
        orders.sort_unstable();
        orders
    }

    /// Lowest registration sequence number in the set.
    pub fn first_order(&self) -> Option<usize> {
        self.registration_orders().first().copied()
    }

    pub fn handler_count(&self) -> usize {
        self.registration_orders().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handler_count() == 0
    }
}

impl fmt::Debug for DataHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataHandlers")
            .field("pre", &self.pre.len())
            .field("post", &self.post.len())
            .field("events", &sorted_keys(&self.events))
            .field("calls", &sorted_keys(&self.calls))
            .field("evm_logs", &sorted_keys(&self.evm_logs))
            .field(
                "contracts_contract_emitted",
                &sorted_keys(&self.contracts_contract_emitted),
            )
            .field("gear_message_enqueued", &sorted_keys(&self.gear_message_enqueued))
            .field("gear_user_message_sent", &sorted_keys(&self.gear_user_message_sent))
            .finish()
    }
}

/// Order-preserving merge by registration sequence number. When every entry
/// of `a` precedes every entry of `b` this is plain concatenation.
fn merge_lists<H: Clone>(a: &[Registered<H>], b: &[Registered<H>]) -> HandlerList<H> {
    a.iter()
        .merge_by(b.iter(), |x, y| x.order <= y.order)
        .cloned()
        .collect()
}

fn merge_keyed<H: Clone>(a: &KeyedHandlers<H>, b: &KeyedHandlers<H>) -> KeyedHandlers<H> {
    let mut merged = a.clone();
    for (key, handlers) in b {
        let combined = match merged.get(key) {
            Some(existing) => merge_lists(existing, handlers),
            None => handlers.clone(),
        };
        merged.insert(key.clone(), combined);
    }
    merged
}

fn keyed_orders<H>(map: &KeyedHandlers<H>) -> impl Iterator<Item = usize> + '_ {
    map.values().flat_map(|list| list.iter().map(|r| r.order))
}

fn sorted_keys<H>(map: &KeyedHandlers<H>) -> Vec<&str> {
    map.keys().map(String::as_str).sorted().collect()
}
