//! Handler matching for a single block item.
//!
//! Matching is a pure function of the batch's [`DataHandlers`] and the item:
//! it returns the handlers to run, in the order they must run.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::types::block::{Call, Event};

use super::registry::{CallHandlerEntry, DataHandlers, KeyedHandlers, Registered};
use super::traits::{CallHandler, EventHandler};

/// Key matching every event or call name.
pub const WILDCARD: &str = "*";

pub const EVM_LOG: &str = "EVM.Log";
pub const CONTRACTS_CONTRACT_EMITTED: &str = "Contracts.ContractEmitted";
pub const GEAR_MESSAGE_ENQUEUED: &str = "Gear.MessageEnqueued";
pub const GEAR_USER_MESSAGE_SENT: &str = "Gear.UserMessageSent";

/// Hex strings compare case-insensitively; anything else (e.g. SS58
/// addresses) is kept as is.
pub fn normalize_key(key: &str) -> String {
    if key.starts_with("0x") || key.starts_with("0X") {
        key.to_ascii_lowercase()
    } else {
        key.to_string()
    }
}

/// Accepted values for one topic position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicSelection {
    One(String),
    AnyOf(Vec<String>),
}

impl TopicSelection {
    fn normalized(self) -> Self {
        match self {
            TopicSelection::One(t) => TopicSelection::One(normalize_key(&t)),
            TopicSelection::AnyOf(ts) => {
                TopicSelection::AnyOf(ts.iter().map(|t| normalize_key(t)).collect())
            }
        }
    }

    fn accepts(&self, topic: &str) -> bool {
        match self {
            TopicSelection::One(t) => t == topic,
            TopicSelection::AnyOf(ts) => ts.iter().any(|t| t == topic),
        }
    }
}

/// Per-position topic filter for EVM logs. `None` at a position accepts any
/// topic there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter(Vec<Option<TopicSelection>>);

impl TopicFilter {
    pub fn new(positions: Vec<Option<TopicSelection>>) -> Self {
        Self(
            positions
                .into_iter()
                .map(|p| p.map(TopicSelection::normalized))
                .collect(),
        )
    }

    /// Filter on the first topic only, the usual event-signature match.
    pub fn topic0(signature_hash: &str) -> Self {
        Self::new(vec![Some(TopicSelection::One(signature_hash.to_string()))])
    }

    /// A constrained position beyond the end of `topics` does not match.
    pub fn matches(&self, topics: &[String]) -> bool {
        self.0.iter().enumerate().all(|(i, selection)| match selection {
            None => true,
            Some(selection) => topics
                .get(i)
                .is_some_and(|topic| selection.accepts(&normalize_key(topic))),
        })
    }
}

fn str_at<'a>(args: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(args, |value, key| value.get(key))
        .and_then(JsonValue::as_str)
}

/// Contract address of an `EVM.Log` event. Accepts both the flat
/// `{address, topics}` layout and the nested `{log: {address, topics}}` one.
pub fn evm_log_address(args: &JsonValue) -> Option<String> {
    str_at(args, &["address"])
        .or_else(|| str_at(args, &["log", "address"]))
        .map(normalize_key)
}

pub fn evm_log_topics(args: &JsonValue) -> Vec<String> {
    args.get("topics")
        .or_else(|| args.get("log").and_then(|log| log.get("topics")))
        .and_then(JsonValue::as_array)
        .map(|topics| {
            topics
                .iter()
                .filter_map(JsonValue::as_str)
                .map(normalize_key)
                .collect()
        })
        .unwrap_or_default()
}

/// Handlers to run for `event`: wildcard handlers, then handlers for the exact
/// name, then, for the well-known specialized names, the handlers registered
/// under the event's contract or program key.
pub fn event_handlers<'a>(handlers: &'a DataHandlers, event: &Event) -> Vec<&'a Arc<dyn EventHandler>> {
    let mut matched: Vec<&Arc<dyn EventHandler>> = Vec::new();

    matched.extend(list_for(&handlers.events, WILDCARD).iter().map(|r| &r.handler));
    if event.name != WILDCARD {
        matched.extend(list_for(&handlers.events, &event.name).iter().map(|r| &r.handler));
    }

    match event.name.as_str() {
        EVM_LOG => {
            if let Some(address) = evm_log_address(&event.args) {
                let topics = evm_log_topics(&event.args);
                matched.extend(
                    list_for(&handlers.evm_logs, &address)
                        .iter()
                        .filter(|r| r.handler.filter.as_ref().map_or(true, |f| f.matches(&topics)))
                        .map(|r| &r.handler.handler),
                );
            }
        }
        CONTRACTS_CONTRACT_EMITTED => {
            extend_keyed(&mut matched, &handlers.contracts_contract_emitted, &event.args, &["contract"]);
        }
        GEAR_MESSAGE_ENQUEUED => {
            extend_keyed(&mut matched, &handlers.gear_message_enqueued, &event.args, &["destination"]);
        }
        GEAR_USER_MESSAGE_SENT => {
            extend_keyed(
                &mut matched,
                &handlers.gear_user_message_sent,
                &event.args,
                &["message", "source"],
            );
        }
        _ => {}
    }

    matched
}

/// Handlers to run for `call`: wildcard handlers, then handlers for the exact
/// name. A failed call only reaches handlers registered with
/// `trigger_for_failed_calls`.
pub fn call_handlers<'a>(handlers: &'a DataHandlers, call: &Call) -> Vec<&'a Arc<dyn CallHandler>> {
    let exact: &[Registered<CallHandlerEntry>] = if call.name != WILDCARD {
        list_for(&handlers.calls, &call.name)
    } else {
        &[]
    };

    list_for(&handlers.calls, WILDCARD)
        .iter()
        .chain(exact.iter())
        .filter(|r| call.success || r.handler.trigger_for_failed_calls)
        .map(|r| &r.handler.handler)
        .collect()
}

fn list_for<'a, H>(map: &'a KeyedHandlers<H>, key: &str) -> &'a [Registered<H>] {
    map.get(key).map(Vec::as_slice).unwrap_or(&[])
}

fn extend_keyed<'a>(
    matched: &mut Vec<&'a Arc<dyn EventHandler>>,
    map: &'a KeyedHandlers<Arc<dyn EventHandler>>,
    args: &JsonValue,
    path: &[&str],
) {
    if let Some(key) = str_at(args, path).map(normalize_key) {
        matched.extend(list_for(map, &key).iter().map(|r| &r.handler));
    }
}
