//! Subscribe update parsing.
//!
//! Updates arrive as JSON objects with exactly one populated kind:
//! ```json
//! {"filters":["client"],"slot":{"slot":"254000123","parent":"254000122","status":"SLOT_PROCESSED"}}
//! {"filters":["transactions"],"transaction":{"slot":"254000123","transaction":{...}}}
//! {"filters":[],"ping":{}}
//! ```
//! Slot numbers may be JSON strings (64-bit safe) or plain numbers.

use chainwatch_core::{StreamEvent, WatchError};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeUpdate {
    #[serde(default)]
    slot: Option<SlotUpdate>,
    #[serde(default)]
    transaction: Option<TransactionUpdate>,
    #[serde(default)]
    ping: Option<Value>,
    #[serde(default)]
    account: Option<Value>,
    #[serde(default)]
    block: Option<Value>,
    #[serde(default)]
    block_meta: Option<Value>,
    #[serde(default)]
    entry: Option<Value>,
    #[serde(default)]
    transaction_status: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SlotUpdate {
    #[serde(deserialize_with = "slot_number")]
    slot: u64,
    #[serde(default, deserialize_with = "optional_slot_number")]
    parent: Option<u64>,
    #[serde(default)]
    status: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TransactionUpdate {
    #[serde(deserialize_with = "slot_number")]
    slot: u64,
    #[serde(default)]
    transaction: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

impl NumberOrString {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            Self::Number(n) => Ok(n),
            Self::String(s) => s.trim().parse().map_err(E::custom),
        }
    }
}

fn slot_number<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    NumberOrString::deserialize(d)?.into_u64()
}

fn optional_slot_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    Option::<NumberOrString>::deserialize(d)?
        .map(NumberOrString::into_u64)
        .transpose()
}

/// Decode one subscribe update.
///
/// Returns `Ok(None)` for frames that carry nothing for the watcher (pongs,
/// empty updates).
pub fn decode_update(bytes: &[u8]) -> Result<Option<StreamEvent>, WatchError> {
    let update: SubscribeUpdate =
        serde_json::from_slice(bytes).map_err(|e| WatchError::Decode(e.to_string()))?;

    if let Some(slot) = update.slot {
        let status = slot.status.map(|s| match s {
            Value::String(s) => s,
            other => other.to_string(),
        });
        return Ok(Some(StreamEvent::SlotUpdate {
            slot: slot.slot,
            parent: slot.parent,
            status,
        }));
    }

    if let Some(tx) = update.transaction {
        return Ok(Some(StreamEvent::Transaction {
            slot: tx.slot,
            payload: tx.transaction,
        }));
    }

    if update.ping.is_some() {
        return Ok(Some(StreamEvent::Ping));
    }

    let other = update.account.is_some()
        || update.block.is_some()
        || update.block_meta.is_some()
        || update.entry.is_some()
        || update.transaction_status.is_some();
    if other {
        return Ok(Some(StreamEvent::Other));
    }

    // pong or empty frame
    Ok(None)
}
