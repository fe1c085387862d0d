//! Subscribe request sent on every (re)connect.
//!
//! Field names follow the geyser subscribe request (camelCase). Categories
//! this crate does not use are kept as empty maps so the request stays
//! complete on the wire.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::AccountFilter;
use crate::event::CommitmentLevel;

/// Filter label for slot notifications.
pub const SLOT_FILTER: &str = "client";
/// Filter label for transaction notifications.
pub const TRANSACTION_FILTER: &str = "transactions";

/// Slot notification filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotsFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_by_commitment: Option<bool>,
}

/// Transaction notification filter. Empty account lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<bool>,
    #[serde(default)]
    pub account_include: Vec<String>,
    #[serde(default)]
    pub account_exclude: Vec<String>,
    #[serde(default)]
    pub account_required: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest {
    pub id: i32,
}

/// Full subscribe request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    #[serde(default)]
    pub accounts: BTreeMap<String, Value>,
    #[serde(default)]
    pub slots: BTreeMap<String, SlotsFilter>,
    #[serde(default)]
    pub transactions: BTreeMap<String, TransactionsFilter>,
    #[serde(default)]
    pub transactions_status: BTreeMap<String, Value>,
    #[serde(default)]
    pub entry: BTreeMap<String, Value>,
    #[serde(default)]
    pub blocks: BTreeMap<String, Value>,
    #[serde(default)]
    pub blocks_meta: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commitment: Option<CommitmentLevel>,
    #[serde(default)]
    pub accounts_data_slice: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping: Option<PingRequest>,
}

impl SubscribeRequest {
    /// Commitment-filtered slot updates plus non-vote transactions touching
    /// `accounts`.
    pub fn slots_and_transactions(commitment: CommitmentLevel, accounts: &AccountFilter) -> Self {
        let mut req = Self {
            commitment: Some(commitment),
            ..Default::default()
        };
        req.slots.insert(
            SLOT_FILTER.to_string(),
            SlotsFilter {
                filter_by_commitment: Some(true),
            },
        );
        req.transactions.insert(
            TRANSACTION_FILTER.to_string(),
            TransactionsFilter {
                vote: Some(false),
                failed: None,
                account_include: accounts.include.clone(),
                account_exclude: accounts.exclude.clone(),
                account_required: accounts.required.clone(),
            },
        );
        req
    }

    /// Keep-alive reply for a server ping.
    pub fn ping(id: i32) -> Self {
        Self {
            ping: Some(PingRequest { id }),
            ..Default::default()
        }
    }
}
