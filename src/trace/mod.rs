/// Trace record: a portable description of one committed artifact.
///
/// The trace ties together everything a reader needs to find and verify
/// a committed payload:
/// - Where the ciphertext lives (payload URI, gateway URL and tier)
/// - How it is unlocked (capsule URI, release condition, dossier)
/// - Which contract governs the release (chain id, contract address)
/// - A BLAKE3 digest of the ciphertext for integrity checks
///
/// Building a trace is pure. No clock is read, so the same commit result
/// always produces the same record byte for byte.
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CommitError, Result};
use crate::pipeline::CommitResult;

/// Polygon Amoy testnet.
pub const DEFAULT_CHAIN_ID: u64 = 80002;

/// A single trace value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraceValue {
    Text(String),
    Number(u64),
}

impl TraceValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TraceValue::Text(s) => Some(s),
            TraceValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<u64> {
        match self {
            TraceValue::Number(n) => Some(*n),
            TraceValue::Text(_) => None,
        }
    }
}

impl fmt::Display for TraceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceValue::Text(s) => f.write_str(s),
            TraceValue::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<String> for TraceValue {
    fn from(s: String) -> Self {
        TraceValue::Text(s)
    }
}

impl From<&str> for TraceValue {
    fn from(s: &str) -> Self {
        TraceValue::Text(s.to_string())
    }
}

impl From<u64> for TraceValue {
    fn from(n: u64) -> Self {
        TraceValue::Number(n)
    }
}

/// Flat key/value trace. Keys are kept sorted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceRecord(BTreeMap<String, TraceValue>);

impl TraceRecord {
    pub fn get(&self, key: &str) -> Option<&TraceValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TraceValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn insert(&mut self, key: &str, value: impl Into<TraceValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Pretty-printed JSON with keys in sorted order.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CommitError::Serialization(e.to_string()))
    }

    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| CommitError::Serialization(e.to_string()))
    }
}

/// Network identifiers stamped into every trace. Opaque configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceContext {
    pub chain_id: u64,
    pub contract_address: String,
}

impl Default for TraceContext {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            contract_address: String::new(),
        }
    }
}

/// Builds trace records for committed artifacts.
#[derive(Debug, Clone, Default)]
pub struct TraceBuilder {
    context: TraceContext,
}

impl TraceBuilder {
    pub fn new(context: TraceContext) -> Self {
        Self { context }
    }

    pub fn build(&self, result: &CommitResult) -> TraceRecord {
        let artifact = result.artifact();
        let stored = result.backend_specific();
        let condition = &artifact.condition;

        let mut record = TraceRecord::default();
        record.insert("payload_uri", result.payload_uri());
        record.insert("capsule_uri", artifact.capsule_uri.as_str());
        record.insert("condition", condition.describe());
        record.insert("description", artifact.description.as_str());
        record.insert("storage_type", result.storage_type().as_str());
        record.insert("dossier_id", condition.dossier_id.as_str());
        record.insert("user_address", condition.user_address.to_string());
        record.insert("chain_id", self.context.chain_id);
        record.insert("original_file_name", artifact.original_file_name.as_str());
        record.insert("ciphertext_size", artifact.ciphertext.len() as u64);
        record.insert(
            "ciphertext_blake3",
            blake3::hash(&artifact.ciphertext).to_hex().to_string(),
        );

        // Absent values are left out rather than written as "".
        if !self.context.contract_address.is_empty() {
            record.insert("contract_address", self.context.contract_address.as_str());
        }
        if let Some(url) = &stored.gateway_url {
            record.insert("gateway_url", url.as_str());
        }
        if let Some(tier) = stored.gateway_tier {
            record.insert("gateway_tier", tier.as_str());
        }
        if let Some(pinned_at) = stored.pinned_at {
            record.insert("pinned_at", pinned_at.to_rfc3339());
        }

        record
    }
}
