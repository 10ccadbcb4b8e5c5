//! Captured canvas transactions.

use crate::error::{ApplyError, ProtocolError, ProtocolResult};
use crate::graph::GraphDelta;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Globally unique transaction identifier.
///
/// Locally captured transactions get a random UUID; identifiers received from
/// the server are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TxId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One captured delta to the canvas.
///
/// # Fields
///
/// - `tx_id`: unique identifier, used for de-duplication across merges
/// - `created_at`: capture time; the log's sort key
/// - `payload`: the node/edge delta, kept raw so payloads written by other
///   client versions never break decoding of the whole log
/// - `revoked`: undone; excluded from replay but kept in the log
/// - `synced_at`: set once the server durably accepted the transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique transaction ID.
    pub tx_id: TxId,
    /// Capture timestamp.
    pub created_at: DateTime<Utc>,
    /// Raw delta payload.
    pub payload: Value,
    /// Whether the transaction has been undone.
    #[serde(default)]
    pub revoked: bool,
    /// When the server accepted the transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Creates an unsynced, active transaction.
    pub fn new(tx_id: TxId, created_at: DateTime<Utc>, payload: Value) -> Self {
        Self {
            tx_id,
            created_at,
            payload,
            revoked: false,
            synced_at: None,
        }
    }

    /// Captures a delta as a new transaction stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns an error if the delta cannot be encoded as JSON.
    pub fn capture(delta: &GraphDelta) -> ProtocolResult<Self> {
        let payload =
            serde_json::to_value(delta).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(Self::new(TxId::generate(), Utc::now(), payload))
    }

    /// Decodes the payload into a delta.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::Undecodable`] for malformed payloads.
    pub fn delta(&self) -> Result<GraphDelta, ApplyError> {
        GraphDelta::from_value(&self.payload)
    }

    /// Returns true if the transaction is an active edit still to be pushed.
    pub fn is_pending(&self) -> bool {
        self.synced_at.is_none() && !self.revoked
    }

    /// Returns true if the server has accepted this transaction.
    pub fn is_synced(&self) -> bool {
        self.synced_at.is_some()
    }

    /// Returns a copy marked synced at the given time.
    #[must_use]
    pub fn synced(&self, at: DateTime<Utc>) -> Self {
        Self {
            synced_at: Some(at),
            ..self.clone()
        }
    }

    /// Returns a copy with `revoked` set and the sync stamp cleared.
    ///
    /// Revocation is state the server must learn, so the transaction becomes
    /// unsynced again.
    #[must_use]
    pub fn with_revoked(&self, revoked: bool) -> Self {
        Self {
            revoked,
            synced_at: None,
            ..self.clone()
        }
    }
}
