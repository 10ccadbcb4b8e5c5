//! Wire messages exchanged with the server of record.
//!
//! Every request is scoped by `canvas_id`. Field names are camelCase on the
//! wire.

use crate::conflict::VersionConflict;
use crate::state::CanvasState;
use crate::transaction::{Transaction, TxId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A protocol message, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum SyncMessage {
    /// Fetch the current state.
    FetchStateRequest(FetchStateRequest),
    /// Current state, if the canvas exists.
    FetchStateResponse(FetchStateResponse),
    /// Push new transactions.
    PushRequest(PushRequest),
    /// Push acknowledgement.
    PushResponse(PushResponse),
    /// Submit a state as the new snapshot.
    SnapshotRequest(SnapshotRequest),
    /// Snapshot outcome.
    SnapshotResponse(Box<SnapshotResponse>),
    /// Fetch transactions created since a timestamp.
    FetchTransactionsRequest(FetchTransactionsRequest),
    /// Transactions created since the requested timestamp.
    FetchTransactionsResponse(FetchTransactionsResponse),
}

impl SyncMessage {
    /// Returns the message type code.
    pub fn type_code(&self) -> u8 {
        match self {
            SyncMessage::FetchStateRequest(_) => 1,
            SyncMessage::FetchStateResponse(_) => 2,
            SyncMessage::PushRequest(_) => 3,
            SyncMessage::PushResponse(_) => 4,
            SyncMessage::SnapshotRequest(_) => 5,
            SyncMessage::SnapshotResponse(_) => 6,
            SyncMessage::FetchTransactionsRequest(_) => 7,
            SyncMessage::FetchTransactionsResponse(_) => 8,
        }
    }

    /// Returns the canvas a request is scoped to. Responses return `None`.
    pub fn canvas_id(&self) -> Option<&str> {
        match self {
            SyncMessage::FetchStateRequest(r) => Some(&r.canvas_id),
            SyncMessage::PushRequest(r) => Some(&r.canvas_id),
            SyncMessage::SnapshotRequest(r) => Some(&r.canvas_id),
            SyncMessage::FetchTransactionsRequest(r) => Some(&r.canvas_id),
            _ => None,
        }
    }
}

/// Request for a canvas's current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchStateRequest {
    /// Canvas ID.
    pub canvas_id: String,
}

/// The server's current state for a canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchStateResponse {
    /// `None` if the server has never seen the canvas.
    #[serde(default)]
    pub state: Option<CanvasState>,
}

/// Transactions pushed against a specific version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// Canvas ID.
    pub canvas_id: String,
    /// Version the transactions were captured against.
    pub version: String,
    /// Transactions to append.
    pub transactions: Vec<Transaction>,
}

impl PushRequest {
    /// Creates a push request.
    pub fn new(
        canvas_id: impl Into<String>,
        version: impl Into<String>,
        transactions: Vec<Transaction>,
    ) -> Self {
        Self {
            canvas_id: canvas_id.into(),
            version: version.into(),
            transactions,
        }
    }
}

/// Server acknowledgement of one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedTransaction {
    /// Acknowledged transaction.
    pub tx_id: TxId,
    /// When the server stored it.
    pub synced_at: DateTime<Utc>,
}

impl SyncedTransaction {
    /// Creates an acknowledgement.
    pub fn new(tx_id: TxId, synced_at: DateTime<Utc>) -> Self {
        Self { tx_id, synced_at }
    }
}

/// Push outcome.
///
/// `success: false` means the push was rejected as a whole, typically
/// because the client's version is stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// Whether the push was accepted.
    pub success: bool,
    /// Per-transaction acknowledgements.
    #[serde(default)]
    pub synced_transactions: Vec<SyncedTransaction>,
}

impl PushResponse {
    /// Creates an accepted response.
    pub fn accepted(synced_transactions: Vec<SyncedTransaction>) -> Self {
        Self {
            success: true,
            synced_transactions,
        }
    }

    /// Creates a rejected response.
    pub fn rejected() -> Self {
        Self {
            success: false,
            synced_transactions: Vec::new(),
        }
    }
}

/// A full state submitted as the new authoritative snapshot.
///
/// A regular request is consolidated with the server's log and conflicts if
/// the server moved to another version. An `overwrite` request replaces the
/// server's state outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRequest {
    /// Canvas ID.
    pub canvas_id: String,
    /// State to consolidate.
    pub state: CanvasState,
    /// Replace the server's state instead of merging with it.
    #[serde(default)]
    pub overwrite: bool,
}

impl SnapshotRequest {
    /// Creates a snapshot request.
    pub fn new(canvas_id: impl Into<String>, state: CanvasState) -> Self {
        Self {
            canvas_id: canvas_id.into(),
            state,
            overwrite: false,
        }
    }

    /// Creates a request that makes `state` authoritative regardless of the
    /// server's current version.
    pub fn overwrite(canvas_id: impl Into<String>, state: CanvasState) -> Self {
        Self {
            overwrite: true,
            ..Self::new(canvas_id, state)
        }
    }
}

/// Snapshot outcome: a fresh state or a version conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    /// Set if the submitted version is not the server's current one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<VersionConflict>,
    /// The new authoritative state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_state: Option<CanvasState>,
}

impl SnapshotResponse {
    /// Creates a response carrying the new state.
    pub fn created(new_state: CanvasState) -> Self {
        Self {
            conflict: None,
            new_state: Some(new_state),
        }
    }

    /// Creates a response carrying a conflict.
    pub fn conflicted(conflict: VersionConflict) -> Self {
        Self {
            conflict: Some(conflict),
            new_state: None,
        }
    }
}

/// Request for transactions created at or after `since`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchTransactionsRequest {
    /// Canvas ID.
    pub canvas_id: String,
    /// Version whose log is queried.
    pub version: String,
    /// Inclusive lower bound on `created_at`.
    pub since: DateTime<Utc>,
}

impl FetchTransactionsRequest {
    /// Creates a fetch request.
    pub fn new(
        canvas_id: impl Into<String>,
        version: impl Into<String>,
        since: DateTime<Utc>,
    ) -> Self {
        Self {
            canvas_id: canvas_id.into(),
            version: version.into(),
            since,
        }
    }
}

/// Transactions matching a [`FetchTransactionsRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchTransactionsResponse {
    /// Matching transactions in log order.
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}
