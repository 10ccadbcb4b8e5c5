//! Remote service abstraction.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use canvas_sync_protocol::{
    CanvasState, FetchTransactionsRequest, PushRequest, PushResponse, SnapshotRequest,
    SnapshotResponse, SyncedTransaction, Transaction,
};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// The server of record, reached over request/response calls.
///
/// This trait abstracts the network layer, so the engine works the same over
/// HTTP, an in-process server, or a mock.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Fetches the authoritative state, or `None` if the canvas is unknown.
    async fn fetch_state(&self, canvas_id: &str) -> SyncResult<Option<CanvasState>>;

    /// Pushes transactions captured against `request.version`.
    async fn push_transactions(&self, request: &PushRequest) -> SyncResult<PushResponse>;

    /// Submits a state as the new snapshot.
    async fn create_snapshot(&self, request: &SnapshotRequest) -> SyncResult<SnapshotResponse>;

    /// Fetches transactions created at or after `request.since`.
    async fn fetch_transactions_since(
        &self,
        request: &FetchTransactionsRequest,
    ) -> SyncResult<Vec<Transaction>>;
}

/// A scripted remote for testing.
///
/// Unless a response is set, `fetch_state` returns `None`, pushes are
/// accepted with every transaction stamped at the current time, and
/// `fetch_transactions_since` returns nothing. `create_snapshot` has no
/// default and fails until a response is set.
#[derive(Debug, Default)]
pub struct MockRemote {
    state: Mutex<Option<CanvasState>>,
    push_response: Mutex<Option<PushResponse>>,
    snapshot_response: Mutex<Option<SnapshotResponse>>,
    transactions: Mutex<Vec<Transaction>>,
    failure: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
    pushes: Mutex<Vec<PushRequest>>,
    snapshots: Mutex<Vec<SnapshotRequest>>,
    fetch_calls: AtomicUsize,
    poll_calls: AtomicUsize,
}

impl MockRemote {
    /// Creates a new mock remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the state returned by `fetch_state`.
    pub fn set_state(&self, state: Option<CanvasState>) {
        *self.state.lock() = state;
    }

    /// Sets the push response.
    pub fn set_push_response(&self, response: PushResponse) {
        *self.push_response.lock() = Some(response);
    }

    /// Sets the snapshot response.
    pub fn set_snapshot_response(&self, response: SnapshotResponse) {
        *self.snapshot_response.lock() = Some(response);
    }

    /// Sets the transactions returned by polls.
    pub fn set_transactions(&self, transactions: Vec<Transaction>) {
        *self.transactions.lock() = transactions;
    }

    /// Makes every call fail with a retryable error until cleared.
    pub fn set_failure(&self, message: Option<&str>) {
        *self.failure.lock() = message.map(str::to_string);
    }

    /// Delays every call by the given duration.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Returns every push request received so far.
    pub fn pushes(&self) -> Vec<PushRequest> {
        self.pushes.lock().clone()
    }

    /// Returns every snapshot request received so far.
    pub fn snapshots(&self) -> Vec<SnapshotRequest> {
        self.snapshots.lock().clone()
    }

    /// Returns the number of `fetch_state` calls.
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Returns the number of `fetch_transactions_since` calls.
    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> SyncResult<()> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.failure.lock().clone() {
            Some(message) => Err(SyncError::transport_retryable(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteService for MockRemote {
    async fn fetch_state(&self, _canvas_id: &str) -> SyncResult<Option<CanvasState>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        Ok(self.state.lock().clone())
    }

    async fn push_transactions(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.pushes.lock().push(request.clone());
        self.enter().await?;
        let scripted = self.push_response.lock().clone();
        Ok(scripted.unwrap_or_else(|| {
            let now = Utc::now();
            PushResponse::accepted(
                request
                    .transactions
                    .iter()
                    .map(|tx| SyncedTransaction::new(tx.tx_id.clone(), now))
                    .collect(),
            )
        }))
    }

    async fn create_snapshot(&self, request: &SnapshotRequest) -> SyncResult<SnapshotResponse> {
        self.snapshots.lock().push(request.clone());
        self.enter().await?;
        self.snapshot_response
            .lock()
            .clone()
            .ok_or_else(|| SyncError::InvalidResponse("no mock snapshot response set".into()))
    }

    async fn fetch_transactions_since(
        &self,
        request: &FetchTransactionsRequest,
    ) -> SyncResult<Vec<Transaction>> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        Ok(self
            .transactions
            .lock()
            .iter()
            .filter(|tx| tx.created_at >= request.since)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn mock_remote_failure() {
        let remote = MockRemote::new();
        remote.set_failure(Some("offline"));

        let result = remote.fetch_state("c").await;
        assert!(matches!(result, Err(SyncError::Transport { retryable: true, .. })));
        assert_eq!(remote.fetch_calls(), 1);

        remote.set_failure(None);
        assert!(remote.fetch_state("c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mock_remote_accepts_pushes_by_default() {
        let remote = MockRemote::new();
        let tx = Transaction::new("t1".into(), Utc::now(), json!({}));
        let response = remote
            .push_transactions(&PushRequest::new("c", "v1", vec![tx]))
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.synced_transactions.len(), 1);
        assert_eq!(remote.pushes().len(), 1);
    }

    #[tokio::test]
    async fn mock_remote_snapshot_requires_response() {
        let remote = MockRemote::new();
        let request = SnapshotRequest::new("c", CanvasState::empty());
        assert!(matches!(
            remote.create_snapshot(&request).await,
            Err(SyncError::InvalidResponse(_))
        ));
        assert_eq!(remote.snapshots().len(), 1);
    }
}
