//! Cross-crate integration test helpers.
//!
//! Provides remotes that connect sessions to the reference server, with
//! optional fault injection.

use async_trait::async_trait;
use canvas_sync_engine::{RemoteService, SyncError, SyncResult};
use canvas_sync_protocol::{
    decode_message, encode_message, CanvasState, FetchStateRequest, FetchTransactionsRequest,
    PushRequest, PushResponse, SnapshotRequest, SnapshotResponse, SyncMessage, Transaction,
};
use canvas_sync_server::{CanvasServer, ServerConfig, ServerError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A remote that calls an in-process [`CanvasServer`].
///
/// Every call is encoded to CBOR, handled as bytes and decoded again, so the
/// wire format is exercised end to end.
#[derive(Debug, Clone)]
pub struct LoopbackRemote {
    server: Arc<CanvasServer>,
}

impl LoopbackRemote {
    /// Connects to an existing server.
    pub fn new(server: Arc<CanvasServer>) -> Self {
        Self { server }
    }

    /// Creates a fresh server with default configuration and connects to it.
    pub fn with_fresh_server() -> Self {
        Self::new(Arc::new(CanvasServer::new(ServerConfig::default())))
    }

    /// Returns the server.
    pub fn server(&self) -> &Arc<CanvasServer> {
        &self.server
    }

    fn call(&self, request: SyncMessage) -> SyncResult<SyncMessage> {
        let bytes = encode_message(&request)?;
        let response = self.server.handle_bytes(&bytes).map_err(server_error)?;
        Ok(decode_message(&response)?)
    }
}

fn server_error(error: ServerError) -> SyncError {
    if error.is_client_error() {
        SyncError::transport_fatal(error.to_string())
    } else {
        SyncError::transport_retryable(error.to_string())
    }
}

fn unexpected(message: &SyncMessage) -> SyncError {
    SyncError::InvalidResponse(format!("unexpected message type {}", message.type_code()))
}

#[async_trait]
impl RemoteService for LoopbackRemote {
    async fn fetch_state(&self, canvas_id: &str) -> SyncResult<Option<CanvasState>> {
        let request = SyncMessage::FetchStateRequest(FetchStateRequest {
            canvas_id: canvas_id.to_string(),
        });
        match self.call(request)? {
            SyncMessage::FetchStateResponse(response) => Ok(response.state),
            other => Err(unexpected(&other)),
        }
    }

    async fn push_transactions(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        match self.call(SyncMessage::PushRequest(request.clone()))? {
            SyncMessage::PushResponse(response) => Ok(response),
            other => Err(unexpected(&other)),
        }
    }

    async fn create_snapshot(&self, request: &SnapshotRequest) -> SyncResult<SnapshotResponse> {
        match self.call(SyncMessage::SnapshotRequest(request.clone()))? {
            SyncMessage::SnapshotResponse(response) => Ok(*response),
            other => Err(unexpected(&other)),
        }
    }

    async fn fetch_transactions_since(
        &self,
        request: &FetchTransactionsRequest,
    ) -> SyncResult<Vec<Transaction>> {
        match self.call(SyncMessage::FetchTransactionsRequest(request.clone()))? {
            SyncMessage::FetchTransactionsResponse(response) => Ok(response.transactions),
            other => Err(unexpected(&other)),
        }
    }
}

/// Which remote operation a [`FlakyRemote`] call was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCall {
    /// `fetch_state`
    FetchState,
    /// `push_transactions`
    Push,
    /// `create_snapshot`
    Snapshot,
    /// `fetch_transactions_since`
    FetchTransactions,
}

/// Wraps a remote and injects retryable failures.
///
/// The remote can be taken offline entirely, or told to fail the next `n`
/// calls. A failed call never reaches the inner remote.
pub struct FlakyRemote {
    inner: Arc<dyn RemoteService>,
    offline: AtomicBool,
    fail_next: AtomicUsize,
    fail_only: Mutex<Option<RemoteCall>>,
    /// Fail only after the inner call went through, as when the response is
    /// lost on the way back.
    lose_responses: AtomicBool,
    calls: Mutex<Vec<RemoteCall>>,
    failures: AtomicUsize,
}

impl FlakyRemote {
    /// Wraps `inner`, initially healthy.
    pub fn new(inner: Arc<dyn RemoteService>) -> Self {
        Self {
            inner,
            offline: AtomicBool::new(false),
            fail_next: AtomicUsize::new(0),
            fail_only: Mutex::new(None),
            lose_responses: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            failures: AtomicUsize::new(0),
        }
    }

    /// Takes the remote offline or brings it back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fails the next `n` calls.
    pub fn fail_next(&self, n: usize) {
        *self.fail_only.lock() = None;
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Fails the next `n` calls of one kind; other calls go through.
    pub fn fail_next_of(&self, kind: RemoteCall, n: usize) {
        *self.fail_only.lock() = Some(kind);
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Makes injected failures happen after the inner call completed.
    pub fn set_lose_responses(&self, lose: bool) {
        self.lose_responses.store(lose, Ordering::SeqCst);
    }

    /// Returns every call made so far, failed or not.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }

    /// Returns the number of calls of one kind.
    pub fn count(&self, kind: RemoteCall) -> usize {
        self.calls.lock().iter().filter(|c| **c == kind).count()
    }

    /// Returns the number of injected failures.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    fn should_fail(&self, kind: RemoteCall) -> bool {
        self.calls.lock().push(kind);
        let targeted = self.fail_only.lock().map_or(true, |only| only == kind);
        let fail = self.offline.load(Ordering::SeqCst)
            || (targeted
                && self
                    .fail_next
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok());
        if fail {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        fail
    }

    async fn run<T, F>(&self, kind: RemoteCall, call: F) -> SyncResult<T>
    where
        F: std::future::Future<Output = SyncResult<T>>,
    {
        if !self.should_fail(kind) {
            return call.await;
        }
        if self.lose_responses.load(Ordering::SeqCst) {
            let _ = call.await;
        }
        Err(SyncError::transport_retryable(format!("injected {kind:?} failure")))
    }
}

#[async_trait]
impl RemoteService for FlakyRemote {
    async fn fetch_state(&self, canvas_id: &str) -> SyncResult<Option<CanvasState>> {
        self.run(RemoteCall::FetchState, self.inner.fetch_state(canvas_id))
            .await
    }

    async fn push_transactions(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.run(RemoteCall::Push, self.inner.push_transactions(request))
            .await
    }

    async fn create_snapshot(&self, request: &SnapshotRequest) -> SyncResult<SnapshotResponse> {
        self.run(RemoteCall::Snapshot, self.inner.create_snapshot(request))
            .await
    }

    async fn fetch_transactions_since(
        &self,
        request: &FetchTransactionsRequest,
    ) -> SyncResult<Vec<Transaction>> {
        self.run(
            RemoteCall::FetchTransactions,
            self.inner.fetch_transactions_since(request),
        )
        .await
    }
}
