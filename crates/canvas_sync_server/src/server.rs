//! Main server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::ledger::CanvasLedger;
use canvas_sync_protocol::{
    decode_message, encode_message, CanvasState, FetchStateRequest, FetchStateResponse,
    FetchTransactionsRequest, FetchTransactionsResponse, PushRequest, PushResponse,
    SnapshotRequest, SnapshotResponse, SyncMessage,
};
use std::sync::Arc;

/// The reference server of record.
///
/// Handles the four remote operations against an in-memory
/// [`CanvasLedger`], either as typed calls or as encoded [`SyncMessage`]s.
///
/// # Example
///
/// ```
/// use canvas_sync_server::{CanvasServer, ServerConfig};
/// use canvas_sync_protocol::{CanvasState, SnapshotRequest};
///
/// let server = CanvasServer::new(ServerConfig::default());
/// let response = server
///     .handle_snapshot(SnapshotRequest::new("demo", CanvasState::empty()))
///     .unwrap();
/// assert!(response.new_state.is_some());
/// assert_eq!(server.canvas_count(), 1);
/// ```
#[derive(Debug)]
pub struct CanvasServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl CanvasServer {
    /// Creates a server with an empty ledger.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_ledger(config, Arc::new(CanvasLedger::new()))
    }

    /// Creates a server over an existing ledger.
    pub fn with_ledger(config: ServerConfig, ledger: Arc<CanvasLedger>) -> Self {
        let context = Arc::new(HandlerContext::new(config, ledger));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Handles a state fetch.
    pub fn handle_fetch_state(&self, request: FetchStateRequest) -> ServerResult<FetchStateResponse> {
        self.handler.handle_fetch_state(request)
    }

    /// Handles a push.
    pub fn handle_push(&self, request: PushRequest) -> ServerResult<PushResponse> {
        self.handler.handle_push(request)
    }

    /// Handles a snapshot submission.
    pub fn handle_snapshot(&self, request: SnapshotRequest) -> ServerResult<SnapshotResponse> {
        self.handler.handle_snapshot(request)
    }

    /// Handles an incremental transaction fetch.
    pub fn handle_fetch_transactions(
        &self,
        request: FetchTransactionsRequest,
    ) -> ServerResult<FetchTransactionsResponse> {
        self.handler.handle_fetch_transactions(request)
    }

    /// Handles a sync message (dispatches to the matching handler).
    pub fn handle_message(&self, message: SyncMessage) -> ServerResult<SyncMessage> {
        match message {
            SyncMessage::FetchStateRequest(req) => self
                .handle_fetch_state(req)
                .map(SyncMessage::FetchStateResponse),
            SyncMessage::PushRequest(req) => self.handle_push(req).map(SyncMessage::PushResponse),
            SyncMessage::SnapshotRequest(req) => self
                .handle_snapshot(req)
                .map(|response| SyncMessage::SnapshotResponse(Box::new(response))),
            SyncMessage::FetchTransactionsRequest(req) => self
                .handle_fetch_transactions(req)
                .map(SyncMessage::FetchTransactionsResponse),
            other => Err(ServerError::UnexpectedMessage(other.type_code())),
        }
    }

    /// Decodes a request, handles it and encodes the response.
    pub fn handle_bytes(&self, request: &[u8]) -> ServerResult<Vec<u8>> {
        let message =
            decode_message(request).map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
        let response = self.handle_message(message)?;
        Ok(encode_message(&response)?)
    }

    /// Returns the shared ledger.
    pub fn ledger(&self) -> &Arc<CanvasLedger> {
        &self.context.ledger
    }

    /// Returns the current state of a canvas.
    pub fn state(&self, canvas_id: &str) -> Option<CanvasState> {
        self.context.ledger.state(canvas_id)
    }

    /// Returns the number of known canvases.
    pub fn canvas_count(&self) -> usize {
        self.context.ledger.len()
    }
}
