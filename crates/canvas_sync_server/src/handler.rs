//! Request handlers for the remote operations.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::ledger::CanvasLedger;
use canvas_sync_protocol::{
    FetchStateRequest, FetchStateResponse, FetchTransactionsRequest, FetchTransactionsResponse,
    PushRequest, PushResponse, SnapshotRequest, SnapshotResponse,
};
use chrono::Utc;
use std::sync::Arc;

/// Context shared by request handlers.
#[derive(Debug)]
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Canvas states (shared across all handlers).
    pub ledger: Arc<CanvasLedger>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, ledger: Arc<CanvasLedger>) -> Self {
        Self { config, ledger }
    }
}

/// Handler for the four remote operations.
#[derive(Debug)]
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles a state fetch.
    pub fn handle_fetch_state(&self, request: FetchStateRequest) -> ServerResult<FetchStateResponse> {
        require_canvas_id(&request.canvas_id)?;
        Ok(FetchStateResponse {
            state: self.context.ledger.state(&request.canvas_id),
        })
    }

    /// Handles a push.
    ///
    /// A push against a version other than the current one is answered with
    /// `success: false` rather than an error.
    pub fn handle_push(&self, request: PushRequest) -> ServerResult<PushResponse> {
        require_canvas_id(&request.canvas_id)?;
        let max = self.context.config.max_push_batch;
        if request.transactions.len() > max {
            return Err(ServerError::BatchTooLarge {
                size: request.transactions.len(),
                max,
            });
        }

        match self.context.ledger.push(
            &request.canvas_id,
            &request.version,
            &request.transactions,
            Utc::now(),
        ) {
            Some(synced) => {
                tracing::debug!(
                    canvas_id = %request.canvas_id,
                    version = %request.version,
                    transactions = synced.len(),
                    "push accepted"
                );
                Ok(PushResponse::accepted(synced))
            }
            None => {
                tracing::debug!(canvas_id = %request.canvas_id, version = %request.version, "push rejected");
                Ok(PushResponse::rejected())
            }
        }
    }

    /// Handles a snapshot submission.
    pub fn handle_snapshot(&self, request: SnapshotRequest) -> ServerResult<SnapshotResponse> {
        require_canvas_id(&request.canvas_id)?;
        if request.overwrite {
            let state = self
                .context
                .ledger
                .overwrite(&request.canvas_id, &request.state, Utc::now());
            tracing::info!(
                canvas_id = %request.canvas_id,
                from = %request.state.version,
                to = %state.version,
                "canvas overwritten"
            );
            return Ok(SnapshotResponse::created(state));
        }
        match self
            .context
            .ledger
            .snapshot(&request.canvas_id, &request.state, Utc::now())
        {
            Ok(state) => {
                tracing::info!(
                    canvas_id = %request.canvas_id,
                    from = %request.state.version,
                    to = %state.version,
                    "snapshot created"
                );
                Ok(SnapshotResponse::created(state))
            }
            Err(conflict) => {
                tracing::info!(
                    canvas_id = %request.canvas_id,
                    submitted = %conflict.local_state.version,
                    current = %conflict.remote_state.version,
                    "stale snapshot"
                );
                Ok(SnapshotResponse::conflicted(conflict))
            }
        }
    }

    /// Handles an incremental transaction fetch.
    pub fn handle_fetch_transactions(
        &self,
        request: FetchTransactionsRequest,
    ) -> ServerResult<FetchTransactionsResponse> {
        require_canvas_id(&request.canvas_id)?;
        Ok(FetchTransactionsResponse {
            transactions: self.context.ledger.transactions_since(
                &request.canvas_id,
                &request.version,
                request.since,
            ),
        })
    }
}

fn require_canvas_id(canvas_id: &str) -> ServerResult<()> {
    if canvas_id.is_empty() {
        return Err(ServerError::InvalidRequest("empty canvas id".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_sync_protocol::{CanvasState, Graph, Transaction};
    use serde_json::json;

    fn tx(id: &str) -> Transaction {
        Transaction::new(
            id.into(),
            Utc::now(),
            json!({ "nodes": { "added": [{ "id": id, "body": {} }] } }),
        )
    }

    fn create_handler(config: ServerConfig) -> RequestHandler {
        let ledger = Arc::new(CanvasLedger::new());
        ledger.insert("c", CanvasState::new("v1", Graph::default(), Utc::now()));
        RequestHandler::new(Arc::new(HandlerContext::new(config, ledger)))
    }

    #[test]
    fn fetch_unknown_canvas() {
        let handler = create_handler(ServerConfig::default());
        let response = handler
            .handle_fetch_state(FetchStateRequest {
                canvas_id: "other".into(),
            })
            .unwrap();
        assert!(response.state.is_none());
    }

    #[test]
    fn push_and_fetch() {
        let handler = create_handler(ServerConfig::default());
        let response = handler
            .handle_push(PushRequest::new("c", "v1", vec![tx("a"), tx("b")]))
            .unwrap();
        assert!(response.success);
        assert_eq!(response.synced_transactions.len(), 2);

        let fetched = handler
            .handle_fetch_transactions(FetchTransactionsRequest::new(
                "c",
                "v1",
                chrono::DateTime::<Utc>::UNIX_EPOCH,
            ))
            .unwrap();
        assert_eq!(fetched.transactions.len(), 2);
    }

    #[test]
    fn stale_push_is_rejected() {
        let handler = create_handler(ServerConfig::default());
        let response = handler
            .handle_push(PushRequest::new("c", "v0", vec![tx("a")]))
            .unwrap();
        assert!(!response.success);
        assert!(response.synced_transactions.is_empty());
    }

    #[test]
    fn oversized_push_is_an_error() {
        let handler = create_handler(ServerConfig::new().with_max_push_batch(1));
        let result = handler.handle_push(PushRequest::new("c", "v1", vec![tx("a"), tx("b")]));
        assert!(matches!(
            result,
            Err(ServerError::BatchTooLarge { size: 2, max: 1 })
        ));
    }

    #[test]
    fn empty_canvas_id_is_invalid() {
        let handler = create_handler(ServerConfig::default());
        let result = handler.handle_fetch_state(FetchStateRequest {
            canvas_id: String::new(),
        });
        assert!(result.unwrap_err().is_client_error());
    }

    #[test]
    fn snapshot_then_stale_snapshot() {
        let handler = create_handler(ServerConfig::default());
        let current = handler
            .handle_fetch_state(FetchStateRequest {
                canvas_id: "c".into(),
            })
            .unwrap()
            .state
            .unwrap();

        let created = handler
            .handle_snapshot(SnapshotRequest::new("c", current.clone()))
            .unwrap();
        assert!(created.new_state.is_some());

        // Same submission again: its version is now stale
        let stale = handler
            .handle_snapshot(SnapshotRequest::new("c", current))
            .unwrap();
        assert!(stale.new_state.is_none());
        assert!(stale.conflict.is_some());
    }

    #[test]
    fn overwrite_replaces_a_newer_version() {
        let handler = create_handler(ServerConfig::default());
        let stale = handler
            .handle_fetch_state(FetchStateRequest {
                canvas_id: "c".into(),
            })
            .unwrap()
            .state
            .unwrap();
        handler
            .handle_snapshot(SnapshotRequest::new("c", stale.clone()))
            .unwrap();

        let replaced = handler
            .handle_snapshot(SnapshotRequest::overwrite("c", stale.clone()))
            .unwrap();
        assert!(replaced.conflict.is_none());
        let state = replaced.new_state.unwrap();
        assert_ne!(state.version, stale.version);
    }
}
