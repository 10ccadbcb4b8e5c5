//! Snapshot lifecycle.

use crate::error::{SyncError, SyncResult};
use crate::transport::RemoteService;
use canvas_sync_protocol::{CanvasState, SnapshotRequest, VersionConflict};
use parking_lot::RwLock;

/// Where the version manager is in its snapshot cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPhase {
    /// No snapshot in flight.
    Stable,
    /// A snapshot request is in flight.
    Snapshotting,
}

/// Outcome of one snapshot attempt.
#[derive(Debug)]
pub enum SnapshotOutcome {
    /// The server consolidated the submitted state into a new version.
    Adopted(CanvasState),
    /// The call failed, but the server already holds a newer version.
    Recovered(CanvasState),
    /// The server's version differs from the submitted one.
    Conflict(VersionConflict),
    /// The call failed and the server still holds the submitted version;
    /// the next cycle retries.
    Failed(SyncError),
}

/// Decides when the transaction log is collapsed into a new base snapshot,
/// and drives the `Stable → Snapshotting → Stable` cycle.
#[derive(Debug)]
pub struct VersionManager {
    threshold: usize,
    phase: RwLock<SnapshotPhase>,
}

impl VersionManager {
    /// Creates a manager that snapshots once the log exceeds `threshold`.
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            phase: RwLock::new(SnapshotPhase::Stable),
        }
    }

    /// Returns the current phase.
    pub fn phase(&self) -> SnapshotPhase {
        *self.phase.read()
    }

    /// Returns true if the state's log is long enough to collapse.
    ///
    /// Every entry since the last snapshot counts, synced or not.
    pub fn needs_snapshot(&self, state: &CanvasState) -> bool {
        state.transactions.len() > self.threshold
    }

    /// Submits the full state as the new snapshot.
    ///
    /// If the call fails, the server's state is fetched: a version different
    /// from the submitted one means an earlier attempt went through, and that
    /// state is returned for adoption.
    pub async fn snapshot(
        &self,
        canvas_id: &str,
        state: &CanvasState,
        remote: &dyn RemoteService,
    ) -> SnapshotOutcome {
        *self.phase.write() = SnapshotPhase::Snapshotting;
        let outcome = self.attempt(canvas_id, state, remote).await;
        *self.phase.write() = SnapshotPhase::Stable;
        outcome
    }

    async fn attempt(
        &self,
        canvas_id: &str,
        state: &CanvasState,
        remote: &dyn RemoteService,
    ) -> SnapshotOutcome {
        tracing::debug!(
            canvas_id,
            version = %state.version,
            transactions = state.transactions.len(),
            "requesting snapshot"
        );

        let error = match submit(canvas_id, state, remote).await {
            Ok(SubmitResult::Created(next)) => {
                tracing::info!(canvas_id, from = %state.version, to = %next.version, "snapshot created");
                return SnapshotOutcome::Adopted(next);
            }
            Ok(SubmitResult::Conflict(conflict)) => return SnapshotOutcome::Conflict(conflict),
            Err(e) => e,
        };

        tracing::warn!(canvas_id, error = %error, "snapshot request failed");
        match remote.fetch_state(canvas_id).await {
            Ok(Some(current)) if current.version != state.version => {
                tracing::info!(canvas_id, version = %current.version, "snapshot recovered from server");
                SnapshotOutcome::Recovered(current)
            }
            _ => SnapshotOutcome::Failed(error),
        }
    }
}

enum SubmitResult {
    Created(CanvasState),
    Conflict(VersionConflict),
}

async fn submit(
    canvas_id: &str,
    state: &CanvasState,
    remote: &dyn RemoteService,
) -> SyncResult<SubmitResult> {
    let response = remote
        .create_snapshot(&SnapshotRequest::new(canvas_id, state.clone()))
        .await?;
    match (response.new_state, response.conflict) {
        (Some(next), _) => Ok(SubmitResult::Created(next)),
        (None, Some(conflict)) => Ok(SubmitResult::Conflict(conflict)),
        (None, None) => Err(SyncError::InvalidResponse(
            "snapshot response carries neither state nor conflict".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockRemote;
    use canvas_sync_protocol::{Graph, SnapshotResponse, Transaction};
    use chrono::Utc;
    use serde_json::json;

    fn state_with(n: usize) -> CanvasState {
        let mut state = CanvasState::new("v1", Graph::default(), Utc::now());
        for i in 0..n {
            state.transactions.push(Transaction::new(
                format!("t{i}").into(),
                Utc::now(),
                json!({}),
            ));
        }
        state
    }

    #[test]
    fn threshold_is_exclusive() {
        let manager = VersionManager::new(3);
        assert!(!manager.needs_snapshot(&state_with(3)));
        assert!(manager.needs_snapshot(&state_with(4)));
        assert_eq!(manager.phase(), SnapshotPhase::Stable);
    }

    #[tokio::test]
    async fn snapshot_adopts_new_state() {
        let manager = VersionManager::new(1);
        let remote = MockRemote::new();
        let next = CanvasState::new("v2", Graph::default(), Utc::now());
        remote.set_snapshot_response(SnapshotResponse::created(next.clone()));

        let outcome = manager.snapshot("c", &state_with(2), &remote).await;
        assert!(matches!(outcome, SnapshotOutcome::Adopted(s) if s == next));
        assert_eq!(manager.phase(), SnapshotPhase::Stable);
    }

    #[tokio::test]
    async fn snapshot_reports_conflict() {
        let manager = VersionManager::new(1);
        let remote = MockRemote::new();
        let conflict = VersionConflict::new(
            state_with(2),
            CanvasState::new("v9", Graph::default(), Utc::now()),
        );
        remote.set_snapshot_response(SnapshotResponse::conflicted(conflict));

        let outcome = manager.snapshot("c", &state_with(2), &remote).await;
        assert!(matches!(outcome, SnapshotOutcome::Conflict(_)));
    }

    #[tokio::test]
    async fn failed_snapshot_recovers_from_newer_server_version() {
        let manager = VersionManager::new(1);
        let remote = MockRemote::new();
        // No snapshot response set: the call fails
        let newer = CanvasState::new("v2", Graph::default(), Utc::now());
        remote.set_state(Some(newer.clone()));

        let outcome = manager.snapshot("c", &state_with(2), &remote).await;
        assert!(matches!(outcome, SnapshotOutcome::Recovered(s) if s == newer));
    }

    #[tokio::test]
    async fn failed_snapshot_with_same_server_version_retries() {
        let manager = VersionManager::new(1);
        let remote = MockRemote::new();
        remote.set_state(Some(state_with(0)));

        let outcome = manager.snapshot("c", &state_with(2), &remote).await;
        assert!(matches!(outcome, SnapshotOutcome::Failed(_)));
        assert_eq!(remote.fetch_calls(), 1);
    }
}
