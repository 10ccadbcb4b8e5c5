//! Version conflict resolution.

use crate::error::{SyncError, SyncResult};
use crate::transport::RemoteService;
use async_trait::async_trait;
use canvas_sync_protocol::{
    CanvasState, ConflictChoice, ConflictSummary, SnapshotRequest, VersionConflict,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Target of the audit events emitted for every resolution.
pub const AUDIT_TARGET: &str = "canvas_sync::audit";

/// The interactive path of conflict resolution, injected by the host.
#[async_trait]
pub trait ConflictPrompt: Send + Sync {
    /// Asks the user which side to keep.
    ///
    /// Returns `None` if the prompt could not be presented or was dismissed.
    async fn choose(&self, canvas_id: &str, summary: &ConflictSummary) -> Option<ConflictChoice>;
}

/// Who made a resolution decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecidedBy {
    /// The user picked a side.
    User,
    /// The prompt did not answer in time.
    Timeout,
    /// No prompt was available or it could not be presented.
    Unavailable,
}

impl fmt::Display for DecidedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecidedBy::User => f.write_str("user"),
            DecidedBy::Timeout => f.write_str("timeout"),
            DecidedBy::Unavailable => f.write_str("unavailable"),
        }
    }
}

/// A recorded conflict resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// Canvas ID.
    pub canvas_id: String,
    /// Version of the local state.
    pub local_version: String,
    /// Version of the remote state.
    pub remote_version: String,
    /// Winning side.
    pub choice: ConflictChoice,
    /// How the choice was made.
    pub decided_by: DecidedBy,
    /// Decision time.
    pub at: DateTime<Utc>,
}

/// The outcome of [`ConflictResolver::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Winning side.
    pub choice: ConflictChoice,
    /// The state to adopt locally.
    pub state: CanvasState,
}

/// Settles version conflicts.
///
/// The user is asked through the [`ConflictPrompt`], if one is installed.
/// Without an answer within the timeout, or without a prompt at all, the
/// remote side wins: a conflict never silently favours local work.
pub struct ConflictResolver {
    prompt: RwLock<Option<Arc<dyn ConflictPrompt>>>,
    timeout: Duration,
    audit: Mutex<Vec<AuditEvent>>,
}

impl ConflictResolver {
    /// Creates a resolver with no prompt.
    pub fn new(timeout: Duration) -> Self {
        Self {
            prompt: RwLock::new(None),
            timeout,
            audit: Mutex::new(Vec::new()),
        }
    }

    /// Installs or removes the interactive prompt.
    pub fn set_prompt(&self, prompt: Option<Arc<dyn ConflictPrompt>>) {
        *self.prompt.write() = prompt;
    }

    /// Returns every resolution recorded so far.
    pub fn audit_log(&self) -> Vec<AuditEvent> {
        self.audit.lock().clone()
    }

    /// Decides which side wins and records the decision.
    pub async fn choose(&self, canvas_id: &str, conflict: &VersionConflict) -> ConflictChoice {
        let prompt = self.prompt.read().clone();
        let (choice, decided_by) = match prompt {
            None => (ConflictChoice::Remote, DecidedBy::Unavailable),
            Some(prompt) => {
                let summary = conflict.summary();
                match tokio::time::timeout(self.timeout, prompt.choose(canvas_id, &summary)).await
                {
                    Ok(Some(choice)) => (choice, DecidedBy::User),
                    Ok(None) => (ConflictChoice::Remote, DecidedBy::Unavailable),
                    Err(_) => (ConflictChoice::Remote, DecidedBy::Timeout),
                }
            }
        };

        let event = AuditEvent {
            canvas_id: canvas_id.to_string(),
            local_version: conflict.local_state.version.clone(),
            remote_version: conflict.remote_state.version.clone(),
            choice,
            decided_by,
            at: Utc::now(),
        };
        tracing::info!(
            target: AUDIT_TARGET,
            canvas_id = %event.canvas_id,
            local_version = %event.local_version,
            remote_version = %event.remote_version,
            choice = %event.choice,
            decided_by = %event.decided_by,
            "version conflict resolved"
        );
        self.audit.lock().push(event);

        choice
    }

    /// Resolves a conflict to a single state.
    ///
    /// Choosing `remote` returns the remote state. Choosing `local` submits
    /// the local state as an overwriting snapshot: the server drops its
    /// current lineage and the state it creates from the local working graph
    /// is returned.
    ///
    /// # Errors
    ///
    /// Fails with a retryable error if the local submission does not go
    /// through. Nothing is persisted by the resolver itself.
    pub async fn resolve(
        &self,
        canvas_id: &str,
        conflict: VersionConflict,
        remote: &dyn RemoteService,
    ) -> SyncResult<Resolution> {
        let choice = self.choose(canvas_id, &conflict).await;
        let state = match choice {
            ConflictChoice::Remote => conflict.remote_state,
            ConflictChoice::Local => {
                let response = remote
                    .create_snapshot(&SnapshotRequest::overwrite(canvas_id, conflict.local_state))
                    .await?;
                match (response.new_state, response.conflict) {
                    (Some(state), _) => state,
                    (None, Some(again)) => {
                        return Err(SyncError::VersionConflict {
                            local: again.local_state.version,
                            remote: again.remote_state.version,
                        })
                    }
                    (None, None) => {
                        return Err(SyncError::InvalidResponse(
                            "snapshot response carries neither state nor conflict".into(),
                        ))
                    }
                }
            }
        };
        Ok(Resolution { choice, state })
    }
}

impl fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("has_prompt", &self.prompt.read().is_some())
            .field("timeout", &self.timeout)
            .field("audit_events", &self.audit.lock().len())
            .finish()
    }
}
