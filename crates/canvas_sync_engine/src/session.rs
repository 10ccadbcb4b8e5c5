//! Per-canvas sync session: capture, push, poll, undo/redo.

use crate::config::SyncConfig;
use crate::editor::GraphEditor;
use crate::error::{SyncError, SyncResult};
use crate::monitor::FailureMonitor;
use crate::registry::CanvasRegistry;
use crate::resolver::{AuditEvent, ConflictPrompt, ConflictResolver};
use crate::store::CanvasStore;
use crate::transport::RemoteService;
use crate::version::{SnapshotOutcome, SnapshotPhase, VersionManager};
use canvas_sync_protocol::{
    diff, merge_states, CanvasState, FetchTransactionsRequest, MergeOutcome, PushRequest,
    Transaction, TxId, VersionConflict,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// How an [`initialize`](SyncSession::initialize) call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// Local and remote agree; the session is live.
    Initialized,
    /// The remote was unreachable; the local copy is used and pushes retry.
    LocalOnly,
    /// The canvas was initialized moments ago and not torn down since.
    Suppressed,
    /// Nothing local and the remote was unreachable. The next mount retries.
    Unavailable,
}

/// How a push attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Not initialized, still within the grace period, or torn down.
    NotReady,
    /// Another push is in flight.
    Busy,
    /// Nothing was pending.
    Idle,
    /// The server acknowledged `synced` transactions.
    Pushed {
        /// Number of acknowledgements applied.
        synced: usize,
    },
    /// The server rejected the push; the lineage was re-reconciled.
    Rejected,
}

/// How a poll attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Not initialized or torn down.
    NotReady,
    /// Another poll is in flight.
    Busy,
    /// A full reconciliation found the server on another version; the
    /// session re-ran the initialization merge against it.
    LineageChanged,
    /// The poll completed.
    Polled {
        /// Remote transactions merged, or revoked flags taken over.
        merged: usize,
        /// Local transactions re-pushed by a full reconciliation.
        repushed: usize,
        /// Whether this was a full-history reconciliation.
        full: bool,
    },
}

/// Arguments of [`SyncSession::force_sync_state`].
#[derive(Debug, Clone, Default)]
pub struct ForceSync {
    /// Push to the server after capturing.
    pub sync_remote: bool,
    /// Push exactly these transactions instead of the pending set.
    pub transactions: Option<Vec<Transaction>>,
}

struct SessionInner {
    canvas_id: String,
    config: SyncConfig,
    store: CanvasStore,
    remote: Arc<dyn RemoteService>,
    editor: Arc<dyn GraphEditor>,
    registry: Arc<CanvasRegistry>,
    resolver: ConflictResolver,
    monitor: FailureMonitor,
    versions: VersionManager,
    current: RwLock<Option<CanvasState>>,
    initialized_at: RwLock<Option<Instant>>,
    torn_down: AtomicBool,
    polls: AtomicU64,
    capture_lock: AsyncMutex<()>,
    push_lock: AsyncMutex<()>,
    poll_lock: AsyncMutex<()>,
    debounce: Mutex<Option<JoinHandle<()>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

/// The single owner of one canvas's synchronization.
///
/// A session coordinates three independently scheduled activities, each
/// behind its own re-entrancy lock:
///
/// - **Local capture**: diffs the editor against the stored state and
///   appends the delta as a transaction. [`notify_change`] debounces;
///   [`sync_local_now`] runs immediately and queues behind other immediate
///   captures.
/// - **Remote push**: sends pending transactions and unacknowledged
///   revocations, stamps the returned acknowledgements, then snapshots if the
///   log grew too long.
/// - **Remote poll**: merges remote changes the client lacks. Every
///   Nth poll reconciles the full history.
///
/// A busy activity makes a second trigger return immediately. Any path that
/// replaces the editor graph flushes a capture first, so unsaved edits are
/// never overwritten.
///
/// Cloning is cheap; clones share the same session.
///
/// [`notify_change`]: SyncSession::notify_change
/// [`sync_local_now`]: SyncSession::sync_local_now
#[derive(Clone)]
pub struct SyncSession {
    inner: Arc<SessionInner>,
}

impl SyncSession {
    /// Creates a session. Nothing happens until [`initialize`](Self::initialize).
    pub fn new(
        canvas_id: impl Into<String>,
        config: SyncConfig,
        store: CanvasStore,
        remote: Arc<dyn RemoteService>,
        editor: Arc<dyn GraphEditor>,
        registry: Arc<CanvasRegistry>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(SessionInner {
                canvas_id: canvas_id.into(),
                resolver: ConflictResolver::new(config.conflict_timeout),
                monitor: FailureMonitor::new(config.degraded_threshold),
                versions: VersionManager::new(config.snapshot_threshold),
                config,
                store,
                remote,
                editor,
                registry,
                current: RwLock::new(None),
                initialized_at: RwLock::new(None),
                torn_down: AtomicBool::new(false),
                polls: AtomicU64::new(0),
                capture_lock: AsyncMutex::new(()),
                push_lock: AsyncMutex::new(()),
                poll_lock: AsyncMutex::new(()),
                debounce: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
                shutdown,
            }),
        }
    }

    /// Installs the interactive conflict prompt.
    pub fn set_conflict_prompt(&self, prompt: Arc<dyn ConflictPrompt>) {
        self.inner.resolver.set_prompt(Some(prompt));
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Returns the canvas ID.
    pub fn canvas_id(&self) -> &str {
        &self.inner.canvas_id
    }

    /// Returns the session configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Returns the in-memory state, if one was adopted.
    pub fn state(&self) -> Option<CanvasState> {
        self.inner.current.read().clone()
    }

    /// Returns true once initialization completed.
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized_at.read().is_some()
    }

    /// Returns true after [`teardown`](Self::teardown).
    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.load(Ordering::SeqCst)
    }

    /// Returns true while consecutive failures exceed the threshold.
    pub fn is_degraded(&self) -> bool {
        self.inner.monitor.is_degraded()
    }

    /// Returns the consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.inner.monitor.failures()
    }

    /// Subscribes to degraded-mode transitions.
    pub fn degraded_signal(&self) -> watch::Receiver<bool> {
        self.inner.monitor.subscribe()
    }

    /// Returns the snapshot phase.
    pub fn snapshot_phase(&self) -> SnapshotPhase {
        self.inner.versions.phase()
    }

    /// Returns every conflict resolution made by this session.
    pub fn audit_log(&self) -> Vec<AuditEvent> {
        self.inner.resolver.audit_log()
    }

    /// Returns true if there is an active transaction to undo.
    pub fn can_undo(&self) -> bool {
        self.inner
            .current
            .read()
            .as_ref()
            .is_some_and(CanvasState::can_undo)
    }

    /// Returns true if there is a revoked transaction to redo.
    pub fn can_redo(&self) -> bool {
        self.inner
            .current
            .read()
            .as_ref()
            .is_some_and(CanvasState::can_redo)
    }

    // ------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------

    /// Loads, reconciles and adopts the canvas state.
    ///
    /// A local copy is shown immediately. The remote state is then fetched
    /// and merged; diverged lineages go through the conflict resolver. If
    /// the remote has never seen the canvas, the local (or a fresh empty)
    /// state is registered with it.
    ///
    /// # Errors
    ///
    /// Only local storage failures are returned. Remote failures end in
    /// [`InitOutcome::LocalOnly`] or [`InitOutcome::Unavailable`].
    pub async fn initialize(&self) -> SyncResult<InitOutcome> {
        let canvas_id = self.canvas_id().to_string();
        if !self.inner.registry.begin_init(&canvas_id) {
            tracing::debug!(canvas_id = %canvas_id, "initialization suppressed");
            return Ok(InitOutcome::Suppressed);
        }

        let local = match self.inner.store.load(&canvas_id) {
            Ok(local) => local,
            Err(e) => {
                self.inner.registry.abandon(&canvas_id);
                return Err(e);
            }
        };
        if let Some(local) = &local {
            self.install(local);
        }

        let result = self.reconcile_remote(local.clone()).await;
        if self.is_torn_down() {
            return Err(SyncError::TornDown);
        }

        match result {
            Ok(()) => {
                self.mark_initialized();
                tracing::info!(canvas_id = %canvas_id, version = ?self.state().map(|s| s.version), "canvas initialized");
                Ok(InitOutcome::Initialized)
            }
            Err(e) if e.is_retryable() => {
                self.inner.monitor.record_failure(&e);
                if self.state().is_some() {
                    self.mark_initialized();
                    tracing::warn!(canvas_id = %canvas_id, error = %e, "remote unavailable, using local state");
                    Ok(InitOutcome::LocalOnly)
                } else {
                    self.inner.registry.abandon(&canvas_id);
                    tracing::warn!(canvas_id = %canvas_id, error = %e, "canvas unavailable");
                    Ok(InitOutcome::Unavailable)
                }
            }
            Err(e) => {
                self.inner.registry.abandon(&canvas_id);
                Err(e)
            }
        }
    }

    async fn reconcile_remote(&self, local: Option<CanvasState>) -> SyncResult<()> {
        let canvas_id = self.canvas_id();
        let remote = self.inner.remote.fetch_state(canvas_id).await?;
        self.inner.monitor.record_success();

        let Some(remote) = remote else {
            let base = local.clone().unwrap_or_else(CanvasState::empty);
            tracing::info!(canvas_id, version = %base.version, "registering canvas with server");
            return match self.inner.versions.snapshot(canvas_id, &base, &*self.inner.remote).await {
                SnapshotOutcome::Adopted(state) | SnapshotOutcome::Recovered(state) => {
                    self.adopt(state, local.as_ref()).await.map(|_| ())
                }
                SnapshotOutcome::Conflict(conflict) => {
                    self.resolve_and_adopt(conflict, local.as_ref()).await
                }
                SnapshotOutcome::Failed(e) => Err(e),
            };
        };

        let Some(mut local) = local else {
            return self.adopt(remote, None).await.map(|_| ());
        };

        if local.version == remote.version {
            let unknown = local.missing_from(&remote.transactions);
            if !unknown.is_empty() {
                let request = PushRequest::new(canvas_id, &local.version, unknown);
                let response = self.inner.remote.push_transactions(&request).await?;
                if response.success {
                    local = local.mark_all_synced(&response.synced_transactions);
                }
            }
        }

        let basis = local.clone();
        match merge_states(&local, &remote) {
            MergeOutcome::Merged(state) => self.adopt(state, Some(&basis)).await.map(|_| ()),
            MergeOutcome::Conflict(conflict) => self.resolve_and_adopt(conflict, Some(&basis)).await,
        }
    }

    async fn resolve_and_adopt(
        &self,
        conflict: VersionConflict,
        basis: Option<&CanvasState>,
    ) -> SyncResult<()> {
        tracing::info!(
            canvas_id = %self.canvas_id(),
            local = %conflict.local_state.version,
            remote = %conflict.remote_state.version,
            "version conflict"
        );
        let resolution = self
            .inner
            .resolver
            .resolve(self.canvas_id(), conflict, &*self.inner.remote)
            .await?;
        self.adopt(resolution.state, basis).await.map(|_| ())
    }

    fn mark_initialized(&self) {
        *self.inner.initialized_at.write() = Some(Instant::now());
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Spawns the push and poll interval tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        if self.is_torn_down() {
            return;
        }
        let push = self.spawn_interval(self.inner.config.push_interval, |session| async move {
            if let Err(e) = session.push_cycle().await {
                tracing::debug!(canvas_id = %session.canvas_id(), error = %e, "push cycle failed");
            }
        });
        let poll = self.spawn_interval(self.inner.config.poll_interval, |session| async move {
            if let Err(e) = session.poll_cycle().await {
                tracing::debug!(canvas_id = %session.canvas_id(), error = %e, "poll cycle failed");
            }
        });
        self.inner.tasks.lock().extend([push, poll]);
    }

    fn spawn_interval<F, Fut>(&self, period: Duration, cycle: F) -> JoinHandle<()>
    where
        F: Fn(SyncSession) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let session = self.clone();
        let mut shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => cycle(session.clone()).await,
                    _ = shutdown.changed() => break,
                }
            }
        })
    }

    /// Schedules a debounced capture. The last trigger within the debounce
    /// window wins.
    pub fn notify_change(&self) {
        if self.is_torn_down() {
            return;
        }
        if let Some(previous) = self.arm_debounce() {
            previous.abort();
        }
    }

    /// Spawns a delayed capture and stores its handle, returning the handle
    /// it replaced.
    fn arm_debounce(&self) -> Option<JoinHandle<()>> {
        let session = self.clone();
        let debounce = self.inner.config.debounce;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            session.debounced_capture();
        });
        self.inner.debounce.lock().replace(handle)
    }

    fn debounced_capture(&self) {
        if self.is_torn_down() {
            return;
        }
        let Ok(_guard) = self.inner.capture_lock.try_lock() else {
            tracing::debug!(canvas_id = %self.canvas_id(), "capture busy, re-arming debounce");
            // The replaced handle is this task's own
            drop(self.arm_debounce());
            return;
        };
        if let Err(e) = self.capture_locked() {
            tracing::warn!(canvas_id = %self.canvas_id(), error = %e, "capture failed");
        }
    }

    /// Captures the editor's changes immediately.
    ///
    /// Queues behind other immediate captures. Returns the ID of the new
    /// transaction, or `None` if nothing changed.
    pub async fn sync_local_now(&self) -> SyncResult<Option<TxId>> {
        let _guard = self.inner.capture_lock.lock().await;
        self.capture_locked()
    }

    /// Captures immediately and optionally pushes.
    ///
    /// The push bypasses the grace period but still requires initialization
    /// and shares the push lock, so at most one push is in flight.
    pub async fn force_sync_state(&self, request: ForceSync) -> SyncResult<PushOutcome> {
        self.sync_local_now().await?;
        if !request.sync_remote {
            return Ok(PushOutcome::Idle);
        }
        if !self.is_initialized() || self.is_torn_down() {
            return Ok(PushOutcome::NotReady);
        }
        let Ok(_guard) = self.inner.push_lock.try_lock() else {
            return Ok(PushOutcome::Busy);
        };
        self.push_locked(request.transactions).await
    }

    // ------------------------------------------------------------------
    // Capture
    // ------------------------------------------------------------------

    /// Diffs the editor against the stored working graph and appends the
    /// delta. Caller holds the capture lock.
    fn capture_locked(&self) -> SyncResult<Option<TxId>> {
        if self.inner.current.read().is_none() {
            return Ok(None);
        }
        let graph = self.inner.editor.working_graph();

        let mut failure = None;
        let mut captured = None;
        let written = self.inner.store.update(self.canvas_id(), |stored| {
            let stored = stored?;
            let delta = diff(&graph, &stored.reconstruct())?;
            match Transaction::capture(&delta) {
                Ok(tx) => {
                    captured = Some(tx.tx_id.clone());
                    Some(stored.append(tx))
                }
                Err(e) => {
                    failure = Some(e);
                    None
                }
            }
        })?;
        if let Some(e) = failure {
            return Err(e.into());
        }

        if let Some(state) = written {
            tracing::debug!(
                canvas_id = %self.canvas_id(),
                tx_id = ?captured,
                transactions = state.transactions.len(),
                "captured local change"
            );
            *self.inner.current.write() = Some(state);
        }
        Ok(captured)
    }

    /// Flushes a capture, then atomically rewrites the stored state and
    /// shows the result in the editor.
    async fn rewrite<F>(&self, f: F) -> SyncResult<Option<CanvasState>>
    where
        F: FnMut(Option<CanvasState>) -> Option<CanvasState>,
    {
        let _guard = self.inner.capture_lock.lock().await;
        if self.is_torn_down() {
            return Ok(None);
        }
        self.capture_locked()?;
        let written = self.inner.store.update(self.canvas_id(), f)?;
        if let Some(state) = &written {
            self.install(state);
        }
        Ok(written)
    }

    /// Replaces the stored state with `adopted`, carrying over transactions
    /// captured locally since `basis` was read. Unacknowledged discards
    /// survive if the version did not change.
    async fn adopt(
        &self,
        adopted: CanvasState,
        basis: Option<&CanvasState>,
    ) -> SyncResult<Option<CanvasState>> {
        self.rewrite(|stored| {
            let next = match (stored, basis) {
                (Some(stored), Some(basis)) => adopted
                    .carry_over(&stored.transactions_not_in(basis))
                    .0
                    .keeping_discarded(&stored),
                _ => adopted.clone(),
            };
            Some(next)
        })
        .await
    }

    fn install(&self, state: &CanvasState) {
        let graph = state.reconstruct();
        if diff(&self.inner.editor.working_graph(), &graph).is_some() {
            self.inner.editor.set_working_graph(graph);
        }
        *self.inner.current.write() = Some(state.clone());
    }

    // ------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------

    /// Runs one scheduled push cycle.
    ///
    /// Skipped until the session has been initialized for the grace period.
    /// A failure is counted by the failure monitor and retried next cycle.
    pub async fn push_cycle(&self) -> SyncResult<PushOutcome> {
        let initialized_at = *self.inner.initialized_at.read();
        let ready = initialized_at.is_some_and(|at| at.elapsed() >= self.inner.config.push_grace);
        if !ready || self.is_torn_down() {
            return Ok(PushOutcome::NotReady);
        }
        let Ok(_guard) = self.inner.push_lock.try_lock() else {
            return Ok(PushOutcome::Busy);
        };
        self.push_locked(None).await
    }

    async fn push_locked(&self, subset: Option<Vec<Transaction>>) -> SyncResult<PushOutcome> {
        let Some(state) = self.state() else {
            return Ok(PushOutcome::NotReady);
        };
        let transactions = subset.unwrap_or_else(|| state.outgoing());

        let outcome = if transactions.is_empty() {
            PushOutcome::Idle
        } else {
            let request = PushRequest::new(self.canvas_id(), &state.version, transactions.clone());
            let result = self.inner.remote.push_transactions(&request).await;
            if self.is_torn_down() {
                return Ok(PushOutcome::NotReady);
            }
            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    self.inner.monitor.record_failure(&e);
                    return Err(e);
                }
            };
            self.inner.monitor.record_success();

            if !response.success {
                tracing::warn!(canvas_id = %self.canvas_id(), version = %state.version, "push rejected, reconciling lineage");
                self.recover_lineage().await?;
                return Ok(PushOutcome::Rejected);
            }

            let synced = response.synced_transactions;
            let written = self.inner.store.update(self.canvas_id(), |stored| {
                let stored = stored?;
                let next = stored.acknowledge(&transactions, &synced);
                (next != stored).then_some(next)
            })?;
            if let Some(state) = written {
                *self.inner.current.write() = Some(state);
            }
            tracing::debug!(canvas_id = %self.canvas_id(), synced = synced.len(), "push acknowledged");
            PushOutcome::Pushed {
                synced: synced.len(),
            }
        };

        self.maybe_snapshot().await?;
        Ok(outcome)
    }

    async fn maybe_snapshot(&self) -> SyncResult<()> {
        let state = match self.inner.store.load(self.canvas_id())? {
            Some(state) if self.inner.versions.needs_snapshot(&state) => state,
            _ => return Ok(()),
        };

        let outcome = self
            .inner
            .versions
            .snapshot(self.canvas_id(), &state, &*self.inner.remote)
            .await;
        if self.is_torn_down() {
            return Ok(());
        }
        match outcome {
            SnapshotOutcome::Adopted(next) | SnapshotOutcome::Recovered(next) => {
                self.adopt(next, Some(&state)).await.map(|_| ())
            }
            SnapshotOutcome::Conflict(conflict) => {
                self.resolve_and_adopt(conflict, Some(&state)).await
            }
            SnapshotOutcome::Failed(e) => {
                self.inner.monitor.record_failure(&e);
                Err(e)
            }
        }
    }

    /// Re-runs the initialization merge after the server rejected a push.
    async fn recover_lineage(&self) -> SyncResult<()> {
        match self.fetch_remote_state().await? {
            Some(remote) => self.reconcile_lineage(remote).await,
            None => Ok(()),
        }
    }

    /// Fetches the server's state. `None` if the canvas is unknown or the
    /// session was torn down meanwhile.
    async fn fetch_remote_state(&self) -> SyncResult<Option<CanvasState>> {
        let fetched = self.inner.remote.fetch_state(self.canvas_id()).await;
        if self.is_torn_down() {
            return Ok(None);
        }
        match fetched {
            Ok(remote) => {
                self.inner.monitor.record_success();
                Ok(remote)
            }
            Err(e) => {
                self.inner.monitor.record_failure(&e);
                Err(e)
            }
        }
    }

    /// Merges the stored state with `remote`, resolving a conflict if the
    /// lineages diverged.
    async fn reconcile_lineage(&self, remote: CanvasState) -> SyncResult<()> {
        let Some(local) = self.inner.store.load(self.canvas_id())? else {
            return Ok(());
        };
        match merge_states(&local, &remote) {
            MergeOutcome::Merged(state) => self.adopt(state, Some(&local)).await.map(|_| ()),
            MergeOutcome::Conflict(conflict) => self.resolve_and_adopt(conflict, Some(&local)).await,
        }
    }

    // ------------------------------------------------------------------
    // Poll
    // ------------------------------------------------------------------

    /// Runs one poll cycle.
    ///
    /// Fetches remote transactions created within the poll window and merges
    /// the ones missing locally. Every `full_reconcile_every`-th poll fetches
    /// the full history instead and re-pushes local transactions the server
    /// does not list. A full reconciliation that comes back empty checks the
    /// server's version: the server answers nothing for a stale version, so
    /// a client that only reads would otherwise never follow another
    /// client's snapshot.
    pub async fn poll_cycle(&self) -> SyncResult<PollOutcome> {
        if !self.is_initialized() || self.is_torn_down() {
            return Ok(PollOutcome::NotReady);
        }
        let Ok(_guard) = self.inner.poll_lock.try_lock() else {
            return Ok(PollOutcome::Busy);
        };
        let Some(state) = self.state() else {
            return Ok(PollOutcome::NotReady);
        };

        let count = self.inner.polls.fetch_add(1, Ordering::SeqCst) + 1;
        let every = u64::from(self.inner.config.full_reconcile_every);
        let full = every > 0 && count % every == 0;
        let since = if full {
            DateTime::<Utc>::UNIX_EPOCH
        } else {
            let window = chrono::Duration::from_std(self.inner.config.poll_window)
                .unwrap_or_else(|_| chrono::Duration::seconds(60));
            Utc::now() - window
        };

        let request = FetchTransactionsRequest::new(self.canvas_id(), &state.version, since);
        let result = self.inner.remote.fetch_transactions_since(&request).await;
        if self.is_torn_down() {
            return Ok(PollOutcome::NotReady);
        }
        let remote_transactions = match result {
            Ok(transactions) => transactions,
            Err(e) => {
                self.inner.monitor.record_failure(&e);
                return Err(e);
            }
        };
        self.inner.monitor.record_success();

        if full && remote_transactions.is_empty() {
            if let Some(remote) = self.fetch_remote_state().await? {
                if remote.version != state.version {
                    tracing::info!(
                        canvas_id = %self.canvas_id(),
                        local = %state.version,
                        remote = %remote.version,
                        "server moved to another version, reconciling lineage"
                    );
                    self.reconcile_lineage(remote).await?;
                    return Ok(PollOutcome::LineageChanged);
                }
            }
        }

        let mut merged = 0;
        let (_, changes) = state.merge_remote(&remote_transactions);
        if changes > 0 {
            self.rewrite(|stored| {
                let stored = stored.filter(|s| s.version == state.version)?;
                let (next, added) = stored.merge_remote(&remote_transactions);
                merged = added;
                (added > 0).then_some(next)
            })
            .await?;
            if merged > 0 {
                tracing::debug!(canvas_id = %self.canvas_id(), merged, "merged remote changes");
            }
        }

        let mut repushed = 0;
        if full {
            let missing = self
                .state()
                .filter(|s| s.version == state.version)
                .map(|s| s.missing_from(&remote_transactions))
                .unwrap_or_default();
            if !missing.is_empty() {
                if let Ok(_push) = self.inner.push_lock.try_lock() {
                    repushed = missing.len();
                    tracing::info!(canvas_id = %self.canvas_id(), repushed, "re-pushing transactions missing from server");
                    self.push_locked(Some(missing)).await?;
                }
            }
        }

        Ok(PollOutcome::Polled {
            merged,
            repushed,
            full,
        })
    }

    // ------------------------------------------------------------------
    // Undo / redo
    // ------------------------------------------------------------------

    /// Revokes the newest active transaction.
    ///
    /// Returns false, without writing anything, if there is nothing to undo.
    pub async fn undo(&self) -> SyncResult<bool> {
        let written = self.rewrite(|stored| stored?.undo()).await?;
        Ok(written.is_some())
    }

    /// Restores the oldest revoked transaction.
    ///
    /// Returns false, without writing anything, if there is nothing to redo.
    pub async fn redo(&self) -> SyncResult<bool> {
        let written = self.rewrite(|stored| stored?.redo()).await?;
        Ok(written.is_some())
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Stops the session.
    ///
    /// A pending debounced capture is flushed, interval tasks are signalled
    /// to stop, in-memory state is cleared and the registry is told the
    /// canvas may initialize again. Calls still in flight complete as no-ops.
    pub async fn teardown(&self) {
        if self.is_torn_down() {
            return;
        }
        let pending = self.inner.debounce.lock().take();
        if let Some(handle) = pending {
            if !handle.is_finished() {
                handle.abort();
                if let Err(e) = self.sync_local_now().await {
                    tracing::warn!(canvas_id = %self.canvas_id(), error = %e, "final capture failed");
                }
            }
        }

        self.inner.torn_down.store(true, Ordering::SeqCst);
        self.inner.shutdown.send_replace(true);
        self.inner.tasks.lock().clear();
        *self.inner.current.write() = None;
        *self.inner.initialized_at.write() = None;
        self.inner.registry.mark_torn_down(self.canvas_id());
        tracing::info!(canvas_id = %self.canvas_id(), "session torn down");
    }
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("canvas_id", &self.inner.canvas_id)
            .field("initialized", &self.is_initialized())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::MemoryEditor;
    use crate::transport::MockRemote;
    use canvas_sync_protocol::{Element, Graph};
    use canvas_sync_storage::InMemoryStore;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn busy_debounced_capture_rearms() {
        let config = SyncConfig::default();
        let store = CanvasStore::new(Arc::new(InMemoryStore::new()));
        let remote = Arc::new(MockRemote::new());
        let editor = Arc::new(MemoryEditor::new());
        remote.set_state(Some(CanvasState::new("v1", Graph::default(), Utc::now())));
        let session = SyncSession::new(
            "c",
            config.clone(),
            store.clone(),
            remote,
            editor.clone(),
            Arc::new(CanvasRegistry::new(config.init_cooldown)),
        );
        session.initialize().await.unwrap();

        editor.edit(|g| g.nodes.push(Element::new("n1", json!({}))));
        session.notify_change();

        // The debounce fires while another capture holds the lock
        let guard = session.inner.capture_lock.lock().await;
        tokio::time::sleep(config.debounce + Duration::from_millis(50)).await;
        drop(guard);
        assert!(store.load("c").unwrap().unwrap().transactions.is_empty());

        tokio::time::sleep(config.debounce + Duration::from_millis(50)).await;
        assert_eq!(store.load("c").unwrap().unwrap().transactions.len(), 1);
    }
}
