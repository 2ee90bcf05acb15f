//! Continuations manager
//!
//! Creates, looks up, invalidates and expires continuation trees. Structural
//! changes happen under the owning holder's lock; disposers run after that
//! lock is released but before the mutating call returns.

use crate::config::ContinuationsConfig;
use crate::continuation::holder::{HolderKind, HolderState, ScopeHolder};
use crate::continuation::id::IdGenerator;
use crate::continuation::info::{ContinuationInfo, SweepReport};
use crate::continuation::metrics::{RegistryMetrics, RegistryMetricsSnapshot};
use crate::continuation::node::{Continuation, NewContinuation, MAX_TIME_TO_LIVE};
use crate::error::ApiError;
use crate::scheduler::{Scheduler, TaskHandle, Work};
use crate::types::{ContinuationId, SessionId};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Registry of continuation trees, generic over the opaque payload `P`
pub struct ContinuationsManager<P> {
    config: ContinuationsConfig,
    ids: IdGenerator,
    global: Arc<ScopeHolder<P>>,
    sessions: RwLock<HashMap<SessionId, Arc<ScopeHolder<P>>>>,
    metrics: RegistryMetrics,
    sweep_task: Mutex<Option<TaskHandle>>,
}

impl<P: Send + Sync + 'static> ContinuationsManager<P> {
    pub fn new(config: ContinuationsConfig) -> Self {
        Self {
            ids: IdGenerator::new(config.id_bytes),
            config,
            global: Arc::new(ScopeHolder::new(HolderKind::Global)),
            sessions: RwLock::new(HashMap::new()),
            metrics: RegistryMetrics::default(),
            sweep_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ContinuationsConfig {
        &self.config
    }

    /// Install the periodic expiration sweep on `scheduler`.
    ///
    /// Returns false if the sweep could not be scheduled; the manager keeps
    /// working but continuations then only go away through invalidation.
    pub fn start(self: &Arc<Self>, scheduler: &Scheduler) -> bool {
        let mut task = self.sweep_task.lock();
        if task.is_some() {
            return true;
        }

        let manager = Arc::downgrade(self);
        let work: Work = Arc::new(move || {
            if let Some(manager) = manager.upgrade() {
                manager.sweep();
            }
            Ok(())
        });

        match scheduler.schedule(
            &self.config.sweep_pool,
            work,
            self.config.sweep_offset(),
            self.config.sweep_period(),
        ) {
            Ok(handle) => {
                info!(
                    task_id = %handle,
                    pool = %self.config.sweep_pool,
                    offset_ms = self.config.sweep_offset_ms,
                    period_ms = self.config.sweep_period_ms,
                    "Installed continuation expiration sweep"
                );
                *task = Some(handle);
                true
            }
            Err(err) => {
                let err = ApiError::SchedulingFailure(err);
                warn!(
                    error = %err,
                    "Running without background expiration; continuations are only removed by invalidation"
                );
                false
            }
        }
    }

    /// Cancel the expiration sweep. Returns true if a queued sweep was removed.
    pub fn stop(&self, scheduler: &Scheduler) -> bool {
        let Some(handle) = self.sweep_task.lock().take() else {
            return false;
        };
        let cancelled = scheduler.cancel(handle);
        info!(task_id = %handle, cancelled, "Stopped continuation expiration sweep");
        cancelled
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweep_task.lock().is_some()
    }

    /// Create a continuation and link it into its holder's tree.
    pub fn create(&self, request: NewContinuation<P>) -> Result<Arc<Continuation<P>>, ApiError> {
        let NewContinuation {
            payload,
            scope_tag,
            parent,
            time_to_live,
            disposer,
            session,
        } = request;

        let time_to_live = if time_to_live.is_zero() {
            self.config.default_ttl()
        } else {
            time_to_live
        }
        .min(MAX_TIME_TO_LIVE);
        let session = self.resolve_session(parent.as_deref(), session)?;

        let invalid_parent = |id: &ContinuationId| {
            ApiError::InvalidParent(format!("{} is not a live continuation of this registry", id))
        };

        loop {
            // A child always lives in its parent's holder
            let holder = match (&parent, &session) {
                (Some(parent), _) => parent
                    .holder()
                    .filter(|holder| self.owns(holder))
                    .ok_or_else(|| invalid_parent(parent.id()))?,
                (None, Some(session)) => self.session_holder(session),
                (None, None) => Arc::clone(&self.global),
            };
            let mut state = holder.lock();

            if let Some(parent) = &parent {
                if !state.holds(parent) {
                    return Err(invalid_parent(parent.id()));
                }
            }
            // Session ended between resolving the holder and locking it
            if state.is_closed() {
                continue;
            }

            let id = self.ids.generate_unique(|candidate| state.contains(candidate));
            let now = Instant::now();
            let node = Arc::new(Continuation::new(
                id,
                payload,
                scope_tag,
                parent.as_ref().map(|p| p.id().clone()),
                session.clone(),
                now,
                time_to_live,
                disposer,
                Arc::downgrade(&holder),
            ));
            state.insert(Arc::clone(&node), now);
            drop(state);

            self.metrics.record_created();
            debug!(
                continuation_id = %node.id(),
                parent_id = node.parent_id().map(|p| p.as_str()).unwrap_or(""),
                scope_tag = %node.scope_tag(),
                session_id = session.as_ref().map(|s| s.as_str()).unwrap_or(""),
                ttl_ms = time_to_live.as_millis() as u64,
                "Created continuation"
            );
            return Ok(node);
        }
    }

    fn resolve_session(
        &self,
        parent: Option<&Continuation<P>>,
        requested: Option<SessionId>,
    ) -> Result<Option<SessionId>, ApiError> {
        if !self.config.session_bound {
            return Ok(None);
        }
        match (parent, requested) {
            (Some(parent), Some(requested)) => {
                if parent.session() != Some(&requested) {
                    return Err(ApiError::InvalidParent(format!(
                        "{} belongs to a different session than {}",
                        parent.id(),
                        requested
                    )));
                }
                Ok(Some(requested))
            }
            (Some(parent), None) => parent
                .session()
                .cloned()
                .map(Some)
                .ok_or(ApiError::SessionRequired),
            (None, Some(requested)) => Ok(Some(requested)),
            (None, None) => Err(ApiError::SessionRequired),
        }
    }

    fn session_holder(&self, session: &SessionId) -> Arc<ScopeHolder<P>> {
        if let Some(holder) = self.sessions.read().get(session) {
            return Arc::clone(holder);
        }
        let mut sessions = self.sessions.write();
        let holder = sessions.entry(session.clone()).or_insert_with(|| {
            debug!(session_id = %session, "Created session holder");
            Arc::new(ScopeHolder::new(HolderKind::Session(session.clone())))
        });
        Arc::clone(holder)
    }

    /// Holder visible to a caller, never creating one
    fn visible_holder(&self, session: Option<&SessionId>) -> Option<Arc<ScopeHolder<P>>> {
        if !self.config.session_bound {
            return Some(Arc::clone(&self.global));
        }
        session.and_then(|session| self.sessions.read().get(session).cloned())
    }

    fn owns(&self, holder: &Arc<ScopeHolder<P>>) -> bool {
        match holder.kind() {
            HolderKind::Global => Arc::ptr_eq(holder, &self.global),
            HolderKind::Session(session) => self
                .sessions
                .read()
                .get(session)
                .map_or(false, |known| Arc::ptr_eq(known, holder)),
        }
    }

    /// Every holder: the global one, then session holders ordered by session id
    fn holders(&self) -> Vec<Arc<ScopeHolder<P>>> {
        let sessions = self.sessions.read();
        let mut session_ids: Vec<&SessionId> = sessions.keys().collect();
        session_ids.sort();
        let mut holders = Vec::with_capacity(sessions.len() + 1);
        holders.push(Arc::clone(&self.global));
        holders.extend(session_ids.into_iter().filter_map(|id| sessions.get(id).cloned()));
        holders
    }

    /// Find a continuation by id on behalf of the flow identified by `scope_tag`.
    ///
    /// A continuation created by another flow is reported as not found unless
    /// `legacy_scope_compat` is set.
    pub fn lookup(
        &self,
        id: &str,
        scope_tag: &str,
        session: Option<&SessionId>,
    ) -> Result<Arc<Continuation<P>>, ApiError> {
        let not_found = || ApiError::NotFound(ContinuationId::from(id));
        let holder = self.visible_holder(session).ok_or_else(not_found)?;
        let mut state = holder.lock();
        let node = state
            .get(id)
            .map(|entry| Arc::clone(&entry.node))
            .ok_or_else(not_found)?;

        if node.scope_tag() != scope_tag {
            if !self.config.legacy_scope_compat {
                drop(state);
                warn!(
                    continuation_id = %id,
                    requested_scope = %scope_tag,
                    owning_scope = %node.scope_tag(),
                    "Continuation requested by a different flow"
                );
                return Err(not_found());
            }
            debug!(
                continuation_id = %id,
                requested_scope = %scope_tag,
                owning_scope = %node.scope_tag(),
                "Scope mismatch ignored (legacy compatibility)"
            );
        }

        if self.config.refresh_on_lookup {
            state.touch(node.id(), Instant::now());
        }
        Ok(node)
    }

    pub fn contains(&self, id: &str, session: Option<&SessionId>) -> bool {
        self.visible_holder(session)
            .map_or(false, |holder| holder.lock().contains(id))
    }

    /// Live children of `node`, in creation order
    pub fn children(&self, node: &Continuation<P>) -> Vec<Arc<Continuation<P>>> {
        let Some(holder) = node.holder() else {
            return Vec::new();
        };
        let state = holder.lock();
        if !state.holds(node) {
            return Vec::new();
        }
        state
            .get(node.id())
            .map(|entry| {
                entry
                    .children
                    .iter()
                    .filter_map(|child| state.get(child).map(|c| Arc::clone(&c.node)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove `node` and its whole subtree, disposing each exactly once.
    ///
    /// Returns the number of continuations removed, or `NotFound` if the node
    /// is no longer stored (already invalidated or expired).
    pub fn invalidate(&self, node: &Continuation<P>) -> Result<usize, ApiError> {
        let not_found = || ApiError::NotFound(node.id().clone());
        let holder = node
            .holder()
            .filter(|holder| self.owns(holder))
            .ok_or_else(not_found)?;

        let removed = {
            let mut state = holder.lock();
            if !state.holds(node) {
                return Err(not_found());
            }
            state.remove_subtree(node.id())
        };

        self.metrics.record_invalidated(removed.len());
        self.dispose_all(&removed);
        debug!(
            continuation_id = %node.id(),
            removed = removed.len(),
            "Invalidated continuation"
        );
        Ok(removed.len())
    }

    fn dispose_all(&self, nodes: &[Arc<Continuation<P>>]) {
        for node in nodes {
            if let Err(err) = node.dispose() {
                self.metrics.record_disposer_failure();
                warn!(continuation_id = %node.id(), error = %err, "Disposer failed");
            }
        }
    }

    /// Expire continuations whose lifetime has elapsed
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Instant::now())
    }

    /// Sweep as if the current time were `now`
    pub fn sweep_at(&self, now: Instant) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport::default();

        for holder in self.holders() {
            let outcome = holder.lock().sweep(now);
            if !outcome.removed.is_empty() {
                self.metrics.record_expired(outcome.removed.len());
                self.dispose_all(&outcome.removed);
            }
            report.merge(SweepReport {
                expired: outcome.expired,
                pruned_ancestors: outcome.pruned,
                skipped: outcome.skipped,
            });
        }

        debug!(
            expired = report.expired,
            pruned_ancestors = report.pruned_ancestors,
            skipped = report.skipped,
            duration_ms = started.elapsed().as_millis() as u64,
            "Expiration sweep finished"
        );
        report
    }

    /// Tear down a session holder, disposing every continuation it stores.
    pub fn end_session(&self, session: &SessionId) -> usize {
        let Some(holder) = self.sessions.write().remove(session) else {
            return 0;
        };
        let removed = {
            let mut state = holder.lock();
            state.close();
            state.remove_all()
        };

        self.metrics.record_invalidated(removed.len());
        self.dispose_all(&removed);
        info!(session_id = %session, disposed = removed.len(), "Ended session");
        removed.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Snapshot of every stored continuation, depth-first pre-order per root
    pub fn list_all(&self) -> Vec<ContinuationInfo> {
        let mut infos = Vec::new();
        for holder in self.holders() {
            let state = holder.lock();
            for root in state.roots() {
                collect_subtree(&state, root, &mut infos);
            }
        }
        infos
    }

    pub fn metrics(&self) -> RegistryMetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn collect_subtree<P>(state: &HolderState<P>, root: &ContinuationId, out: &mut Vec<ContinuationInfo>) {
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let Some(entry) = state.get(id) else {
            panic!("continuation tree corrupted: {} missing from holder", id);
        };
        let node = &entry.node;
        let lifetime = entry.expires_at().saturating_duration_since(node.created());
        let expires_at = chrono::Duration::from_std(lifetime)
            .ok()
            .and_then(|lifetime| node.created_at().checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        out.push(ContinuationInfo {
            id: node.id().clone(),
            parent_id: node.parent_id().cloned(),
            child_ids: entry.children.clone(),
            scope_tag: node.scope_tag().to_string(),
            session_id: node.session().cloned(),
            created_at: node.created_at(),
            expires_at,
            expiration_tracked: entry.expiry.is_some(),
            state: node.state().as_str().to_string(),
        });
        stack.extend(entry.children.iter().rev());
    }
}
