//! Continuation nodes and the request used to create them.

use crate::continuation::holder::ScopeHolder;
use crate::error::ApiError;
use crate::scheduler::pool::panic_message;
use crate::types::{ContinuationId, SessionId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Upper bound on a continuation's lifetime; longer TTLs are clamped at creation
pub const MAX_TIME_TO_LIVE: Duration = crate::scheduler::task::FAR_FUTURE;

/// One-shot callback invoked when a continuation is permanently removed
pub type Disposer<P> = Box<dyn FnOnce(&Continuation<P>) -> anyhow::Result<()> + Send + 'static>;

/// Lifecycle of a continuation. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeState {
    /// Stored in its holder and linked into the tree
    Live = 0,
    /// Unlinked from every index, disposer not yet run
    Detached = 1,
    /// Disposer has run
    Disposed = 2,
}

impl NodeState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => NodeState::Live,
            1 => NodeState::Detached,
            _ => NodeState::Disposed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeState::Live => "live",
            NodeState::Detached => "detached",
            NodeState::Disposed => "disposed",
        }
    }
}

/// A suspended point in an interactive flow, wrapping an opaque payload.
///
/// Tree links (children) live in the owning holder; the node itself only
/// remembers its parent id and a weak reference to that holder.
pub struct Continuation<P> {
    id: ContinuationId,
    payload: P,
    scope_tag: String,
    parent_id: Option<ContinuationId>,
    session: Option<SessionId>,
    created_at: DateTime<Utc>,
    created: Instant,
    time_to_live: Duration,
    state: AtomicU8,
    disposer: Mutex<Option<Disposer<P>>>,
    holder: Weak<ScopeHolder<P>>,
}

impl<P> Continuation<P> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: ContinuationId,
        payload: P,
        scope_tag: String,
        parent_id: Option<ContinuationId>,
        session: Option<SessionId>,
        created: Instant,
        time_to_live: Duration,
        disposer: Option<Disposer<P>>,
        holder: Weak<ScopeHolder<P>>,
    ) -> Self {
        Self {
            id,
            payload,
            scope_tag,
            parent_id,
            session,
            created_at: Utc::now(),
            created,
            time_to_live,
            state: AtomicU8::new(NodeState::Live as u8),
            disposer: Mutex::new(disposer),
            holder,
        }
    }

    pub fn id(&self) -> &ContinuationId {
        &self.id
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Tag of the flow type that created this continuation
    pub fn scope_tag(&self) -> &str {
        &self.scope_tag
    }

    pub fn parent_id(&self) -> Option<&ContinuationId> {
        self.parent_id.as_ref()
    }

    /// Owning session, in session-bound mode
    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn created(&self) -> Instant {
        self.created
    }

    pub fn time_to_live(&self) -> Duration {
        self.time_to_live
    }

    pub fn state(&self) -> NodeState {
        NodeState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_live(&self) -> bool {
        self.state() == NodeState::Live
    }

    pub(crate) fn holder(&self) -> Option<Arc<ScopeHolder<P>>> {
        self.holder.upgrade()
    }

    /// Live -> Detached. Called once, by whoever removed the node from its holder.
    pub(crate) fn mark_detached(&self) {
        let previous = self.state.compare_exchange(
            NodeState::Live as u8,
            NodeState::Detached as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        assert!(
            previous.is_ok(),
            "continuation {} detached twice",
            self.id
        );
    }

    /// Run the disposer, at most once. Detached -> Disposed even if the disposer fails.
    pub(crate) fn dispose(&self) -> Result<(), ApiError> {
        let disposer = self.disposer.lock().take();
        let result = match disposer {
            Some(disposer) => match catch_unwind(AssertUnwindSafe(|| disposer(self))) {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(ApiError::DisposerFailure {
                    id: self.id.clone(),
                    reason: err.to_string(),
                }),
                Err(panic) => Err(ApiError::DisposerFailure {
                    id: self.id.clone(),
                    reason: format!("panicked: {}", panic_message(&*panic)),
                }),
            },
            None => Ok(()),
        };
        self.state.store(NodeState::Disposed as u8, Ordering::Release);
        result
    }
}

impl<P> fmt::Debug for Continuation<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("id", &self.id)
            .field("scope_tag", &self.scope_tag)
            .field("parent_id", &self.parent_id)
            .field("session", &self.session)
            .field("created_at", &self.created_at)
            .field("time_to_live", &self.time_to_live)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Parameters for `ContinuationsManager::create`
pub struct NewContinuation<P> {
    pub(crate) payload: P,
    pub(crate) scope_tag: String,
    pub(crate) parent: Option<Arc<Continuation<P>>>,
    pub(crate) time_to_live: Duration,
    pub(crate) disposer: Option<Disposer<P>>,
    pub(crate) session: Option<SessionId>,
}

impl<P> NewContinuation<P> {
    /// A root continuation with the default TTL and no disposer
    pub fn new(payload: P, scope_tag: impl Into<String>) -> Self {
        Self {
            payload,
            scope_tag: scope_tag.into(),
            parent: None,
            time_to_live: Duration::ZERO,
            disposer: None,
            session: None,
        }
    }

    /// Attach under `parent`. The child inherits the parent's session.
    pub fn parent(mut self, parent: &Arc<Continuation<P>>) -> Self {
        self.parent = Some(Arc::clone(parent));
        self
    }

    /// Zero selects the configured default
    pub fn time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = ttl;
        self
    }

    pub fn disposer<F>(mut self, disposer: F) -> Self
    where
        F: FnOnce(&Continuation<P>) -> anyhow::Result<()> + Send + 'static,
    {
        self.disposer = Some(Box::new(disposer));
        self
    }

    /// Owning session; ignored in global mode
    pub fn session(mut self, session: impl Into<SessionId>) -> Self {
        self.session = Some(session.into());
        self
    }
}
