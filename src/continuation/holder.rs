//! Scope holders
//!
//! A holder maps continuation ids to nodes and owns everything structural about
//! them: child lists, the forest of roots and the expiration index. All of it
//! sits behind one lock per holder; distinct holders never contend.
//!
//! Nothing here runs disposers. Removal returns the detached nodes so the
//! caller can dispose them after the lock is released.

use crate::continuation::node::Continuation;
use crate::scheduler::task::deadline;
use crate::types::{ContinuationId, SessionId};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

/// Which visibility scope a holder serves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HolderKind {
    Global,
    Session(SessionId),
}

/// Expiration index key: expiry instant, then insertion sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct ExpiryKey {
    pub expires_at: Instant,
    pub seq: u64,
}

pub(crate) struct Entry<P> {
    pub node: Arc<Continuation<P>>,
    pub children: Vec<ContinuationId>,
    pub last_access: Instant,
    pub expiry: Option<ExpiryKey>,
}

impl<P> Entry<P> {
    pub fn expires_at(&self) -> Instant {
        deadline(self.last_access, self.node.time_to_live())
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at() <= now
    }
}

/// Nodes removed by one sweep pass, in removal order (children before parents)
pub(crate) struct SweepOutcome<P> {
    pub removed: Vec<Arc<Continuation<P>>>,
    pub expired: usize,
    pub pruned: usize,
    pub skipped: usize,
}

impl<P> Default for SweepOutcome<P> {
    fn default() -> Self {
        Self {
            removed: Vec::new(),
            expired: 0,
            pruned: 0,
            skipped: 0,
        }
    }
}

pub(crate) struct HolderState<P> {
    nodes: HashMap<ContinuationId, Entry<P>>,
    roots: BTreeSet<ContinuationId>,
    expirations: BTreeMap<ExpiryKey, ContinuationId>,
    next_seq: u64,
    closed: bool,
}

impl<P> HolderState<P> {
    fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            roots: BTreeSet::new(),
            expirations: BTreeMap::new(),
            next_seq: 0,
            closed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Entry<P>> {
        self.nodes.get(id)
    }

    /// True if `node` is the live entry stored under its id
    pub fn holds(&self, node: &Continuation<P>) -> bool {
        self.nodes
            .get(node.id())
            .map_or(false, |entry| std::ptr::eq(Arc::as_ptr(&entry.node), node))
    }

    pub fn roots(&self) -> impl Iterator<Item = &ContinuationId> {
        self.roots.iter()
    }

    pub fn is_indexed(&self, id: &str) -> bool {
        self.nodes.get(id).map_or(false, |entry| entry.expiry.is_some())
    }

    pub fn indexed_len(&self) -> usize {
        self.expirations.len()
    }

    fn entry(&self, id: &str) -> &Entry<P> {
        match self.nodes.get(id) {
            Some(entry) => entry,
            None => panic!("continuation tree corrupted: {} missing from holder", id),
        }
    }

    fn entry_mut(&mut self, id: &str) -> &mut Entry<P> {
        match self.nodes.get_mut(id) {
            Some(entry) => entry,
            None => panic!("continuation tree corrupted: {} missing from holder", id),
        }
    }

    fn index(&mut self, id: &ContinuationId) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let entry = self.entry_mut(id);
        if entry.expiry.is_some() {
            return;
        }
        let key = ExpiryKey {
            expires_at: entry.expires_at(),
            seq,
        };
        entry.expiry = Some(key);
        self.expirations.insert(key, id.clone());
    }

    fn unindex(&mut self, id: &str) {
        if let Some(key) = self.entry_mut(id).expiry.take() {
            self.expirations.remove(&key);
        }
    }

    /// Link a freshly created node into the tree and the expiration index.
    ///
    /// The caller has checked that the id is free and the parent is live here.
    pub fn insert(&mut self, node: Arc<Continuation<P>>, now: Instant) {
        let id = node.id().clone();
        let parent_id = node.parent_id().cloned();
        assert!(
            !self.nodes.contains_key(&id),
            "continuation id {} inserted twice",
            id
        );

        self.nodes.insert(
            id.clone(),
            Entry {
                node,
                children: Vec::new(),
                last_access: now,
                expiry: None,
            },
        );

        match parent_id {
            Some(parent_id) => {
                let parent = self.entry_mut(&parent_id);
                parent.children.push(id.clone());
                // A parent with two or more children is no longer a sweep candidate
                if parent.children.len() >= 2 {
                    self.unindex(&parent_id);
                }
            }
            None => {
                self.roots.insert(id.clone());
            }
        }

        self.index(&id);
    }

    /// Bump last access and re-key the node's expiration entry
    pub fn touch(&mut self, id: &ContinuationId, now: Instant) {
        let indexed = self.entry(id).expiry.is_some();
        if indexed {
            self.unindex(id);
        }
        self.entry_mut(id).last_access = now;
        if indexed {
            self.index(id);
        }
    }

    /// Unlink `id` from its parent (or the forest). Re-indexes a parent that
    /// dropped below two children.
    fn unlink(&mut self, id: &ContinuationId) {
        let parent_id = self.entry(id).node.parent_id().cloned();
        match parent_id {
            Some(parent_id) => {
                let parent = self.entry_mut(&parent_id);
                let before = parent.children.len();
                parent.children.retain(|child| child != id);
                assert!(
                    parent.children.len() + 1 == before,
                    "continuation tree corrupted: {} not a child of {}",
                    id,
                    parent_id
                );
                if parent.children.len() < 2 {
                    self.index(&parent_id);
                }
            }
            None => {
                self.roots.remove(id);
            }
        }
    }

    /// Detach `id` and its whole subtree, pre-order (node before its descendants).
    pub fn remove_subtree(&mut self, id: &ContinuationId) -> Vec<Arc<Continuation<P>>> {
        self.unlink(id);

        let mut removed = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            self.unindex(&current);
            let Some(entry) = self.nodes.remove(&current) else {
                panic!("continuation tree corrupted: {} missing from holder", current);
            };
            entry.node.mark_detached();
            // Reverse so siblings come off the stack in creation order
            stack.extend(entry.children.into_iter().rev());
            removed.push(entry.node);
        }
        removed
    }

    /// Detach every node, root by root, from a snapshot of the forest.
    pub fn remove_all(&mut self) -> Vec<Arc<Continuation<P>>> {
        let roots: Vec<ContinuationId> = self.roots.iter().cloned().collect();
        let mut removed = Vec::with_capacity(self.nodes.len());
        for root in roots {
            if self.nodes.contains_key(&root) {
                removed.extend(self.remove_subtree(&root));
            }
        }
        assert!(
            self.nodes.is_empty(),
            "continuation tree corrupted: {} nodes unreachable from any root",
            self.nodes.len()
        );
        removed
    }

    /// Remove expired leaves in expiry order, then prune ancestors that are
    /// expired and left without children.
    pub fn sweep(&mut self, now: Instant) -> SweepOutcome<P> {
        let candidates: Vec<(ExpiryKey, ContinuationId)> = self
            .expirations
            .iter()
            .take_while(|(key, _)| key.expires_at <= now)
            .map(|(key, id)| (*key, id.clone()))
            .collect();

        let mut outcome = SweepOutcome::default();
        for (key, id) in candidates {
            // Pruned as an ancestor earlier in this pass, or re-keyed
            if self.expirations.get(&key) != Some(&id) {
                continue;
            }
            let entry = self.entry(&id);
            if !entry.children.is_empty() {
                outcome.skipped += 1;
                continue;
            }
            if !entry.is_expired(now) {
                continue;
            }

            let mut parent = entry.node.parent_id().cloned();
            outcome.removed.extend(self.remove_subtree(&id));
            outcome.expired += 1;

            while let Some(parent_id) = parent {
                let entry = self.entry(&parent_id);
                if !entry.children.is_empty() || !entry.is_expired(now) {
                    break;
                }
                parent = entry.node.parent_id().cloned();
                outcome.removed.extend(self.remove_subtree(&parent_id));
                outcome.pruned += 1;
            }
        }
        outcome
    }
}

/// Container of continuations for one visibility scope
pub struct ScopeHolder<P> {
    kind: HolderKind,
    state: Mutex<HolderState<P>>,
}

impl<P> ScopeHolder<P> {
    pub fn new(kind: HolderKind) -> Self {
        Self {
            kind,
            state: Mutex::new(HolderState::new()),
        }
    }

    pub fn kind(&self) -> &HolderKind {
        &self.kind
    }

    pub fn session(&self) -> Option<&SessionId> {
        match &self.kind {
            HolderKind::Global => None,
            HolderKind::Session(session) => Some(session),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, HolderState<P>> {
        self.state.lock()
    }

    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
