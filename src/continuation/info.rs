//! Read-only views returned by the registry's diagnostic operations.

use crate::types::{ContinuationId, SessionId};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Flat snapshot of one continuation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContinuationInfo {
    pub id: ContinuationId,
    pub parent_id: Option<ContinuationId>,
    pub child_ids: Vec<ContinuationId>,
    pub scope_tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Present in the expiration index (sweep candidate)
    pub expiration_tracked: bool,
    pub state: String,
}

/// Outcome of one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Expired leaves removed
    pub expired: usize,
    /// Expired ancestors removed after losing their last child
    pub pruned_ancestors: usize,
    /// Expired index entries left alone because they still have a child
    pub skipped: usize,
}

impl SweepReport {
    pub fn removed(&self) -> usize {
        self.expired + self.pruned_ancestors
    }

    pub(crate) fn merge(&mut self, other: SweepReport) {
        self.expired += other.expired;
        self.pruned_ancestors += other.pruned_ancestors;
        self.skipped += other.skipped;
    }
}
