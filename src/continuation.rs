//! Continuation Trees
//!
//! Tree-structured handles to suspended points of interactive flows. Each
//! continuation wraps an opaque payload, lives in a global or per-session
//! holder, and is removed by explicit invalidation (with its subtree) or by
//! the periodic expiration sweep.

mod holder;
mod id;
mod info;
mod manager;
mod metrics;
mod node;

pub use holder::{HolderKind, ScopeHolder};
pub use id::IdGenerator;
pub use info::{ContinuationInfo, SweepReport};
pub use manager::ContinuationsManager;
pub use metrics::RegistryMetricsSnapshot;
pub use node::{Continuation, Disposer, NewContinuation, NodeState, MAX_TIME_TO_LIVE};
