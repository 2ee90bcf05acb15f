//! Contree: Continuation Tree Lifecycle Management
//!
//! An in-memory registry of tree-structured continuations for interactive
//! server-side flows, with cascading invalidation, per-session scoping and a
//! background expiration sweep driven by a delayed/periodic task scheduler.

pub mod cli;
pub mod config;
pub mod continuation;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod types;
