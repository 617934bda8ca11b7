// src/state/mod.rs

//! State Store: the in-memory projection of the watched job.
//!
//! - `scope.rs`: what is watched.
//! - `store.rs`: the single-writer fold.
//! - `snapshot.rs`: read-only views and the queries over them.
//! - `task.rs`: task lifecycle classes and statuses.

pub mod scope;
pub mod snapshot;
pub mod store;
pub mod task;

pub use scope::{ScopeTarget, WatchedScope};
pub use snapshot::{ScopedTask, Snapshot};
pub use store::{ApplyOutcome, StateStore};
pub use task::{TaskLifecycle, TaskStatus};
