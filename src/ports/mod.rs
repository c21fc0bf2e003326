//! Port traits defining external boundaries.
//!
//! The repository API is the only external system the reconciler talks to.
//! Implementations live in `src/adapters/`.

pub mod repository;

pub use repository::{About, AuthRejected, PortError, ReloadTask, RepoFuture, TaskRepository};
