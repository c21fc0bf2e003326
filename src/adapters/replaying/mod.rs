//! Replaying adapters that serve recorded interactions.

pub mod repository;

pub use repository::ReplayingRepository;

use crate::ports::{PortError, RepoFuture};

/// Wrap an already-computed result as a port future.
pub(crate) fn ready<'a, T: Send + 'a>(result: Result<T, PortError>) -> RepoFuture<'a, T> {
    Box::pin(std::future::ready(result))
}
