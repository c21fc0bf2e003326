//! Repository API port for reading and updating reload tasks.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Error type returned by repository calls.
pub type PortError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed future type alias used by [`TaskRepository`] to keep the trait dyn-compatible.
pub type RepoFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PortError>> + Send + 'a>>;

/// The server answered 401: the credentials bound to the client were not
/// accepted, or none were offered for the scheme it asked for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("authentication rejected (401 Unauthorized), server offers: {offered}")]
pub struct AuthRejected {
    /// Schemes named in the `WWW-Authenticate` challenges, comma-separated.
    pub offered: String,
}

/// A scheduled reload task as the server describes it.
///
/// Only the fields the reconciler reads are typed; everything else the
/// server sent is kept in `extra` and written back untouched on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadTask {
    /// Server-assigned identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// How many times a failed reload is re-attempted.
    pub max_retries: u32,
    /// Remaining fields of the record.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ReloadTask {
    /// Builds a task with no extra fields.
    pub fn new(id: impl Into<String>, name: impl Into<String>, max_retries: u32) -> Self {
        Self { id: id.into(), name: name.into(), max_retries, extra: Map::new() }
    }
}

/// The server's about record, used as a connectivity check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct About {
    /// Server build version, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_version: Option<String>,
    /// Remaining fields of the record.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reads and writes reload tasks on a repository service.
///
/// Abstracting the API allows transcript recording and replay, and lets the
/// reconciler run against in-memory fakes in tests.
pub trait TaskRepository: Send + Sync {
    /// Fetches the about record.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached or rejects the request.
    fn about(&self) -> RepoFuture<'_, About>;

    /// Lists all reload tasks. Records may be a partial projection.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails or cannot be parsed.
    fn list_reload_tasks(&self) -> RepoFuture<'_, Vec<ReloadTask>>;

    /// Fetches the full record of one reload task.
    ///
    /// # Errors
    ///
    /// Returns an error if the task cannot be fetched or parsed.
    fn get_reload_task<'a>(&'a self, id: &'a str) -> RepoFuture<'a, ReloadTask>;

    /// Submits a full task record as an update and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the update.
    fn update_reload_task<'a>(&'a self, task: &'a ReloadTask) -> RepoFuture<'a, ReloadTask>;
}
