//! Recording adapter for the `TaskRepository` port.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;
use serde_json::json;

use crate::ports::{About, ReloadTask, RepoFuture, TaskRepository};
use crate::transcript::TranscriptRecorder;

/// Records repository calls while delegating to an inner implementation.
pub struct RecordingRepository {
    inner: Box<dyn TaskRepository>,
    recorder: Mutex<TranscriptRecorder>,
}

impl RecordingRepository {
    /// Creates a new recording repository wrapping the given implementation.
    pub fn new(inner: Box<dyn TaskRepository>, recorder: TranscriptRecorder) -> Self {
        Self { inner, recorder: Mutex::new(recorder) }
    }

    /// Writes the transcript of every call made so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the transcript file cannot be written.
    pub fn finish(self) -> Result<PathBuf, std::io::Error> {
        let recorder = self.recorder.into_inner().map_err(|e| {
            std::io::Error::other(format!("transcript recorder lock poisoned: {e}"))
        })?;
        recorder.finish()
    }

    fn record<T: Serialize, E: std::fmt::Display>(
        &self,
        call: &str,
        input: serde_json::Value,
        result: &Result<T, E>,
    ) {
        match self.recorder.lock() {
            Ok(mut recorder) => recorder.record_result(call, input, result),
            Err(_) => tracing::warn!(call, "transcript recorder lock poisoned; call not recorded"),
        }
    }
}

impl TaskRepository for RecordingRepository {
    fn about(&self) -> RepoFuture<'_, About> {
        Box::pin(async move {
            let result = self.inner.about().await;
            self.record("about", json!({}), &result);
            result
        })
    }

    fn list_reload_tasks(&self) -> RepoFuture<'_, Vec<ReloadTask>> {
        Box::pin(async move {
            let result = self.inner.list_reload_tasks().await;
            self.record("list_reload_tasks", json!({}), &result);
            result
        })
    }

    fn get_reload_task<'a>(&'a self, id: &'a str) -> RepoFuture<'a, ReloadTask> {
        Box::pin(async move {
            let result = self.inner.get_reload_task(id).await;
            self.record("get_reload_task", json!({ "id": id }), &result);
            result
        })
    }

    fn update_reload_task<'a>(&'a self, task: &'a ReloadTask) -> RepoFuture<'a, ReloadTask> {
        Box::pin(async move {
            let result = self.inner.update_reload_task(task).await;
            let input = json!({ "task": serde_json::to_value(task).unwrap_or_default() });
            self.record("update_reload_task", input, &result);
            result
        })
    }
}
