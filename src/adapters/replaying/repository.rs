//! Replaying adapter for the `TaskRepository` port.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::ready;
use crate::ports::{About, PortError, ReloadTask, RepoFuture, TaskRepository};
use crate::transcript::{Exchange, Transcript};

/// Serves recorded repository responses from a transcript.
///
/// Each call name has its own queue, consumed in recorded order. Updates
/// submitted to it are kept so callers can inspect what would have been sent.
pub struct ReplayingRepository {
    queues: Mutex<HashMap<String, VecDeque<Exchange>>>,
    served: Mutex<Vec<String>>,
    submitted: Mutex<Vec<ReloadTask>>,
}

impl ReplayingRepository {
    /// Create a replaying repository from a loaded transcript.
    #[must_use]
    pub fn new(transcript: &Transcript) -> Self {
        let mut queues: HashMap<String, VecDeque<Exchange>> = HashMap::new();
        for exchange in &transcript.exchanges {
            queues.entry(exchange.call.clone()).or_default().push_back(exchange.clone());
        }
        Self { queues: Mutex::new(queues), served: Mutex::default(), submitted: Mutex::default() }
    }

    /// Create a replaying repository from a transcript file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        Transcript::load(path).map(|t| Self::new(&t))
    }

    /// Names of the calls served so far, in order.
    #[must_use]
    pub fn served_calls(&self) -> Vec<String> {
        self.served.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Task records submitted through `update_reload_task`, in order.
    #[must_use]
    pub fn submitted_updates(&self) -> Vec<ReloadTask> {
        self.submitted.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn next<T: DeserializeOwned>(&self, call: &str) -> Result<T, PortError> {
        self.next_matching(call, |_| Ok(()))
    }

    /// Like `next`, but first lets `check` reject the recorded input.
    fn next_matching<T: DeserializeOwned>(
        &self,
        call: &str,
        check: impl FnOnce(&Value) -> Result<(), String>,
    ) -> Result<T, PortError> {
        let exchange = {
            let mut queues = self.queues.lock().map_err(|_| "replay queues poisoned")?;
            queues.get_mut(call).and_then(VecDeque::pop_front)
        }
        .ok_or_else(|| format!("Transcript has no recorded response left for {call}"))?;

        check(&exchange.input)?;
        if let Ok(mut served) = self.served.lock() {
            served.push(call.to_string());
        }
        replay_output(exchange.output)
    }
}

/// Decode an output recorded under the `Ok`/`Err` convention.
fn replay_output<T: DeserializeOwned>(output: Value) -> Result<T, PortError> {
    let Value::Object(mut map) = output else {
        return Err("Recorded output is not an Ok/Err object".into());
    };
    if let Some(ok) = map.remove("Ok") {
        return Ok(serde_json::from_value(ok)?);
    }
    match map.remove("Err") {
        Some(Value::String(message)) => Err(message.into()),
        Some(other) => Err(other.to_string().into()),
        None => Err("Recorded output is not an Ok/Err object".into()),
    }
}

impl TaskRepository for ReplayingRepository {
    fn about(&self) -> RepoFuture<'_, About> {
        ready(self.next("about"))
    }

    fn list_reload_tasks(&self) -> RepoFuture<'_, Vec<ReloadTask>> {
        ready(self.next("list_reload_tasks"))
    }

    fn get_reload_task<'a>(&'a self, id: &'a str) -> RepoFuture<'a, ReloadTask> {
        ready(self.next_matching("get_reload_task", |input| match input.get("id") {
            Some(Value::String(recorded)) if recorded != id => Err(format!(
                "Transcript recorded get_reload_task for {recorded}, but {id} was requested"
            )),
            _ => Ok(()),
        }))
    }

    fn update_reload_task<'a>(&'a self, task: &'a ReloadTask) -> RepoFuture<'a, ReloadTask> {
        if let Ok(mut submitted) = self.submitted.lock() {
            submitted.push(task.clone());
        }
        ready(self.next("update_reload_task"))
    }
}
