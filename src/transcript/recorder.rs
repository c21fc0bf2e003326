//! Collects exchanges and writes them as a YAML transcript.

use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use super::format::{Exchange, Transcript};

/// Records exchanges and writes them as a YAML transcript file.
#[derive(Debug)]
pub struct TranscriptRecorder {
    path: PathBuf,
    server: String,
    exchanges: Vec<Exchange>,
    next_seq: u64,
}

impl TranscriptRecorder {
    /// Create a new recorder that will write to the given path.
    pub fn new(path: impl Into<PathBuf>, server: impl Into<String>) -> Self {
        Self { path: path.into(), server: server.into(), exchanges: Vec::new(), next_seq: 0 }
    }

    /// Record an exchange. The `seq` field is assigned automatically.
    pub fn record(&mut self, call: impl Into<String>, input: Value, output: Value) {
        self.exchanges.push(Exchange { seq: self.next_seq, call: call.into(), input, output });
        self.next_seq += 1;
    }

    /// Record the outcome of a fallible call using the `Ok`/`Err` convention.
    pub fn record_result<T, E>(&mut self, call: &str, input: Value, result: &Result<T, E>)
    where
        T: Serialize,
        E: std::fmt::Display,
    {
        let output = match result {
            Ok(v) => json!({ "Ok": serde_json::to_value(v).unwrap_or_default() }),
            Err(e) => json!({ "Err": e.to_string() }),
        };
        self.record(call, input, output);
    }

    /// Number of exchanges recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// Finish recording and write the transcript to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn finish(self) -> Result<PathBuf, std::io::Error> {
        let transcript = Transcript {
            server: self.server,
            recorded_at: Utc::now(),
            exchanges: self.exchanges,
        };
        let yaml = serde_yaml::to_string(&transcript).map_err(std::io::Error::other)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, yaml)?;
        Ok(self.path)
    }
}
