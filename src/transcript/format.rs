//! Transcript data structures.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One call made against the repository API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Exchange {
    /// Sequence number (assigned automatically by the recorder).
    pub seq: u64,
    /// Port method invoked (e.g. `"list_reload_tasks"`).
    pub call: String,
    /// Arguments passed to the call.
    pub input: serde_json::Value,
    /// Outcome, as `{"Ok": value}` or `{"Err": message}`.
    pub output: serde_json::Value,
}

/// Every call made during one run, in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transcript {
    /// API base URL the calls went to.
    pub server: String,
    /// When the run finished.
    pub recorded_at: DateTime<Utc>,
    /// Ordered list of calls.
    pub exchanges: Vec<Exchange>,
}

impl Transcript {
    /// Read a transcript file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read transcript {}: {e}", path.display()))?;
        serde_yaml::from_str(&content)
            .map_err(|e| format!("Failed to parse transcript {}: {e}", path.display()))
    }
}
