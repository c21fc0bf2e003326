//! YAML transcripts of repository API calls, for auditing and replay.

pub mod format;
pub mod recorder;

pub use format::{Exchange, Transcript};
pub use recorder::TranscriptRecorder;
