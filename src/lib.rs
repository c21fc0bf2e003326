//! Core library entry for the `reload-retries` CLI.

pub mod adapters;
pub mod cli;
pub mod connection;
pub mod error;
pub mod ports;
pub mod reconcile;
pub mod transcript;
pub mod trust;

use std::path::Path;

use clap::Parser;

use crate::adapters::live::LiveRepository;
use crate::adapters::recording::RecordingRepository;
use crate::connection::{ConnectionDescriptor, RunSettings};
use crate::ports::TaskRepository;
use crate::reconcile::Summary;
use crate::transcript::TranscriptRecorder;

pub use crate::error::Error;

/// Run the CLI with the provided arguments.
///
/// Flags are resolved and the client is built before any request is made,
/// so configuration errors never touch the network.
///
/// # Errors
///
/// Returns an error when argument parsing, client construction, the
/// connectivity check or any task call fails.
pub fn run<I, T>(args: I) -> Result<Summary, Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = cli::Cli::try_parse_from(args)?;
    let descriptor = ConnectionDescriptor::from_cli(&cli)?;
    let settings = RunSettings::from_cli(&cli);
    if let Some(dir) = descriptor.cert_dir() {
        tracing::debug!(dir = %dir.display(), "using certificate directory");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(Error::Runtime)?;
    let repo = LiveRepository::connect(&descriptor)?;
    runtime.block_on(execute(repo, settings, cli.record.as_deref()))
}

/// Verify the connection and reconcile, recording a transcript if asked.
///
/// The transcript is written even when the run fails.
async fn execute(
    repo: LiveRepository,
    settings: RunSettings,
    record: Option<&Path>,
) -> Result<Summary, Error> {
    let server = repo.base().to_string();
    let Some(path) = record else {
        return verify_and_reconcile(&repo, &server, settings).await;
    };

    let recording = RecordingRepository::new(Box::new(repo), TranscriptRecorder::new(path, &server));
    let result = verify_and_reconcile(&recording, &server, settings).await;
    let written = recording.finish().map_err(|e| {
        Error::Transcript(format!("Failed to write transcript {}: {e}", path.display()))
    });

    let summary = result?;
    let written = written?;
    tracing::info!(path = %written.display(), "transcript written");
    Ok(summary)
}

async fn verify_and_reconcile(
    repo: &dyn TaskRepository,
    server: &str,
    settings: RunSettings,
) -> Result<Summary, Error> {
    connection::verify(repo, server).await?;
    reconcile::reconcile(repo, settings).await
}
