//! Error types shared across the crate.

use thiserror::Error;

use crate::ports::PortError;
use crate::trust::TrustError;

/// Top-level error for a run.
///
/// Usage errors are reported together with the usage banner; everything
/// else is reported on its own. Both exit with a failure status.
#[derive(Debug, Error)]
pub enum Error {
    /// Command-line parsing failed (or help/version was requested).
    #[error(transparent)]
    Cli(#[from] clap::Error),
    /// A flag value was present but unusable.
    #[error("{0}")]
    Usage(String),
    /// Certificate material could not be loaded.
    #[error(transparent)]
    Trust(#[from] TrustError),
    /// The HTTP client could not be built from the connection settings.
    #[error("Failed to build API client: {0}")]
    Client(String),
    /// The about check against the server failed.
    #[error("Could not connect to {url}: {source}")]
    Connect {
        /// The API base URL that was checked.
        url: String,
        /// The underlying failure.
        source: PortError,
    },
    /// The about check reached the server but it refused to authenticate us.
    #[error(
        "{url} rejected the connection as unauthenticated (server offers: {offered}). \
         The integrated-authentication handshake must be answered by the platform or an \
         authenticating proxy in HTTPS_PROXY; otherwise connect with --direct"
    )]
    Unauthorized {
        /// The API base URL that was checked.
        url: String,
        /// Schemes the server asked for.
        offered: String,
    },
    /// A listing, fetch or update call failed.
    #[error("{context}: {source}")]
    Api {
        /// What the run was doing when the call failed.
        context: String,
        /// The underlying failure.
        source: PortError,
    },
    /// The API transcript could not be written or read.
    #[error("{0}")]
    Transcript(String),
    /// The async runtime could not be started.
    #[error("Failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl Error {
    /// Whether this error belongs to the configuration/usage class.
    #[must_use]
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Cli(_) | Self::Usage(_) | Self::Trust(_) | Self::Client(_))
    }

    pub(crate) fn api(context: impl Into<String>, source: PortError) -> Self {
        Self::Api { context: context.into(), source }
    }
}
