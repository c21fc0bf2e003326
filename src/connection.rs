//! Resolving the command line into a connection descriptor.

use std::path::PathBuf;

use reqwest::Url;

use crate::cli::Cli;
use crate::error::Error;
use crate::ports::{About, AuthRejected, TaskRepository};
use crate::trust::TrustSource;

/// How to reach the repository API. Resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionDescriptor {
    /// Go through a virtual proxy; the calling session supplies credentials.
    ProxyDelegated {
        /// Server base URL.
        url: Url,
    },
    /// Talk to the repository service port as an explicit user.
    Direct {
        /// Server base URL (its port is replaced by `port`).
        url: Url,
        /// Repository service port.
        port: u16,
        /// User directory of the acting user.
        user_directory: String,
        /// User id of the acting user.
        user_id: String,
        /// Certificates used for the TLS handshake.
        trust: TrustSource,
    },
}

/// What the reconciler should do once connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSettings {
    /// Retry count every task should end up with.
    pub target_retries: u32,
    /// Whether to write changes or only report them.
    pub apply: bool,
}

impl RunSettings {
    /// Read the run settings from parsed flags.
    #[must_use]
    pub fn from_cli(cli: &Cli) -> Self {
        Self { target_retries: cli.retries, apply: cli.apply }
    }
}

impl ConnectionDescriptor {
    /// Pick the connection mode from parsed flags.
    ///
    /// `--ntlm` wins outright; direct-mode values are only inspected when it
    /// is absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] when no mode is given, `--certs` accompanies
    /// `--ntlm`, the URL is not an absolute http(s) URL, or the direct-mode
    /// port is not a port number.
    pub fn from_cli(cli: &Cli) -> Result<Self, Error> {
        if let Some(url) = &cli.ntlm {
            if cli.certs.is_some() {
                return Err(Error::Usage("--certs is only valid with --direct".into()));
            }
            return Ok(Self::ProxyDelegated { url: parse_url(url)? });
        }

        let Some(values) = &cli.direct else {
            return Err(Error::Usage("Specify either --ntlm or --direct".into()));
        };
        let [url, port, user_directory, user_id] = values.as_slice() else {
            return Err(Error::Usage(format!(
                "--direct takes 4 values (url, port, user directory, user id), got {}",
                values.len()
            )));
        };

        let url = parse_url(url)?;
        let port = port
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| Error::Usage(format!("Invalid port: {port:?}")))?;
        let trust = cli.certs.clone().map_or(TrustSource::SystemStore, TrustSource::Directory);

        Ok(Self::Direct {
            url,
            port,
            user_directory: user_directory.clone(),
            user_id: user_id.clone(),
            trust,
        })
    }

    /// Root of the repository API (`<server>/qrs/`, on the service port for
    /// direct connections).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Usage`] when the URL cannot carry a port.
    pub fn api_base(&self) -> Result<Url, Error> {
        let mut base = match self {
            Self::ProxyDelegated { url } => url.clone(),
            Self::Direct { url, port, .. } => {
                let mut url = url.clone();
                url.set_port(Some(*port))
                    .map_err(|()| Error::Usage(format!("Cannot set port on {url}")))?;
                url
            }
        };
        let path = base.path().trim_end_matches('/').to_string();
        base.set_path(&format!("{path}/qrs/"));
        base.set_query(None);
        Ok(base)
    }

    /// The certificate directory, when one was given.
    #[must_use]
    pub fn cert_dir(&self) -> Option<&PathBuf> {
        match self {
            Self::Direct { trust: TrustSource::Directory(dir), .. } => Some(dir),
            _ => None,
        }
    }
}

/// Confirm the repository answers before any task is touched.
///
/// # Errors
///
/// Returns [`Error::Unauthorized`] when the server answers 401, and
/// [`Error::Connect`] for any other failure of the about call.
pub async fn verify(repo: &dyn TaskRepository, api_base: &str) -> Result<About, Error> {
    let about = repo.about().await.map_err(|source| {
        let url = api_base.to_string();
        match source.downcast_ref::<AuthRejected>().map(|r| r.offered.clone()) {
            Some(offered) => Error::Unauthorized { url, offered },
            None => Error::Connect { url, source },
        }
    })?;
    tracing::info!(
        build = about.build_version.as_deref().unwrap_or("unknown"),
        "connected to {api_base}"
    );
    Ok(about)
}

fn parse_url(raw: &str) -> Result<Url, Error> {
    let url = Url::parse(raw).map_err(|e| Error::Usage(format!("Invalid URL {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(Error::Usage(format!("Invalid URL {raw:?}: expected http(s)://host"))),
    }
}
