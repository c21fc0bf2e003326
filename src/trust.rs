//! Loading TLS trust material for direct connections.
//!
//! A certificate directory holds the exported server certificates:
//! `root.pem` (the CA the server certificate chains to), `client.pem` and
//! `client_key.pem` (the client identity presented to the repository
//! service). Without a directory the platform trust store is used and no
//! client identity is presented.

use std::path::{Path, PathBuf};

use reqwest::{Certificate, Identity};
use thiserror::Error;

/// File name of the trusted root certificate.
pub const ROOT_CERT: &str = "root.pem";
/// File name of the client certificate.
pub const CLIENT_CERT: &str = "client.pem";
/// File name of the client private key (PKCS#1, PKCS#8 or SEC1 PEM).
pub const CLIENT_KEY: &str = "client_key.pem";

/// Where trust material comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustSource {
    /// A directory containing the exported PEM files.
    Directory(PathBuf),
    /// The host's default certificate store.
    SystemStore,
}

/// Failure to load trust material.
#[derive(Debug, Error)]
pub enum TrustError {
    /// The certificate directory does not exist.
    #[error("Certificate directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),
    /// A required file is missing from the certificate directory.
    #[error("Certificate file not found: {}", .0.display())]
    MissingFile(PathBuf),
    /// A file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        /// The file that failed.
        path: PathBuf,
        /// The I/O failure.
        source: std::io::Error,
    },
    /// A file was read but is not usable PEM material.
    #[error("Invalid certificate material in {}: {reason}", path.display())]
    Invalid {
        /// The offending file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },
}

/// Certificates loaded from a directory.
pub struct TrustMaterial {
    /// CA certificate added to the client's root store.
    pub root: Certificate,
    /// Client identity presented during the TLS handshake.
    pub identity: Identity,
}

impl std::fmt::Debug for TrustMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustMaterial").finish_non_exhaustive()
    }
}

impl TrustSource {
    /// Load the material this source points at.
    ///
    /// Returns `None` for the system store: the TLS backend reads it itself.
    ///
    /// # Errors
    ///
    /// Returns a [`TrustError`] naming the directory or file that failed.
    pub fn load(&self) -> Result<Option<TrustMaterial>, TrustError> {
        match self {
            Self::Directory(dir) => load_directory(dir).map(Some),
            Self::SystemStore => Ok(None),
        }
    }
}

fn load_directory(dir: &Path) -> Result<TrustMaterial, TrustError> {
    if !dir.is_dir() {
        return Err(TrustError::MissingDirectory(dir.to_path_buf()));
    }

    // All three must exist before any is parsed.
    let root_path = dir.join(ROOT_CERT);
    let cert_path = dir.join(CLIENT_CERT);
    let key_path = dir.join(CLIENT_KEY);
    for path in [&root_path, &cert_path, &key_path] {
        if !path.is_file() {
            return Err(TrustError::MissingFile(path.clone()));
        }
    }

    let root_pem = read(&root_path)?;
    let root = Certificate::from_pem(&root_pem).map_err(|e| invalid(&root_path, e))?;

    let cert_pem = read(&cert_path)?;
    if !has_pem_block(&cert_pem, &["CERTIFICATE"]) {
        return Err(invalid(&cert_path, "no PEM certificate found"));
    }
    let key_pem = read(&key_path)?;
    if !has_pem_block(&key_pem, KEY_LABELS) {
        return Err(invalid(&key_path, "no PKCS#1, PKCS#8 or SEC1 private key found"));
    }

    let mut bundle = cert_pem;
    bundle.push(b'\n');
    bundle.extend_from_slice(&key_pem);
    let identity = Identity::from_pem(&bundle).map_err(|e| invalid(&key_path, e))?;

    tracing::debug!(dir = %dir.display(), "loaded certificate directory");
    Ok(TrustMaterial { root, identity })
}

/// PEM labels of the private key encodings the TLS backend accepts.
const KEY_LABELS: &[&str] = &["PRIVATE KEY", "RSA PRIVATE KEY", "EC PRIVATE KEY"];

fn has_pem_block(pem: &[u8], labels: &[&str]) -> bool {
    let text = String::from_utf8_lossy(pem);
    labels.iter().any(|label| text.contains(&format!("-----BEGIN {label}-----")))
}

fn invalid(path: &Path, reason: impl std::fmt::Display) -> TrustError {
    TrustError::Invalid { path: path.to_path_buf(), reason: reason.to_string() }
}

fn read(path: &Path) -> Result<Vec<u8>, TrustError> {
    std::fs::read(path).map_err(|source| TrustError::Read { path: path.to_path_buf(), source })
}
