//! CLI argument definitions.

use std::path::PathBuf;

use clap::{ArgGroup, CommandFactory, Parser};

/// Top-level CLI parser for `reload-retries`.
///
/// Exactly one of `--ntlm` or `--direct` selects how to reach the server.
#[derive(Debug, Parser)]
#[command(
    name = "reload-retries",
    version,
    about = "List reload tasks and normalize their retry count"
)]
#[command(group(ArgGroup::new("mode").required(true).args(["ntlm", "direct"])))]
pub struct Cli {
    /// Connect through a virtual proxy using integrated (NTLM) authentication.
    ///
    /// The NTLM/Negotiate handshake is not performed by this tool: it must be
    /// answered by the platform or by an authenticating proxy named in
    /// HTTPS_PROXY. A 401 from the virtual proxy is reported as such.
    #[arg(long, value_name = "URL")]
    pub ntlm: Option<String>,

    /// Connect directly to the repository service as the given user.
    #[arg(long, num_args = 4, value_names = ["URL", "PORT", "USER_DIR", "USER_ID"])]
    pub direct: Option<Vec<String>>,

    /// Directory holding root.pem, client.pem and client_key.pem.
    ///
    /// Without it the system certificate store is used.
    #[arg(long, value_name = "PATH", requires = "direct", conflicts_with = "ntlm")]
    pub certs: Option<PathBuf>,

    /// Retry count every reload task should end up with.
    #[arg(long, value_name = "N", default_value_t = 0, env = "QRS_RETRIES")]
    pub retries: u32,

    /// Apply changes. Without this flag the run only reports.
    #[arg(long)]
    pub apply: bool,

    /// Write a YAML transcript of every API call to FILE.
    #[arg(long, value_name = "FILE")]
    pub record: Option<PathBuf>,
}

/// The one-line usage banner printed after configuration errors.
#[must_use]
pub fn usage() -> String {
    Cli::command().render_usage().to_string()
}
