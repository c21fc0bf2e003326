//! Binary entrypoint for the `reload-retries` CLI.

use std::process::ExitCode;

use reload_retries::{cli, Error};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // A missing .env file is the normal case.
    let _ = dotenvy::dotenv();
    init_logging();

    match reload_retries::run(std::env::args_os()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(Error::Cli(err)) => {
            // Help and version requests land here too and are not failures.
            let _ = err.print();
            if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) if err.is_usage() => {
            eprintln!("{err}");
            eprintln!();
            eprintln!("{}", cli::usage());
            eprintln!("For more information, try '--help'.");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so they never mix with the task report on stdout.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
