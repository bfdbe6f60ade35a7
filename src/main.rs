// Entrypoint for the CLI application.
// - Keeps `main` small: parse arguments, set up logging and Ctrl-C handling,
//   then hand over to `cli::run`.
// - Exit codes: 0 success, 1 failure, 130 interrupted.

use std::process::ExitCode;

use clap::Parser;
use protecodesc_cli::cancel::CancelToken;
use protecodesc_cli::cli::{is_client_error, run, Cli};
use protecodesc_cli::logging::{init_logging_with_config, LogConfig};
use protecodesc_cli::ClientError;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging_with_config(LogConfig::from_verbosity(cli.verbose).format(cli.log_format));

    let cancel = match CancelToken::install_ctrlc_handler() {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!("Could not install Ctrl-C handler: {}", e);
            CancelToken::new()
        }
    };

    match run(cli, cancel) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if is_client_error(&e, |c| matches!(c, ClientError::Cancelled)) => ExitCode::from(130),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
