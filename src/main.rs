use clap::Parser;
use cloud_storage_backups::cli::{run, Cli};
use cloud_storage_backups::logging::init_logging;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_settings()) {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(&cli).await {
        Ok(outcome) => {
            let code = outcome.exit_code(cli.strict);
            if outcome.is_success() {
                tracing::info!(?outcome, exit_code = code, "Backup run finished");
            } else {
                tracing::warn!(
                    ?outcome,
                    exit_code = code,
                    "Backup run finished without a backup in place"
                );
            }
            ExitCode::from(code)
        }
        Err(e) => {
            tracing::error!(error = ?e, "Backup run failed");
            ExitCode::FAILURE
        }
    }
}
