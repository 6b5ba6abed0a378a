//! Command-line interface for `csb`: argument parsing and the linear backup run.
//!
//! A run goes through these steps and stops at the first one that does not hold:
//! 1. the config path must be a regular file ([`Outcome::ConfigMissing`]);
//! 2. the config must parse (propagated error);
//! 3. the local backup must be a regular file ([`Outcome::LocalFileMissing`]);
//! 4. the provider section is read and the provider's credentials file must be a regular file
//!    ([`Outcome::CredentialsMissing`]);
//! 5. the provider client connects, then [`backup_if_absent`] runs.
//!
//! Logging is set up by the caller before [`run`], so `run` can be driven from tests under a
//! scoped subscriber.

use crate::backup::{backup_if_absent, Outcome};
use crate::load_config::{check_file_exists, load_config, BackupConfig, GoogleSection};
use crate::logging::{LogLevel, LogSettings};
use crate::upload::{GoogleCloudStorage, Provider};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, error, info};

/// Cloud Storage Backups: push a backup file to a cloud bucket unless it is already there.
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "csb",
    version,
    about = "Cloud Storage Backups: push a backup file to a cloud bucket unless it is already there"
)]
pub struct Cli {
    /// Console log level
    #[clap(long, value_enum, default_value = "error", env = "CSB_CONSOLE_LOG_LEVEL")]
    pub console_log_level: LogLevel,

    /// File log level; no log file is written when unset
    #[clap(long, value_enum, env = "CSB_FILE_LOG_LEVEL")]
    pub file_log_level: Option<LogLevel>,

    /// /path/to/logs_dir
    #[clap(short = 'l', long = "log-path", env = "CSB_LOG_PATH", default_value_os_t = std::env::temp_dir())]
    pub log_dir: PathBuf,

    /// /path/to/config.ini
    #[clap(short = 'c', long = "config", env = "CSB_CONFIG")]
    pub config: PathBuf,

    /// Local /path/to/backup
    #[clap(long, env = "CSB_LOCAL_PATH")]
    pub local_path: PathBuf,

    /// Remote (cloud) path/to/backup
    #[clap(long, env = "CSB_REMOTE_PATH")]
    pub remote_path: String,

    /// Google project id, e.g. my-project-123456; defaults to the key file's project_id
    #[clap(long, env = "CSB_GOOGLE_PROJECT_ID")]
    pub google_project_id: Option<String>,

    /// Cloud provider
    #[clap(long, value_enum, env = "CSB_PROVIDER")]
    pub provider: Provider,

    /// Exit non-zero when the credentials file is missing or the upload is forbidden
    #[clap(long, env = "CSB_STRICT")]
    pub strict: bool,
}

impl Cli {
    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            console_level: self.console_log_level,
            file_level: self.file_log_level,
            log_dir: self.log_dir.clone(),
        }
    }
}

/// Runs one backup attempt described by `cli`.
///
/// Precondition failures come back as an [`Outcome`]; malformed configuration or
/// credentials, a missing bucket and unexpected provider errors come back as `Err`.
pub async fn run(cli: &Cli) -> Result<Outcome> {
    info!(
        provider = %cli.provider,
        config = ?cli.config,
        local_path = ?cli.local_path,
        remote_path = %cli.remote_path,
        "Backup run starting"
    );

    if !check_file_exists(&cli.config) {
        return Ok(Outcome::ConfigMissing);
    }
    let config = load_config(&cli.config)?;

    if cli.local_path.is_file() {
        debug!(local_path = ?cli.local_path, "local_path is a file");
    } else {
        error!(
            local_path = ?cli.local_path,
            "local_path {} is not a file or does not exist",
            cli.local_path.display()
        );
        return Ok(Outcome::LocalFileMissing);
    }

    match cli.provider {
        Provider::Google => backup_to_google(cli, &config).await,
    }
}

async fn backup_to_google(cli: &Cli, config: &BackupConfig) -> Result<Outcome> {
    let section = GoogleSection::from_config(config)?;

    if !check_file_exists(&section.private_key_json_file) {
        error!(
            private_key_json_file = ?section.private_key_json_file,
            provider = %cli.provider,
            "Unable to read private_key_json_file, cannot continue with provider {}",
            cli.provider
        );
        return Ok(Outcome::CredentialsMissing);
    }

    let store = GoogleCloudStorage::connect(
        &section.private_key_json_file,
        &section.bucket,
        cli.google_project_id.as_deref(),
        section.endpoint.as_deref(),
    )
    .await
    .with_context(|| format!("Failed to open bucket {}", section.bucket))?;

    let outcome = backup_if_absent(&store, cli.provider, &cli.local_path, &cli.remote_path)
        .await
        .with_context(|| format!("Backup to {} failed", cli.remote_path))?;
    Ok(outcome)
}
