//! `load_config` module: loads the sectioned INI file that names the credentials and bucket for each provider.
//!
//! # Responsibilities
//! - Refuse to parse anything that is not a regular file (`ConfigError::NotFound`)
//! - Parse the INI text, surfacing malformed input as `ConfigError::Parse`
//! - Answer `(section, key)` lookups, failing with `ConfigError::KeyNotFound` on first access
//!   to a missing key. No defaults are synthesized.
//!
//! Values are returned exactly as written after `=`: no escape sequences, no quote stripping,
//! so Windows paths like `C:\keys\sa.json` survive. Option names match case-insensitively and
//! fall back to the `[DEFAULT]` section; section names are case-sensitive.
//!
//! # Accepted layout
//! ```ini
//! [google]
//! private_key_json_file = /etc/backups/service-account.json
//! bucket = my-backups
//! ; optional, for emulators
//! endpoint = http://127.0.0.1:4443
//! ```
use ini::{Ini, ParseOption, Properties};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Errors raised while loading or querying the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file {0:?} is not a file")]
    NotFound(PathBuf),

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("no option '{key}' in section '{section}'")]
    KeyNotFound { section: String, key: String },
}

/// Section whose options every other section inherits.
pub const DEFAULT_SECTION: &str = "DEFAULT";

fn parse_options() -> ParseOption {
    ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..Default::default()
    }
}

// Last occurrence wins when an option is repeated.
fn find_option<'a>(props: &'a Properties, key: &str) -> Option<&'a str> {
    let wanted = key.to_lowercase();
    props
        .iter()
        .filter(|(name, _)| name.to_lowercase() == wanted)
        .map(|(_, value)| value)
        .last()
}

/// Immutable view over a loaded configuration file.
#[derive(Debug)]
pub struct BackupConfig {
    ini: Ini,
}

impl BackupConfig {
    /// Parses configuration from in-memory INI text.
    pub fn parse_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str_opt(text, parse_options()).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            source: ini::Error::Parse(e),
        })?;
        Ok(Self { ini })
    }

    /// Looks up `key` in `section`.
    pub fn get(&self, section: &str, key: &str) -> Result<&str, ConfigError> {
        self.get_opt(section, key)
            .ok_or_else(|| ConfigError::KeyNotFound {
                section: section.to_string(),
                key: key.to_string(),
            })
    }

    /// Looks up an optional `key` in `section`, then in `[DEFAULT]`.
    ///
    /// A section that does not exist has no options, inherited or not.
    pub fn get_opt(&self, section: &str, key: &str) -> Option<&str> {
        let props = self.ini.section(Some(section))?;
        find_option(props, key).or_else(|| {
            self.ini
                .section(Some(DEFAULT_SECTION))
                .and_then(|defaults| find_option(defaults, key))
        })
    }
}

/// Settings of the `[google]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleSection {
    pub private_key_json_file: PathBuf,
    pub bucket: String,
    pub endpoint: Option<String>,
}

impl GoogleSection {
    pub const NAME: &'static str = "google";

    pub fn from_config(config: &BackupConfig) -> Result<Self, ConfigError> {
        let section = Self {
            private_key_json_file: PathBuf::from(config.get(Self::NAME, "private_key_json_file")?),
            bucket: config.get(Self::NAME, "bucket")?.to_string(),
            endpoint: config.get_opt(Self::NAME, "endpoint").map(str::to_string),
        };
        debug!(
            private_key_json_file = ?section.private_key_json_file,
            bucket = %section.bucket,
            endpoint = ?section.endpoint,
            "Read [google] section"
        );
        Ok(section)
    }
}

/// Returns true if `path` is a regular file, logging the result either way.
pub fn check_file_exists(path: &Path) -> bool {
    if path.is_file() {
        debug!(path = ?path, "Path is a file");
        true
    } else {
        error!(path = ?path, "Path is not a file");
        false
    }
}

/// Loads the configuration file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BackupConfig, ConfigError> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    if !path_ref.is_file() {
        error!(config_path = ?path_ref, "Config path is not a regular file");
        return Err(ConfigError::NotFound(path_ref.to_path_buf()));
    }

    let ini = match Ini::load_from_file_opt(path_ref, parse_options()) {
        Ok(ini) => {
            info!(config_path = ?path_ref, "Parsed config INI successfully");
            ini
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config INI");
            return Err(ConfigError::Parse {
                path: path_ref.to_path_buf(),
                source: e,
            });
        }
    };

    Ok(BackupConfig { ini })
}
