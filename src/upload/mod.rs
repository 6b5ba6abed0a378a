//! Storage capability used by the backup flow, and the providers implementing it.
//!
//! The flow in [`crate::backup`] only talks to [`BackupStore`]; a provider is a type that can
//! answer "is there an object at this path?" and "put this local file at that path".
//! [`MockBackupStore`] is generated for tests.

use async_trait::async_trait;
use clap::ValueEnum;
use std::fmt;
use std::path::Path;

pub mod gcs;

pub use gcs::{GoogleCloudStorage, ServiceAccountKey};

pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while talking to a storage provider.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The service-account key file could not be read or parsed.
    #[error("invalid credentials in {path:?}: {reason}")]
    CredentialsInvalid { path: String, reason: String },

    /// Exchanging the credentials for an access token failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The bucket does not exist or is not visible with these credentials.
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    /// The provider refused the write.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Any other non-success answer from the provider.
    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The remote path is not a name the provider can store an object under.
    #[error("invalid object name {name:?}: {reason}")]
    InvalidObjectName { name: String, reason: &'static str },

    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn credentials_invalid(path: &Path, reason: impl ToString) -> Self {
        Self::CredentialsInvalid {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

/// Cloud providers selectable with `--provider`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    Google,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Google => "google",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bucket of one provider, bound for the duration of a run.
#[cfg_attr(any(test, feature = "test-export-mocks"), mockall::automock)]
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Returns true iff an object exists at `remote_path`.
    async fn exists_at(&self, remote_path: &str) -> StorageResult<bool>;

    /// Streams the file at `local_path` to `remote_path`, creating or overwriting it.
    async fn upload(&self, local_path: &Path, remote_path: &str) -> StorageResult<()>;
}
