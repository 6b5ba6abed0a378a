//! The check-then-upload step of a backup run, and the outcomes a run can end in.
//!
//! [`backup_if_absent`] is generic over [`BackupStore`] so it runs unchanged against any
//! provider, and against `MockBackupStore` in tests.
//!
//! The existence check and the upload are two separate requests. A writer that creates the
//! same object in between is overwritten; runs are assumed to be the only writer of their
//! remote path.

use crate::upload::{BackupStore, Provider, StorageResult};
use std::path::Path;
use tracing::{error, info, warn};

/// How a backup run ended, when it did not fail with a propagated error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The local file was uploaded.
    Uploaded,
    /// An object already exists at the remote path; nothing was uploaded.
    AlreadyExists,
    /// The configuration path is not a regular file.
    ConfigMissing,
    /// The local backup path is not a regular file.
    LocalFileMissing,
    /// The credentials file named in the configuration is not a regular file.
    CredentialsMissing,
    /// The provider rejected the upload for lack of permission.
    UploadForbidden,
}

impl Outcome {
    /// Process exit status for this outcome.
    ///
    /// A missing credentials file and a forbidden upload exit 0 unless `strict` is set, which
    /// keeps existing monitoring that greps the log working.
    pub fn exit_code(self, strict: bool) -> u8 {
        match self {
            Outcome::Uploaded | Outcome::AlreadyExists => 0,
            Outcome::ConfigMissing | Outcome::LocalFileMissing => 1,
            Outcome::CredentialsMissing | Outcome::UploadForbidden => u8::from(strict),
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Outcome::Uploaded | Outcome::AlreadyExists)
    }
}

/// Uploads `local_path` to `remote_path` unless an object is already there.
///
/// A permission-denied upload is logged and reported as [`Outcome::UploadForbidden`]; every
/// other storage error is returned to the caller.
pub async fn backup_if_absent<S>(
    store: &S,
    provider: Provider,
    local_path: &Path,
    remote_path: &str,
) -> StorageResult<Outcome>
where
    S: BackupStore + ?Sized,
{
    if store.exists_at(remote_path).await? {
        warn!(%provider, remote_path, "Backup {remote_path} already exists in the cloud");
        return Ok(Outcome::AlreadyExists);
    }

    match store.upload(local_path, remote_path).await {
        Ok(()) => {
            info!(
                %provider,
                ?local_path,
                remote_path,
                "Successfully uploaded {} to {remote_path} for provider {provider}",
                local_path.display()
            );
            Ok(Outcome::Uploaded)
        }
        Err(e) if e.is_permission_denied() => {
            error!(
                %provider,
                ?local_path,
                remote_path,
                error = %e,
                "Failed to upload {} to {remote_path} for provider {provider}: permission denied",
                local_path.display()
            );
            Ok(Outcome::UploadForbidden)
        }
        Err(e) => Err(e),
    }
}
