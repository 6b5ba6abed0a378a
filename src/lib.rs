//! cloud-storage-backups: push one backup file to a cloud storage bucket unless an object
//! already exists at the remote path.
//!
//! - [`load_config`]: the INI configuration naming credentials and bucket per provider
//! - [`logging`]: console and size-rotated file sinks
//! - [`upload`]: the [`upload::BackupStore`] capability and the Google Cloud Storage provider
//! - [`backup`]: check-then-upload and the run [`Outcome`]
//! - [`cli`]: argument parsing and the run itself

pub mod backup;
pub mod cli;
pub mod load_config;
pub mod logging;
pub mod upload;

pub use backup::Outcome;
pub use cli::{run, Cli};
