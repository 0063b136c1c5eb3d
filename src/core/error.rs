use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InventoryError {
    /// Platform disk enumeration failed. The previous snapshot is kept.
    #[error("drive enumeration failed: {0}")]
    Enumeration(#[source] anyhow::Error),

    #[error("mount table query failed for {device}: {source}")]
    MountResolution {
        device: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("inventory task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors that abort the remainder of a device run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{op} failed for {}: {source}", path.display())]
    ChecksumOrCopy {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to record ingestion action: {0}")]
    Registry(#[source] anyhow::Error),
}

impl IngestError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::ChecksumOrCopy {
            op,
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("device {0} is not connected")]
    DeviceNotConnected(String),

    #[error("device {0} is already registered")]
    AlreadyRegistered(String),

    #[error(transparent)]
    Registry(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum BrowseError {
    #[error("device {0} is not connected")]
    DeviceNotConnected(String),

    #[error("device {0} has no usable mount point")]
    NoMountPoints(String),

    #[error("failed to list {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
