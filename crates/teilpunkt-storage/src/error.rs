//! Engine-level errors.
//!
//! [`StorageError`] is the closed set of expected failures of endpoint and
//! registry operations. Each maps onto exactly one [`StorageStatus`].

use teilpunkt_types::StorageStatus;
use thiserror::Error;

use crate::vfs::VfsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum StorageError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("no such file")]
    NoSuchFile,

    #[error("no such directory")]
    NoSuchDir,

    #[error("no such storage endpoint")]
    NoSuchEndpoint,

    #[error("invalid name")]
    InvalidName,

    #[error("name already exists")]
    NameExists,

    #[error("quota exceeded")]
    QuotaExceeded,

    /// Resource exhausted or in use; retry after backoff.
    #[error("busy")]
    Busy,

    #[error("operation failed")]
    Unsuccessful,
}

impl StorageError {
    pub fn status(&self) -> StorageStatus {
        match self {
            StorageError::PermissionDenied => StorageStatus::ErrNoUacPerm,
            StorageError::NoSuchFile => StorageStatus::ErrNoSuchFile,
            StorageError::NoSuchDir => StorageStatus::ErrNoSuchDir,
            StorageError::NoSuchEndpoint => StorageStatus::ErrNoSuchEndpoint,
            StorageError::InvalidName => StorageStatus::ErrInvalidFileName,
            StorageError::NameExists => StorageStatus::ErrNoUniqueName,
            StorageError::QuotaExceeded => StorageStatus::ErrQuotaExceeded,
            StorageError::Busy => StorageStatus::ErrBusy,
            StorageError::Unsuccessful => StorageStatus::ErrUnsuccessful,
        }
    }
}

impl From<StorageError> for StorageStatus {
    fn from(err: StorageError) -> Self {
        err.status()
    }
}

impl From<VfsError> for StorageError {
    fn from(err: VfsError) -> Self {
        match err {
            VfsError::FileNotFound(_) => StorageError::NoSuchFile,
            VfsError::DirNotFound(_) => StorageError::NoSuchDir,
            VfsError::NameExists(_) => StorageError::NameExists,
            VfsError::InvalidName(_) => StorageError::InvalidName,
            VfsError::QuotaExceeded { .. } | VfsError::LimitTooLarge { .. } => {
                StorageError::QuotaExceeded
            }
            VfsError::ReadOnly(_) => StorageError::PermissionDenied,
            VfsError::RootNotRemovable => StorageError::Unsuccessful,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Status of a finished operation.
pub trait ResultStatus {
    fn status(&self) -> StorageStatus;
}

impl<T> ResultStatus for StorageResult<T> {
    fn status(&self) -> StorageStatus {
        match self {
            Ok(_) => StorageStatus::Ok,
            Err(err) => err.status(),
        }
    }
}
