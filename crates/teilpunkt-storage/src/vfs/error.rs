//! VFS error types.

use teilpunkt_types::FileId;
use thiserror::Error;

/// VFS error type.
///
/// Every variant is a policy rejection: the tree is left unchanged when one
/// is returned. Internal inconsistencies are not represented here, they go
/// through [`consistency_fault`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VfsError {
    /// File not found (or not a child of the given directory).
    #[error("no such file: {0}")]
    FileNotFound(FileId),

    /// Directory not found, or detached from the tree.
    #[error("no such directory: {0}")]
    DirNotFound(FileId),

    /// A sibling of the same kind already has this name.
    #[error("name already exists: {0}")]
    NameExists(String),

    /// Name is empty, too long, or contains forbidden characters.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// The change does not fit into the quota of `dir`.
    #[error("quota exceeded in {dir}: {requested} bytes requested, {available} available")]
    QuotaExceeded {
        dir: FileId,
        requested: u64,
        available: u64,
    },

    /// A new directory's limit must be strictly below the parent's remaining capacity.
    #[error("directory limit {requested} not below remaining capacity {available}")]
    LimitTooLarge { requested: u64, available: u64 },

    /// Directory is read-only.
    #[error("directory is read-only: {0}")]
    ReadOnly(FileId),

    /// The endpoint root can't be removed through the tree.
    #[error("the root directory cannot be removed")]
    RootNotRemovable,
}

impl VfsError {
    /// Create a FileNotFound error.
    pub fn file_not_found(id: FileId) -> Self {
        Self::FileNotFound(id)
    }

    /// Create a DirNotFound error.
    pub fn dir_not_found(id: FileId) -> Self {
        Self::DirNotFound(id)
    }

    /// Create a NameExists error.
    pub fn name_exists(name: impl Into<String>) -> Self {
        Self::NameExists(name.into())
    }

    /// Create an InvalidName error.
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName(name.into())
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

/// Abort on broken bookkeeping.
///
/// Reaching this means lock discipline or transaction bookkeeping is wrong;
/// continuing would silently corrupt quota accounting above `id`. Also
/// used for operations on invalid or closed datastore handles.
#[cold]
#[track_caller]
pub(crate) fn consistency_fault(id: FileId, what: &str) -> ! {
    tracing::error!(id = %id, "internal consistency fault: {}", what);
    panic!("internal consistency fault at {id}: {what}");
}
