//! Virtual filesystem: the in-memory metadata tree of one endpoint.
//!
//! The tree knows names, ownership, timestamps, sizes and quotas. It knows
//! nothing about the bytes behind a file; those live in a
//! [`DataStore`](crate::datastore::DataStore) keyed by the file's uid.
//!
//! # Quotas
//!
//! Every directory carries a size limit. A directory's own size is the sum
//! of its direct files; `sub_dir_file_size` is the sum of everything in its
//! subdirectories. After every operation, for every directory,
//! `size + sub_dir_file_size <= size_limit`.
//!
//! # Example
//!
//! ```
//! use teilpunkt_storage::vfs::{DirectoryCreationInfo, FileCreationInfo, VirtualFilesystem};
//! use teilpunkt_types::{EndpointId, UserId};
//!
//! let user = UserId::new(1);
//! let root = DirectoryCreationInfo::new("home", user, 1000);
//! let fs = VirtualFilesystem::new(EndpointId::new(0), &root);
//! let id = fs.root().file_add(&FileCreationInfo::new("a.txt", user).with_size(500)).unwrap();
//! assert_eq!(fs.get_file(id).unwrap().size(), 500);
//! assert!(fs.root().file_add(&FileCreationInfo::new("b.txt", user).with_size(600)).is_err());
//! ```

mod directory;
mod error;
mod file;
mod filesystem;
mod types;

pub use directory::VirtualDirectory;
pub use error::{VfsError, VfsResult};
pub use file::VirtualFile;
pub use filesystem::{DirectoryRef, VirtualFilesystem};
pub use types::{
    DEFAULT_NAME_MAX_LEN, DirectoryCreationInfo, DirectoryEntry, DirectoryInfo, DirectoryLimits,
    DirectoryStats, DirectorySummary, EntryKind, FileCreationInfo, FileHistory, FileInfo,
    FileStats, unix_secs, validate_name,
};

pub(crate) use error::consistency_fault;
