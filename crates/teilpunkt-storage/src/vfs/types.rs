//! Core VFS types.
//!
//! Metadata records for files and directories plus the presentation
//! records handed to the protocol layer. Timestamps are kept as
//! `SystemTime` internally and exported as unix seconds.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use teilpunkt_types::{FileId, UserId};

use super::error::{VfsError, VfsResult};

/// Default maximum name length in bytes.
pub const DEFAULT_NAME_MAX_LEN: usize = 56;

/// Provided when adding a file to a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCreationInfo {
    pub name: String,
    pub creator: UserId,
    /// Initial accounted size in bytes.
    pub size: u64,
}

impl FileCreationInfo {
    /// An empty file owned by `creator`.
    pub fn new(name: impl Into<String>, creator: UserId) -> Self {
        Self {
            name: name.into(),
            creator,
            size: 0,
        }
    }

    /// Set the initial size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }
}

/// Provided when adding a subdirectory (or creating an endpoint root).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryCreationInfo {
    pub name: String,
    pub creator: UserId,
    /// Quota for everything below this directory, in bytes.
    pub size_limit: u64,
    pub read_only: bool,
}

impl DirectoryCreationInfo {
    pub fn new(name: impl Into<String>, creator: UserId, size_limit: u64) -> Self {
        Self {
            name: name.into(),
            creator,
            size_limit,
            read_only: false,
        }
    }

    /// Mark the directory read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Immutable identity of an entry (the name changes only through rename).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub creator: UserId,
    pub owner: UserId,
}

/// Usage statistics, mutated on every access and write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStats {
    pub created: SystemTime,
    pub modified: SystemTime,
    pub accessed: SystemTime,
    pub modification_count: u32,
    pub access_count: u32,
    /// Size in bytes. For a directory: sum of its direct files only.
    pub size: u64,
}

impl FileStats {
    pub fn new(size: u64) -> Self {
        let now = SystemTime::now();
        Self {
            created: now,
            modified: now,
            accessed: now,
            modification_count: 0,
            access_count: 0,
            size,
        }
    }

    /// Record a read or metadata access.
    pub fn touch_access(&mut self) {
        self.accessed = SystemTime::now();
        self.access_count = self.access_count.wrapping_add(1);
    }

    /// Record a modification.
    pub fn touch_modify(&mut self) {
        self.modified = SystemTime::now();
        self.modification_count = self.modification_count.wrapping_add(1);
    }
}

/// Rename history of a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHistory {
    pub past_names: Option<Vec<String>>,
    pub enabled: bool,
}

impl FileHistory {
    /// Remember `name` if history tracking is enabled.
    pub fn record_name(&mut self, name: &str) {
        if self.enabled {
            self.past_names
                .get_or_insert_with(Vec::new)
                .push(name.to_string());
        }
    }
}

/// Identity of a directory plus its place in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryInfo {
    pub base: FileInfo,
    /// `None` only for the endpoint root.
    pub parent: Option<FileId>,
}

/// Directory statistics including everything accounted below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryStats {
    pub base: FileStats,
    /// Bytes of all files in all subdirectories (recursively).
    pub sub_dir_file_size: u64,
    /// Files contained in all subdirectories (recursively).
    pub subdir_file_count: u32,
    /// Directories contained in all subdirectories (recursively).
    pub subdir_dir_count: u32,
}

impl DirectoryStats {
    pub fn new() -> Self {
        Self {
            base: FileStats::new(0),
            sub_dir_file_size: 0,
            subdir_file_count: 0,
            subdir_dir_count: 0,
        }
    }

    /// Everything accounted against this directory's quota.
    pub fn total_size(&self) -> u64 {
        self.base.size + self.sub_dir_file_size
    }
}

impl Default for DirectoryStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryLimits {
    pub size_limit: u64,
    pub is_read_only: bool,
}

/// Entry kind in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One row of a directory listing, or the metadata of a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub id: FileId,
    pub kind: EntryKind,
    /// Display name of the creator.
    pub creator: String,
    /// Display name of the owner.
    pub owner: String,
    /// Unix seconds.
    pub created: u64,
    pub modified: u64,
    pub accessed: u64,
    /// Bytes. For directories: everything accounted below it.
    pub size: u64,
}

/// Summary of a directory (and of an endpoint, via its root).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySummary {
    pub name: String,
    pub id: FileId,
    pub size_limit: u64,
    pub size_used: u64,
    pub file_count: u32,
    pub dir_count: u32,
    pub total_file_count: u32,
    pub total_dir_count: u32,
    pub read_only: bool,
}

/// Unix seconds, clamped to zero for pre-epoch times.
pub fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Check an entry name.
///
/// Names are case-sensitive, non-empty, at most `max_len` bytes, and must
/// not contain `/` or NUL or be `.` / `..`.
pub fn validate_name(name: &str, max_len: usize) -> VfsResult<()> {
    if name.is_empty()
        || name.len() > max_len
        || name == "."
        || name == ".."
        || name.contains(['/', '\0'])
    {
        return Err(VfsError::invalid_name(name));
    }
    Ok(())
}
