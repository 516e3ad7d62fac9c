//! Directory node data.
//!
//! A `VirtualDirectory` holds the files it contains directly and the ids
//! of its subdirectories. Subdirectories live in the filesystem's arena;
//! the parent only caches their names for uniqueness checks. Everything
//! here assumes the caller holds the node's lock.

use teilpunkt_types::{FileId, UserId};

use super::error::consistency_fault;
use super::file::VirtualFile;
use super::types::{
    DirectoryCreationInfo, DirectoryEntry, DirectoryInfo, DirectoryLimits, DirectoryStats,
    DirectorySummary, EntryKind, FileInfo, unix_secs,
};

/// A subdirectory as seen from its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChildDir {
    pub(crate) id: FileId,
    pub(crate) name: String,
}

#[derive(Debug)]
pub struct VirtualDirectory {
    pub(crate) id: FileId,
    pub(crate) info: DirectoryInfo,
    pub(crate) stats: DirectoryStats,
    pub(crate) limits: DirectoryLimits,
    pub(crate) files: Vec<VirtualFile>,
    pub(crate) dirs: Vec<ChildDir>,
    /// Set once the directory has been cut out of the tree.
    pub(crate) detached: bool,
}

impl VirtualDirectory {
    pub(crate) fn new(
        id: FileId,
        parent: Option<FileId>,
        creation: &DirectoryCreationInfo,
    ) -> Self {
        Self {
            id,
            info: DirectoryInfo {
                base: FileInfo {
                    name: creation.name.clone(),
                    creator: creation.creator,
                    owner: creation.creator,
                },
                parent,
            },
            stats: DirectoryStats::new(),
            limits: DirectoryLimits {
                size_limit: creation.size_limit,
                is_read_only: creation.read_only,
            },
            files: Vec::new(),
            dirs: Vec::new(),
            detached: false,
        }
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.info.base.name
    }

    pub fn info(&self) -> &DirectoryInfo {
        &self.info
    }

    pub fn stats(&self) -> &DirectoryStats {
        &self.stats
    }

    pub fn limits(&self) -> DirectoryLimits {
        self.limits
    }

    // ── Local lookups ────────────────────────────────────────────────────────

    pub(crate) fn find_file(&self, id: FileId) -> Option<&VirtualFile> {
        self.files.iter().find(|f| f.id == id)
    }

    pub(crate) fn find_file_mut(&mut self, id: FileId) -> Option<&mut VirtualFile> {
        self.files.iter_mut().find(|f| f.id == id)
    }

    pub(crate) fn find_dir(&self, id: FileId) -> Option<&ChildDir> {
        self.dirs.iter().find(|d| d.id == id)
    }

    pub(crate) fn file_exists(&self, name: &str) -> bool {
        self.files.iter().any(|f| f.info.name == name)
    }

    pub(crate) fn dir_exists(&self, name: &str) -> bool {
        self.dirs.iter().any(|d| d.name == name)
    }

    // ── Accounting ───────────────────────────────────────────────────────────

    /// Bytes still available under this directory's own limit.
    pub(crate) fn remaining(&self) -> u64 {
        self.limits.size_limit.saturating_sub(self.stats.total_size())
    }

    /// Would `delta` more bytes stay within the limit?
    pub(crate) fn fits(&self, delta: u64) -> bool {
        self.stats
            .total_size()
            .checked_add(delta)
            .is_some_and(|total| total <= self.limits.size_limit)
    }

    pub(crate) fn grow_own(&mut self, delta: u64) {
        self.stats.base.size += delta;
    }

    pub(crate) fn shrink_own(&mut self, delta: u64) {
        self.stats.base.size = match self.stats.base.size.checked_sub(delta) {
            Some(size) => size,
            None => consistency_fault(self.id, "directory size underflow"),
        };
    }

    pub(crate) fn grow_sub(&mut self, delta: u64) {
        self.stats.sub_dir_file_size += delta;
    }

    pub(crate) fn shrink_sub(&mut self, delta: u64) {
        self.stats.sub_dir_file_size = match self.stats.sub_dir_file_size.checked_sub(delta) {
            Some(size) => size,
            None => consistency_fault(self.id, "subdirectory size underflow"),
        };
    }

    /// Can `delta` bytes be subtracted from the own size and the subtree size?
    pub(crate) fn can_shrink(&self, own: u64, sub: u64) -> bool {
        self.stats.base.size >= own && self.stats.sub_dir_file_size >= sub
    }

    pub(crate) fn drop_sub_counts(&mut self, files: u32, dirs: u32) {
        match (
            self.stats.subdir_file_count.checked_sub(files),
            self.stats.subdir_dir_count.checked_sub(dirs),
        ) {
            (Some(f), Some(d)) => {
                self.stats.subdir_file_count = f;
                self.stats.subdir_dir_count = d;
            }
            _ => consistency_fault(self.id, "subdirectory counter underflow"),
        }
    }

    /// Files below this directory, recursively.
    pub(crate) fn total_files(&self) -> u32 {
        self.files.len() as u32 + self.stats.subdir_file_count
    }

    /// Directories below this directory, recursively.
    pub(crate) fn total_dirs(&self) -> u32 {
        self.dirs.len() as u32 + self.stats.subdir_dir_count
    }

    // ── Presentation ─────────────────────────────────────────────────────────

    pub(crate) fn rename(&mut self, name: &str) {
        self.info.base.name = name.to_string();
        self.stats.base.touch_modify();
    }

    pub(crate) fn to_entry(&self, resolve: &dyn Fn(UserId) -> String) -> DirectoryEntry {
        dir_entry(self.id, &self.info.base, &self.stats, resolve)
    }

    pub(crate) fn summary(&self) -> DirectorySummary {
        DirectorySummary {
            name: self.info.base.name.clone(),
            id: self.id,
            size_limit: self.limits.size_limit,
            size_used: self.stats.total_size(),
            file_count: self.files.len() as u32,
            dir_count: self.dirs.len() as u32,
            total_file_count: self.total_files(),
            total_dir_count: self.total_dirs(),
            read_only: self.limits.is_read_only,
        }
    }
}

/// Listing record for a directory, built from a snapshot of its metadata.
pub(crate) fn dir_entry(
    id: FileId,
    info: &FileInfo,
    stats: &DirectoryStats,
    resolve: &dyn Fn(UserId) -> String,
) -> DirectoryEntry {
    DirectoryEntry {
        name: info.name.clone(),
        id,
        kind: EntryKind::Directory,
        creator: resolve(info.creator),
        owner: resolve(info.owner),
        created: unix_secs(stats.base.created),
        modified: unix_secs(stats.base.modified),
        accessed: unix_secs(stats.base.accessed),
        size: stats.total_size(),
    }
}
