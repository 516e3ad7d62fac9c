//! A single file entry in the virtual tree.

use teilpunkt_types::{FileId, UserId};

use super::types::{
    DirectoryEntry, EntryKind, FileCreationInfo, FileHistory, FileInfo, FileStats, unix_secs,
};

/// Metadata of one file. Owned by the directory that contains it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFile {
    pub(crate) id: FileId,
    pub(crate) info: FileInfo,
    pub(crate) stats: FileStats,
    pub(crate) history: FileHistory,
}

impl VirtualFile {
    pub(crate) fn new(id: FileId, creation: &FileCreationInfo) -> Self {
        Self {
            id,
            info: FileInfo {
                name: creation.name.clone(),
                creator: creation.creator,
                owner: creation.creator,
            },
            stats: FileStats::new(creation.size),
            history: FileHistory::default(),
        }
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn size(&self) -> u64 {
        self.stats.size
    }

    pub fn owner(&self) -> UserId {
        self.info.owner
    }

    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    pub fn stats(&self) -> &FileStats {
        &self.stats
    }

    pub fn history(&self) -> &FileHistory {
        &self.history
    }

    /// Change the name, remembering the old one when history is enabled.
    pub(crate) fn rename(&mut self, name: &str) {
        let old = std::mem::replace(&mut self.info.name, name.to_string());
        self.history.record_name(&old);
        self.stats.touch_modify();
    }

    /// Listing record; display names come from `resolve`.
    pub(crate) fn to_entry(&self, resolve: &dyn Fn(UserId) -> String) -> DirectoryEntry {
        DirectoryEntry {
            name: self.info.name.clone(),
            id: self.id,
            kind: EntryKind::File,
            creator: resolve(self.info.creator),
            owner: resolve(self.info.owner),
            created: unix_secs(self.stats.created),
            modified: unix_secs(self.stats.modified),
            accessed: unix_secs(self.stats.accessed),
            size: self.stats.size,
        }
    }
}
