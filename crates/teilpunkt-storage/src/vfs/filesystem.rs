//! The directory tree of one storage endpoint.
//!
//! Directories live in an arena keyed by their [`FileId`]; each node stores
//! its parent's id, so ancestor walks never follow pointers into freed
//! memory. Every node has its own lock.
//!
//! Lock order: operations spanning several directories lock from the
//! target directory upwards (child before parent, ending at the root) and
//! hold all guards until they are done. Nothing locks downwards while
//! holding a lock. The arena lock is a leaf: it may be taken while holding
//! directory locks, but no directory lock is ever acquired while the arena
//! lock is held.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use teilpunkt_types::{EndpointId, FileId, UserId};
use tracing::debug;

use super::directory::{ChildDir, VirtualDirectory, dir_entry};
use super::error::{VfsError, VfsResult, consistency_fault};
use super::file::VirtualFile;
use super::types::{
    DEFAULT_NAME_MAX_LEN, DirectoryCreationInfo, DirectoryEntry, DirectoryLimits, DirectoryStats,
    DirectorySummary, FileCreationInfo, validate_name,
};

struct DirNode {
    id: FileId,
    /// Fixed at creation; directories never move.
    parent: Option<FileId>,
    inner: Mutex<VirtualDirectory>,
}

type DirGuard<'a> = MutexGuard<'a, VirtualDirectory>;

/// Owns the root directory of one endpoint and everything below it.
pub struct VirtualFilesystem {
    endpoint: EndpointId,
    root: Arc<DirNode>,
    name_max_len: usize,
    next_uid: AtomicU32,
    nodes: RwLock<HashMap<FileId, Arc<DirNode>>>,
    /// file -> containing directory. A hint, validated on every use.
    locations: DashMap<FileId, FileId>,
}

impl std::fmt::Debug for VirtualFilesystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualFilesystem")
            .field("endpoint", &self.endpoint)
            .field("root", &self.root.id)
            .finish_non_exhaustive()
    }
}

impl VirtualFilesystem {
    /// Create a tree whose root is described by `root`.
    pub fn new(endpoint: EndpointId, root: &DirectoryCreationInfo) -> Self {
        Self::with_name_max_len(endpoint, root, DEFAULT_NAME_MAX_LEN)
    }

    pub fn with_name_max_len(
        endpoint: EndpointId,
        root: &DirectoryCreationInfo,
        name_max_len: usize,
    ) -> Self {
        let root_id = FileId::directory(endpoint, 1);
        let root = Arc::new(DirNode {
            id: root_id,
            parent: None,
            inner: Mutex::new(VirtualDirectory::new(root_id, None, root)),
        });
        let mut nodes = HashMap::new();
        nodes.insert(root_id, Arc::clone(&root));

        Self {
            endpoint,
            root,
            name_max_len,
            next_uid: AtomicU32::new(2),
            nodes: RwLock::new(nodes),
            locations: DashMap::new(),
        }
    }

    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    pub fn name_max_len(&self) -> usize {
        self.name_max_len
    }

    pub fn root(&self) -> DirectoryRef<'_> {
        DirectoryRef {
            fs: self,
            node: Arc::clone(&self.root),
        }
    }

    /// Number of live directories, root included.
    pub fn dir_count(&self) -> usize {
        self.nodes.read().len()
    }

    /// Find a directory anywhere in the tree.
    pub fn get_dir(&self, id: FileId) -> Option<DirectoryRef<'_>> {
        if !id.is_directory() || id.endpoint() != self.endpoint {
            return None;
        }
        let node = self.node(id)?;
        if node.inner.lock().detached {
            return None;
        }
        Some(DirectoryRef { fs: self, node })
    }

    /// Find the directory that directly contains `file`.
    ///
    /// Consults the location cache first and falls back to a breadth-first
    /// search from the root.
    pub fn get_file_dir(&self, file: FileId) -> Option<DirectoryRef<'_>> {
        if !file.is_file() || file.endpoint() != self.endpoint {
            return None;
        }

        let cached = self.locations.get(&file).map(|entry| *entry.value());
        if let Some(dir) = cached {
            if let Some(node) = self.node(dir) {
                let hit = {
                    let guard = node.inner.lock();
                    !guard.detached && guard.find_file(file).is_some()
                };
                if hit {
                    return Some(DirectoryRef { fs: self, node });
                }
            }
            self.locations.remove(&file);
        }

        let mut queue = VecDeque::from([Arc::clone(&self.root)]);
        while let Some(node) = queue.pop_front() {
            let children: Vec<FileId> = {
                let guard = node.inner.lock();
                if guard.detached {
                    continue;
                }
                if guard.find_file(file).is_some() {
                    drop(guard);
                    self.locations.insert(file, node.id);
                    return Some(DirectoryRef { fs: self, node });
                }
                guard.dirs.iter().map(|child| child.id).collect()
            };
            queue.extend(children.into_iter().filter_map(|id| self.node(id)));
        }
        None
    }

    /// Snapshot of a file anywhere in the tree.
    pub fn get_file(&self, file: FileId) -> Option<VirtualFile> {
        self.get_file_dir(file)?.find_file(file)
    }

    fn node(&self, id: FileId) -> Option<Arc<DirNode>> {
        self.nodes.read().get(&id).cloned()
    }

    fn allocate_uid(&self) -> u32 {
        let uid = self.next_uid.fetch_add(1, Ordering::Relaxed);
        if uid == u32::MAX {
            consistency_fault(self.root.id, "file id space exhausted");
        }
        uid
    }

    /// `start` followed by its ancestors up to the root.
    fn chain(&self, start: &Arc<DirNode>) -> VfsResult<Vec<Arc<DirNode>>> {
        let nodes = self.nodes.read();
        let mut chain = vec![Arc::clone(start)];
        let mut parent = start.parent;
        while let Some(id) = parent {
            let node = nodes.get(&id).ok_or(VfsError::dir_not_found(start.id))?;
            parent = node.parent;
            chain.push(Arc::clone(node));
        }
        Ok(chain)
    }
}

/// Lock every node of `chain` in order, failing if any was cut out of the tree.
fn lock_chain(chain: &[Arc<DirNode>]) -> VfsResult<Vec<DirGuard<'_>>> {
    let mut guards = Vec::with_capacity(chain.len());
    for node in chain {
        let guard = node.inner.lock();
        if guard.detached {
            return Err(VfsError::dir_not_found(chain[0].id));
        }
        guards.push(guard);
    }
    Ok(guards)
}

/// Every directory in `guards` must accept `delta` more bytes.
fn check_growth(guards: &[DirGuard<'_>], delta: u64) -> VfsResult<()> {
    match guards.iter().find(|dir| !dir.fits(delta)) {
        Some(dir) => Err(VfsError::QuotaExceeded {
            dir: dir.id,
            requested: delta,
            available: dir.remaining(),
        }),
        None => Ok(()),
    }
}

fn check_writable(dir: &VirtualDirectory) -> VfsResult<()> {
    if dir.limits.is_read_only {
        return Err(VfsError::ReadOnly(dir.id));
    }
    Ok(())
}

// ============================================================================
// DirectoryRef
// ============================================================================

/// Handle to one directory of a [`VirtualFilesystem`].
///
/// All directory-scoped operations go through this handle. A handle to a
/// directory that has since been deleted stays safe to use; operations on
/// it fail with [`VfsError::DirNotFound`].
#[derive(Clone)]
pub struct DirectoryRef<'a> {
    fs: &'a VirtualFilesystem,
    node: Arc<DirNode>,
}

impl std::fmt::Debug for DirectoryRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DirectoryRef").field(&self.node.id).finish()
    }
}

impl<'a> DirectoryRef<'a> {
    pub fn id(&self) -> FileId {
        self.node.id
    }

    pub fn parent(&self) -> Option<FileId> {
        self.node.parent
    }

    pub fn is_root(&self) -> bool {
        self.node.parent.is_none()
    }

    pub fn name(&self) -> String {
        self.node.inner.lock().name().to_string()
    }

    pub fn limits(&self) -> DirectoryLimits {
        self.node.inner.lock().limits()
    }

    pub fn stats(&self) -> DirectoryStats {
        self.node.inner.lock().stats().clone()
    }

    pub fn summary(&self) -> DirectorySummary {
        let mut dir = self.node.inner.lock();
        dir.stats.base.touch_access();
        dir.summary()
    }

    // ── Local lookups ────────────────────────────────────────────────────────

    /// Snapshot of a direct child file.
    pub fn find_file(&self, file: FileId) -> Option<VirtualFile> {
        self.node.inner.lock().find_file(file).cloned()
    }

    /// A direct subdirectory.
    pub fn find_dir(&self, dir: FileId) -> Option<DirectoryRef<'a>> {
        let is_child = self.node.inner.lock().find_dir(dir).is_some();
        if is_child { self.fs.get_dir(dir) } else { None }
    }

    pub fn file_exists(&self, name: &str) -> bool {
        self.node.inner.lock().file_exists(name)
    }

    pub fn dir_exists(&self, name: &str) -> bool {
        self.node.inner.lock().dir_exists(name)
    }

    // ── Files ────────────────────────────────────────────────────────────────

    /// Add a file and account its initial size up to the root.
    pub fn file_add(&self, creation: &FileCreationInfo) -> VfsResult<FileId> {
        validate_name(&creation.name, self.fs.name_max_len)?;

        let chain = self.fs.chain(&self.node)?;
        let mut guards = lock_chain(&chain)?;
        check_writable(&guards[0])?;
        if guards[0].file_exists(&creation.name) {
            return Err(VfsError::name_exists(&creation.name));
        }
        check_growth(&guards, creation.size)?;

        let id = FileId::file(self.fs.endpoint, self.fs.allocate_uid());
        let (dir, ancestors) = guards.split_at_mut(1);
        let dir = &mut dir[0];
        dir.files.push(VirtualFile::new(id, creation));
        dir.grow_own(creation.size);
        dir.stats.base.touch_modify();
        for ancestor in ancestors {
            ancestor.grow_sub(creation.size);
            ancestor.stats.subdir_file_count += 1;
        }
        drop(guards);

        self.fs.locations.insert(id, self.node.id);
        debug!(
            dir = %self.node.id,
            file = %id,
            name = %creation.name,
            size = creation.size,
            "file added"
        );
        Ok(id)
    }

    /// Set a file's size, checking the quota of every ancestor first.
    ///
    /// Either every directory up to the root is updated, or none is.
    pub fn file_change_size(&self, file: FileId, new_size: u64) -> VfsResult<()> {
        let chain = self.fs.chain(&self.node)?;
        let mut guards = lock_chain(&chain)?;
        check_writable(&guards[0])?;
        let old_size = guards[0]
            .find_file(file)
            .map(VirtualFile::size)
            .ok_or(VfsError::file_not_found(file))?;

        if new_size > old_size {
            check_growth(&guards, new_size - old_size)?;
        }

        let (dir, ancestors) = guards.split_at_mut(1);
        let dir = &mut dir[0];
        if new_size >= old_size {
            let delta = new_size - old_size;
            dir.grow_own(delta);
            ancestors.iter_mut().for_each(|a| a.grow_sub(delta));
        } else {
            let delta = old_size - new_size;
            if !ancestors.iter().all(|a| a.can_shrink(0, delta)) || !dir.can_shrink(delta, 0) {
                consistency_fault(dir.id, "size change would underflow an ancestor");
            }
            dir.shrink_own(delta);
            ancestors.iter_mut().for_each(|a| a.shrink_sub(delta));
        }

        dir.stats.base.touch_modify();
        if let Some(f) = dir.find_file_mut(file) {
            f.stats.size = new_size;
            f.stats.touch_modify();
        }
        debug!(dir = %self.node.id, file = %file, old_size, new_size, "file size changed");
        Ok(())
    }

    /// Remove a direct child file, discounting its size up to the root.
    pub fn file_delete(&self, file: FileId) -> VfsResult<VirtualFile> {
        let chain = self.fs.chain(&self.node)?;
        let mut guards = lock_chain(&chain)?;
        check_writable(&guards[0])?;
        let pos = guards[0]
            .files
            .iter()
            .position(|f| f.id == file)
            .ok_or(VfsError::file_not_found(file))?;

        let (dir, ancestors) = guards.split_at_mut(1);
        let dir = &mut dir[0];
        let removed = dir.files.remove(pos);
        dir.shrink_own(removed.size());
        dir.stats.base.touch_modify();
        for ancestor in ancestors {
            ancestor.shrink_sub(removed.size());
            ancestor.drop_sub_counts(1, 0);
        }
        drop(guards);

        self.fs.locations.remove(&file);
        debug!(dir = %self.node.id, file = %file, size = removed.size(), "file deleted");
        Ok(removed)
    }

    /// Remove every direct child file. Returns the removed ids.
    pub fn file_delete_all(&self) -> VfsResult<Vec<FileId>> {
        let chain = self.fs.chain(&self.node)?;
        let mut guards = lock_chain(&chain)?;
        check_writable(&guards[0])?;

        let (dir, ancestors) = guards.split_at_mut(1);
        let dir = &mut dir[0];
        let removed: Vec<VirtualFile> = dir.files.drain(..).collect();
        let bytes: u64 = removed.iter().map(VirtualFile::size).sum();
        let count = removed.len() as u32;
        dir.shrink_own(bytes);
        dir.stats.base.touch_modify();
        for ancestor in ancestors {
            ancestor.shrink_sub(bytes);
            ancestor.drop_sub_counts(count, 0);
        }
        drop(guards);

        let ids: Vec<FileId> = removed.iter().map(VirtualFile::id).collect();
        for id in &ids {
            self.fs.locations.remove(id);
        }
        debug!(dir = %self.node.id, count, bytes, "all files deleted");
        Ok(ids)
    }

    /// Rename a direct child file.
    pub fn file_rename(&self, file: FileId, name: &str) -> VfsResult<()> {
        validate_name(name, self.fs.name_max_len)?;

        let mut dir = self.node.inner.lock();
        if dir.detached {
            return Err(VfsError::dir_not_found(self.node.id));
        }
        check_writable(&dir)?;
        let current = dir
            .find_file(file)
            .map(|f| f.name().to_string())
            .ok_or(VfsError::file_not_found(file))?;
        if current == name {
            return Ok(());
        }
        if dir.file_exists(name) {
            return Err(VfsError::name_exists(name));
        }

        if let Some(f) = dir.find_file_mut(file) {
            f.rename(name);
        }
        dir.stats.base.touch_modify();
        debug!(dir = %self.node.id, file = %file, from = %current, to = %name, "file renamed");
        Ok(())
    }

    /// Record a read or metadata access on a direct child file.
    pub fn file_touch(&self, file: FileId) -> VfsResult<VirtualFile> {
        let mut dir = self.node.inner.lock();
        let f = dir.find_file_mut(file).ok_or(VfsError::file_not_found(file))?;
        f.stats.touch_access();
        Ok(f.clone())
    }

    /// Turn rename history on or off for a direct child file.
    pub fn set_file_history(&self, file: FileId, enabled: bool) -> VfsResult<()> {
        let mut dir = self.node.inner.lock();
        let f = dir.find_file_mut(file).ok_or(VfsError::file_not_found(file))?;
        f.history.enabled = enabled;
        Ok(())
    }

    /// Would `bytes` more fit into this directory and all of its ancestors?
    pub fn can_fit(&self, bytes: u64) -> bool {
        let Ok(chain) = self.fs.chain(&self.node) else {
            return false;
        };
        match lock_chain(&chain) {
            Ok(guards) => check_growth(&guards, bytes).is_ok(),
            Err(_) => false,
        }
    }

    // ── Directories ──────────────────────────────────────────────────────────

    /// Add a subdirectory.
    ///
    /// Its limit must be strictly below this directory's remaining capacity.
    pub fn dir_add(&self, creation: &DirectoryCreationInfo) -> VfsResult<FileId> {
        validate_name(&creation.name, self.fs.name_max_len)?;

        let chain = self.fs.chain(&self.node)?;
        let mut guards = lock_chain(&chain)?;
        check_writable(&guards[0])?;
        if guards[0].dir_exists(&creation.name) {
            return Err(VfsError::name_exists(&creation.name));
        }
        let available = guards[0].remaining();
        if creation.size_limit >= available {
            return Err(VfsError::LimitTooLarge {
                requested: creation.size_limit,
                available,
            });
        }

        let id = FileId::directory(self.fs.endpoint, self.fs.allocate_uid());
        let node = Arc::new(DirNode {
            id,
            parent: Some(self.node.id),
            inner: Mutex::new(VirtualDirectory::new(id, Some(self.node.id), creation)),
        });
        self.fs.nodes.write().insert(id, node);

        let (dir, ancestors) = guards.split_at_mut(1);
        let dir = &mut dir[0];
        dir.dirs.push(ChildDir {
            id,
            name: creation.name.clone(),
        });
        dir.stats.base.touch_modify();
        for ancestor in ancestors {
            ancestor.stats.subdir_dir_count += 1;
        }
        drop(guards);

        debug!(
            dir = %self.node.id,
            child = %id,
            name = %creation.name,
            limit = creation.size_limit,
            "directory added"
        );
        Ok(id)
    }

    /// Remove a direct subdirectory and everything below it.
    ///
    /// Returns the ids of all files that were removed, so their backing
    /// objects can be deleted.
    pub fn dir_delete(&self, dir: FileId) -> VfsResult<Vec<FileId>> {
        let child = self.fs.node(dir).ok_or(VfsError::dir_not_found(dir))?;
        if child.parent != Some(self.node.id) {
            return Err(VfsError::dir_not_found(dir));
        }

        let mut chain = vec![Arc::clone(&child)];
        chain.extend(self.fs.chain(&self.node)?);
        let mut guards = lock_chain(&chain).map_err(|_| VfsError::dir_not_found(dir))?;
        check_writable(&guards[1])?;
        if guards[1].find_dir(dir).is_none() {
            return Err(VfsError::dir_not_found(dir));
        }

        let (head, ancestors) = guards.split_at_mut(2);
        let [sub, parent] = head else {
            consistency_fault(dir, "directory chain shorter than two");
        };
        let bytes = sub.stats.total_size();
        let files = sub.total_files();
        let dirs = sub.total_dirs();

        parent.shrink_sub(bytes);
        parent.drop_sub_counts(files, dirs);
        parent.dirs.retain(|c| c.id != dir);
        parent.stats.base.touch_modify();
        for ancestor in ancestors {
            ancestor.shrink_sub(bytes);
            ancestor.drop_sub_counts(files, dirs + 1);
        }

        sub.detached = true;
        let mut removed: Vec<FileId> = sub.files.iter().map(VirtualFile::id).collect();
        let mut queue: VecDeque<FileId> = sub.dirs.iter().map(|c| c.id).collect();
        drop(guards);

        self.fs.nodes.write().remove(&dir);
        while let Some(id) = queue.pop_front() {
            let node = self.fs.nodes.write().remove(&id);
            if let Some(node) = node {
                let mut inner = node.inner.lock();
                inner.detached = true;
                removed.extend(inner.files.iter().map(VirtualFile::id));
                queue.extend(inner.dirs.iter().map(|c| c.id));
            }
        }
        for id in &removed {
            self.fs.locations.remove(id);
        }

        debug!(
            dir = %self.node.id,
            child = %dir,
            bytes,
            files = removed.len(),
            "directory deleted"
        );
        Ok(removed)
    }

    /// Rename this directory. Names stay unique among its siblings.
    pub fn rename(&self, name: &str) -> VfsResult<()> {
        validate_name(name, self.fs.name_max_len)?;

        let Some(parent_id) = self.node.parent else {
            let mut dir = self.node.inner.lock();
            dir.rename(name);
            return Ok(());
        };
        let parent = self.fs.node(parent_id).ok_or(VfsError::dir_not_found(self.node.id))?;
        let chain = [Arc::clone(&self.node), parent];
        let mut guards = lock_chain(&chain)?;
        check_writable(&guards[1])?;

        if guards[0].name() == name {
            return Ok(());
        }
        if guards[1].dir_exists(name) {
            return Err(VfsError::name_exists(name));
        }

        guards[0].rename(name);
        let id = self.node.id;
        if let Some(entry) = guards[1].dirs.iter_mut().find(|c| c.id == id) {
            entry.name = name.to_string();
        }
        debug!(dir = %id, name = %name, "directory renamed");
        Ok(())
    }

    /// Append the direct children of this directory to `out`.
    ///
    /// Display names are resolved through `resolve` after the directory
    /// lock has been released.
    pub fn collect_entries(
        &self,
        resolve: &dyn Fn(UserId) -> String,
        out: &mut Vec<DirectoryEntry>,
    ) {
        let (files, children) = {
            let mut dir = self.node.inner.lock();
            if dir.detached {
                return;
            }
            dir.stats.base.touch_access();
            let children: Vec<FileId> = dir.dirs.iter().map(|c| c.id).collect();
            (dir.files.clone(), children)
        };

        out.extend(files.iter().map(|f| f.to_entry(resolve)));
        for id in children {
            let Some(node) = self.fs.node(id) else {
                continue;
            };
            let (info, stats) = {
                let dir = node.inner.lock();
                if dir.detached {
                    continue;
                }
                (dir.info.base.clone(), dir.stats.clone())
            };
            out.push(dir_entry(id, &info, &stats, resolve));
        }
    }
}
