//! One storage endpoint: a virtual tree plus the datastore behind it.
//!
//! Every public operation runs under the endpoint's operation lock, asks
//! access control for the permission it needs on its target, resolves the
//! target in the tree, does its work and records an event. Data operations
//! hand back a transaction; dropping it undoes whatever it started.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;
use teilpunkt_types::{EndpointId, FileId, Permission, UserId};
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::datastore::{DataStore, LocalFileSystemDatastore, MemoryDatastore};
use crate::error::{ResultStatus, StorageError, StorageResult};
use crate::services::{EventAction, EventContext, Services};
use crate::transaction::{
    ActivityGuard, ActivityTracker, CreateFileTransaction, ReadFileTransaction, ResponseLink,
    SharedBacking, TransactionContext, WriteAudit, WriteFileTransaction,
};
use crate::vfs::{
    DirectoryCreationInfo, DirectoryEntry, DirectoryRef, DirectorySummary, FileCreationInfo,
    VfsError, VirtualFilesystem,
};

/// Which datastore backs an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EndpointKind {
    LocalFileSystem,
    Memory,
}

/// Fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEndpointData {
    pub name: String,
    /// Quota of the root directory in bytes.
    pub max_size: u64,
    pub kind: EndpointKind,
    pub creator: UserId,
    pub endpoint_id: EndpointId,
}

impl StorageEndpointData {
    pub fn new(
        name: impl Into<String>,
        max_size: u64,
        kind: EndpointKind,
        creator: UserId,
    ) -> Self {
        Self {
            name: name.into(),
            max_size,
            kind,
            creator,
            endpoint_id: EndpointId::INVALID,
        }
    }
}

pub struct StorageEndpoint {
    data: StorageEndpointData,
    vfs: Arc<VirtualFilesystem>,
    datastore: Arc<dyn DataStore>,
    local: Option<Arc<LocalFileSystemDatastore>>,
    op_lock: Mutex<()>,
    /// Set once the endpoint is being removed; every operation then fails.
    retired: AtomicBool,
    tracker: Arc<ActivityTracker>,
    services: Services,
    chunk_size: usize,
}

impl std::fmt::Debug for StorageEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEndpoint")
            .field("data", &self.data)
            .field("open", &self.tracker.open_count())
            .finish_non_exhaustive()
    }
}

impl StorageEndpoint {
    /// Build an endpoint; nothing touches the disk until [`materialize`](Self::materialize).
    pub fn new(data: StorageEndpointData, config: &StorageConfig, services: Services) -> Self {
        let root = DirectoryCreationInfo::new(data.name.clone(), data.creator, data.max_size);
        let vfs = Arc::new(VirtualFilesystem::with_name_max_len(
            data.endpoint_id,
            &root,
            config.name_max_len,
        ));
        let (datastore, local) = match data.kind {
            EndpointKind::LocalFileSystem => {
                let local = Arc::new(LocalFileSystemDatastore::new(config, data.endpoint_id));
                (local.clone() as Arc<dyn DataStore>, Some(local))
            }
            EndpointKind::Memory => {
                let memory = Arc::new(MemoryDatastore::new(config.max_readers));
                (memory as Arc<dyn DataStore>, None)
            }
        };
        Self {
            data,
            vfs,
            datastore,
            local,
            op_lock: Mutex::new(()),
            retired: AtomicBool::new(false),
            tracker: ActivityTracker::new(),
            services,
            chunk_size: config.chunk_size,
        }
    }

    pub fn id(&self) -> EndpointId {
        self.data.endpoint_id
    }

    pub fn data(&self) -> &StorageEndpointData {
        &self.data
    }

    pub fn root_id(&self) -> FileId {
        self.vfs.root().id()
    }

    /// Summary of the root directory, i.e. of the whole endpoint.
    pub fn root(&self) -> DirectorySummary {
        self.vfs.root().summary()
    }

    pub fn vfs(&self) -> &Arc<VirtualFilesystem> {
        &self.vfs
    }

    /// Create the on-disk directories of a local endpoint.
    pub fn materialize(&self) -> StorageResult<()> {
        if let Some(local) = &self.local {
            local.materialize().map_err(|e| {
                warn!(endpoint = %self.id(), error = %e, "could not materialize datastore");
                StorageError::Unsuccessful
            })?;
        }
        Ok(())
    }

    /// True when no transaction is open.
    pub fn can_be_removed(&self) -> bool {
        self.tracker.is_idle()
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Refuse every further operation, unless a transaction is still open.
    ///
    /// Returns false, and changes nothing, while the endpoint is busy.
    pub(crate) fn retire(&self) -> bool {
        let _serial = self.op_lock.lock();
        if !self.tracker.is_idle() {
            return false;
        }
        self.retired.store(true, Ordering::Release);
        true
    }

    /// Undo [`retire`](Self::retire) after a removal that did not go through.
    pub(crate) fn reinstate(&self) {
        let _serial = self.op_lock.lock();
        self.retired.store(false, Ordering::Release);
    }

    // ── Files ────────────────────────────────────────────────────────────────

    /// Create an empty file in `dir`.
    #[tracing::instrument(skip(self), name = "storage.file_create")]
    pub fn file_create(&self, actor: UserId, dir: FileId, name: &str) -> StorageResult<FileId> {
        self.run(EventAction::FileCreate, actor, dir, Permission::Create, Some(name), || {
            let (file, _) = self.create_committed(dir, FileCreationInfo::new(name, actor))?;
            Ok(file)
        })
    }

    /// Create a file and open a write on it as one upload.
    ///
    /// Opening records `FileUploadStart`; the transaction records
    /// `FileUpload` with its final status when it commits or is dropped.
    /// Dropping it before commit removes the file again.
    #[tracing::instrument(skip(self), name = "storage.file_upload")]
    pub fn file_upload(
        &self,
        actor: UserId,
        dir: FileId,
        name: &str,
    ) -> StorageResult<WriteFileTransaction> {
        self.run(EventAction::FileUploadStart, actor, dir, Permission::Create, Some(name), || {
            let (file, backing) = self.create_committed(dir, FileCreationInfo::new(name, actor))?;
            let guard = self.tracker.begin_write(file).ok_or(StorageError::Busy)?;
            let mut tx =
                WriteFileTransaction::new(self.context(guard), file, true).with_backing(backing);
            tx.begin()?;
            Ok(tx.with_audit(self.audit(EventAction::FileUpload, actor, file, Some(name))))
        })
    }

    /// Open a write replacing the contents of `file`.
    ///
    /// Recorded like [`file_upload`](Self::file_upload), as `FileWriteStart`
    /// and then `FileWrite`.
    #[tracing::instrument(skip(self), name = "storage.file_write")]
    pub fn file_write(&self, actor: UserId, file: FileId) -> StorageResult<WriteFileTransaction> {
        self.run(EventAction::FileWriteStart, actor, file, Permission::Write, None, || {
            self.file_dir(file)?;
            let guard = self.tracker.begin_write(file).ok_or(StorageError::Busy)?;
            let mut tx = WriteFileTransaction::new(self.context(guard), file, false);
            tx.begin()?;
            Ok(tx.with_audit(self.audit(EventAction::FileWrite, actor, file, None)))
        })
    }

    /// Start streaming `[begin, end)` of `file` into `response`.
    ///
    /// `end == 0` reads to the end. The returned transaction is driven
    /// further through [`ReadFileTransaction::on_writable`].
    #[tracing::instrument(skip(self, response), name = "storage.file_read")]
    pub fn file_read(
        &self,
        actor: UserId,
        file: FileId,
        begin: u64,
        end: u64,
        response: ResponseLink,
    ) -> StorageResult<ReadFileTransaction> {
        self.run(EventAction::FileRead, actor, file, Permission::Read, None, || {
            self.file_dir(file)?;
            let guard = self.tracker.begin_read(file);
            let mut tx = ReadFileTransaction::new(
                self.context(guard),
                file,
                begin,
                end,
                self.chunk_size,
                response,
            );
            tx.start()?;
            Ok(tx)
        })
    }

    /// Remove a file and its backing object.
    #[tracing::instrument(skip(self), name = "storage.file_delete")]
    pub fn file_delete(&self, actor: UserId, file: FileId) -> StorageResult<()> {
        self.run(EventAction::FileDelete, actor, file, Permission::Delete, None, || {
            let dir = self.file_dir(file)?;
            if self.tracker.is_busy(file) {
                return Err(StorageError::Busy);
            }
            dir.file_delete(file)?;
            self.delete_backing(file);
            Ok(())
        })
    }

    #[tracing::instrument(skip(self), name = "storage.file_rename")]
    pub fn file_rename(&self, actor: UserId, file: FileId, name: &str) -> StorageResult<()> {
        self.run(EventAction::FileRename, actor, file, Permission::Write, Some(name), || {
            Ok(self.file_dir(file)?.file_rename(file, name)?)
        })
    }

    /// Metadata of a single file. Counts as an access.
    #[tracing::instrument(skip(self), name = "storage.info_file")]
    pub fn info_file(&self, actor: UserId, file: FileId) -> StorageResult<DirectoryEntry> {
        self.run(EventAction::FileInfo, actor, file, Permission::Read, None, || {
            let touched = self.file_dir(file)?.file_touch(file)?;
            Ok(touched.to_entry(&|user| self.services.users.display_name(user)))
        })
    }

    // ── Directories ──────────────────────────────────────────────────────────

    #[tracing::instrument(skip(self), name = "storage.dir_create")]
    pub fn dir_create(
        &self,
        actor: UserId,
        parent: FileId,
        name: &str,
        size_limit: u64,
    ) -> StorageResult<FileId> {
        self.run(EventAction::DirCreate, actor, parent, Permission::Create, Some(name), || {
            let info = DirectoryCreationInfo::new(name, actor, size_limit);
            Ok(self.dir(parent)?.dir_add(&info)?)
        })
    }

    /// Remove a directory with everything below it, backing objects included.
    #[tracing::instrument(skip(self), name = "storage.dir_delete")]
    pub fn dir_delete(&self, actor: UserId, dir: FileId) -> StorageResult<()> {
        self.run(EventAction::DirDelete, actor, dir, Permission::Delete, None, || {
            let target = self.dir(dir)?;
            let parent = target.parent().ok_or(VfsError::RootNotRemovable)?;
            let removed = self.dir(parent)?.dir_delete(dir)?;
            for file in &removed {
                self.delete_backing(*file);
            }
            info!(endpoint = %self.id(), dir = %dir, files = removed.len(), "directory removed");
            Ok(())
        })
    }

    #[tracing::instrument(skip(self), name = "storage.dir_rename")]
    pub fn dir_rename(&self, actor: UserId, dir: FileId, name: &str) -> StorageResult<()> {
        self.run(EventAction::DirRename, actor, dir, Permission::Write, Some(name), || {
            Ok(self.dir(dir)?.rename(name)?)
        })
    }

    /// Direct children of `dir`.
    #[tracing::instrument(skip(self), name = "storage.dir_get_entries")]
    pub fn dir_get_entries(
        &self,
        actor: UserId,
        dir: FileId,
    ) -> StorageResult<Vec<DirectoryEntry>> {
        self.run(EventAction::DirGetEntries, actor, dir, Permission::Read, None, || {
            let mut entries = Vec::new();
            self.dir(dir)?
                .collect_entries(&|user| self.services.users.display_name(user), &mut entries);
            Ok(entries)
        })
    }

    #[tracing::instrument(skip(self), name = "storage.dir_get_info")]
    pub fn dir_get_info(&self, actor: UserId, dir: FileId) -> StorageResult<DirectorySummary> {
        self.run(EventAction::DirGetInfo, actor, dir, Permission::Read, None, || {
            Ok(self.dir(dir)?.summary())
        })
    }

    // ── Internals ────────────────────────────────────────────────────────────

    /// Serialize, check access, run `op`, record the outcome.
    ///
    /// A retired endpoint fails everything with `NoSuchEndpoint`.
    fn run<T>(
        &self,
        action: EventAction,
        actor: UserId,
        target: FileId,
        permission: Permission,
        name: Option<&str>,
        op: impl FnOnce() -> StorageResult<T>,
    ) -> StorageResult<T> {
        let _serial = self.op_lock.lock();
        let result = if self.is_retired() {
            Err(StorageError::NoSuchEndpoint)
        } else if self.services.access.check(actor, target, permission) {
            op()
        } else {
            Err(StorageError::PermissionDenied)
        };

        let context = self.event_context(actor, target, name);
        self.services.events.record(action, result.status(), &context);
        result
    }

    fn event_context(&self, actor: UserId, target: FileId, name: Option<&str>) -> EventContext {
        let context = EventContext::new(actor, self.id(), target);
        match name {
            Some(name) => context.with_name(name),
            None => context,
        }
    }

    fn audit(
        &self,
        action: EventAction,
        actor: UserId,
        file: FileId,
        name: Option<&str>,
    ) -> WriteAudit {
        WriteAudit {
            events: Arc::clone(&self.services.events),
            action,
            context: self.event_context(actor, file, name),
        }
    }

    fn context(&self, activity: ActivityGuard) -> TransactionContext {
        TransactionContext {
            vfs: Arc::clone(&self.vfs),
            datastore: Arc::clone(&self.datastore),
            activity,
        }
    }

    fn dir(&self, id: FileId) -> StorageResult<DirectoryRef<'_>> {
        self.vfs.get_dir(id).ok_or(StorageError::NoSuchDir)
    }

    fn file_dir(&self, file: FileId) -> StorageResult<DirectoryRef<'_>> {
        self.vfs.get_file_dir(file).ok_or(StorageError::NoSuchFile)
    }

    /// The new file may still be waiting for its backing object.
    fn create_committed(
        &self,
        dir: FileId,
        info: FileCreationInfo,
    ) -> StorageResult<(FileId, SharedBacking)> {
        let mut tx = CreateFileTransaction::new(self.context(self.tracker.begin()), dir, info);
        tx.create(Box::new(|_| {}))?;
        let backing = tx.backing();
        Ok((tx.commit()?, backing))
    }

    fn delete_backing(&self, file: FileId) {
        let endpoint = self.id();
        self.datastore.delete_file(
            file,
            Box::new(move |ok| {
                if ok {
                    debug!(endpoint = %endpoint, file = %file, "backing object deleted");
                } else {
                    warn!(endpoint = %endpoint, file = %file, "could not delete backing object");
                }
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::testing::capture;
    use crate::services::testing::{DenyList, RecordingEvents, services};
    use crate::transaction::TransactionState;
    use crate::transaction::testing::{RecordingResponse, link};
    use teilpunkt_types::StorageStatus;
    use tempfile::TempDir;

    const OWNER: UserId = UserId::new(1);
    const GUEST: UserId = UserId::new(7);

    fn memory_endpoint(max_size: u64) -> (StorageEndpoint, Arc<DenyList>, Arc<RecordingEvents>) {
        let (services, access, events) = services();
        let mut data = StorageEndpointData::new("home", max_size, EndpointKind::Memory, OWNER);
        data.endpoint_id = EndpointId::new(3);
        (StorageEndpoint::new(data, &StorageConfig::default(), services), access, events)
    }

    fn upload(
        endpoint: &StorageEndpoint,
        dir: FileId,
        name: &str,
        content: &[u8],
    ) -> StorageResult<FileId> {
        let mut tx = endpoint.file_upload(OWNER, dir, name)?;
        let file = tx.file_id();
        tx.write(content, true, Box::new(|_| {}))?;
        let (cb, ok) = capture();
        tx.commit(cb)?;
        assert_eq!(*ok.lock(), Some(true));
        Ok(file)
    }

    fn read(endpoint: &StorageEndpoint, file: FileId) -> Vec<u8> {
        let response = Arc::new(RecordingResponse::default());
        let (event_loop, link) = link(&response);
        let tx = endpoint.file_read(OWNER, file, 0, 0, link).unwrap();
        assert_eq!(tx.state(), TransactionState::Committed);
        drop(tx);
        event_loop.run();
        assert_eq!(*response.status.lock(), Some(StorageStatus::Ok));
        let body = response.body.lock().clone();
        body
    }

    #[test]
    fn test_upload_then_read() {
        let (endpoint, _, events) = memory_endpoint(1000);
        let root = endpoint.root_id();
        let file = upload(&endpoint, root, "hello.txt", b"Hello, world!").unwrap();

        assert_eq!(
            events.events.lock()[..],
            [
                (EventAction::FileUploadStart, StorageStatus::Ok),
                (EventAction::FileUpload, StorageStatus::Ok),
            ]
        );

        assert_eq!(read(&endpoint, file), b"Hello, world!");
        assert_eq!(endpoint.root().size_used, 13);
        assert_eq!(events.last(), Some((EventAction::FileRead, StorageStatus::Ok)));
        assert!(endpoint.can_be_removed());
    }

    #[test]
    fn test_abandoned_upload_leaves_nothing() {
        let (endpoint, _, _) = memory_endpoint(1000);
        let root = endpoint.root_id();
        let file = {
            let mut tx = endpoint.file_upload(OWNER, root, "big.bin").unwrap();
            tx.write(b"partial", false, Box::new(|_| {})).unwrap();
            assert!(!endpoint.can_be_removed());
            tx.file_id()
        };
        assert!(endpoint.vfs().get_file(file).is_none());
        assert_eq!(endpoint.dir_get_entries(OWNER, root).unwrap(), Vec::new());
        assert_eq!(endpoint.root().size_used, 0);
        assert!(endpoint.can_be_removed());
    }

    #[test]
    fn test_permission_denied_is_recorded() {
        let (endpoint, access, events) = memory_endpoint(1000);
        access.deny(GUEST, Permission::Create);
        let root = endpoint.root_id();

        assert_eq!(endpoint.file_create(GUEST, root, "x"), Err(StorageError::PermissionDenied));
        assert_eq!(events.last(), Some((EventAction::FileCreate, StorageStatus::ErrNoUacPerm)));
        assert!(endpoint.file_create(OWNER, root, "x").is_ok());
    }

    #[test]
    fn test_concurrent_writer_is_busy() {
        let (endpoint, _, _) = memory_endpoint(1000);
        let file = endpoint.file_create(OWNER, endpoint.root_id(), "doc").unwrap();

        let first = endpoint.file_write(OWNER, file).unwrap();
        assert_eq!(endpoint.file_write(OWNER, file).unwrap_err(), StorageError::Busy);
        assert_eq!(endpoint.file_delete(OWNER, file), Err(StorageError::Busy));
        drop(first);
        assert!(endpoint.file_write(OWNER, file).is_ok());
        assert_eq!(endpoint.file_delete(OWNER, file), Ok(()));
        assert_eq!(endpoint.info_file(OWNER, file), Err(StorageError::NoSuchFile));
    }

    #[test]
    fn test_quota_rejects_upload() {
        let (endpoint, _, events) = memory_endpoint(10);
        let root = endpoint.root_id();
        assert_eq!(
            upload(&endpoint, root, "big", b"more than ten bytes"),
            Err(StorageError::QuotaExceeded)
        );
        assert_eq!(endpoint.root().file_count, 0);
        assert_eq!(events.last(), Some((EventAction::FileUpload, StorageStatus::ErrQuotaExceeded)));
    }

    #[test]
    fn test_dropped_writes_record_failure() {
        let (endpoint, _, events) = memory_endpoint(1000);
        let root = endpoint.root_id();
        {
            let mut tx = endpoint.file_upload(OWNER, root, "half").unwrap();
            tx.write(b"half", false, Box::new(|_| {})).unwrap();
            assert_eq!(events.last(), Some((EventAction::FileUploadStart, StorageStatus::Ok)));
        }
        assert_eq!(events.last(), Some((EventAction::FileUpload, StorageStatus::ErrUnsuccessful)));

        let file = endpoint.file_create(OWNER, root, "doc").unwrap();
        drop(endpoint.file_write(OWNER, file).unwrap());
        assert_eq!(events.last(), Some((EventAction::FileWrite, StorageStatus::ErrUnsuccessful)));

        let mut tx = endpoint.file_write(OWNER, file).unwrap();
        tx.write(b"v2", true, Box::new(|_| {})).unwrap();
        tx.commit(Box::new(|_| {})).unwrap();
        assert_eq!(events.last(), Some((EventAction::FileWrite, StorageStatus::Ok)));
    }

    #[test]
    fn test_retired_endpoint_refuses_work() {
        let (endpoint, _, events) = memory_endpoint(1000);
        let root = endpoint.root_id();

        let tx = endpoint.file_upload(OWNER, root, "open").unwrap();
        assert!(!endpoint.retire());
        assert!(!endpoint.is_retired());
        drop(tx);

        assert!(endpoint.retire());
        assert_eq!(endpoint.file_create(OWNER, root, "late"), Err(StorageError::NoSuchEndpoint));
        assert_eq!(
            events.last(),
            Some((EventAction::FileCreate, StorageStatus::ErrNoSuchEndpoint))
        );
        assert_eq!(
            endpoint.file_upload(OWNER, root, "late").unwrap_err(),
            StorageError::NoSuchEndpoint
        );
        assert_eq!(endpoint.dir_get_entries(OWNER, root), Err(StorageError::NoSuchEndpoint));

        endpoint.reinstate();
        assert!(endpoint.file_create(OWNER, root, "late").is_ok());
    }

    #[test]
    fn test_directories() {
        let (endpoint, _, _) = memory_endpoint(1000);
        let root = endpoint.root_id();
        let docs = endpoint.dir_create(OWNER, root, "docs", 500).unwrap();
        assert_eq!(endpoint.dir_create(OWNER, root, "docs", 10), Err(StorageError::NameExists));
        assert_eq!(
            endpoint.dir_create(OWNER, root, "huge", 1000),
            Err(StorageError::QuotaExceeded)
        );

        let file = upload(&endpoint, docs, "a.txt", b"abc").unwrap();
        endpoint.dir_rename(OWNER, docs, "papers").unwrap();
        let info = endpoint.dir_get_info(OWNER, docs).unwrap();
        assert_eq!(info.name, "papers");
        assert_eq!(info.size_used, 3);

        let entries = endpoint.dir_get_entries(OWNER, root).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].creator, "user1");

        assert_eq!(endpoint.dir_delete(OWNER, root), Err(StorageError::Unsuccessful));
        endpoint.dir_delete(OWNER, docs).unwrap();
        assert!(endpoint.vfs().get_file(file).is_none());
        assert_eq!(endpoint.root().size_used, 0);
        assert_eq!(endpoint.dir_get_info(OWNER, docs), Err(StorageError::NoSuchDir));
    }

    #[test]
    fn test_rename_and_info() {
        let (endpoint, _, _) = memory_endpoint(1000);
        let root = endpoint.root_id();
        let file = upload(&endpoint, root, "draft", b"12345").unwrap();
        endpoint.file_create(OWNER, root, "final").unwrap();

        assert_eq!(endpoint.file_rename(OWNER, file, "final"), Err(StorageError::NameExists));
        assert_eq!(endpoint.file_rename(OWNER, file, "a/b"), Err(StorageError::InvalidName));
        endpoint.file_rename(OWNER, file, "v1").unwrap();

        let info = endpoint.info_file(OWNER, file).unwrap();
        assert_eq!(info.name, "v1");
        assert_eq!(info.size, 5);
        assert_eq!(info.owner, "user1");
    }

    #[test]
    fn test_local_endpoint_on_disk() {
        let tmp = TempDir::new().unwrap();
        let config = StorageConfig::default().with_endpoints_root(tmp.path());
        let (services, _, _) = services();
        let mut data =
            StorageEndpointData::new("disk", 1 << 20, EndpointKind::LocalFileSystem, OWNER);
        data.endpoint_id = EndpointId::new(9);
        let endpoint = StorageEndpoint::new(data, &config, services);
        endpoint.materialize().unwrap();
        assert!(tmp.path().join("9").join("datastore").is_dir());

        let file = upload(&endpoint, endpoint.root_id(), "notes", b"on disk").unwrap();
        assert_eq!(read(&endpoint, file), b"on disk");
        let object = tmp.path().join("9").join("datastore").join(file.uid().to_string());
        assert_eq!(std::fs::read(&object).unwrap(), b"on disk");

        endpoint.file_delete(OWNER, file).unwrap();
        assert!(!object.exists());
    }
}
