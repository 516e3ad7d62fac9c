use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use teilpunkt_types::{FileId, StorageStatus};
use tracing::{debug, warn};

use super::create::{SharedBacking, backing_pending, delete_backing, discard_backing, remove_entry};
use super::io::ResponseLink;
use super::{TransactionContext, TransactionState};
use crate::datastore::{DataStore, DoneCallback, WriteHandle};
use crate::error::{StorageError, StorageResult};
use crate::services::{EventAction, EventContext, EventSink};
use crate::vfs::VirtualFilesystem;

/// Where a write reports how it ended.
pub(crate) struct WriteAudit {
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) action: EventAction,
    pub(crate) context: EventContext,
}

impl WriteAudit {
    fn record(self, status: StorageStatus) {
        self.events.record(self.action, status, &self.context);
    }
}

/// Replaces a file's contents through a staged write.
///
/// Chunks arrive in order through [`write`](Self::write). Nothing is visible
/// to readers until [`commit`](Self::commit), which accounts the new size
/// against every quota up to the root and then promotes the staged bytes.
/// Dropped without commit, the staged bytes are discarded; if the file was
/// created for this upload, its entry and backing object are removed too.
pub struct WriteFileTransaction {
    ctx: TransactionContext,
    file: FileId,
    handle: WriteHandle,
    state: TransactionState,
    created_here: bool,
    /// Set when the backing object was requested by this upload.
    backing: Option<SharedBacking>,
    old_size: u64,
    written: u64,
    failed: Arc<AtomicBool>,
    /// Error of the last rejected call, reported if the write is abandoned.
    rejected: Option<StorageError>,
    audit: Option<WriteAudit>,
    response: Option<ResponseLink>,
}

impl std::fmt::Debug for WriteFileTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteFileTransaction")
            .field("file", &self.file)
            .field("state", &self.state)
            .field("written", &self.written)
            .finish_non_exhaustive()
    }
}

impl WriteFileTransaction {
    pub(crate) fn new(ctx: TransactionContext, file: FileId, created_here: bool) -> Self {
        Self {
            ctx,
            file,
            handle: WriteHandle::default(),
            state: TransactionState::Created,
            created_here,
            backing: None,
            old_size: 0,
            written: 0,
            failed: Arc::new(AtomicBool::new(false)),
            rejected: None,
            audit: None,
            response: None,
        }
    }

    /// Follow the create that requested this file's backing object.
    pub(crate) fn with_backing(mut self, backing: SharedBacking) -> Self {
        self.backing = Some(backing);
        self
    }

    /// Record the final status through `audit` once the write ends.
    pub(crate) fn with_audit(mut self, audit: WriteAudit) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn attach_response(&mut self, response: ResponseLink) {
        self.response = Some(response);
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn file_id(&self) -> FileId {
        self.file
    }

    /// Bytes staged so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Open the staging object.
    ///
    /// If the backing object is still being created, staging opens with
    /// the first chunk instead.
    pub fn begin(&mut self) -> StorageResult<()> {
        if self.state != TransactionState::Created {
            return Err(StorageError::Unsuccessful);
        }
        let file = self.ctx.vfs.get_file(self.file).ok_or(StorageError::NoSuchFile)?;
        self.old_size = file.size();
        if !self.ctx.datastore.init_write(self.file, &mut self.handle) {
            if !self.backing_pending() {
                return Err(StorageError::Unsuccessful);
            }
            debug!(file = %self.file, "backing object pending, staging deferred");
        }
        self.state = TransactionState::Started;
        debug!(file = %self.file, old_size = self.old_size, "write started");
        Ok(())
    }

    /// Stage the next chunk. `is_last` must be set on the final one.
    ///
    /// Fails early with `QuotaExceeded` once the staged size can no longer
    /// fit; the caller should then drop the transaction. `Busy` means the
    /// backing object does not exist yet and the chunk may be retried.
    pub fn write(
        &mut self,
        data: &[u8],
        is_last: bool,
        on_done: DoneCallback,
    ) -> StorageResult<()> {
        let result = self.stage(data, is_last, on_done);
        self.rejected = result.err();
        result
    }

    fn stage(&mut self, data: &[u8], is_last: bool, on_done: DoneCallback) -> StorageResult<()> {
        if !self.state.is_active() || self.handle.is_done() {
            return Err(StorageError::Unsuccessful);
        }
        if !self.handle.is_open() && !self.ctx.datastore.init_write(self.file, &mut self.handle) {
            return Err(if self.backing_pending() {
                StorageError::Busy
            } else {
                StorageError::Unsuccessful
            });
        }

        let written = self.written + data.len() as u64;
        if written > self.old_size {
            let dir = self.ctx.vfs.get_file_dir(self.file).ok_or(StorageError::NoSuchFile)?;
            if !dir.can_fit(written - self.old_size) {
                debug!(file = %self.file, written, "write rejected early, quota exceeded");
                return Err(StorageError::QuotaExceeded);
            }
        }

        let failed = Arc::clone(&self.failed);
        let accepted = self.ctx.datastore.write_file(
            &mut self.handle,
            is_last,
            data,
            Box::new(move |ok| {
                if !ok {
                    failed.store(true, Ordering::Release);
                }
                on_done(ok);
            }),
        );
        if !accepted {
            return Err(StorageError::Unsuccessful);
        }
        self.written = written;
        self.state = TransactionState::Streaming;
        Ok(())
    }

    /// Account the new size and promote the staged bytes.
    ///
    /// Requires the last chunk to have been written. If the datastore then
    /// fails to promote, the size change is undone in `on_done`'s stead.
    pub fn commit(mut self, on_done: DoneCallback) -> StorageResult<()> {
        let result = self.promote(on_done);
        self.rejected = result.err();
        result
    }

    fn promote(&mut self, on_done: DoneCallback) -> StorageResult<()> {
        let ready = self.state.is_active() && self.handle.is_done();
        if !ready || self.failed.load(Ordering::Acquire) {
            return Err(StorageError::Unsuccessful);
        }
        let new_size = self.handle.new_size();
        let dir = self.ctx.vfs.get_file_dir(self.file).ok_or(StorageError::NoSuchFile)?;
        dir.file_change_size(self.file, new_size)?;
        self.state = TransactionState::Committed;

        let undo = CommitUndo {
            vfs: Arc::clone(&self.ctx.vfs),
            datastore: Arc::clone(&self.ctx.datastore),
            file: self.file,
            old_size: self.old_size,
            created_here: self.created_here,
            backing: self.backing.clone(),
        };
        let audit = self.audit.take();
        let accepted = self.ctx.datastore.close_write(
            &mut self.handle,
            false,
            Box::new(move |ok| {
                if !ok {
                    undo.run();
                }
                if let Some(audit) = audit {
                    audit.record(if ok {
                        StorageStatus::Ok
                    } else {
                        StorageStatus::ErrUnsuccessful
                    });
                }
                on_done(ok);
            }),
        );
        debug!(file = %self.file, new_size, accepted, "write committed");
        if accepted { Ok(()) } else { Err(StorageError::Unsuccessful) }
    }

    fn backing_pending(&self) -> bool {
        self.backing.as_ref().is_some_and(backing_pending)
    }

    fn rollback(&mut self) {
        if self.handle.is_open() {
            let file = self.file;
            self.ctx.datastore.close_write(
                &mut self.handle,
                true,
                Box::new(move |ok| {
                    if !ok {
                        warn!(file = %file, "could not discard staged bytes");
                    }
                }),
            );
        }
        if self.created_here {
            let backing = self.backing.as_ref();
            remove_created(&self.ctx.vfs, self.ctx.datastore.as_ref(), backing, self.file);
        }
        self.state = TransactionState::Aborted;
        debug!(file = %self.file, written = self.written, "write rolled back");
        if let Some(audit) = self.audit.take() {
            audit.record(self.rejected.map_or(StorageStatus::ErrUnsuccessful, |e| e.status()));
        }
        if let Some(response) = &self.response {
            response.finish_deferred(StorageStatus::ErrUnsuccessful);
        }
    }
}

impl Drop for WriteFileTransaction {
    fn drop(&mut self) {
        if self.state != TransactionState::Committed {
            self.rollback();
        }
    }
}

/// Reverts a commit whose promotion failed.
struct CommitUndo {
    vfs: Arc<VirtualFilesystem>,
    datastore: Arc<dyn DataStore>,
    file: FileId,
    old_size: u64,
    created_here: bool,
    backing: Option<SharedBacking>,
}

impl CommitUndo {
    fn run(self) {
        warn!(file = %self.file, "promotion failed, reverting size");
        if self.created_here {
            remove_created(&self.vfs, self.datastore.as_ref(), self.backing.as_ref(), self.file);
        } else if let Some(dir) = self.vfs.get_file_dir(self.file) {
            if let Err(e) = dir.file_change_size(self.file, self.old_size) {
                warn!(file = %self.file, error = %e, "could not revert size");
            }
        }
    }
}

/// Remove a file created for an upload: tree entry and backing object.
fn remove_created(
    vfs: &VirtualFilesystem,
    datastore: &dyn DataStore,
    backing: Option<&SharedBacking>,
    file: FileId,
) {
    remove_entry(vfs, file);
    match backing {
        Some(backing) => discard_backing(backing, datastore, file),
        None => delete_backing(datastore, file),
    }
}
