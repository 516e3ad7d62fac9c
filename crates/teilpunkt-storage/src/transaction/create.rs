use std::sync::Arc;

use parking_lot::Mutex;
use teilpunkt_types::{FileId, StorageStatus};
use tracing::{debug, warn};

use super::io::ResponseLink;
use super::{ActivityGuard, TransactionContext, TransactionState};
use crate::datastore::{DataStore, DoneCallback};
use crate::error::{StorageError, StorageResult};
use crate::vfs::{FileCreationInfo, VirtualFilesystem};

/// What became of a backing object the datastore was asked to create.
#[derive(Debug, Default)]
pub(crate) struct BackingState {
    /// Outcome reported by the datastore; `None` while pending.
    outcome: Option<bool>,
    /// The entry was kept before the outcome arrived.
    committed: bool,
    /// The entry was removed before the outcome arrived.
    abandoned: bool,
}

pub(crate) type SharedBacking = Arc<Mutex<BackingState>>;

/// Is the datastore still working on the backing object?
pub(crate) fn backing_pending(backing: &SharedBacking) -> bool {
    backing.lock().outcome.is_none()
}

/// Get rid of a backing object whose entry is gone.
///
/// A pending create is marked abandoned; its completion deletes the object.
pub(crate) fn discard_backing(backing: &SharedBacking, datastore: &dyn DataStore, file: FileId) {
    let outcome = {
        let mut state = backing.lock();
        if state.outcome.is_none() {
            state.abandoned = true;
        }
        state.outcome
    };
    if outcome == Some(true) {
        delete_backing(datastore, file);
    }
}

pub(super) fn delete_backing(datastore: &dyn DataStore, file: FileId) {
    datastore.delete_file(
        file,
        Box::new(move |ok| {
            if !ok {
                warn!(file = %file, "could not delete backing object");
            }
        }),
    );
}

pub(super) fn remove_entry(vfs: &VirtualFilesystem, file: FileId) {
    if let Some(dir) = vfs.get_file_dir(file) {
        if let Err(e) = dir.file_delete(file) {
            warn!(file = %file, error = %e, "could not remove entry");
        }
    }
}

/// Creates a file entry and its empty backing object.
///
/// Dropped without [`commit`](Self::commit): the entry is removed from the
/// tree and the backing object is deleted, now or once the datastore has
/// created it.
pub struct CreateFileTransaction {
    ctx: TransactionContext,
    dir: FileId,
    info: FileCreationInfo,
    file: Option<FileId>,
    backing: SharedBacking,
    state: TransactionState,
    response: Option<ResponseLink>,
    write_guard: Option<ActivityGuard>,
}

impl std::fmt::Debug for CreateFileTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateFileTransaction")
            .field("dir", &self.dir)
            .field("file", &self.file)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl CreateFileTransaction {
    pub(crate) fn new(ctx: TransactionContext, dir: FileId, info: FileCreationInfo) -> Self {
        Self {
            ctx,
            dir,
            info,
            file: None,
            backing: SharedBacking::default(),
            state: TransactionState::Created,
            response: None,
            write_guard: None,
        }
    }

    /// Report a rollback to `response`.
    pub fn attach_response(&mut self, response: ResponseLink) {
        self.response = Some(response);
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Id of the new file, once [`create`](Self::create) has run.
    pub fn file_id(&self) -> Option<FileId> {
        self.file
    }

    pub(crate) fn backing(&self) -> SharedBacking {
        Arc::clone(&self.backing)
    }

    /// Add the tree entry and ask the datastore for a backing object.
    ///
    /// `on_done` receives the datastore's outcome, which may arrive after
    /// this call and even after [`commit`](Self::commit).
    pub fn create(&mut self, on_done: DoneCallback) -> StorageResult<FileId> {
        if self.state != TransactionState::Created {
            return Err(StorageError::Unsuccessful);
        }
        let dir = self.ctx.vfs.get_dir(self.dir).ok_or(StorageError::NoSuchDir)?;
        let file = dir.file_add(&self.info)?;
        self.file = Some(file);
        self.state = TransactionState::Started;
        self.write_guard = self.ctx.activity.tracker().begin_write(file);

        let backing = Arc::clone(&self.backing);
        let vfs = Arc::clone(&self.ctx.vfs);
        let datastore = Arc::clone(&self.ctx.datastore);
        let accepted = self.ctx.datastore.create_file(
            file,
            Box::new(move |ok| {
                let (committed, abandoned) = {
                    let mut state = backing.lock();
                    state.outcome = Some(ok);
                    (state.committed, state.abandoned)
                };
                if ok && abandoned {
                    debug!(file = %file, "backing object created after rollback");
                    delete_backing(datastore.as_ref(), file);
                } else if !ok && committed && !abandoned {
                    warn!(file = %file, "backing object failed after commit, removing entry");
                    remove_entry(&vfs, file);
                }
                on_done(ok);
            }),
        );
        if !accepted {
            return Err(StorageError::Unsuccessful);
        }
        debug!(file = %file, name = %self.info.name, "create started");
        Ok(file)
    }

    /// Keep the new file.
    ///
    /// Fails if the datastore already reported a failure. While the outcome
    /// is pending the entry is kept, and a later failure removes it.
    pub fn commit(mut self) -> StorageResult<FileId> {
        let (TransactionState::Started, Some(file)) = (self.state, self.file) else {
            return Err(StorageError::Unsuccessful);
        };
        let outcome = {
            let mut state = self.backing.lock();
            if state.outcome.is_none() {
                state.committed = true;
            }
            state.outcome
        };
        match outcome {
            Some(false) => Err(StorageError::Unsuccessful),
            Some(true) => {
                self.state = TransactionState::Committed;
                Ok(file)
            }
            None => {
                debug!(file = %file, "committed ahead of the backing object");
                self.state = TransactionState::Committed;
                Ok(file)
            }
        }
    }

    fn rollback(&mut self) {
        if let Some(file) = self.file {
            remove_entry(&self.ctx.vfs, file);
            discard_backing(&self.backing, self.ctx.datastore.as_ref(), file);
            debug!(file = %file, "create rolled back");
        }
        self.state = TransactionState::Aborted;
        if let Some(response) = &self.response {
            response.finish_deferred(StorageStatus::ErrUnsuccessful);
        }
    }
}

impl Drop for CreateFileTransaction {
    fn drop(&mut self) {
        if self.state != TransactionState::Committed {
            self.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::testing::DeferredStore;
    use crate::datastore::{DataStore, MemoryDatastore};
    use crate::transaction::ActivityTracker;
    use crate::transaction::testing::{RecordingResponse, link};
    use crate::vfs::{DirectoryCreationInfo, VirtualFilesystem};
    use teilpunkt_types::{EndpointId, UserId};

    struct Fixture {
        vfs: Arc<VirtualFilesystem>,
        store: Arc<MemoryDatastore>,
        tracker: Arc<ActivityTracker>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                vfs: Arc::new(VirtualFilesystem::new(
                    EndpointId::new(1),
                    &DirectoryCreationInfo::new("root", UserId::new(1), 1000),
                )),
                store: Arc::new(MemoryDatastore::new(2)),
                tracker: ActivityTracker::new(),
            }
        }

        fn transaction(&self, name: &str) -> CreateFileTransaction {
            self.transaction_on(self.store.clone(), name)
        }

        fn transaction_on(
            &self,
            datastore: Arc<dyn DataStore>,
            name: &str,
        ) -> CreateFileTransaction {
            let ctx = TransactionContext {
                vfs: Arc::clone(&self.vfs),
                datastore,
                activity: self.tracker.begin(),
            };
            let info = FileCreationInfo::new(name, UserId::new(1));
            CreateFileTransaction::new(ctx, self.vfs.root().id(), info)
        }
    }

    #[test]
    fn test_commit_keeps_everything() {
        let fx = Fixture::new();
        let mut tx = fx.transaction("a.txt");
        let file = tx.create(Box::new(|ok| assert!(ok))).unwrap();
        assert!(fx.tracker.is_writing(file));
        assert_eq!(tx.commit().unwrap(), file);

        assert!(fx.vfs.get_file(file).is_some());
        assert!(fx.store.exists(file));
        assert!(fx.tracker.is_idle());
    }

    #[test]
    fn test_drop_rolls_back() {
        let fx = Fixture::new();
        let response = Arc::new(RecordingResponse::default());
        let (event_loop, link) = link(&response);

        let file = {
            let mut tx = fx.transaction("a.txt");
            tx.attach_response(link);
            tx.create(Box::new(|_| {})).unwrap()
        };

        assert!(fx.vfs.get_file(file).is_none());
        assert!(!fx.store.exists(file));
        assert!(fx.vfs.root().find_file(file).is_none());
        assert!(fx.tracker.is_idle());

        assert_eq!(*response.status.lock(), None);
        event_loop.run();
        assert_eq!(*response.status.lock(), Some(StorageStatus::ErrUnsuccessful));
    }

    #[test]
    fn test_name_collision_leaves_tree_alone() {
        let fx = Fixture::new();
        let mut first = fx.transaction("dup");
        first.create(Box::new(|_| {})).unwrap();
        first.commit().unwrap();

        let mut second = fx.transaction("dup");
        assert_eq!(second.create(Box::new(|_| {})), Err(StorageError::NameExists));
        assert!(second.file_id().is_none());
        drop(second);
        assert_eq!(fx.store.len(), 1);
        assert_eq!(fx.vfs.root().summary().file_count, 1);
    }

    #[test]
    fn test_commit_without_create_fails() {
        let fx = Fixture::new();
        let tx = fx.transaction("never");
        assert_eq!(tx.commit(), Err(StorageError::Unsuccessful));
        assert!(fx.store.is_empty());
    }

    #[test]
    fn test_commit_ahead_of_late_backing() {
        let fx = Fixture::new();
        let store = Arc::new(DeferredStore::new(1).with_deferred_creates());
        let mut tx = fx.transaction_on(store.clone(), "late");
        let file = tx.create(Box::new(|ok| assert!(ok))).unwrap();
        assert!(!store.exists(file));

        assert_eq!(tx.commit().unwrap(), file);
        assert_eq!(store.complete(), 1);
        assert!(store.exists(file));
        assert!(fx.vfs.get_file(file).is_some());
        assert!(fx.tracker.is_idle());
    }

    #[test]
    fn test_late_failure_removes_committed_entry() {
        let fx = Fixture::new();
        let store = Arc::new(DeferredStore::new(1).with_failing_creates());
        let mut tx = fx.transaction_on(store.clone(), "doomed");
        let file = tx.create(Box::new(|ok| assert!(!ok))).unwrap();
        tx.commit().unwrap();
        assert!(fx.vfs.get_file(file).is_some());

        store.complete();
        assert!(fx.vfs.get_file(file).is_none());
        assert_eq!(fx.vfs.root().summary().file_count, 0);
    }

    #[test]
    fn test_rollback_before_backing_exists() {
        let fx = Fixture::new();
        let store = Arc::new(DeferredStore::new(1).with_deferred_creates());
        let file = {
            let mut tx = fx.transaction_on(store.clone(), "gone");
            tx.create(Box::new(|_| {})).unwrap()
        };
        assert!(fx.vfs.get_file(file).is_none());

        store.complete();
        assert!(!store.exists(file));
        assert!(store.inner().is_empty());
    }
}
