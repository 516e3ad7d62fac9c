//! Scoped operations that pair a tree mutation with datastore work.
//!
//! A transaction that is dropped without being committed undoes every
//! effect it caused: tree entries it added are removed, staged bytes are
//! discarded, backing objects it created are deleted, and any attached
//! response is told the operation failed (from the event loop, never from
//! inside the drop).
//!
//! `commit` consumes the transaction, so committing twice or committing
//! after an abort cannot be expressed.
//!
//! ```text
//! Created ─▶ Started ─▶ Streaming* ─▶ Committed
//!                 │          │
//!                 └──────────┴──────▶ Aborted
//! ```

mod create;
mod io;
mod read;
mod write;

pub use create::CreateFileTransaction;
pub use io::{EventLoop, ResponseLink, ResponseSink, TokioEventLoop, WriteOutcome};
pub use read::ReadFileTransaction;
pub use write::WriteFileTransaction;

pub(crate) use create::SharedBacking;
pub(crate) use write::WriteAudit;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use strum::IntoStaticStr;
use teilpunkt_types::FileId;

use crate::datastore::DataStore;
use crate::vfs::VirtualFilesystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum TransactionState {
    Created,
    Started,
    Streaming,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Started | TransactionState::Streaming)
    }
}

/// What every transaction works against.
pub(crate) struct TransactionContext {
    pub(crate) vfs: Arc<VirtualFilesystem>,
    pub(crate) datastore: Arc<dyn DataStore>,
    pub(crate) activity: ActivityGuard,
}

// ============================================================================
// In-flight tracking
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
struct FileActivity {
    readers: u32,
    writer: bool,
}

/// Counts open transactions of one endpoint.
///
/// A file can have many readers but at most one writer.
#[derive(Debug, Default)]
pub struct ActivityTracker {
    files: DashMap<FileId, FileActivity>,
    open: AtomicUsize,
}

impl ActivityTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Activity not tied to a single file yet.
    pub fn begin(self: &Arc<Self>) -> ActivityGuard {
        self.guard(Claim::Endpoint)
    }

    pub fn begin_read(self: &Arc<Self>, file: FileId) -> ActivityGuard {
        self.files.entry(file).or_default().readers += 1;
        self.guard(Claim::Read(file))
    }

    /// `None` if the file already has a writer.
    pub fn begin_write(self: &Arc<Self>, file: FileId) -> Option<ActivityGuard> {
        {
            let mut activity = self.files.entry(file).or_default();
            if activity.writer {
                return None;
            }
            activity.writer = true;
        }
        Some(self.guard(Claim::Write(file)))
    }

    /// Is any transaction using `file`?
    pub fn is_busy(&self, file: FileId) -> bool {
        self.files.contains_key(&file)
    }

    pub fn is_writing(&self, file: FileId) -> bool {
        self.files.get(&file).is_some_and(|a| a.writer)
    }

    /// Open transactions.
    pub fn open_count(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }

    pub fn is_idle(&self) -> bool {
        self.open_count() == 0
    }

    fn guard(self: &Arc<Self>, claim: Claim) -> ActivityGuard {
        self.open.fetch_add(1, Ordering::AcqRel);
        ActivityGuard {
            tracker: Arc::clone(self),
            claim,
        }
    }

    fn release(&self, claim: Claim) {
        let file = match claim {
            Claim::Endpoint => None,
            Claim::Read(file) => {
                if let Some(mut activity) = self.files.get_mut(&file) {
                    activity.readers = activity.readers.saturating_sub(1);
                }
                Some(file)
            }
            Claim::Write(file) => {
                if let Some(mut activity) = self.files.get_mut(&file) {
                    activity.writer = false;
                }
                Some(file)
            }
        };
        if let Some(file) = file {
            self.files.remove_if(&file, |_, a| a.readers == 0 && !a.writer);
        }
        self.open.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone, Copy)]
enum Claim {
    Endpoint,
    Read(FileId),
    Write(FileId),
}

/// Held by a transaction for as long as it is alive.
#[derive(Debug)]
pub struct ActivityGuard {
    tracker: Arc<ActivityTracker>,
    claim: Claim,
}

impl ActivityGuard {
    pub fn tracker(&self) -> &Arc<ActivityTracker> {
        &self.tracker
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.tracker.release(self.claim);
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use teilpunkt_types::EndpointId;

    #[test]
    fn test_single_writer_many_readers() {
        let tracker = ActivityTracker::new();
        let file = FileId::file(EndpointId::new(0), 2);

        let r1 = tracker.begin_read(file);
        let r2 = tracker.begin_read(file);
        let w = tracker.begin_write(file).unwrap();
        assert!(tracker.begin_write(file).is_none());
        assert!(tracker.is_writing(file));
        assert_eq!(tracker.open_count(), 3);

        drop(w);
        assert!(!tracker.is_writing(file));
        assert!(tracker.is_busy(file));
        drop(r1);
        drop(r2);
        assert!(!tracker.is_busy(file));
        assert!(tracker.is_idle());
    }

    #[test]
    fn test_endpoint_activity() {
        let tracker = ActivityTracker::new();
        let guard = tracker.begin();
        assert!(!tracker.is_idle());
        drop(guard);
        assert!(tracker.is_idle());
    }

    #[test]
    fn test_states() {
        assert!(TransactionState::Committed.is_terminal());
        assert!(TransactionState::Aborted.is_terminal());
        assert!(!TransactionState::Streaming.is_terminal());
        assert!(TransactionState::Streaming.is_active());
        let name: &'static str = TransactionState::Created.into();
        assert_eq!(name, "created");
    }
}
