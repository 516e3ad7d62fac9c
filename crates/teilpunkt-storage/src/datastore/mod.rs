//! Physical byte storage behind the virtual tree.
//!
//! A [`DataStore`] stores one opaque byte sequence (the backing object) per
//! numeric file id. It knows nothing about names, directories, or users.
//!
//! Every operation takes a completion callback and returns whether the
//! request was accepted. The callback may fire before the call returns.
//! A store is not required to serialize operations on the same file id;
//! the endpoint does that.
//!
//! Writes are two-phase: bytes go to a staging object and only replace the
//! backing object when the write handle is closed without `revert`. Readers
//! never observe a half-written object.

mod local;
mod memory;
mod pool;

pub use local::{LocalFileSystemDatastore, STAGING_SUFFIX};
pub use memory::MemoryDatastore;
pub use pool::ReadBufferPool;

use std::sync::Arc;

use teilpunkt_types::FileId;

/// Completion of a create, delete, write, or close.
pub type DoneCallback = Box<dyn FnOnce(bool) + Send>;

/// Completion of one `read_file` call.
pub type ReadCallback = Box<dyn FnOnce(ReadChunk<'_>) + Send>;

/// One chunk delivered by [`DataStore::read_file`].
#[derive(Debug, Clone, Copy)]
pub struct ReadChunk<'a> {
    pub data: &'a [u8],
    pub success: bool,
    /// True exactly on the chunk that reaches the end of the range.
    pub is_last: bool,
}

impl<'a> ReadChunk<'a> {
    pub(crate) fn failed() -> Self {
        Self {
            data: &[],
            success: false,
            is_last: false,
        }
    }
}

/// Asynchronous, callback-driven access to backing objects.
pub trait DataStore: Send + Sync {
    /// Create an empty backing object. Fails if one already exists.
    fn create_file(&self, file: FileId, on_done: DoneCallback) -> bool;

    /// Remove the backing object.
    fn delete_file(&self, file: FileId, on_done: DoneCallback) -> bool;

    /// Does a backing object exist for `file`?
    fn exists(&self, file: FileId) -> bool;

    /// Open a read cursor over `[begin, end)`; `end == 0` reads to the end.
    ///
    /// Claims a read buffer. Returns false when the buffer pool is
    /// exhausted, the object is missing, or the range is empty.
    fn init_read(&self, file: FileId, begin: u64, end: u64, handle: &mut ReadHandle) -> bool;

    /// Read up to `chunk_size` bytes from the cursor.
    fn read_file(&self, handle: &mut ReadHandle, chunk_size: usize, on_data: ReadCallback) -> bool;

    /// Release the descriptor and the read buffer.
    fn close_read(&self, handle: &mut ReadHandle, on_done: DoneCallback) -> bool;

    /// Open the target object and a fresh staging object.
    fn init_write(&self, file: FileId, handle: &mut WriteHandle) -> bool;

    /// Append `data` to the staging object. `is_last` marks the handle done.
    fn write_file(
        &self,
        handle: &mut WriteHandle,
        is_last: bool,
        data: &[u8],
        on_done: DoneCallback,
    ) -> bool;

    /// Commit the staged bytes (`revert == false`) or discard them.
    fn close_write(&self, handle: &mut WriteHandle, revert: bool, on_done: DoneCallback) -> bool;
}

// ── Handles ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) enum ReadSource {
    #[default]
    Closed,
    File(std::fs::File),
    Bytes(Arc<Vec<u8>>),
}

/// An open sequential read cursor.
///
/// Valid between a successful `init_read` and the matching `close_read`.
/// Using it outside that window is a fatal error.
#[derive(Debug)]
pub struct ReadHandle {
    pub(crate) position: u64,
    pub(crate) end: u64,
    pub(crate) file_id: FileId,
    pub(crate) source: ReadSource,
    pub(crate) buffer_slot: Option<usize>,
}

impl Default for ReadHandle {
    fn default() -> Self {
        Self {
            position: 0,
            end: 0,
            file_id: FileId::INVALID,
            source: ReadSource::Closed,
            buffer_slot: None,
        }
    }
}

impl ReadHandle {
    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.source, ReadSource::Closed)
    }

    /// The cursor has reached the end of its range.
    pub fn is_done(&self) -> bool {
        self.position >= self.end
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Default)]
pub(crate) enum WriteTarget {
    #[default]
    Closed,
    File {
        target: Option<std::fs::File>,
        staging: std::fs::File,
    },
    Bytes(Vec<u8>),
}

/// An open staged write.
///
/// Valid between a successful `init_write` and the matching `close_write`.
#[derive(Debug)]
pub struct WriteHandle {
    /// Bytes staged so far; the object's size after commit.
    pub(crate) new_size: u64,
    pub(crate) temp_position: u64,
    pub(crate) file_id: FileId,
    pub(crate) target: WriteTarget,
    pub(crate) done: bool,
}

impl Default for WriteHandle {
    fn default() -> Self {
        Self {
            new_size: 0,
            temp_position: 0,
            file_id: FileId::INVALID,
            target: WriteTarget::Closed,
            done: false,
        }
    }
}

impl WriteHandle {
    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    pub fn new_size(&self) -> u64 {
        self.new_size
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.target, WriteTarget::Closed)
    }

    /// The last chunk has been written.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

/// `[begin, end)` with `end == 0` meaning "to the end of an object of `size` bytes".
///
/// `None` for empty or out-of-range requests.
pub(crate) fn resolve_range(begin: u64, end: u64, size: u64) -> Option<(u64, u64)> {
    let end = if end == 0 { size } else { end.min(size) };
    (begin < end).then_some((begin, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_range() {
        assert_eq!(resolve_range(0, 0, 13), Some((0, 13)));
        assert_eq!(resolve_range(2, 5, 13), Some((2, 5)));
        assert_eq!(resolve_range(2, 50, 13), Some((2, 13)));
        assert_eq!(resolve_range(5, 5, 13), None);
        assert_eq!(resolve_range(0, 0, 0), None);
        assert_eq!(resolve_range(20, 0, 13), None);
    }

    #[test]
    fn test_fresh_handles_are_closed() {
        let read = ReadHandle::default();
        assert!(!read.is_open());
        assert!(read.is_done());
        assert!(!read.file_id().is_valid());

        let write = WriteHandle::default();
        assert!(!write.is_open());
        assert!(!write.is_done());
    }
}
