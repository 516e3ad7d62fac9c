//! In-memory datastore.
//!
//! Used for ephemeral endpoints and testing. Same staging and commit
//! semantics as the local store: readers hold a snapshot of the object and
//! never see a write in progress.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use teilpunkt_types::FileId;
use tracing::{debug, warn};

use super::pool::ReadBufferPool;
use super::{
    DataStore, DoneCallback, ReadCallback, ReadChunk, ReadHandle, ReadSource, WriteHandle,
    WriteTarget, resolve_range,
};
use crate::vfs::consistency_fault;

#[derive(Debug)]
pub struct MemoryDatastore {
    objects: Mutex<HashMap<u32, Arc<Vec<u8>>>>,
    readers: ReadBufferPool,
}

impl MemoryDatastore {
    pub fn new(max_readers: usize) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            readers: ReadBufferPool::new(max_readers),
        }
    }

    /// Number of backing objects.
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    /// Copy of an object's committed bytes.
    pub fn contents(&self, file: FileId) -> Option<Vec<u8>> {
        self.objects.lock().get(&file.uid()).map(|bytes| bytes.as_ref().clone())
    }
}

impl DataStore for MemoryDatastore {
    fn create_file(&self, file: FileId, on_done: DoneCallback) -> bool {
        let created = {
            let mut objects = self.objects.lock();
            if objects.contains_key(&file.uid()) {
                false
            } else {
                objects.insert(file.uid(), Arc::new(Vec::new()));
                true
            }
        };
        if !created {
            warn!(file = %file, "backing object already exists");
        }
        on_done(created);
        true
    }

    fn delete_file(&self, file: FileId, on_done: DoneCallback) -> bool {
        let removed = self.objects.lock().remove(&file.uid()).is_some();
        debug!(file = %file, removed, "backing object deleted");
        on_done(removed);
        true
    }

    fn exists(&self, file: FileId) -> bool {
        self.objects.lock().contains_key(&file.uid())
    }

    fn init_read(&self, file: FileId, begin: u64, end: u64, handle: &mut ReadHandle) -> bool {
        if handle.is_open() {
            consistency_fault(handle.file_id, "init_read on an open read handle");
        }
        let Some(bytes) = self.objects.lock().get(&file.uid()).cloned() else {
            return false;
        };
        let Some((begin, end)) = resolve_range(begin, end, bytes.len() as u64) else {
            return false;
        };
        let Some(slot) = self.readers.acquire() else {
            warn!(file = %file, "read buffer pool exhausted");
            return false;
        };

        *handle = ReadHandle {
            position: begin,
            end,
            file_id: file,
            source: ReadSource::Bytes(bytes),
            buffer_slot: Some(slot),
        };
        true
    }

    fn read_file(&self, handle: &mut ReadHandle, chunk_size: usize, on_data: ReadCallback) -> bool {
        let ReadSource::Bytes(bytes) = &handle.source else {
            consistency_fault(handle.file_id, "read on a closed read handle");
        };
        if handle.is_done() || chunk_size == 0 {
            warn!(file = %handle.file_id, chunk_size, "read on a finished cursor");
            on_data(ReadChunk::failed());
            return false;
        }

        let start = handle.position as usize;
        let stop = (handle.end as usize).min(start.saturating_add(chunk_size));
        let is_last = stop as u64 >= handle.end;
        on_data(ReadChunk {
            data: &bytes[start..stop],
            success: true,
            is_last,
        });
        handle.position = stop as u64;
        true
    }

    fn close_read(&self, handle: &mut ReadHandle, on_done: DoneCallback) -> bool {
        if !handle.is_open() {
            consistency_fault(handle.file_id, "close of a closed read handle");
        }
        if let Some(slot) = handle.buffer_slot {
            self.readers.release(slot);
        }
        handle.reset();
        on_done(true);
        true
    }

    fn init_write(&self, file: FileId, handle: &mut WriteHandle) -> bool {
        if handle.is_open() {
            consistency_fault(handle.file_id, "init_write on an open write handle");
        }
        if !self.exists(file) {
            warn!(file = %file, "write target does not exist");
            return false;
        }
        *handle = WriteHandle {
            new_size: 0,
            temp_position: 0,
            file_id: file,
            target: WriteTarget::Bytes(Vec::new()),
            done: false,
        };
        true
    }

    fn write_file(
        &self,
        handle: &mut WriteHandle,
        is_last: bool,
        data: &[u8],
        on_done: DoneCallback,
    ) -> bool {
        let WriteTarget::Bytes(staged) = &mut handle.target else {
            consistency_fault(handle.file_id, "write on a closed write handle");
        };
        if handle.done {
            warn!(file = %handle.file_id, "write after the last chunk");
            on_done(false);
            return false;
        }
        staged.extend_from_slice(data);
        handle.temp_position += data.len() as u64;
        handle.new_size = handle.temp_position;
        handle.done = is_last;
        on_done(true);
        true
    }

    fn close_write(&self, handle: &mut WriteHandle, revert: bool, on_done: DoneCallback) -> bool {
        let file = handle.file_id;
        let done = handle.done;
        let WriteTarget::Bytes(staged) = std::mem::take(&mut handle.target) else {
            consistency_fault(file, "close of a closed write handle");
        };
        handle.reset();

        if revert || !done {
            on_done(revert);
            return true;
        }

        let committed = {
            let mut objects = self.objects.lock();
            match objects.get_mut(&file.uid()) {
                Some(object) => {
                    *object = Arc::new(staged);
                    true
                }
                None => false,
            }
        };
        debug!(file = %file, committed, "write closed");
        on_done(committed);
        true
    }
}
