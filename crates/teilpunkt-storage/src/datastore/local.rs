//! Datastore on the local filesystem.
//!
//! Layout: `<endpoints_root>/<endpoint>/datastore/<uid>` holds the backing
//! object of file `uid`; `<uid>T` is its staging object while a write is
//! open. Commit renames the staging object over the backing object, which
//! replaces it atomically.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, FileExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use teilpunkt_types::{EndpointId, FileId};
use tracing::{debug, warn};

use super::pool::ReadBufferPool;
use super::{
    DataStore, DoneCallback, ReadCallback, ReadChunk, ReadHandle, ReadSource, WriteHandle,
    WriteTarget, resolve_range,
};
use crate::config::StorageConfig;
use crate::vfs::consistency_fault;

/// Marker appended to a uid to name its staging object.
pub const STAGING_SUFFIX: &str = "T";

/// Name of the datastore directory inside an endpoint directory.
pub const DATASTORE_DIR: &str = "datastore";

pub struct LocalFileSystemDatastore {
    endpoint: EndpointId,
    dir: PathBuf,
    file_mode: u32,
    dir_mode: u32,
    readers: ReadBufferPool,
}

impl std::fmt::Debug for LocalFileSystemDatastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFileSystemDatastore")
            .field("endpoint", &self.endpoint)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl LocalFileSystemDatastore {
    pub fn new(config: &StorageConfig, endpoint: EndpointId) -> Self {
        Self {
            endpoint,
            dir: config.endpoint_dir(endpoint).join(DATASTORE_DIR),
            file_mode: config.file_mode,
            dir_mode: config.dir_mode,
            readers: ReadBufferPool::new(config.max_readers),
        }
    }

    /// Directory holding the backing objects.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the datastore directory (and the endpoint directory above it).
    pub fn materialize(&self) -> io::Result<()> {
        DirBuilder::new()
            .recursive(true)
            .mode(self.dir_mode)
            .create(&self.dir)?;
        debug!(endpoint = %self.endpoint, dir = %self.dir.display(), "datastore materialized");
        Ok(())
    }

    pub fn readers(&self) -> &ReadBufferPool {
        &self.readers
    }

    fn object_path(&self, file: FileId) -> PathBuf {
        self.dir.join(file.uid().to_string())
    }

    fn staging_path(&self, file: FileId) -> PathBuf {
        self.dir.join(format!("{}{STAGING_SUFFIX}", file.uid()))
    }

    fn commit(&self, file: FileId, target: Option<File>, staging: File) -> io::Result<()> {
        staging.sync_all()?;
        drop(staging);
        let old_size = target.and_then(|t| t.metadata().ok()).map_or(0, |m| m.len());
        fs::rename(self.staging_path(file), self.object_path(file))?;
        debug!(endpoint = %self.endpoint, file = %file, old_size, "write committed");
        Ok(())
    }
}

/// Fill `buf` from `offset`, stopping early only at end of file.
fn read_full_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl DataStore for LocalFileSystemDatastore {
    fn create_file(&self, file: FileId, on_done: DoneCallback) -> bool {
        let result = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(self.file_mode)
            .open(self.object_path(file));
        match result {
            Ok(_) => {
                debug!(endpoint = %self.endpoint, file = %file, "backing object created");
                on_done(true);
            }
            Err(e) => {
                warn!(
                    endpoint = %self.endpoint,
                    file = %file,
                    error = %e,
                    "failed to create backing object"
                );
                on_done(false);
            }
        }
        true
    }

    fn delete_file(&self, file: FileId, on_done: DoneCallback) -> bool {
        let _ = fs::remove_file(self.staging_path(file));
        match fs::remove_file(self.object_path(file)) {
            Ok(()) => {
                debug!(endpoint = %self.endpoint, file = %file, "backing object deleted");
                on_done(true);
            }
            Err(e) => {
                warn!(
                    endpoint = %self.endpoint,
                    file = %file,
                    error = %e,
                    "failed to delete backing object"
                );
                on_done(false);
            }
        }
        true
    }

    fn exists(&self, file: FileId) -> bool {
        self.object_path(file).is_file()
    }

    fn init_read(&self, file: FileId, begin: u64, end: u64, handle: &mut ReadHandle) -> bool {
        if handle.is_open() {
            consistency_fault(handle.file_id, "init_read on an open read handle");
        }

        let source = match File::open(self.object_path(file)) {
            Ok(f) => f,
            Err(e) => {
                warn!(
                    endpoint = %self.endpoint,
                    file = %file,
                    error = %e,
                    "failed to open backing object"
                );
                return false;
            }
        };
        let size = match source.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(
                    endpoint = %self.endpoint,
                    file = %file,
                    error = %e,
                    "failed to stat backing object"
                );
                return false;
            }
        };
        let Some((begin, end)) = resolve_range(begin, end, size) else {
            debug!(file = %file, begin, end, size, "empty read range");
            return false;
        };
        let Some(slot) = self.readers.acquire() else {
            warn!(endpoint = %self.endpoint, file = %file, "read buffer pool exhausted");
            return false;
        };

        *handle = ReadHandle {
            position: begin,
            end,
            file_id: file,
            source: ReadSource::File(source),
            buffer_slot: Some(slot),
        };
        true
    }

    fn read_file(&self, handle: &mut ReadHandle, chunk_size: usize, on_data: ReadCallback) -> bool {
        let (ReadSource::File(source), Some(slot)) = (&handle.source, handle.buffer_slot) else {
            consistency_fault(handle.file_id, "read on a closed read handle");
        };
        if handle.is_done() || chunk_size == 0 {
            warn!(file = %handle.file_id, chunk_size, "read on a finished cursor");
            on_data(ReadChunk::failed());
            return false;
        }

        let (position, end) = (handle.position, handle.end);
        let want = (end - position).min(chunk_size as u64) as usize;
        let read = self.readers.with_buffer(slot, want, |buf| {
            match read_full_at(source, buf, position) {
                Ok(n) => {
                    let is_last = n < want || position + n as u64 >= end;
                    on_data(ReadChunk {
                        data: &buf[..n],
                        success: true,
                        is_last,
                    });
                    Some((n as u64, is_last))
                }
                Err(e) => {
                    warn!(file = %handle.file_id, error = %e, "read failed");
                    on_data(ReadChunk::failed());
                    None
                }
            }
        });

        match read.flatten() {
            Some((n, is_last)) => {
                handle.position += n;
                if is_last {
                    handle.end = handle.position;
                }
                true
            }
            None => false,
        }
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

        let target = match File::open(self.object_path(file)) {
            Ok(f) => f,
            Err(e) => {
                warn!(
                    endpoint = %self.endpoint,
                    file = %file,
                    error = %e,
                    "failed to open write target"
                );
                return false;
            }
        };
        let staging = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(self.file_mode)
            .open(self.staging_path(file));
        let staging = match staging {
            Ok(f) => f,
            Err(e) => {
                warn!(
                    endpoint = %self.endpoint,
                    file = %file,
                    error = %e,
                    "failed to open staging object"
                );
                return false;
            }
        };

        *handle = WriteHandle {
            new_size: 0,
            temp_position: 0,
            file_id: file,
            target: WriteTarget::File {
                target: Some(target),
                staging,
            },
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
        let WriteTarget::File { staging, .. } = &handle.target else {
            consistency_fault(handle.file_id, "write on a closed write handle");
        };
        if handle.done {
            warn!(file = %handle.file_id, "write after the last chunk");
            on_done(false);
            return false;
        }

        match staging.write_all_at(data, handle.temp_position) {
            Ok(()) => {
                handle.temp_position += data.len() as u64;
                handle.new_size = handle.temp_position;
                handle.done = is_last;
                on_done(true);
            }
            Err(e) => {
                warn!(file = %handle.file_id, error = %e, "staging write failed");
                on_done(false);
            }
        }
        true
    }

    fn close_write(&self, handle: &mut WriteHandle, revert: bool, on_done: DoneCallback) -> bool {
        let file = handle.file_id;
        let done = handle.done;
        let WriteTarget::File { target, staging } = std::mem::take(&mut handle.target) else {
            consistency_fault(file, "close of a closed write handle");
        };
        handle.reset();

        if revert || !done {
            if !revert {
                warn!(file = %file, "commit of an unfinished write, discarding");
            }
            drop(staging);
            let removed = fs::remove_file(self.staging_path(file));
            if let Err(e) = &removed {
                warn!(file = %file, error = %e, "failed to remove staging object");
            }
            on_done(revert && removed.is_ok());
            return true;
        }

        match self.commit(file, target, staging) {
            Ok(()) => on_done(true),
            Err(e) => {
                warn!(endpoint = %self.endpoint, file = %file, error = %e, "commit failed");
                let _ = fs::remove_file(self.staging_path(file));
                on_done(false);
            }
        }
        true
    }
}
