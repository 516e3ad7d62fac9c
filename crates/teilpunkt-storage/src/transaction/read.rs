use std::sync::Arc;

use parking_lot::Mutex;
use teilpunkt_types::{FileId, StorageStatus};
use tracing::{debug, warn};

use super::io::ResponseLink;
use super::{TransactionContext, TransactionState};
use crate::datastore::{DataStore, ReadChunk, ReadHandle, resolve_range};
use crate::error::{StorageError, StorageResult};

#[derive(Debug, Default)]
struct ReadProgress {
    delivered: u64,
    finished: bool,
    failed: bool,
    /// The response asked us to stop until it is writable again.
    paused: bool,
    /// A read was issued and its callback has not fired yet.
    pending: bool,
    /// `pump` is inside `read_file`; a callback firing now needs no resume.
    in_call: bool,
}

impl ReadProgress {
    fn can_issue(&self) -> bool {
        !(self.finished || self.failed || self.paused || self.pending)
    }
}

/// Streams a byte range of a file into a response.
///
/// Chunks are pulled from the datastore and pushed into the response until
/// the range is exhausted or the response pushes back. After backpressure,
/// [`on_writable`](Self::on_writable) resumes the stream. A chunk the
/// datastore delivers after `read_file` has returned resumes the stream
/// from the event loop. The response is told the final status from the
/// event loop once the stream ends, or with `ErrUnsuccessful` if the
/// transaction is dropped first.
pub struct ReadFileTransaction {
    ctx: TransactionContext,
    begin: u64,
    end: u64,
    stream: Arc<ReadStream>,
}

/// The part of a read that completions reach.
struct ReadStream {
    file: FileId,
    chunk_size: usize,
    datastore: Arc<dyn DataStore>,
    /// Held for a whole pump; serializes pumps and the final close.
    handle: Mutex<ReadHandle>,
    state: Mutex<TransactionState>,
    progress: Mutex<ReadProgress>,
    response: ResponseLink,
}

impl std::fmt::Debug for ReadFileTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadFileTransaction")
            .field("file", &self.stream.file)
            .field("begin", &self.begin)
            .field("end", &self.end)
            .field("state", &self.stream.state())
            .finish_non_exhaustive()
    }
}

impl ReadFileTransaction {
    pub(crate) fn new(
        ctx: TransactionContext,
        file: FileId,
        begin: u64,
        end: u64,
        chunk_size: usize,
        response: ResponseLink,
    ) -> Self {
        let stream = Arc::new(ReadStream {
            file,
            chunk_size: chunk_size.max(1),
            datastore: Arc::clone(&ctx.datastore),
            handle: Mutex::new(ReadHandle::default()),
            state: Mutex::new(TransactionState::Created),
            progress: Mutex::new(ReadProgress::default()),
            response,
        });
        Self {
            ctx,
            begin,
            end,
            stream,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.stream.state()
    }

    pub fn file_id(&self) -> FileId {
        self.stream.file
    }

    /// Bytes handed to the response so far.
    pub fn delivered(&self) -> u64 {
        self.stream.progress.lock().delivered
    }

    /// Open the range and stream until done or paused.
    ///
    /// An empty range finishes at once. `Busy` means every read buffer is
    /// in use; try again later.
    pub fn start(&mut self) -> StorageResult<TransactionState> {
        let stream = &self.stream;
        let file = stream.file;
        if stream.state() != TransactionState::Created {
            return Err(StorageError::Unsuccessful);
        }
        let dir = self.ctx.vfs.get_file_dir(file).ok_or(StorageError::NoSuchFile)?;
        let size = dir.file_touch(file)?.size();

        if resolve_range(self.begin, self.end, size).is_none() {
            debug!(file = %file, size, begin = self.begin, end = self.end, "empty read range");
            stream.set_state(TransactionState::Committed);
            stream.response.finish_deferred(StorageStatus::Ok);
            return Ok(TransactionState::Committed);
        }

        {
            let mut handle = stream.handle.lock();
            if !stream.datastore.init_read(file, self.begin, self.end, &mut handle) {
                return if stream.datastore.exists(file) {
                    Err(StorageError::Busy)
                } else {
                    warn!(file = %file, "backing object missing");
                    Err(StorageError::Unsuccessful)
                };
            }
            debug!(file = %file, begin = handle.position(), end = handle.end(), "read started");
        }
        stream.set_state(TransactionState::Started);
        Ok(stream.pump())
    }

    /// The response drained its buffer; continue streaming.
    pub fn on_writable(&mut self) -> TransactionState {
        let state = self.stream.state();
        if !state.is_active() {
            return state;
        }
        self.stream.progress.lock().paused = false;
        self.stream.pump()
    }
}

impl ReadStream {
    fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    fn pump(self: &Arc<Self>) -> TransactionState {
        let mut handle = self.handle.lock();
        if !self.state().is_active() {
            return self.state();
        }
        loop {
            if !self.progress.lock().can_issue() || handle.is_done() {
                break;
            }
            {
                let mut progress = self.progress.lock();
                progress.pending = true;
                progress.in_call = true;
            }
            let stream = Arc::clone(self);
            let accepted = self.datastore.read_file(
                &mut handle,
                self.chunk_size,
                Box::new(move |chunk: ReadChunk<'_>| stream.on_chunk(chunk)),
            );
            {
                let mut progress = self.progress.lock();
                progress.in_call = false;
                if !accepted {
                    progress.pending = false;
                    progress.failed = true;
                }
            }
            self.set_state(TransactionState::Streaming);
        }

        let (finished, failed) = {
            let progress = self.progress.lock();
            (progress.finished, progress.failed)
        };
        if failed {
            self.end_stream(&mut handle, StorageStatus::ErrUnsuccessful);
        } else if finished {
            self.end_stream(&mut handle, StorageStatus::Ok);
        }
        self.state()
    }

    /// Runs as the datastore's read callback. Never touches the handle.
    fn on_chunk(self: &Arc<Self>, chunk: ReadChunk<'_>) {
        if self.state().is_terminal() {
            debug!(file = %self.file, "chunk after the stream ended, dropped");
            return;
        }
        let outcome = chunk.success.then(|| self.response.sink().write_bytes(chunk.data));
        let resume = {
            let mut progress = self.progress.lock();
            progress.pending = false;
            match outcome {
                None => progress.failed = true,
                Some(outcome) => {
                    progress.delivered += chunk.data.len() as u64;
                    if chunk.is_last {
                        progress.finished = true;
                    } else if outcome.complete {
                        progress.failed = true;
                    } else if !outcome.accepted {
                        progress.paused = true;
                    }
                }
            }
            !progress.in_call
        };
        if resume {
            let stream = Arc::clone(self);
            self.response.defer(Box::new(move || {
                stream.pump();
            }));
        }
    }

    fn end_stream(&self, handle: &mut ReadHandle, status: StorageStatus) {
        if handle.is_open() {
            let file = self.file;
            self.datastore.close_read(
                handle,
                Box::new(move |ok| {
                    if !ok {
                        warn!(file = %file, "could not close read handle");
                    }
                }),
            );
        }
        self.set_state(if status.is_ok() {
            TransactionState::Committed
        } else {
            TransactionState::Aborted
        });
        let delivered = self.progress.lock().delivered;
        debug!(file = %self.file, delivered, status = status.code(), "read ended");
        self.response.finish_deferred(status);
    }
}

impl Drop for ReadFileTransaction {
    fn drop(&mut self) {
        let mut handle = self.stream.handle.lock();
        if self.stream.state().is_active() {
            self.stream.end_stream(&mut handle, StorageStatus::ErrUnsuccessful);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::testing::DeferredStore;
    use crate::datastore::{DataStore, MemoryDatastore, WriteHandle};
    use crate::transaction::io::{ResponseSink, WriteOutcome};
    use crate::transaction::testing::{QueuedEventLoop, RecordingResponse, link};
    use crate::transaction::ActivityTracker;
    use crate::vfs::{DirectoryCreationInfo, FileCreationInfo, VirtualFilesystem};
    use teilpunkt_types::{EndpointId, UserId};

    const CONTENT: &[u8] = b"The quick brown fox jumps over the lazy dog";

    struct Fixture {
        vfs: Arc<VirtualFilesystem>,
        store: Arc<dyn DataStore>,
        tracker: Arc<ActivityTracker>,
    }

    impl Fixture {
        fn new(max_readers: usize) -> Self {
            Self::with_store(Arc::new(MemoryDatastore::new(max_readers)))
        }

        fn with_store(store: Arc<dyn DataStore>) -> Self {
            Self {
                vfs: Arc::new(VirtualFilesystem::new(
                    EndpointId::new(1),
                    &DirectoryCreationInfo::new("root", UserId::new(1), 1000),
                )),
                store,
                tracker: ActivityTracker::new(),
            }
        }

        fn file(&self, name: &str, content: &[u8]) -> FileId {
            let root = self.vfs.root();
            let file = root.file_add(&FileCreationInfo::new(name, UserId::new(1))).unwrap();
            self.store.create_file(file, Box::new(|_| {}));
            let mut handle = WriteHandle::default();
            assert!(self.store.init_write(file, &mut handle));
            self.store.write_file(&mut handle, true, content, Box::new(|_| {}));
            self.store.close_write(&mut handle, false, Box::new(|_| {}));
            root.file_change_size(file, content.len() as u64).unwrap();
            file
        }

        fn transaction(
            &self,
            file: FileId,
            begin: u64,
            end: u64,
            chunk: usize,
            response: ResponseLink,
        ) -> ReadFileTransaction {
            let ctx = TransactionContext {
                vfs: Arc::clone(&self.vfs),
                datastore: Arc::clone(&self.store),
                activity: self.tracker.begin_read(file),
            };
            ReadFileTransaction::new(ctx, file, begin, end, chunk, response)
        }
    }

    fn read_through(
        fx: &Fixture,
        file: FileId,
        begin: u64,
        end: u64,
        chunk: usize,
    ) -> (Vec<u8>, Option<StorageStatus>) {
        let response = Arc::new(RecordingResponse::default());
        let (event_loop, link) = link(&response);
        let mut tx = fx.transaction(file, begin, end, chunk, link);
        assert_eq!(tx.start().unwrap(), TransactionState::Committed);
        drop(tx);
        event_loop.run();
        let body = response.body.lock().clone();
        let status = *response.status.lock();
        (body, status)
    }

    #[test]
    fn test_reads_exactly_across_chunk_sizes() {
        let fx = Fixture::new(2);
        let file = fx.file("fox", CONTENT);
        for chunk in [1, 3, 7, 43, 44, 4096] {
            let (body, status) = read_through(&fx, file, 0, 0, chunk);
            assert_eq!(body, CONTENT, "chunk size {chunk}");
            assert_eq!(status, Some(StorageStatus::Ok));
        }
        assert!(fx.tracker.is_idle());
    }

    #[test]
    fn test_partial_range() {
        let fx = Fixture::new(1);
        let file = fx.file("fox", CONTENT);
        let (body, _) = read_through(&fx, file, 4, 9, 2);
        assert_eq!(body, b"quick");
    }

    #[test]
    fn test_empty_file_finishes_at_once() {
        let fx = Fixture::new(1);
        let file = fx.file("empty", b"");
        let (body, status) = read_through(&fx, file, 0, 0, 8);
        assert!(body.is_empty());
        assert_eq!(status, Some(StorageStatus::Ok));
    }

    #[test]
    fn test_backpressure_pauses_and_resumes() {
        let fx = Fixture::new(1);
        let file = fx.file("fox", CONTENT);
        let response = Arc::new(RecordingResponse::with_pause_every(2));
        let (event_loop, link) = link(&response);

        let mut tx = fx.transaction(file, 0, 0, 10, link);
        assert_eq!(tx.start().unwrap(), TransactionState::Streaming);
        assert_eq!(tx.delivered(), 20);
        assert_eq!(tx.on_writable(), TransactionState::Streaming);
        assert_eq!(tx.delivered(), 40);
        assert_eq!(tx.on_writable(), TransactionState::Committed);
        assert_eq!(tx.on_writable(), TransactionState::Committed);

        assert_eq!(*response.status.lock(), None);
        event_loop.run();
        assert_eq!(response.body.lock().as_slice(), CONTENT);
        assert_eq!(*response.status.lock(), Some(StorageStatus::Ok));
    }

    #[test]
    fn test_exhausted_pool_is_busy() {
        let fx = Fixture::new(1);
        let file = fx.file("fox", CONTENT);
        let response = Arc::new(RecordingResponse::with_pause_every(1));

        let (_, first_link) = link(&response);
        let mut first = fx.transaction(file, 0, 0, 4, first_link);
        assert_eq!(first.start().unwrap(), TransactionState::Streaming);

        let (_, second_link) = link(&response);
        let mut second = fx.transaction(file, 0, 0, 4, second_link);
        assert_eq!(second.start(), Err(StorageError::Busy));

        drop(first);
        drop(second);
        let (body, _) = read_through(&fx, file, 0, 3, 4);
        assert_eq!(body, b"The");
    }

    #[test]
    fn test_drop_mid_stream_reports_failure() {
        let fx = Fixture::new(1);
        let file = fx.file("fox", CONTENT);
        let response = Arc::new(RecordingResponse::with_pause_every(1));
        let (event_loop, link) = link(&response);

        let mut tx = fx.transaction(file, 0, 0, 4, link);
        tx.start().unwrap();
        drop(tx);
        assert_eq!(event_loop.pending(), 1);
        event_loop.run();
        assert_eq!(*response.status.lock(), Some(StorageStatus::ErrUnsuccessful));
        assert!(fx.tracker.is_idle());
    }

    /// Accepts one chunk and then reports the response as finished.
    #[derive(Default)]
    struct HangUp {
        writes: Mutex<usize>,
        status: Mutex<Option<StorageStatus>>,
    }

    impl ResponseSink for HangUp {
        fn write_bytes(&self, _data: &[u8]) -> WriteOutcome {
            let mut writes = self.writes.lock();
            *writes += 1;
            if *writes == 1 { WriteOutcome::ready() } else { WriteOutcome::closed() }
        }

        fn signal_done(&self, status: StorageStatus) {
            *self.status.lock() = Some(status);
        }
    }

    #[test]
    fn test_early_close_fails_the_read() {
        let fx = Fixture::new(1);
        let file = fx.file("fox", CONTENT);
        let sink = Arc::new(HangUp::default());
        let event_loop = Arc::new(QueuedEventLoop::default());
        let link = ResponseLink::new(event_loop.clone(), sink.clone());

        let mut tx = fx.transaction(file, 0, 0, 4, link);
        assert_eq!(tx.start().unwrap(), TransactionState::Aborted);
        assert_eq!(*sink.writes.lock(), 2);
        event_loop.run();
        assert_eq!(*sink.status.lock(), Some(StorageStatus::ErrUnsuccessful));
    }

    #[test]
    fn test_missing_file() {
        let fx = Fixture::new(1);
        let file = FileId::file(EndpointId::new(1), 99);
        let response = Arc::new(RecordingResponse::default());
        let (_, link) = link(&response);
        let mut tx = fx.transaction(file, 0, 0, 4, link);
        assert_eq!(tx.start(), Err(StorageError::NoSuchFile));
    }

    #[test]
    fn test_late_chunks_resume_the_stream() {
        let store = Arc::new(DeferredStore::new(1).with_deferred_reads());
        let fx = Fixture::with_store(store.clone());
        let file = fx.file("digits", b"0123456789");
        let response = Arc::new(RecordingResponse::default());
        let (event_loop, link) = link(&response);

        let mut tx = fx.transaction(file, 0, 0, 4, link);
        assert_eq!(tx.start().unwrap(), TransactionState::Streaming);
        assert!(response.body.lock().is_empty());
        assert_eq!(store.held(), 1);

        for _ in 0..10 {
            if store.complete() == 0 && event_loop.pending() == 0 {
                break;
            }
            event_loop.run();
        }
        assert_eq!(response.body.lock().as_slice(), b"0123456789");
        assert_eq!(*response.chunks.lock(), 3);
        assert_eq!(*response.status.lock(), Some(StorageStatus::Ok));
        assert_eq!(tx.state(), TransactionState::Committed);
        assert_eq!(tx.delivered(), 10);
    }

    #[test]
    fn test_late_chunk_after_drop_is_ignored() {
        let store = Arc::new(DeferredStore::new(1).with_deferred_reads());
        let fx = Fixture::with_store(store.clone());
        let file = fx.file("digits", b"0123456789");
        let response = Arc::new(RecordingResponse::default());
        let (event_loop, link) = link(&response);

        let mut tx = fx.transaction(file, 0, 0, 4, link);
        tx.start().unwrap();
        drop(tx);
        assert_eq!(store.complete(), 1);
        event_loop.run();

        assert!(response.body.lock().is_empty());
        assert_eq!(*response.status.lock(), Some(StorageStatus::ErrUnsuccessful));
        assert_eq!(event_loop.pending(), 0);
        assert!(fx.tracker.is_idle());
    }
}
