//! The network side of a transaction: an event loop to defer work onto and
//! a response to stream bytes into.

use std::sync::Arc;

use teilpunkt_types::StorageStatus;

/// Runs callbacks later, outside the current call stack.
pub trait EventLoop: Send + Sync {
    fn defer(&self, task: Box<dyn FnOnce() + Send>);
}

/// Result of handing bytes to a [`ResponseSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// False means the sink buffered the bytes but wants the producer to
    /// pause until it reports writability again.
    pub accepted: bool,
    /// The response is finished; nothing more will be sent.
    pub complete: bool,
}

impl WriteOutcome {
    pub const fn ready() -> Self {
        Self {
            accepted: true,
            complete: false,
        }
    }

    pub const fn backpressure() -> Self {
        Self {
            accepted: false,
            complete: false,
        }
    }

    pub const fn closed() -> Self {
        Self {
            accepted: false,
            complete: true,
        }
    }
}

/// A pending response, e.g. an HTTP response body.
pub trait ResponseSink: Send + Sync {
    fn write_bytes(&self, data: &[u8]) -> WriteOutcome;

    /// The operation behind this response has ended with `status`.
    fn signal_done(&self, status: StorageStatus);
}

/// Event loop backed by a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioEventLoop {
    handle: tokio::runtime::Handle,
}

impl TokioEventLoop {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// The runtime of the calling thread, if there is one.
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl EventLoop for TokioEventLoop {
    fn defer(&self, task: Box<dyn FnOnce() + Send>) {
        self.handle.spawn(async move { task() });
    }
}

/// Where a transaction reports its outcome.
#[derive(Clone)]
pub struct ResponseLink {
    event_loop: Arc<dyn EventLoop>,
    sink: Arc<dyn ResponseSink>,
}

impl std::fmt::Debug for ResponseLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseLink").finish_non_exhaustive()
    }
}

impl ResponseLink {
    pub fn new(event_loop: Arc<dyn EventLoop>, sink: Arc<dyn ResponseSink>) -> Self {
        Self { event_loop, sink }
    }

    pub(crate) fn sink(&self) -> &Arc<dyn ResponseSink> {
        &self.sink
    }

    /// Run `task` on the event loop.
    pub(crate) fn defer(&self, task: Box<dyn FnOnce() + Send>) {
        self.event_loop.defer(task);
    }

    /// Signal `status` from the event loop, never from the caller's stack.
    pub(crate) fn finish_deferred(&self, status: StorageStatus) {
        let sink = Arc::clone(&self.sink);
        self.event_loop.defer(Box::new(move || sink.signal_done(status)));
    }
}
