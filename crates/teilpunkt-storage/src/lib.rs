//! # teilpunkt-storage
//!
//! Storage engine for teilpunkt.
//!
//! Users work on a virtual tree of directories and files; the bytes behind
//! each file live elsewhere. The engine:
//! - Keeps one in-memory tree per endpoint, with a quota on every directory
//! - Stores file contents in a datastore (local filesystem or memory), keyed by file id
//! - Pairs tree changes with datastore work in transactions that undo themselves when dropped
//! - Leaves decisions about who may do what to an access-control collaborator
//!
//! Entry point: [`Storage`], the registry of [`StorageEndpoint`]s.

pub mod config;
pub mod datastore;
pub mod endpoint;
pub mod error;
pub mod services;
pub mod storage;
pub mod transaction;
pub mod vfs;

pub use config::{ConfigError, StorageConfig};
pub use datastore::{DataStore, LocalFileSystemDatastore, MemoryDatastore};
pub use endpoint::{EndpointKind, StorageEndpoint, StorageEndpointData};
pub use error::{ResultStatus, StorageError, StorageResult};
pub use services::{
    AccessControl, EventAction, EventContext, EventSink, Services, TracingEventSink, UserDirectory,
};
pub use storage::Storage;
pub use transaction::{
    CreateFileTransaction, EventLoop, ReadFileTransaction, ResponseLink, ResponseSink,
    TokioEventLoop, TransactionState, WriteFileTransaction, WriteOutcome,
};
pub use vfs::{DirectoryEntry, DirectorySummary, VfsError, VirtualFilesystem};

pub use teilpunkt_types::{EndpointId, FileId, Permission, StorageStatus, UserId};
