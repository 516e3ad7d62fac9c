//! Collaborators consulted by the engine.
//!
//! The engine does not decide who may do what, does not know user names,
//! and does not own the audit log. Those come in through the traits here,
//! bundled into [`Services`] and handed to [`Storage::new`](crate::Storage::new).

use std::sync::Arc;

use strum::IntoStaticStr;
use teilpunkt_types::{EndpointId, FileId, Permission, StorageStatus, UserId};
use tracing::{error, info, warn};

/// Access-control decisions.
pub trait AccessControl: Send + Sync {
    /// May `actor` perform `permission` on `target`?
    fn check(&self, actor: UserId, target: FileId, permission: Permission) -> bool;

    /// May `actor` create and delete endpoints?
    fn is_administrator(&self, actor: UserId) -> bool;
}

/// Resolves user ids to display names for listings.
pub trait UserDirectory: Send + Sync {
    fn display_name(&self, user: UserId) -> String;
}

/// Fire-and-forget audit sink. Must not block.
pub trait EventSink: Send + Sync {
    fn record(&self, action: EventAction, status: StorageStatus, context: &EventContext);
}

/// What was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum EventAction {
    FileCreate,
    /// An upload was opened; `FileUpload` follows once it ends.
    FileUploadStart,
    FileUpload,
    /// A write was opened; `FileWrite` follows once it ends.
    FileWriteStart,
    FileWrite,
    FileRead,
    FileDelete,
    FileRename,
    FileInfo,
    DirCreate,
    DirDelete,
    DirRename,
    DirGetEntries,
    DirGetInfo,
    EndpointCreate,
    EndpointGet,
    EndpointDelete,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Who did it, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    pub actor: UserId,
    pub endpoint: EndpointId,
    pub target: FileId,
    /// Entry name involved, if any.
    pub name: Option<String>,
}

impl EventContext {
    pub fn new(actor: UserId, endpoint: EndpointId, target: FileId) -> Self {
        Self {
            actor,
            endpoint,
            target,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Renders events as tracing records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, action: EventAction, status: StorageStatus, context: &EventContext) {
        let name = context.name.as_deref().unwrap_or("");
        match status {
            StorageStatus::Ok => info!(
                action = action.as_str(),
                actor = %context.actor,
                endpoint = %context.endpoint,
                target = %context.target,
                name,
                "storage event"
            ),
            StorageStatus::ErrUnsuccessful => error!(
                action = action.as_str(),
                status = status.code(),
                actor = %context.actor,
                endpoint = %context.endpoint,
                target = %context.target,
                name,
                "storage operation failed"
            ),
            _ => warn!(
                action = action.as_str(),
                status = status.code(),
                actor = %context.actor,
                endpoint = %context.endpoint,
                target = %context.target,
                name,
                "storage operation rejected"
            ),
        }
    }
}

/// The collaborators an engine instance runs with.
#[derive(Clone)]
pub struct Services {
    pub access: Arc<dyn AccessControl>,
    pub users: Arc<dyn UserDirectory>,
    pub events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

impl Services {
    /// Services logging events through tracing.
    pub fn new(access: Arc<dyn AccessControl>, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            access,
            users,
            events: Arc::new(TracingEventSink),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }
}
