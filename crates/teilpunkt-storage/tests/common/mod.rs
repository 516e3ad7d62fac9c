//! Collaborator doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use teilpunkt_storage::{
    AccessControl, EventAction, EventContext, EventLoop, EventSink, ResponseSink, Services,
    StorageStatus, UserDirectory, WriteOutcome,
};
use teilpunkt_types::{FileId, Permission, UserId};

pub const ADMIN: UserId = UserId::new(1);
pub const ALICE: UserId = UserId::new(2);

/// Log to the test writer; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Everyone may do everything except the denied `(actor, permission)` pairs.
#[derive(Default)]
pub struct TestAccess {
    denied: Mutex<HashSet<(UserId, Permission)>>,
}

impl TestAccess {
    pub fn deny(&self, actor: UserId, permission: Permission) {
        self.denied.lock().insert((actor, permission));
    }
}

impl AccessControl for TestAccess {
    fn check(&self, actor: UserId, _target: FileId, permission: Permission) -> bool {
        !self.denied.lock().contains(&(actor, permission))
    }

    fn is_administrator(&self, actor: UserId) -> bool {
        actor == ADMIN
    }
}

pub struct TestUsers;

impl UserDirectory for TestUsers {
    fn display_name(&self, user: UserId) -> String {
        match user {
            ADMIN => "admin".to_string(),
            ALICE => "alice".to_string(),
            other => format!("user-{other}"),
        }
    }
}

#[derive(Default)]
pub struct TestEvents {
    pub records: Mutex<Vec<(EventAction, StorageStatus, Option<String>)>>,
}

impl EventSink for TestEvents {
    fn record(&self, action: EventAction, status: StorageStatus, context: &EventContext) {
        self.records.lock().push((action, status, context.name.clone()));
    }
}

pub fn services() -> (Services, Arc<TestAccess>, Arc<TestEvents>) {
    init_tracing();
    let access = Arc::new(TestAccess::default());
    let events = Arc::new(TestEvents::default());
    let services = Services::new(access.clone(), Arc::new(TestUsers)).with_events(events.clone());
    (services, access, events)
}

/// Holds deferred callbacks until `run`.
#[derive(Default)]
pub struct ManualLoop {
    tasks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl ManualLoop {
    pub fn run(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        tasks.into_iter().for_each(|task| task());
    }
}

impl EventLoop for ManualLoop {
    fn defer(&self, task: Box<dyn FnOnce() + Send>) {
        self.tasks.lock().push(task);
    }
}

/// Collects a response body; optionally pushes back after every chunk.
#[derive(Default)]
pub struct Body {
    pub bytes: Mutex<Vec<u8>>,
    pub status: Mutex<Option<StorageStatus>>,
    pub push_back: bool,
}

impl ResponseSink for Body {
    fn write_bytes(&self, data: &[u8]) -> WriteOutcome {
        self.bytes.lock().extend_from_slice(data);
        if self.push_back {
            WriteOutcome::backpressure()
        } else {
            WriteOutcome::ready()
        }
    }

    fn signal_done(&self, status: StorageStatus) {
        *self.status.lock() = Some(status);
    }
}
