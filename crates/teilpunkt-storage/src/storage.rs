//! The registry of storage endpoints.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use parking_lot::RwLock;
use teilpunkt_types::{EndpointId, FileId, Permission, UserId};
use tracing::{info, warn};

use crate::config::StorageConfig;
use crate::endpoint::{EndpointKind, StorageEndpoint, StorageEndpointData};
use crate::error::{ResultStatus, StorageError, StorageResult};
use crate::services::{EventAction, EventContext, Services};
use crate::vfs::DirectorySummary;

/// Owns every endpoint and routes to them by id.
pub struct Storage {
    endpoints: RwLock<BTreeMap<EndpointId, Arc<StorageEndpoint>>>,
    next_id: AtomicU16,
    config: StorageConfig,
    services: Services,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("endpoints", &self.endpoints.read().len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Storage {
    pub fn new(config: StorageConfig, services: Services) -> Self {
        Self {
            endpoints: RwLock::new(BTreeMap::new()),
            next_id: AtomicU16::new(1),
            config,
            services,
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }

    /// Create, materialize and register a new endpoint. Administrators only.
    #[tracing::instrument(skip(self), name = "storage.endpoint_create")]
    pub fn endpoint_create(
        &self,
        actor: UserId,
        name: &str,
        max_size: u64,
        kind: EndpointKind,
    ) -> StorageResult<EndpointId> {
        let result = self.create(actor, name, max_size, kind);
        let endpoint = result.as_ref().copied().unwrap_or(EndpointId::INVALID);
        let context = EventContext::new(actor, endpoint, FileId::INVALID).with_name(name);
        self.record(EventAction::EndpointCreate, &result, context);
        result
    }

    /// Look up an endpoint the actor may read.
    pub fn endpoint_get(
        &self,
        actor: UserId,
        id: EndpointId,
    ) -> StorageResult<Arc<StorageEndpoint>> {
        let result = self.get(id).and_then(|endpoint| {
            if self.services.access.check(actor, endpoint.root_id(), Permission::Read) {
                Ok(endpoint)
            } else {
                Err(StorageError::PermissionDenied)
            }
        });
        let context = EventContext::new(actor, id, FileId::INVALID);
        self.record(EventAction::EndpointGet, &result, context);
        result
    }

    /// Unregister an idle endpoint and remove its directory. Administrators only.
    ///
    /// Handles obtained earlier through [`endpoint_get`](Self::endpoint_get)
    /// fail every operation with `NoSuchEndpoint` afterwards.
    #[tracing::instrument(skip(self), name = "storage.endpoint_delete")]
    pub fn endpoint_delete(&self, actor: UserId, id: EndpointId) -> StorageResult<()> {
        let result = self.delete(actor, id);
        let context = EventContext::new(actor, id, FileId::INVALID);
        self.record(EventAction::EndpointDelete, &result, context);
        result
    }

    /// Root summaries of every endpoint the actor may read, by id.
    pub fn get_roots(&self, actor: UserId) -> Vec<DirectorySummary> {
        let endpoints: Vec<Arc<StorageEndpoint>> =
            self.endpoints.read().values().cloned().collect();
        endpoints
            .iter()
            .filter(|endpoint| {
                self.services.access.check(actor, endpoint.root_id(), Permission::Read)
            })
            .map(|endpoint| endpoint.root())
            .collect()
    }

    fn create(
        &self,
        actor: UserId,
        name: &str,
        max_size: u64,
        kind: EndpointKind,
    ) -> StorageResult<EndpointId> {
        if !self.services.access.is_administrator(actor) {
            return Err(StorageError::PermissionDenied);
        }
        crate::vfs::validate_name(name, self.config.name_max_len)?;

        let raw = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = EndpointId::new(raw);
        if id == EndpointId::INVALID {
            warn!("endpoint id space exhausted");
            return Err(StorageError::Unsuccessful);
        }

        let mut data = StorageEndpointData::new(name, max_size, kind, actor);
        data.endpoint_id = id;
        let endpoint = Arc::new(StorageEndpoint::new(data, &self.config, self.services.clone()));
        endpoint.materialize()?;

        self.endpoints.write().insert(id, endpoint);
        info!(
            endpoint = %id,
            name,
            max_size,
            kind = <&'static str>::from(kind),
            "endpoint created"
        );
        Ok(id)
    }

    fn delete(&self, actor: UserId, id: EndpointId) -> StorageResult<()> {
        if !self.services.access.is_administrator(actor) {
            return Err(StorageError::PermissionDenied);
        }
        let mut endpoints = self.endpoints.write();
        let endpoint = endpoints.get(&id).ok_or(StorageError::NoSuchEndpoint)?;
        if !endpoint.retire() {
            return Err(StorageError::Busy);
        }

        if endpoint.data().kind == EndpointKind::LocalFileSystem {
            let dir = self.config.endpoint_dir(id);
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(
                        endpoint = %id,
                        dir = %dir.display(),
                        error = %e,
                        "could not remove endpoint directory"
                    );
                    endpoint.reinstate();
                    return Err(StorageError::Unsuccessful);
                }
            }
        }
        endpoints.remove(&id);
        info!(endpoint = %id, "endpoint deleted");
        Ok(())
    }

    fn get(&self, id: EndpointId) -> StorageResult<Arc<StorageEndpoint>> {
        self.endpoints.read().get(&id).cloned().ok_or(StorageError::NoSuchEndpoint)
    }

    fn record<T>(&self, action: EventAction, result: &StorageResult<T>, context: EventContext) {
        self.services.events.record(action, result.status(), &context);
    }
}
