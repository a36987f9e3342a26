//! Agent registry: worker types and live worker instances
//!
//! Maps a worker-type name to a constructor, and tracks every live worker
//! by id. The registry is constructed explicitly and injected into the
//! coordinator; concurrent calls may create and remove workers, so both
//! tables sit behind locks that are never held across an await.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CoordinationError, CoordinatorResult};
use crate::worker::SharedWorker;
use crate::types::{WorkerId, WorkerType};

/// Builds a worker for a freshly assigned id
pub type WorkerConstructor = Arc<dyn Fn(WorkerId) -> SharedWorker + Send + Sync>;

/// Shared reference to AgentRegistry
pub type SharedAgentRegistry = Arc<AgentRegistry>;

/// Registry of worker constructors and live worker instances
#[derive(Default)]
pub struct AgentRegistry {
    constructors: RwLock<HashMap<WorkerType, WorkerConstructor>>,
    workers: RwLock<HashMap<WorkerId, SharedWorker>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this registry
    pub fn shared(self) -> SharedAgentRegistry {
        Arc::new(self)
    }

    /// Register (or replace) the constructor for a worker type
    pub fn register_type<F>(&self, worker_type: impl Into<WorkerType>, constructor: F)
    where
        F: Fn(WorkerId) -> SharedWorker + Send + Sync + 'static,
    {
        let worker_type = worker_type.into();
        let replaced = write(&self.constructors)
            .insert(worker_type.clone(), Arc::new(constructor))
            .is_some();
        if replaced {
            warn!(worker_type = %worker_type, "Worker type constructor replaced");
        } else {
            debug!(worker_type = %worker_type, "Worker type registered");
        }
    }

    pub fn has_type(&self, worker_type: &str) -> bool {
        read(&self.constructors).contains_key(worker_type)
    }

    /// Instantiate a worker of a registered type under a new unique id
    pub fn create_worker(&self, worker_type: &str) -> CoordinatorResult<SharedWorker> {
        let constructor = read(&self.constructors)
            .get(worker_type)
            .cloned()
            .ok_or_else(|| CoordinationError::UnknownWorkerType(worker_type.to_string()))?;

        let mut workers = write(&self.workers);
        let worker_id = loop {
            let candidate = new_worker_id(worker_type);
            if !workers.contains_key(&candidate) {
                break candidate;
            }
        };

        let worker = constructor(worker_id.clone());
        if worker.worker_id() != worker_id {
            warn!(
                expected = %worker_id,
                actual = worker.worker_id(),
                "Constructor ignored the assigned worker id"
            );
        }
        workers.insert(worker_id.clone(), worker.clone());
        info!(worker_id = %worker_id, worker_type, "Worker created");
        Ok(worker)
    }

    pub fn get(&self, worker_id: &str) -> Option<SharedWorker> {
        read(&self.workers).get(worker_id).cloned()
    }

    /// Remove a worker and shut it down in the background.
    /// Returns `false` if the id was unknown.
    pub fn remove(&self, worker_id: &str) -> bool {
        let Some(worker) = self.take(worker_id) else {
            return false;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    worker.shutdown().await;
                });
            }
            Err(_) => {
                // No runtime to run the async hook on; mark it inactive directly.
                worker.state().deactivate();
            }
        }
        true
    }

    /// Remove a worker without shutting it down; the caller owns that.
    pub fn take(&self, worker_id: &str) -> Option<SharedWorker> {
        let worker = write(&self.workers).remove(worker_id)?;
        debug!(worker_id, "Worker removed");
        Some(worker)
    }

    /// Live workers declaring `capability`, ordered by id
    pub fn by_capability(&self, capability: &str) -> Vec<SharedWorker> {
        self.filtered(|w| w.state().has_capability(capability))
    }

    /// Live workers of `worker_type`, ordered by id
    pub fn by_type(&self, worker_type: &str) -> Vec<SharedWorker> {
        self.filtered(|w| w.worker_type() == worker_type)
    }

    /// Every live worker, ordered by id
    pub fn workers(&self) -> Vec<SharedWorker> {
        self.filtered(|_| true)
    }

    /// Registered type names, sorted
    pub fn all_types(&self) -> Vec<WorkerType> {
        let mut types: Vec<WorkerType> = read(&self.constructors).keys().cloned().collect();
        types.sort();
        types
    }

    /// Number of live workers
    pub fn len(&self) -> usize {
        read(&self.workers).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.workers).is_empty()
    }

    /// Remove every live worker and await their shutdown hooks.
    pub async fn shutdown_all(&self) {
        let drained: Vec<SharedWorker> = write(&self.workers).drain().map(|(_, w)| w).collect();
        let count = drained.len();
        futures::future::join_all(drained.iter().map(|w| w.shutdown())).await;
        info!(count, "All workers shut down");
    }

    fn filtered(&self, predicate: impl Fn(&SharedWorker) -> bool) -> Vec<SharedWorker> {
        let mut matches: Vec<SharedWorker> = read(&self.workers)
            .values()
            .filter(|w| predicate(w))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.worker_id().cmp(b.worker_id()));
        matches
    }
}

fn new_worker_id(worker_type: &str) -> WorkerId {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}_{}", worker_type, &hex[..8])
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
