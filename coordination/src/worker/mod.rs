//! Worker contract
//!
//! A worker is an independently implemented unit that answers part of a
//! query. The coordinator only ever talks to workers through [`Worker`];
//! concrete workers embed a [`WorkerState`] to get lifecycle, cached
//! context and performance bookkeeping for free.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::session::SessionContext;
use crate::types::{Capability, Response, SessionId, WorkerId, WorkerType};

/// Error a worker returns from [`Worker::process_query`].
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker failed: {0}")]
    Failed(String),

    #[error("Worker unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Historical performance of one worker instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub total_queries: u64,
    pub successful_queries: u64,
    /// Running average over successful queries
    pub avg_confidence: f64,
    /// Running average over all queries
    pub avg_latency_ms: f64,
}

impl PerformanceRecord {
    pub fn has_history(&self) -> bool {
        self.total_queries > 0
    }

    /// Success rate (0.0 - 1.0); 1.0 with no history
    pub fn success_rate(&self) -> f64 {
        if self.total_queries == 0 {
            1.0
        } else {
            self.successful_queries as f64 / self.total_queries as f64
        }
    }

    pub fn avg_latency_secs(&self) -> f64 {
        self.avg_latency_ms / 1000.0
    }

    /// Fold one completed query into the running averages.
    /// `confidence` is only meaningful for a success.
    pub fn record(&mut self, success: bool, confidence: Option<f64>, latency_ms: u64) {
        self.total_queries += 1;
        self.avg_latency_ms +=
            (latency_ms as f64 - self.avg_latency_ms) / self.total_queries as f64;

        if success {
            self.successful_queries += 1;
            let confidence = confidence.unwrap_or(0.0).clamp(0.0, 1.0);
            self.avg_confidence +=
                (confidence - self.avg_confidence) / self.successful_queries as f64;
        }
    }
}

/// Point-in-time view of a worker, reported by `session_status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub worker_id: WorkerId,
    pub worker_type: WorkerType,
    pub active: bool,
    pub session_id: Option<SessionId>,
    pub capabilities: Vec<Capability>,
    pub performance: PerformanceRecord,
}

/// Lifecycle and bookkeeping state embedded by concrete workers.
///
/// Interior mutability lets the coordinator update it through `&self`
/// while the worker is shared behind an `Arc`.
#[derive(Debug)]
pub struct WorkerState {
    id: WorkerId,
    worker_type: WorkerType,
    capabilities: Vec<Capability>,
    active: AtomicBool,
    context: Mutex<Option<SessionContext>>,
    performance: Mutex<PerformanceRecord>,
}

impl WorkerState {
    pub fn new(
        id: impl Into<WorkerId>,
        worker_type: impl Into<WorkerType>,
        capabilities: impl IntoIterator<Item = impl Into<Capability>>,
    ) -> Self {
        let mut capabilities: Vec<Capability> = capabilities.into_iter().map(Into::into).collect();
        capabilities.sort();
        capabilities.dedup();

        Self {
            id: id.into(),
            worker_type: worker_type.into(),
            capabilities,
            active: AtomicBool::new(true),
            context: Mutex::new(None),
            performance: Mutex::new(PerformanceRecord::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn worker_type(&self) -> &str {
        &self.worker_type
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Cache `context`. Returns `false` if this session was already attached.
    pub fn attach(&self, context: &SessionContext) -> bool {
        let mut slot = self.context.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh = slot
            .as_ref()
            .map_or(true, |current| current.session_id != context.session_id);
        *slot = Some(context.clone());
        fresh
    }

    pub fn context(&self) -> Option<SessionContext> {
        self.context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has_context(&self) -> bool {
        self.context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| c.session_id.clone())
    }

    pub fn performance(&self) -> PerformanceRecord {
        self.performance
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn record_query(&self, success: bool, confidence: Option<f64>, latency_ms: u64) {
        self.performance
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(success, confidence, latency_ms);
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            worker_id: self.id.clone(),
            worker_type: self.worker_type.clone(),
            active: self.is_active(),
            session_id: self.session_id(),
            capabilities: self.capabilities.clone(),
            performance: self.performance(),
        }
    }
}

/// The contract every worker implements.
///
/// Only [`state`](Worker::state), [`score_query`](Worker::score_query) and
/// [`process_query`](Worker::process_query) are required; the lifecycle
/// hooks default to updating the embedded [`WorkerState`].
#[async_trait]
pub trait Worker: Send + Sync {
    fn state(&self) -> &WorkerState;

    /// Compatibility of this worker with a query (0.0 - 1.0). Must be cheap.
    fn score_query(&self, query: &str, context: &SessionContext) -> f64;

    /// Produce an answer. The dispatcher wraps this in a deadline.
    async fn process_query(
        &self,
        query: &str,
        context: &SessionContext,
    ) -> Result<Response, WorkerError>;

    fn worker_id(&self) -> &str {
        self.state().id()
    }

    fn worker_type(&self) -> &str {
        self.state().worker_type()
    }

    fn capabilities(&self) -> &[Capability] {
        self.state().capabilities()
    }

    /// Bind the worker to a session. Idempotent per session.
    async fn initialize(&self, context: &SessionContext) -> Result<(), WorkerError> {
        if self.state().attach(context) {
            debug!(
                worker_id = self.worker_id(),
                session_id = %context.session_id,
                "Worker initialized"
            );
        }
        Ok(())
    }

    /// Refresh the cached session context after a broadcast.
    async fn update_context(&self, context: &SessionContext) {
        self.state().attach(context);
    }

    async fn shutdown(&self) {
        self.state().deactivate();
        debug!(worker_id = self.worker_id(), "Worker shut down");
    }

    fn status(&self) -> WorkerStatus {
        self.state().status()
    }

    fn performance(&self) -> PerformanceRecord {
        self.state().performance()
    }
}

/// Shared handle to a live worker
pub type SharedWorker = Arc<dyn Worker>;
