//! Coordination sessions
//!
//! A session owns the shared context its workers read while answering:
//! notebook/cell references, an arbitrary key/value bag, and the set of
//! workers currently active on its behalf. Sessions live for the process
//! lifetime only.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{CoordinationError, CoordinatorResult};
use crate::types::{SessionId, WorkerId};

/// Context shared by every worker active in a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: SessionId,
    #[serde(default)]
    pub notebook_id: Option<String>,
    #[serde(default)]
    pub cell_id: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    /// Keys that are not one of the known fields above
    #[serde(default)]
    pub shared_state: BTreeMap<String, Value>,
    #[serde(default)]
    pub active_workers: BTreeSet<WorkerId>,
    /// Incremented on every merged update
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(session_id: impl Into<SessionId>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            notebook_id: None,
            cell_id: None,
            language: None,
            shared_state: BTreeMap::new(),
            active_workers: BTreeSet::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_notebook(mut self, notebook_id: impl Into<String>) -> Self {
        self.notebook_id = Some(notebook_id.into());
        self
    }

    pub fn with_cell(mut self, cell_id: impl Into<String>) -> Self {
        self.cell_id = Some(cell_id.into());
        self
    }

    /// Merge an update map. Known fields are set directly (`null` clears
    /// them); anything else lands in `shared_state`. Returns the keys applied.
    pub fn merge_update(&mut self, updates: &HashMap<String, Value>) -> Vec<String> {
        let mut applied = Vec::with_capacity(updates.len());

        for (key, value) in updates {
            match key.as_str() {
                "session_id" => {
                    warn!(session_id = %self.session_id, "Ignoring attempt to rewrite session id");
                    continue;
                }
                "notebook_id" => self.notebook_id = known_field(value),
                "cell_id" => self.cell_id = known_field(value),
                "language" => self.language = known_field(value),
                _ => {
                    self.shared_state.insert(key.clone(), value.clone());
                }
            }
            applied.push(key.clone());
        }

        applied.sort();
        if !applied.is_empty() {
            self.version += 1;
            self.updated_at = Utc::now();
        }
        applied
    }
}

fn known_field(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Session context behind its own lock; updates to one session are
/// serialized without blocking the others.
pub type SharedSession = Arc<Mutex<SessionContext>>;

/// Keyed store of live sessions
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, SharedSession>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the session, creating it from `template` if absent.
    /// The boolean is `true` when the session was newly created.
    pub async fn get_or_create(&self, template: SessionContext) -> (SharedSession, bool) {
        if let Some(existing) = self.sessions.read().await.get(&template.session_id) {
            return (existing.clone(), false);
        }

        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&template.session_id) {
            return (existing.clone(), false);
        }

        let session_id = template.session_id.clone();
        let shared = Arc::new(Mutex::new(template));
        sessions.insert(session_id.clone(), shared.clone());
        info!(session_id = %session_id, "Session created");
        (shared, true)
    }

    pub async fn get(&self, session_id: &str) -> Option<SharedSession> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Copy of the session's current context
    pub async fn snapshot(&self, session_id: &str) -> Option<SessionContext> {
        let shared = self.get(session_id).await?;
        let context = shared.lock().await;
        Some(context.clone())
    }

    /// Remove a session, returning its final context.
    pub async fn remove(&self, session_id: &str) -> Option<SessionContext> {
        let shared = self.sessions.write().await.remove(session_id)?;
        let context = shared.lock().await.clone();
        debug!(session_id, "Session removed");
        Some(context)
    }

    /// Merge `updates` into the session and return the new context.
    pub async fn update(
        &self,
        session_id: &str,
        updates: &HashMap<String, Value>,
    ) -> CoordinatorResult<(SessionContext, Vec<String>)> {
        let shared = self
            .get(session_id)
            .await
            .ok_or_else(|| CoordinationError::SessionNotFound(session_id.to_string()))?;

        let mut context = shared.lock().await;
        let applied = context.merge_update(updates);
        Ok((context.clone(), applied))
    }

    /// Record workers as active in the session.
    pub async fn activate_workers(
        &self,
        session_id: &str,
        worker_ids: impl IntoIterator<Item = WorkerId>,
    ) -> CoordinatorResult<SessionContext> {
        let shared = self
            .get(session_id)
            .await
            .ok_or_else(|| CoordinationError::SessionNotFound(session_id.to_string()))?;

        let mut context = shared.lock().await;
        context.active_workers.extend(worker_ids);
        Ok(context.clone())
    }

    /// Drop a worker from every session that lists it.
    pub async fn deactivate_worker(&self, worker_id: &str) {
        let sessions: Vec<SharedSession> = self.sessions.read().await.values().cloned().collect();
        for shared in sessions {
            shared.lock().await.active_workers.remove(worker_id);
        }
    }

    pub async fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
