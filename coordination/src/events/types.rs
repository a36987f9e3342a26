//! Event types for team coordination

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::team::ComplexityLevel;
use crate::types::{SessionId, WorkerId, WorkerType};

/// All coordination events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinationEvent {
    /// A new session was created
    SessionCreated {
        session_id: SessionId,
        timestamp: DateTime<Utc>,
    },

    /// A session ended and its workers were released
    SessionEnded {
        session_id: SessionId,
        workers_released: usize,
        timestamp: DateTime<Utc>,
    },

    /// Shared context was updated by a broadcast
    ContextUpdated {
        session_id: SessionId,
        version: u64,
        keys: Vec<String>,
        workers_notified: usize,
        timestamp: DateTime<Utc>,
    },

    /// A team was assembled for a request
    TeamSelected {
        request_id: String,
        session_id: SessionId,
        complexity: ComplexityLevel,
        workers: Vec<WorkerId>,
        timestamp: DateTime<Utc>,
    },

    /// A worker attempt failed and will be retried
    WorkerRetried {
        request_id: String,
        worker_id: WorkerId,
        attempt: u32,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A worker exhausted its retries and was replaced by a fallback
    WorkerFellBack {
        request_id: String,
        worker_id: WorkerId,
        worker_type: WorkerType,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// A coordination call returned normally
    CoordinationCompleted {
        request_id: String,
        session_id: SessionId,
        primary_worker: WorkerId,
        consensus_score: f64,
        conflicts: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A coordination call had no usable responses
    EmergencyFallback {
        request_id: String,
        session_id: SessionId,
        failed_workers: Vec<WorkerId>,
        timestamp: DateTime<Utc>,
    },
}

impl CoordinationEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CoordinationEvent::SessionCreated { timestamp, .. } => *timestamp,
            CoordinationEvent::SessionEnded { timestamp, .. } => *timestamp,
            CoordinationEvent::ContextUpdated { timestamp, .. } => *timestamp,
            CoordinationEvent::TeamSelected { timestamp, .. } => *timestamp,
            CoordinationEvent::WorkerRetried { timestamp, .. } => *timestamp,
            CoordinationEvent::WorkerFellBack { timestamp, .. } => *timestamp,
            CoordinationEvent::CoordinationCompleted { timestamp, .. } => *timestamp,
            CoordinationEvent::EmergencyFallback { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            CoordinationEvent::SessionCreated { .. } => "session_created",
            CoordinationEvent::SessionEnded { .. } => "session_ended",
            CoordinationEvent::ContextUpdated { .. } => "context_updated",
            CoordinationEvent::TeamSelected { .. } => "team_selected",
            CoordinationEvent::WorkerRetried { .. } => "worker_retried",
            CoordinationEvent::WorkerFellBack { .. } => "worker_fell_back",
            CoordinationEvent::CoordinationCompleted { .. } => "coordination_completed",
            CoordinationEvent::EmergencyFallback { .. } => "emergency_fallback",
        }
    }

    /// Get the session ID if this event is session-scoped
    pub fn session_id(&self) -> Option<&str> {
        match self {
            CoordinationEvent::SessionCreated { session_id, .. }
            | CoordinationEvent::SessionEnded { session_id, .. }
            | CoordinationEvent::ContextUpdated { session_id, .. }
            | CoordinationEvent::TeamSelected { session_id, .. }
            | CoordinationEvent::CoordinationCompleted { session_id, .. }
            | CoordinationEvent::EmergencyFallback { session_id, .. } => Some(session_id),
            _ => None,
        }
    }

    /// Get the request ID if this event belongs to one coordination call
    pub fn request_id(&self) -> Option<&str> {
        match self {
            CoordinationEvent::TeamSelected { request_id, .. }
            | CoordinationEvent::WorkerRetried { request_id, .. }
            | CoordinationEvent::WorkerFellBack { request_id, .. }
            | CoordinationEvent::CoordinationCompleted { request_id, .. }
            | CoordinationEvent::EmergencyFallback { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
}
