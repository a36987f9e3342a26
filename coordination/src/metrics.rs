//! Aggregate coordination metrics and bounded result history.
//!
//! Shared by every concurrent `coordinate` call, so all state sits behind one
//! mutex and each call updates it exactly once.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CoordinationResult, SessionId, WorkerId};

/// Point-in-time view of the aggregate counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Every call, including ones rejected before a team formed.
    pub total_coordinations: u64,
    /// Calls whose primary response came from a worker.
    pub successful_coordinations: u64,
    /// Calls that ended in the emergency fallback.
    pub emergency_fallbacks: u64,
    /// Running average over calls that produced a result.
    pub average_coordination_time_ms: f64,
    /// Running average of the per-call conflict resolution rate.
    pub average_resolution_rate: f64,
    pub total_conflicts: u64,
}

impl MetricsSnapshot {
    /// Fraction of all calls that succeeded; 0.0 before the first call.
    pub fn success_rate(&self) -> f64 {
        if self.total_coordinations == 0 {
            0.0
        } else {
            self.successful_coordinations as f64 / self.total_coordinations as f64
        }
    }
}

/// Summary of one past coordination result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub request_id: String,
    pub session_id: SessionId,
    pub primary_worker_id: WorkerId,
    pub supporting_worker_ids: Vec<WorkerId>,
    pub consensus_score: f64,
    pub conflict_count: usize,
    pub coordination_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub emergency: bool,
}

impl From<&CoordinationResult> for HistoryEntry {
    fn from(result: &CoordinationResult) -> Self {
        Self {
            request_id: result.request_id.clone(),
            session_id: result.session_id.clone(),
            primary_worker_id: result.primary_response.worker_id.clone(),
            supporting_worker_ids: result
                .supporting_responses
                .iter()
                .map(|r| r.worker_id.clone())
                .collect(),
            consensus_score: result.consensus_score,
            conflict_count: result.conflicts.len(),
            coordination_time_ms: result.coordination_time_ms,
            timestamp: Utc::now(),
            emergency: result.is_emergency(),
        }
    }
}

struct MetricsState {
    snapshot: MetricsSnapshot,
    /// Calls folded into the running averages
    averaged: u64,
    history: VecDeque<HistoryEntry>,
}

/// Thread-safe metrics and history recorder.
pub struct MetricsRecorder {
    capacity: usize,
    state: Mutex<MetricsState>,
}

impl MetricsRecorder {
    /// Create a recorder keeping at most `capacity` history entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(MetricsState {
                snapshot: MetricsSnapshot::default(),
                averaged: 0,
                history: VecDeque::with_capacity(capacity),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fold a finished call into the counters and append it to history.
    pub fn record(&self, result: &CoordinationResult) {
        let entry = HistoryEntry::from(result);
        let resolution_rate = result.resolution_rate();

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.averaged += 1;
        let n = state.averaged as f64;

        let stats = &mut state.snapshot;
        stats.total_coordinations += 1;
        if entry.emergency {
            stats.emergency_fallbacks += 1;
        } else {
            stats.successful_coordinations += 1;
        }
        stats.total_conflicts += entry.conflict_count as u64;
        stats.average_coordination_time_ms +=
            (entry.coordination_time_ms as f64 - stats.average_coordination_time_ms) / n;
        stats.average_resolution_rate +=
            (resolution_rate - stats.average_resolution_rate) / n;

        if state.history.len() >= self.capacity {
            state.history.pop_front();
        }
        state.history.push_back(entry);
    }

    /// Count a call that was rejected before producing a result.
    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.snapshot.total_coordinations += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot
            .clone()
    }

    /// The newest `limit` entries, oldest first.
    pub fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }

    /// Format a summary line for logging.
    pub fn summary_line(&self) -> String {
        let stats = self.snapshot();
        format!(
            "coordinations={}/{} emergency={} avg_time={:.0}ms avg_resolution={:.2} conflicts={}",
            stats.successful_coordinations,
            stats.total_coordinations,
            stats.emergency_fallbacks,
            stats.average_coordination_time_ms,
            stats.average_resolution_rate,
            stats.total_conflicts,
        )
    }
}
