//! Coordination phase tracking with legal transition guards.
//!
//! Every coordination call walks this graph:
//!
//! ```text
//! Received → TeamSelected → Dispatched → Analyzed → Resolved → Returned
//!     │                          │
//!     ▼                          ▼
//!   Failed               EmergencyFallback
//! ```
//!
//! `Failed` is only reachable before a team exists (invalid request or no
//! suitable agents). Once dispatched, a call always terminates in either
//! `Returned` or `EmergencyFallback`.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Phases of one coordination call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationPhase {
    /// Request accepted, nothing selected yet.
    Received,
    /// Composer and selector produced a non-empty team.
    TeamSelected,
    /// All dispatch tasks have settled.
    Dispatched,
    /// Primary/supporting split done, conflicts detected.
    Analyzed,
    /// Resolution strategies applied.
    Resolved,
    /// Result handed back; terminal.
    Returned,
    /// No usable responses; emergency result returned; terminal.
    EmergencyFallback,
    /// Validation or team assembly failed; terminal.
    Failed,
}

impl CoordinationPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Returned | Self::EmergencyFallback | Self::Failed)
    }
}

impl fmt::Display for CoordinationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::TeamSelected => write!(f, "team_selected"),
            Self::Dispatched => write!(f, "dispatched"),
            Self::Analyzed => write!(f, "analyzed"),
            Self::Resolved => write!(f, "resolved"),
            Self::Returned => write!(f, "returned"),
            Self::EmergencyFallback => write!(f, "emergency_fallback"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

fn is_legal_transition(from: CoordinationPhase, to: CoordinationPhase) -> bool {
    use CoordinationPhase::*;

    matches!(
        (from, to),
        (Received, TeamSelected)
            | (Received, Failed)
            | (TeamSelected, Dispatched)
            | (Dispatched, Analyzed)
            | (Dispatched, EmergencyFallback)
            | (Analyzed, Resolved)
            | (Resolved, Returned)
    )
}

/// A single recorded phase transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: CoordinationPhase,
    pub to: CoordinationPhase,
    /// Milliseconds since the tracker was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: CoordinationPhase,
    pub to: CoordinationPhase,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal phase transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Tracks the phase of one coordination call.
pub struct PhaseTracker {
    request_id: String,
    current: CoordinationPhase,
    created_at: Instant,
    transitions: Vec<PhaseTransition>,
}

impl PhaseTracker {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            current: CoordinationPhase::Received,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> CoordinationPhase {
        self.current
    }

    /// Move to `to` if the edge exists in the phase graph.
    pub fn advance(
        &mut self,
        to: CoordinationPhase,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(
            request_id = %self.request_id,
            from = %self.current,
            to = %to,
            "Coordination phase transition"
        );

        self.transitions.push(PhaseTransition {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    /// The ordered list of phases visited, starting at `Received`.
    pub fn phases(&self) -> Vec<CoordinationPhase> {
        std::iter::once(CoordinationPhase::Received)
            .chain(self.transitions.iter().map(|t| t.to))
            .collect()
    }
}
