//! Core data model for team coordination
//!
//! Requests come in, a [`CoordinationResult`] always goes out: even when
//! every worker fails, the primary response is a synthesized emergency
//! fallback rather than an error.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoordinationError, CoordinatorResult};
use crate::state_machine::CoordinationPhase;

/// Unique identifier for a live worker instance
pub type WorkerId = String;

/// Registered worker type name (e.g. `"data"`)
pub type WorkerType = String;

/// Capability tag a worker declares
pub type Capability = String;

/// Unique identifier for a coordination session
pub type SessionId = String;

/// Session used when a request does not name one
pub const DEFAULT_SESSION_ID: &str = "default";

/// Prefix on the worker id of a per-worker fallback response
pub const FALLBACK_PREFIX: &str = "fallback_";

/// Worker id of the team-level emergency fallback response
pub const EMERGENCY_WORKER_ID: &str = "emergency_fallback";

/// Worker id of a response synthesized by `hybrid_approach`
pub const HYBRID_WORKER_ID: &str = "hybrid";

/// A request for a team answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationRequest {
    /// The user's query text
    pub query: String,
    /// Capabilities at least one team member must declare
    #[serde(default)]
    pub required_capabilities: Vec<Capability>,
    /// Worker types the caller would like on the team, in order
    #[serde(default)]
    pub preferred_types: Vec<WorkerType>,
    /// Upper bound on team size (>= 1)
    pub max_agents: usize,
    /// Overrides the configured group deadline
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Session to coordinate within; created on first use
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

impl CoordinationRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            required_capabilities: Vec::new(),
            preferred_types: Vec::new(),
            max_agents: 3,
            timeout_ms: None,
            session_id: None,
        }
    }

    pub fn with_capability(mut self, capability: impl Into<Capability>) -> Self {
        let capability = capability.into();
        if !self.required_capabilities.contains(&capability) {
            self.required_capabilities.push(capability);
        }
        self
    }

    pub fn with_preferred_type(mut self, worker_type: impl Into<WorkerType>) -> Self {
        let worker_type = worker_type.into();
        if !self.preferred_types.contains(&worker_type) {
            self.preferred_types.push(worker_type);
        }
        self
    }

    pub fn with_max_agents(mut self, max_agents: usize) -> Self {
        self.max_agents = max_agents;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Session id this request runs under
    pub fn session(&self) -> &str {
        self.session_id.as_deref().unwrap_or(DEFAULT_SESSION_ID)
    }

    /// Reject requests that cannot be coordinated at all.
    pub fn validate(&self) -> CoordinatorResult<()> {
        if self.max_agents == 0 {
            return Err(CoordinationError::InvalidRequest(
                "max_agents must be at least 1".to_string(),
            ));
        }
        if self.query.trim().is_empty() {
            return Err(CoordinationError::InvalidRequest(
                "query must not be empty".to_string(),
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(CoordinationError::InvalidRequest(
                "timeout_ms must be positive".to_string(),
            ));
        }
        if matches!(&self.session_id, Some(id) if id.trim().is_empty()) {
            return Err(CoordinationError::InvalidRequest(
                "session_id must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

/// One worker's answer. Immutable once returned to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub worker_id: WorkerId,
    pub worker_type: WorkerType,
    pub text: String,
    /// Self-reported confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Capabilities the worker used to answer
    pub capabilities_used: Vec<Capability>,
    pub suggestions: Vec<String>,
    /// Code or text artifacts
    pub artifacts: Vec<String>,
    pub elapsed_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl Response {
    pub fn new(
        worker_id: impl Into<WorkerId>,
        worker_type: impl Into<WorkerType>,
        text: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            worker_type: worker_type.into(),
            text: text.into(),
            // NaN reads as no confidence at all
            confidence: if confidence.is_nan() {
                0.0
            } else {
                confidence.clamp(0.0, 1.0)
            },
            capabilities_used: Vec::new(),
            suggestions: Vec::new(),
            artifacts: Vec::new(),
            elapsed_ms: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities_used = capabilities;
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    /// Whether this is a synthesized per-worker fallback
    pub fn is_fallback(&self) -> bool {
        self.worker_id.starts_with(FALLBACK_PREFIX)
    }

    /// Whether this is the team-level emergency fallback
    pub fn is_emergency(&self) -> bool {
        self.worker_id == EMERGENCY_WORKER_ID
    }
}

/// What kind of disagreement or failure a conflict records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    SuggestionConflict,
    ArtifactConflict,
    ConfidenceDivergence,
    PartialFailure,
    CompleteFailure,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SuggestionConflict => write!(f, "suggestion_conflict"),
            Self::ArtifactConflict => write!(f, "artifact_conflict"),
            Self::ConfidenceDivergence => write!(f, "confidence_divergence"),
            Self::PartialFailure => write!(f, "partial_failure"),
            Self::CompleteFailure => write!(f, "complete_failure"),
        }
    }
}

/// Conflict severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    None,
    Low,
    Medium,
    High,
}

impl ConflictSeverity {
    /// Severity from the number of contradicting item pairs:
    /// 0 none, 1 low, 2-3 medium, more high.
    pub fn from_count(count: usize) -> Self {
        match count {
            0 => Self::None,
            1 => Self::Low,
            2 | 3 => Self::Medium,
            _ => Self::High,
        }
    }
}

impl fmt::Display for ConflictSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// How a conflict is (to be) resolved.
///
/// Serialized as its tag string, e.g. `favor_agent_data_1a2b3c4d`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ResolutionStrategy {
    /// Promote this worker's response to primary
    FavorAgent(WorkerId),
    /// Synthesize a merged primary from the contributing responses
    HybridApproach,
    /// Union artifacts and suggestions into the current primary
    CombineApproaches,
    /// Promote whichever side of the pair is more confident
    FavorHigherConfidence,
    /// Keep the answers that did arrive
    ProceedWithAvailable,
    /// Nothing to resolve with
    EmergencyFallback,
    /// A tag this version does not know
    Other(String),
}

const FAVOR_AGENT_PREFIX: &str = "favor_agent_";

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FavorAgent(id) => write!(f, "{}{}", FAVOR_AGENT_PREFIX, id),
            Self::HybridApproach => write!(f, "hybrid_approach"),
            Self::CombineApproaches => write!(f, "combine_approaches"),
            Self::FavorHigherConfidence => write!(f, "favor_higher_confidence"),
            Self::ProceedWithAvailable => write!(f, "proceed_with_available"),
            Self::EmergencyFallback => write!(f, "emergency_fallback"),
            Self::Other(tag) => write!(f, "{}", tag),
        }
    }
}

impl From<ResolutionStrategy> for String {
    fn from(strategy: ResolutionStrategy) -> Self {
        strategy.to_string()
    }
}

impl From<String> for ResolutionStrategy {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "hybrid_approach" => Self::HybridApproach,
            "combine_approaches" => Self::CombineApproaches,
            "favor_higher_confidence" => Self::FavorHigherConfidence,
            "proceed_with_available" => Self::ProceedWithAvailable,
            "emergency_fallback" => Self::EmergencyFallback,
            _ => match tag.strip_prefix(FAVOR_AGENT_PREFIX) {
                Some(id) if !id.is_empty() => Self::FavorAgent(id.to_string()),
                _ => Self::Other(tag),
            },
        }
    }
}

/// A detected disagreement between responses, or a team failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    /// The two workers of a pairwise conflict, or the failed workers
    pub workers: Vec<WorkerId>,
    pub severity: ConflictSeverity,
    pub strategy: ResolutionStrategy,
    pub resolved: bool,
    /// Human-readable detail (the contradicting items, the gap, ...)
    pub description: String,
    /// Set when applying the strategy failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_error: Option<String>,
}

impl Conflict {
    pub fn new(
        kind: ConflictKind,
        workers: Vec<WorkerId>,
        severity: ConflictSeverity,
        strategy: ResolutionStrategy,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            workers,
            severity,
            strategy,
            resolved: false,
            description: description.into(),
            resolution_error: None,
        }
    }
}

/// The single answer returned for every coordinated request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationResult {
    pub request_id: String,
    pub session_id: SessionId,
    /// Never absent; the emergency fallback under total failure
    pub primary_response: Response,
    /// Remaining genuine responses by confidence, then fallbacks
    pub supporting_responses: Vec<Response>,
    /// Agreement of the team (0.0 - 1.0)
    pub consensus_score: f64,
    pub conflicts: Vec<Conflict>,
    pub coordination_time_ms: u64,
    /// Phases this call passed through, in order
    pub phases: Vec<CoordinationPhase>,
}

impl CoordinationResult {
    /// Whether the call ended in the emergency fallback path
    pub fn is_emergency(&self) -> bool {
        self.primary_response.is_emergency()
    }

    /// Fraction of conflicts that were resolved; 1.0 with no conflicts
    pub fn resolution_rate(&self) -> f64 {
        if self.conflicts.is_empty() {
            return 1.0;
        }
        let resolved = self.conflicts.iter().filter(|c| c.resolved).count();
        resolved as f64 / self.conflicts.len() as f64
    }

    /// Every response in this result, primary first
    pub fn all_responses(&self) -> impl Iterator<Item = &Response> {
        std::iter::once(&self.primary_response).chain(self.supporting_responses.iter())
    }
}
