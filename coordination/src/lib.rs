//! Team Coordination Library
//!
//! Answers a request with a small team of specialized workers instead of a
//! single one:
//!
//! - Classifies the request's complexity and domains and recommends which
//!   worker types should be on the team
//! - Scores live workers (compatibility, synergy, specialization, past
//!   performance) and assembles a capped team
//! - Dispatches the team concurrently under per-worker and group deadlines,
//!   with health checks, quality gating, retries and fallback responses
//! - Detects conflicts between the answers, resolves them, and scores
//!   consensus
//! - Keeps per-session shared context, aggregate metrics and a bounded
//!   result history, and publishes coordination events
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use team_coordination::{AgentRegistry, CoordinationConfig, CoordinationRequest, Coordinator};
//!
//! let registry = AgentRegistry::new();
//! registry.register_type("data", |id| Arc::new(MyDataWorker::new(id)) as _);
//! registry.create_worker("data")?;
//!
//! let coordinator = Coordinator::new(registry.shared(), CoordinationConfig::from_env()?);
//! let result = coordinator
//!     .coordinate(CoordinationRequest::new("clean this csv").with_capability("pandas"))
//!     .await?;
//! println!("{}", result.primary_response.text);
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod analysis;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod metrics;
pub mod registry;
pub mod session;
pub mod state_machine;
pub mod team;
pub mod types;
pub mod worker;

pub use analysis::{AnalysisReport, ConflictDetector, ConflictResolver, ResponseAnalyzer};
pub use config::{
    ConfigError, ConfigResult, CoordinationConfig, DispatchConfig, HealthConfig, QualityConfig,
    SelectionConfig,
};
pub use coordinator::{Coordinator, SharedCoordinator};
pub use dispatch::{DegradationLevel, DispatchReport, Dispatcher, QualityValidator, WorkerOutcome};
pub use error::{CoordinationError, CoordinatorResult, ResolutionError, RetryCategory, WorkerFailure};
pub use events::{CoordinationEvent, EventBus, EventFilter, FilteredReceiver, SharedEventBus};
pub use metrics::{HistoryEntry, MetricsRecorder, MetricsSnapshot};
pub use registry::{AgentRegistry, SharedAgentRegistry, WorkerConstructor};
pub use session::{SessionContext, SessionManager, SharedSession};
pub use state_machine::{CoordinationPhase, PhaseTracker};
pub use team::{
    AgentSelector, CandidateScore, ComplexityLevel, Lexicon, ScoreBreakdown, SynergyTable,
    TeamComposer, TeamComposition,
};
pub use types::{
    Capability, Conflict, ConflictKind, ConflictSeverity, CoordinationRequest,
    CoordinationResult, ResolutionStrategy, Response, SessionId, WorkerId, WorkerType,
    DEFAULT_SESSION_ID, EMERGENCY_WORKER_ID, FALLBACK_PREFIX, HYBRID_WORKER_ID,
};
pub use worker::{PerformanceRecord, SharedWorker, Worker, WorkerError, WorkerState, WorkerStatus};
