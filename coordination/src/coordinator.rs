//! Team coordinator - caller-facing entry point
//!
//! Owns the registry handle, sessions, team assembly, dispatch, analysis,
//! metrics and the event bus, and drives one request through:
//!
//! ```text
//! validate ─▶ compose ─▶ candidate pool ─▶ score/assemble ─▶ dispatch
//!                                                                │
//!                        ┌──────── usable responses? ────────────┤
//!                        ▼                                       ▼
//!               analyze + resolve                        emergency fallback
//!                        │                                       │
//!                        └────────▶ metrics, history, events ◀───┘
//! ```
//!
//! Only validation and team assembly can fail a call; once a team is
//! dispatched, a [`CoordinationResult`] is always returned.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::analysis::ResponseAnalyzer;
use crate::config::CoordinationConfig;
use crate::dispatch::{fallback, DispatchReport, Dispatcher};
use crate::error::{CoordinationError, CoordinatorResult};
use crate::events::{CoordinationEvent, EventBus, EventFilter, FilteredReceiver, SharedEventBus};
use crate::metrics::{HistoryEntry, MetricsRecorder, MetricsSnapshot};
use crate::registry::SharedAgentRegistry;
use crate::session::{SessionContext, SessionManager};
use crate::state_machine::{CoordinationPhase, PhaseTracker};
use crate::team::{AgentSelector, Lexicon, SynergyTable, TeamComposer, TeamComposition};
use crate::types::{
    Conflict, ConflictKind, ConflictSeverity, CoordinationRequest, CoordinationResult,
    ResolutionStrategy, SessionId, WorkerId, WorkerType,
};
use crate::worker::{SharedWorker, WorkerStatus};

/// Shared reference to a Coordinator
pub type SharedCoordinator = Arc<Coordinator>;

/// Central orchestrator for team coordination
pub struct Coordinator {
    config: CoordinationConfig,
    registry: SharedAgentRegistry,
    sessions: SessionManager,
    lexicon: Arc<Lexicon>,
    composer: TeamComposer,
    selector: AgentSelector,
    dispatcher: Dispatcher,
    analyzer: ResponseAnalyzer,
    metrics: MetricsRecorder,
    events: SharedEventBus,
    shutdown: CancellationToken,
}

impl Coordinator {
    /// Create a coordinator with the built-in keyword and synergy tables
    pub fn new(registry: SharedAgentRegistry, config: CoordinationConfig) -> Self {
        Self::with_tables(registry, config, Lexicon::default(), SynergyTable::default())
    }

    /// Create a coordinator with custom domain/complexity keywords and synergy pairs
    pub fn with_tables(
        registry: SharedAgentRegistry,
        config: CoordinationConfig,
        lexicon: Lexicon,
        synergy: SynergyTable,
    ) -> Self {
        let lexicon = Arc::new(lexicon);
        let events = EventBus::with_capacity(config.event_channel_capacity).shared();

        Self {
            registry,
            sessions: SessionManager::new(),
            composer: TeamComposer::new(lexicon.clone()),
            selector: AgentSelector::new(synergy, config.selection.min_candidate_score),
            dispatcher: Dispatcher::new(&config, lexicon.clone(), events.clone()),
            analyzer: ResponseAnalyzer::new(),
            metrics: MetricsRecorder::new(config.history_capacity),
            lexicon,
            events,
            shutdown: CancellationToken::new(),
            config,
        }
    }

    /// Create a shared reference to this coordinator
    pub fn shared(self) -> SharedCoordinator {
        Arc::new(self)
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    pub fn registry(&self) -> &SharedAgentRegistry {
        &self.registry
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    /// Subscribe to coordination events
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinationEvent> {
        self.events.subscribe()
    }

    /// Subscribe to one session's events, plus the request-scoped
    /// dispatch events that carry no session id.
    pub fn watch_session(&self, session_id: &str) -> FilteredReceiver {
        self.events.subscribe_filtered(EventFilter::for_session(session_id))
    }

    // =========================================================================
    // Session Management
    // =========================================================================

    /// Create a session, or return the existing one with that id.
    pub async fn create_session(
        &self,
        session_id: impl Into<SessionId>,
        notebook_id: Option<&str>,
        cell_id: Option<&str>,
    ) -> SessionContext {
        let mut template = SessionContext::new(session_id);
        if let Some(notebook_id) = notebook_id {
            template = template.with_notebook(notebook_id);
        }
        if let Some(cell_id) = cell_id {
            template = template.with_cell(cell_id);
        }

        let (session, created) = self.sessions.get_or_create(template).await;
        let context = session.lock().await.clone();
        if created {
            self.events.publish(CoordinationEvent::SessionCreated {
                session_id: context.session_id.clone(),
                timestamp: Utc::now(),
            });
        }
        context
    }

    /// Current context of a session
    pub async fn session(&self, session_id: &str) -> Option<SessionContext> {
        self.sessions.snapshot(session_id).await
    }

    /// End a session: shut down and unregister its active workers.
    ///
    /// Returns the number of workers released.
    pub async fn end_session(&self, session_id: &str) -> CoordinatorResult<usize> {
        let context = self
            .sessions
            .remove(session_id)
            .await
            .ok_or_else(|| CoordinationError::SessionNotFound(session_id.to_string()))?;

        let mut released = Vec::new();
        for worker_id in &context.active_workers {
            if let Some(worker) = self.registry.take(worker_id) {
                worker.shutdown().await;
                self.sessions.deactivate_worker(worker_id).await;
                released.push(worker_id.clone());
            }
        }

        info!(
            session_id,
            workers_released = released.len(),
            "Session ended"
        );
        self.events.publish(CoordinationEvent::SessionEnded {
            session_id: session_id.to_string(),
            workers_released: released.len(),
            timestamp: Utc::now(),
        });
        Ok(released.len())
    }

    /// Merge `updates` into the session's context and refresh the cached
    /// context of every active worker. No worker is queried.
    pub async fn broadcast_context_update(
        &self,
        session_id: &str,
        updates: HashMap<String, Value>,
    ) -> CoordinatorResult<SessionContext> {
        let (context, keys) = self.sessions.update(session_id, &updates).await?;

        let workers: Vec<SharedWorker> = context
            .active_workers
            .iter()
            .filter_map(|id| self.registry.get(id))
            .collect();
        futures::future::join_all(workers.iter().map(|w| w.update_context(&context))).await;

        debug!(
            session_id,
            version = context.version,
            keys = ?keys,
            workers_notified = workers.len(),
            "Context update broadcast"
        );
        self.events.publish(CoordinationEvent::ContextUpdated {
            session_id: session_id.to_string(),
            version: context.version,
            keys,
            workers_notified: workers.len(),
            timestamp: Utc::now(),
        });
        Ok(context)
    }

    /// Status of every active worker in the session, keyed by worker id
    pub async fn session_status(
        &self,
        session_id: &str,
    ) -> CoordinatorResult<BTreeMap<WorkerId, WorkerStatus>> {
        let context = self
            .sessions
            .snapshot(session_id)
            .await
            .ok_or_else(|| CoordinationError::SessionNotFound(session_id.to_string()))?;

        Ok(context
            .active_workers
            .iter()
            .filter_map(|id| self.registry.get(id))
            .map(|w| (w.worker_id().to_string(), w.status()))
            .collect())
    }

    // =========================================================================
    // Metrics
    // =========================================================================

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The newest `limit` results, oldest first
    pub fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.metrics.history(limit)
    }

    // =========================================================================
    // Coordination
    // =========================================================================

    /// Coordinate a team answer for `request`.
    pub async fn coordinate(
        &self,
        request: CoordinationRequest,
    ) -> CoordinatorResult<CoordinationResult> {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let mut tracker = PhaseTracker::new(&request_id);

        if let Err(e) = request.validate() {
            return Err(self.fail(&mut tracker, e));
        }

        let session_id = request.session().to_string();
        info!(
            request_id = %request_id,
            session_id = %session_id,
            max_agents = request.max_agents,
            "Coordination started"
        );
        self.create_session(session_id.clone(), None, None).await;

        let composition = self.composer.compose(&request);
        debug!(request_id = %request_id, composition = %composition.summary(), "Team composed");

        let team = match self.select_team(&request, &session_id, &composition).await {
            Ok(team) => team,
            Err(e) => return Err(self.fail(&mut tracker, e)),
        };

        let team_ids: Vec<WorkerId> = team.iter().map(|w| w.worker_id().to_string()).collect();
        let context = match self
            .sessions
            .activate_workers(&session_id, team_ids.iter().cloned())
            .await
        {
            Ok(context) => context,
            Err(e) => return Err(self.fail(&mut tracker, e)),
        };
        for worker in &team {
            if let Err(e) = worker.initialize(&context).await {
                warn!(worker_id = worker.worker_id(), error = %e, "Worker initialization failed");
            }
        }

        step(&mut tracker, CoordinationPhase::TeamSelected, None);
        info!(
            request_id = %request_id,
            complexity = %composition.complexity,
            team = ?team_ids,
            "Team selected"
        );
        self.events.publish(CoordinationEvent::TeamSelected {
            request_id: request_id.clone(),
            session_id: session_id.clone(),
            complexity: composition.complexity,
            workers: team_ids.clone(),
            timestamp: Utc::now(),
        });

        let group_timeout = request
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.dispatch.group_timeout());
        let report = self
            .dispatcher
            .dispatch(
                &request_id,
                &request.query,
                team,
                context,
                group_timeout,
                &self.shutdown,
            )
            .await;
        step(
            &mut tracker,
            CoordinationPhase::Dispatched,
            report.deadline_exceeded.then_some("group deadline exceeded"),
        );

        let analysis = if report.has_usable() {
            self.analyzer.analyze(report.usable_responses())
        } else {
            None
        };

        let result = match analysis {
            Some(analysis) => {
                step(&mut tracker, CoordinationPhase::Analyzed, None);
                step(&mut tracker, CoordinationPhase::Resolved, None);

                let mut conflicts = analysis.conflicts;
                let failed = report.failed_workers();
                if !failed.is_empty() {
                    conflicts.push(Conflict::new(
                        ConflictKind::PartialFailure,
                        failed.clone(),
                        ConflictSeverity::Medium,
                        ResolutionStrategy::ProceedWithAvailable,
                        format!(
                            "{} of {} workers produced no usable response",
                            failed.len(),
                            team_ids.len()
                        ),
                    ));
                }

                let mut supporting = analysis.supporting;
                supporting.extend(report.fallback_responses());

                step(&mut tracker, CoordinationPhase::Returned, None);
                CoordinationResult {
                    request_id: request_id.clone(),
                    session_id: session_id.clone(),
                    primary_response: analysis.primary,
                    supporting_responses: supporting,
                    consensus_score: analysis.consensus_score,
                    conflicts,
                    coordination_time_ms: started.elapsed().as_millis() as u64,
                    phases: tracker.phases(),
                }
            }
            None => {
                step(
                    &mut tracker,
                    CoordinationPhase::EmergencyFallback,
                    Some("no usable responses"),
                );
                self.emergency_result(&request, &request_id, &session_id, &report, &tracker, started)
            }
        };

        self.metrics.record(&result);
        if result.is_emergency() {
            let failed_workers = report.failed_workers();
            error!(
                request_id = %request_id,
                session_id = %session_id,
                failed_workers = ?failed_workers,
                "All workers failed, returning emergency fallback"
            );
            self.events.publish(CoordinationEvent::EmergencyFallback {
                request_id: request_id.clone(),
                session_id: session_id.clone(),
                failed_workers,
                timestamp: Utc::now(),
            });
        } else {
            info!(
                request_id = %request_id,
                primary = %result.primary_response.worker_id,
                consensus = result.consensus_score,
                conflicts = result.conflicts.len(),
                duration_ms = result.coordination_time_ms,
                "Coordination completed"
            );
            self.events.publish(CoordinationEvent::CoordinationCompleted {
                request_id: request_id.clone(),
                session_id: session_id.clone(),
                primary_worker: result.primary_response.worker_id.clone(),
                consensus_score: result.consensus_score,
                conflicts: result.conflicts.len(),
                duration_ms: result.coordination_time_ms,
                timestamp: Utc::now(),
            });
        }

        Ok(result)
    }

    /// Cancel in-flight dispatches and shut down every registered worker.
    pub async fn shutdown(&self) {
        info!("Coordinator shutting down");
        self.shutdown.cancel();
        self.registry.shutdown_all().await;
        info!(summary = %self.metrics.summary_line(), "Coordinator stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Build the candidate pool, score it and assemble the team.
    async fn select_team(
        &self,
        request: &CoordinationRequest,
        session_id: &str,
        composition: &TeamComposition,
    ) -> CoordinatorResult<Vec<SharedWorker>> {
        let no_agents = || CoordinationError::NoSuitableAgents {
            required: request.required_capabilities.clone(),
        };

        let candidates = self.candidate_pool(request, composition);
        if candidates.is_empty() {
            return Err(no_agents());
        }

        let context = self
            .sessions
            .snapshot(session_id)
            .await
            .ok_or_else(|| CoordinationError::SessionNotFound(session_id.to_string()))?;
        let session_team: Vec<(WorkerId, WorkerType)> = context
            .active_workers
            .iter()
            .filter_map(|id| self.registry.get(id))
            .map(|w| (w.worker_id().to_string(), w.worker_type().to_string()))
            .collect();

        let scored = self.selector.score_candidates(
            &request.query,
            &context,
            &candidates,
            composition,
            &session_team,
        );
        let team = self.selector.assemble(scored, composition);
        if team.is_empty() {
            return Err(no_agents());
        }

        for candidate in &team {
            debug!(
                worker_id = candidate.worker_id(),
                score = candidate.score,
                compatibility = candidate.breakdown.compatibility,
                synergy = candidate.breakdown.synergy,
                "Team member"
            );
        }
        Ok(team.into_iter().map(|c| c.worker).collect())
    }

    /// Live workers eligible for the request, ordered by id.
    ///
    /// The union of workers declaring any required capability and the
    /// instances of every recommended type. Empty when required
    /// capabilities match no live worker, whatever the recommendation.
    /// With nothing required and nothing recommended, every live worker.
    fn candidate_pool(
        &self,
        request: &CoordinationRequest,
        composition: &TeamComposition,
    ) -> Vec<SharedWorker> {
        let mut pool: BTreeMap<WorkerId, SharedWorker> = BTreeMap::new();

        if !request.required_capabilities.is_empty() {
            for capability in &request.required_capabilities {
                admit(&mut pool, self.registry.by_capability(capability));
            }
            if pool.is_empty() {
                return Vec::new();
            }
        } else if composition.recommended_types.is_empty() {
            admit(&mut pool, self.registry.workers());
        }

        for worker_type in &composition.recommended_types {
            admit(&mut pool, self.registry.by_type(worker_type));
        }

        pool.into_values().collect()
    }

    fn emergency_result(
        &self,
        request: &CoordinationRequest,
        request_id: &str,
        session_id: &str,
        report: &DispatchReport,
        tracker: &PhaseTracker,
        started: Instant,
    ) -> CoordinationResult {
        let failed = report.failed_workers();
        let description = if report.deadline_exceeded {
            format!(
                "no usable response from {} workers before the group deadline",
                failed.len()
            )
        } else {
            format!("no usable response from {} workers", failed.len())
        };

        CoordinationResult {
            request_id: request_id.to_string(),
            session_id: session_id.to_string(),
            primary_response: fallback::emergency_response(&request.query, &self.lexicon),
            supporting_responses: report.fallback_responses(),
            consensus_score: 0.0,
            conflicts: vec![Conflict::new(
                ConflictKind::CompleteFailure,
                failed,
                ConflictSeverity::High,
                ResolutionStrategy::EmergencyFallback,
                description,
            )],
            coordination_time_ms: started.elapsed().as_millis() as u64,
            phases: tracker.phases(),
        }
    }

    /// Record a call rejected before dispatch and hand the error back.
    fn fail(&self, tracker: &mut PhaseTracker, error: CoordinationError) -> CoordinationError {
        let reason = error.to_string();
        step(tracker, CoordinationPhase::Failed, Some(&reason));
        warn!(error = %error, "Coordination failed");
        self.metrics.record_failure();
        error
    }
}

/// Add the live workers among `workers` to `pool`, keyed by id.
fn admit(pool: &mut BTreeMap<WorkerId, SharedWorker>, workers: Vec<SharedWorker>) {
    for worker in workers.into_iter().filter(|w| w.state().is_active()) {
        pool.entry(worker.worker_id().to_string()).or_insert(worker);
    }
}

fn step(tracker: &mut PhaseTracker, to: CoordinationPhase, reason: Option<&str>) {
    if let Err(e) = tracker.advance(to, reason) {
        error!(error = %e, "Coordination phase out of order");
    }
}
