//! Concurrent team dispatch
//!
//! One task per worker, all supervised by a group deadline. Each task runs
//! its own cascade:
//!
//! ```text
//! attempt n:  health check ─▶ process_query (worker deadline) ─▶ quality gate
//!                 │                   │                              │
//!                 └──── failure ──────┴──────────────────────────────┘
//!                          │
//!            retriable && n <= max_retries ─▶ sleep(base * n), attempt n+1
//!                          │
//!                          └─▶ fallback response (level = unavailable)
//! ```
//!
//! When the group deadline fires, outstanding tasks are cancelled and the
//! report carries whatever finished. Dispatch itself never fails.

pub mod fallback;
pub mod quality;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CoordinationConfig, DispatchConfig, HealthConfig};
use crate::error::WorkerFailure;
use crate::events::{CoordinationEvent, SharedEventBus};
use crate::session::SessionContext;
use crate::team::Lexicon;
use crate::types::{Response, WorkerId, WorkerType};
use crate::worker::SharedWorker;

pub use quality::QualityValidator;

/// How much of a worker's answer survived the cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    /// First attempt succeeded
    Full,
    /// Succeeded after one or more retries
    Partial,
    /// Retries exhausted; the response is a fallback
    Unavailable,
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Partial => write!(f, "partial"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Result of one worker's cascade
#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    pub worker_id: WorkerId,
    pub worker_type: WorkerType,
    /// Genuine response, or a fallback when `level` is `Unavailable`
    pub response: Response,
    pub level: DegradationLevel,
    pub attempts: u32,
    /// Every failed attempt, in order
    pub failures: Vec<WorkerFailure>,
}

impl WorkerOutcome {
    pub fn is_usable(&self) -> bool {
        self.level != DegradationLevel::Unavailable
    }
}

/// Everything the dispatcher learned about one team
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Settled workers, in team order
    pub outcomes: Vec<WorkerOutcome>,
    /// Workers whose task was cancelled before settling
    pub cancelled: Vec<WorkerId>,
    pub deadline_exceeded: bool,
}

impl DispatchReport {
    /// Genuine responses, in team order
    pub fn usable_responses(&self) -> Vec<Response> {
        self.outcomes
            .iter()
            .filter(|o| o.is_usable())
            .map(|o| o.response.clone())
            .collect()
    }

    /// Fallback responses, in team order
    pub fn fallback_responses(&self) -> Vec<Response> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_usable())
            .map(|o| o.response.clone())
            .collect()
    }

    /// Workers that produced no genuine response, fallbacks first
    pub fn failed_workers(&self) -> Vec<WorkerId> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_usable())
            .map(|o| o.worker_id.clone())
            .chain(self.cancelled.iter().cloned())
            .collect()
    }

    pub fn has_usable(&self) -> bool {
        self.outcomes.iter().any(WorkerOutcome::is_usable)
    }
}

/// Runs a team under the retry / health / quality / fallback cascade
#[derive(Clone)]
pub struct Dispatcher {
    config: DispatchConfig,
    health: HealthConfig,
    validator: QualityValidator,
    lexicon: Arc<Lexicon>,
    events: SharedEventBus,
}

impl Dispatcher {
    pub fn new(config: &CoordinationConfig, lexicon: Arc<Lexicon>, events: SharedEventBus) -> Self {
        Self {
            config: config.dispatch.clone(),
            health: config.health.clone(),
            validator: QualityValidator::new(config.quality.clone()),
            lexicon,
            events,
        }
    }

    /// Dispatch `team` concurrently and wait for every task to settle, the
    /// group deadline to pass, or `cancel` to fire.
    pub async fn dispatch(
        &self,
        request_id: &str,
        query: &str,
        team: Vec<SharedWorker>,
        context: SessionContext,
        group_timeout: Duration,
        cancel: &CancellationToken,
    ) -> DispatchReport {
        let token = cancel.child_token();
        let request_id: Arc<str> = Arc::from(request_id);
        let query: Arc<str> = Arc::from(query);
        let context = Arc::new(context);

        let members: Vec<(WorkerId, WorkerType)> = team
            .iter()
            .map(|w| (w.worker_id().to_string(), w.worker_type().to_string()))
            .collect();

        let mut join_set = JoinSet::new();
        for (index, worker) in team.into_iter().enumerate() {
            let this = self.clone();
            let token = token.clone();
            let request_id = request_id.clone();
            let query = query.clone();
            let context = context.clone();

            join_set.spawn(async move {
                let outcome = tokio::select! {
                    _ = token.cancelled() => None,
                    outcome = this.run_worker(&request_id, &query, worker, &context) => Some(outcome),
                };
                (index, outcome)
            });
        }

        let deadline = Instant::now() + group_timeout;
        let mut slots: Vec<Option<WorkerOutcome>> = members.iter().map(|_| None).collect();
        let mut deadline_exceeded = false;

        loop {
            match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                Ok(Some(Ok((index, Some(outcome))))) => {
                    debug!(
                        worker_id = %outcome.worker_id,
                        level = %outcome.level,
                        attempts = outcome.attempts,
                        "Worker settled"
                    );
                    slots[index] = Some(outcome);
                }
                Ok(Some(Ok((_, None)))) => {}
                Ok(Some(Err(e))) => {
                    warn!(request_id = %request_id, error = %e, "Dispatch task panicked");
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_exceeded = true;
                    let outstanding = join_set.len();
                    warn!(
                        request_id = %request_id,
                        timeout_ms = group_timeout.as_millis() as u64,
                        outstanding,
                        "Group deadline exceeded, cancelling outstanding workers"
                    );
                    token.cancel();
                    join_set.shutdown().await;
                    break;
                }
            }
        }

        let interrupted = deadline_exceeded || token.is_cancelled();
        let mut report = DispatchReport {
            deadline_exceeded,
            ..Default::default()
        };

        for ((worker_id, worker_type), slot) in members.into_iter().zip(slots) {
            match slot {
                Some(outcome) => report.outcomes.push(outcome),
                None if interrupted => report.cancelled.push(worker_id),
                None => {
                    // Task panicked; treat it like an exhausted worker.
                    let failure = WorkerFailure::WorkerError("dispatch task panicked".into());
                    report.outcomes.push(WorkerOutcome {
                        response: fallback::fallback_response(
                            &worker_id,
                            &worker_type,
                            &query,
                            &self.lexicon,
                        ),
                        worker_id,
                        worker_type,
                        level: DegradationLevel::Unavailable,
                        attempts: 1,
                        failures: vec![failure],
                    });
                }
            }
        }

        report
    }

    /// Retry cascade for one worker; always yields an outcome.
    async fn run_worker(
        &self,
        request_id: &str,
        query: &str,
        worker: SharedWorker,
        context: &SessionContext,
    ) -> WorkerOutcome {
        let worker_id = worker.worker_id().to_string();
        let worker_type = worker.worker_type().to_string();
        let max_attempts = self.config.max_attempts();
        let mut failures = Vec::new();

        for attempt in 1..=max_attempts {
            match self.attempt(&worker, query, context).await {
                Ok(response) => {
                    let level = if attempt == 1 {
                        DegradationLevel::Full
                    } else {
                        info!(worker_id = %worker_id, attempt, "Worker recovered after retry");
                        DegradationLevel::Partial
                    };
                    return WorkerOutcome {
                        worker_id,
                        worker_type,
                        response,
                        level,
                        attempts: attempt,
                        failures,
                    };
                }
                Err(failure) => {
                    warn!(
                        worker_id = %worker_id,
                        attempt,
                        category = %failure.retry_category(),
                        error = %failure,
                        "Worker attempt failed"
                    );
                    let retriable = failure.is_retriable();
                    let reason = failure.to_string();
                    failures.push(failure);
                    if !retriable || attempt == max_attempts {
                        break;
                    }

                    self.events.publish(CoordinationEvent::WorkerRetried {
                        request_id: request_id.to_string(),
                        worker_id: worker_id.clone(),
                        attempt,
                        reason,
                        timestamp: Utc::now(),
                    });
                    tokio::time::sleep(self.config.backoff(attempt)).await;
                }
            }
        }

        let attempts = failures.len() as u32;
        warn!(worker_id = %worker_id, attempts, "Worker exhausted retries, using fallback");
        self.events.publish(CoordinationEvent::WorkerFellBack {
            request_id: request_id.to_string(),
            worker_id: worker_id.clone(),
            worker_type: worker_type.clone(),
            attempts,
            timestamp: Utc::now(),
        });

        WorkerOutcome {
            response: fallback::fallback_response(&worker_id, &worker_type, query, &self.lexicon),
            worker_id,
            worker_type,
            level: DegradationLevel::Unavailable,
            attempts,
            failures,
        }
    }

    /// One pass of health check, deadline-bounded query and quality gate.
    async fn attempt(
        &self,
        worker: &SharedWorker,
        query: &str,
        context: &SessionContext,
    ) -> Result<Response, WorkerFailure> {
        self.health_check(worker)?;

        let worker_timeout = self.config.worker_timeout();
        let started = Instant::now();
        let result =
            tokio::time::timeout(worker_timeout, worker.process_query(query, context)).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        let state = worker.state();

        match result {
            Err(_) => {
                state.record_query(false, None, latency_ms);
                Err(WorkerFailure::Timeout(worker_timeout))
            }
            Ok(Err(e)) => {
                state.record_query(false, None, latency_ms);
                Err(WorkerFailure::WorkerError(e.to_string()))
            }
            Ok(Ok(mut response)) => {
                if let Err(reason) = self.validator.validate(&response) {
                    state.record_query(false, None, latency_ms);
                    return Err(WorkerFailure::LowQualityResponse(reason));
                }
                state.record_query(true, Some(response.confidence), latency_ms);

                if response.worker_id != worker.worker_id() {
                    debug!(
                        reported = %response.worker_id,
                        worker_id = worker.worker_id(),
                        "Normalizing response worker id"
                    );
                    response.worker_id = worker.worker_id().to_string();
                }
                response.elapsed_ms = latency_ms;
                Ok(response)
            }
        }
    }

    fn health_check(&self, worker: &SharedWorker) -> Result<(), WorkerFailure> {
        let state = worker.state();
        if !state.is_active() {
            return Err(WorkerFailure::HealthCheckFailed("worker is inactive".into()));
        }
        if !state.has_context() {
            return Err(WorkerFailure::HealthCheckFailed(
                "worker has no session context".into(),
            ));
        }

        let performance = state.performance();
        if performance.total_queries >= self.health.min_queries_for_rate
            && performance.success_rate() < self.health.min_success_rate
        {
            return Err(WorkerFailure::HealthCheckFailed(format!(
                "success rate {:.2} below {:.2} over {} queries",
                performance.success_rate(),
                self.health.min_success_rate,
                performance.total_queries
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::worker::{Worker, WorkerError, WorkerState};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls, then answers.
    struct FlakyWorker {
        state: WorkerState,
        failures: u32,
        calls: AtomicU32,
        delay: Duration,
    }

    impl FlakyWorker {
        fn new(id: &str, failures: u32) -> Self {
            Self {
                state: WorkerState::new(id, "code", ["python"]),
                failures,
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
            }
        }

        fn slow(id: &str, delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(id, 0)
            }
        }
    }

    #[async_trait]
    impl Worker for FlakyWorker {
        fn state(&self) -> &WorkerState {
            &self.state
        }

        fn score_query(&self, _query: &str, _context: &SessionContext) -> f64 {
            0.5
        }

        async fn process_query(
            &self,
            _query: &str,
            _context: &SessionContext,
        ) -> Result<Response, WorkerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if call <= self.failures {
                return Err(WorkerError::Failed(format!("call {} failed", call)));
            }
            Ok(Response::new(
                self.worker_id(),
                self.worker_type(),
                "Use a generator expression to save memory.",
                0.8,
            ))
        }
    }

    fn dispatcher() -> Dispatcher {
        let mut config = CoordinationConfig::default();
        config.dispatch.worker_timeout_ms = 1_000;
        config.dispatch.retry_base_delay_ms = 100;
        Dispatcher::new(
            &config,
            Arc::new(Lexicon::default()),
            EventBus::new().shared(),
        )
    }

    async fn attached(worker: FlakyWorker) -> Arc<FlakyWorker> {
        let worker = Arc::new(worker);
        worker.initialize(&SessionContext::new("s")).await.unwrap();
        worker
    }

    async fn run(
        dispatcher: &Dispatcher,
        team: Vec<SharedWorker>,
        group: Duration,
    ) -> DispatchReport {
        dispatcher
            .dispatch(
                "req",
                "write python code",
                team,
                SessionContext::new("s"),
                group,
                &CancellationToken::new(),
            )
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success_is_full() {
        let worker = attached(FlakyWorker::new("code_a", 0)).await;
        let report = run(
            &dispatcher(),
            vec![worker.clone() as SharedWorker],
            Duration::from_secs(10),
        )
        .await;

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].level, DegradationLevel::Full);
        assert_eq!(report.outcomes[0].attempts, 1);
        assert_eq!(worker.performance().successful_queries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_retry() {
        let worker = attached(FlakyWorker::new("code_a", 1)).await;
        let report = run(
            &dispatcher(),
            vec![worker.clone() as SharedWorker],
            Duration::from_secs(10),
        )
        .await;

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.level, DegradationLevel::Partial);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(worker.performance().total_queries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fall_back() {
        let worker = attached(FlakyWorker::new("code_a", u32::MAX)).await;
        let report = run(
            &dispatcher(),
            vec![worker.clone() as SharedWorker],
            Duration::from_secs(10),
        )
        .await;

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.level, DegradationLevel::Unavailable);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.response.worker_id, "fallback_code_a");
        assert_eq!(worker.calls.load(Ordering::SeqCst), 3);
        assert!(!report.has_usable());
        assert_eq!(report.failed_workers(), vec!["code_a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_context_fails_health_check() {
        let worker = Arc::new(FlakyWorker::new("code_a", 0));
        let report = run(
            &dispatcher(),
            vec![worker.clone() as SharedWorker],
            Duration::from_secs(10),
        )
        .await;

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.level, DegradationLevel::Unavailable);
        assert!(matches!(
            outcome.failures[0],
            WorkerFailure::HealthCheckFailed(_)
        ));
        // Health rejections never reach the worker or its record.
        assert_eq!(worker.calls.load(Ordering::SeqCst), 0);
        assert_eq!(worker.performance().total_queries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_success_rate_fails_health_check() {
        let worker = attached(FlakyWorker::new("code_a", 0)).await;
        for _ in 0..5 {
            worker.state().record_query(false, None, 10);
        }
        let report = run(
            &dispatcher(),
            vec![worker.clone() as SharedWorker],
            Duration::from_secs(10),
        )
        .await;
        assert_eq!(report.outcomes[0].level, DegradationLevel::Unavailable);
        assert_eq!(worker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_deadline_keeps_finished_results() {
        let fast = attached(FlakyWorker::new("code_fast", 0)).await;
        let slow = attached(FlakyWorker::slow("code_slow", Duration::from_millis(900))).await;

        let report = run(
            &dispatcher(),
            vec![fast.clone() as SharedWorker, slow.clone()],
            Duration::from_millis(500),
        )
        .await;

        assert!(report.deadline_exceeded);
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].worker_id, "code_fast");
        assert_eq!(report.cancelled, vec!["code_slow"]);
        assert_eq!(report.failed_workers(), vec!["code_slow"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_stops_dispatch() {
        let slow = attached(FlakyWorker::slow("code_slow", Duration::from_secs(60))).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = dispatcher()
            .dispatch(
                "req",
                "q",
                vec![slow as SharedWorker],
                SessionContext::new("s"),
                Duration::from_secs(120),
                &cancel,
            )
            .await;

        assert!(!report.deadline_exceeded);
        assert_eq!(report.cancelled, vec!["code_slow"]);
    }
}
