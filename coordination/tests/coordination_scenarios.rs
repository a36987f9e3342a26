//! End-to-end coordination scenarios with scripted workers.
//!
//! Covers: composition → selection → dispatch cascade → analysis →
//! resolution → metrics, through the public `Coordinator` API.

mod common;

use std::time::Duration;

use common::{fast_config, register, spawn, Script};
use team_coordination::{
    AgentRegistry, ConflictKind, ConflictSeverity, CoordinationError, CoordinationEvent,
    CoordinationPhase, CoordinationRequest, CoordinationResult, Coordinator, ResolutionStrategy,
    Worker, FALLBACK_PREFIX,
};

fn kinds(result: &CoordinationResult, kind: ConflictKind) -> usize {
    result.conflicts.iter().filter(|c| c.kind == kind).count()
}

// ── Scenario A: single matching worker ─────────────────────────────

#[tokio::test]
async fn test_single_capability_match() {
    let registry = AgentRegistry::new().shared();
    register(&registry, "data", &["pandas", "sql"], Script::answering(0.9));
    register(&registry, "code", &["python"], Script::answering(0.9));
    let data = spawn(&registry, "data", 1);
    spawn(&registry, "code", 2);

    let coordinator = Coordinator::new(registry, fast_config());
    let result = coordinator
        .coordinate(CoordinationRequest::new("clean this csv").with_capability("pandas"))
        .await
        .unwrap();

    assert_eq!(result.primary_response.worker_id, data[0].worker_id());
    assert_eq!(result.primary_response.confidence, 0.9);
    assert!(result.supporting_responses.is_empty());
    assert!(result.conflicts.is_empty());
    assert_eq!(result.consensus_score, 1.0);
    assert_eq!(
        result.phases,
        vec![
            CoordinationPhase::Received,
            CoordinationPhase::TeamSelected,
            CoordinationPhase::Dispatched,
            CoordinationPhase::Analyzed,
            CoordinationPhase::Resolved,
            CoordinationPhase::Returned,
        ]
    );
}

#[tokio::test]
async fn test_unmatched_capability_is_fatal() {
    let registry = AgentRegistry::new().shared();
    register(&registry, "code", &["python"], Script::answering(0.9));
    spawn(&registry, "code", 2);

    let coordinator = Coordinator::new(registry, fast_config());
    let err = coordinator
        .coordinate(
            CoordinationRequest::new("write python code").with_capability("fortran"),
        )
        .await
        .unwrap_err();

    match err {
        CoordinationError::NoSuitableAgents { required } => assert_eq!(required, vec!["fortran"]),
        other => panic!("unexpected error: {other}"),
    }
    let metrics = coordinator.metrics();
    assert_eq!(metrics.total_coordinations, 1);
    assert_eq!(metrics.successful_coordinations, 0);
    assert!(coordinator.history(10).is_empty());
}

// ── Scenario B: contradicting suggestions ──────────────────────────

#[tokio::test]
async fn test_close_suggestion_conflict_is_hybridized() {
    let registry = AgentRegistry::new().shared();
    register(
        &registry,
        "code",
        &["python"],
        Script::answering(0.8).suggestions(&["increase iterations"]),
    );
    register(
        &registry,
        "data",
        &["pandas"],
        Script::answering(0.7).suggestions(&["decrease iterations"]),
    );
    let code = spawn(&registry, "code", 1);
    let data = spawn(&registry, "data", 1);

    let coordinator = Coordinator::new(registry, fast_config());
    let result = coordinator
        .coordinate(CoordinationRequest::new("tune the python code for this data"))
        .await
        .unwrap();

    assert_eq!(result.conflicts.len(), 1);
    let conflict = &result.conflicts[0];
    assert_eq!(conflict.kind, ConflictKind::SuggestionConflict);
    assert_eq!(conflict.severity, ConflictSeverity::Low);
    assert_eq!(conflict.strategy, ResolutionStrategy::HybridApproach);
    assert!(conflict.resolved);

    let primary = &result.primary_response;
    assert_eq!(primary.worker_id, "hybrid");
    assert!(primary.text.contains(&format!("### code ({})", code[0].worker_id())));
    assert!(primary.text.contains(&format!("### data ({})", data[0].worker_id())));
    assert_eq!(primary.suggestions.len(), 2);
    assert!((primary.confidence - 0.75).abs() < 1e-9);
    assert_eq!(result.supporting_responses.len(), 2);
    assert_eq!(result.resolution_rate(), 1.0);
}

#[tokio::test]
async fn test_wide_gap_suggestion_conflict_favors_agent() {
    let registry = AgentRegistry::new().shared();
    register(
        &registry,
        "code",
        &["python"],
        Script::answering(0.6).suggestions(&["increase iterations"]),
    );
    register(
        &registry,
        "data",
        &["pandas"],
        Script::answering(0.85).suggestions(&["decrease iterations"]),
    );
    spawn(&registry, "code", 1);
    let data = spawn(&registry, "data", 1);

    let coordinator = Coordinator::new(registry, fast_config());
    let result = coordinator
        .coordinate(CoordinationRequest::new("tune the python code for this data"))
        .await
        .unwrap();

    assert_eq!(kinds(&result, ConflictKind::SuggestionConflict), 1);
    assert_eq!(
        result.conflicts[0].strategy,
        ResolutionStrategy::FavorAgent(data[0].worker_id().to_string())
    );
    assert_eq!(
        result.conflicts[0].strategy.to_string(),
        format!("favor_agent_{}", data[0].worker_id())
    );
    assert_eq!(result.primary_response.worker_id, data[0].worker_id());
}

// ── Contradicting artifacts ────────────────────────────────────────

#[tokio::test]
async fn test_equal_artifact_conflict_combines_into_primary() {
    let registry = AgentRegistry::new().shared();
    register(
        &registry,
        "code",
        &["python"],
        Script::answering(0.8).artifacts(&["DEBUG = True"]),
    );
    register(
        &registry,
        "data",
        &["pandas"],
        Script::answering(0.8).artifacts(&["DEBUG = False"]),
    );
    spawn(&registry, "code", 1);
    spawn(&registry, "data", 1);

    let coordinator = Coordinator::new(registry, fast_config());
    let result = coordinator
        .coordinate(CoordinationRequest::new("write python code for this data"))
        .await
        .unwrap();

    assert_eq!(result.conflicts.len(), 1);
    let conflict = &result.conflicts[0];
    assert_eq!(conflict.kind, ConflictKind::ArtifactConflict);
    assert_eq!(conflict.severity, ConflictSeverity::Low);
    assert_eq!(conflict.strategy, ResolutionStrategy::CombineApproaches);
    assert!(conflict.resolved);

    let primary = &result.primary_response;
    assert_ne!(primary.worker_id, "hybrid");
    assert_eq!(primary.artifacts.len(), 2);
    assert!(primary.artifacts.contains(&"DEBUG = True".to_string()));
    assert!(primary.artifacts.contains(&"DEBUG = False".to_string()));
    assert_eq!(result.supporting_responses.len(), 1);
}

#[tokio::test]
async fn test_artifact_conflict_favors_broader_worker() {
    let registry = AgentRegistry::new().shared();
    register(
        &registry,
        "code",
        &["python", "rust", "testing"],
        Script::answering(0.8).artifacts(&["DEBUG = True"]),
    );
    register(
        &registry,
        "data",
        &["pandas"],
        Script::answering(0.8).artifacts(&["DEBUG = False"]),
    );
    let code = spawn(&registry, "code", 1);
    spawn(&registry, "data", 1);

    let coordinator = Coordinator::new(registry, fast_config());
    let result = coordinator
        .coordinate(CoordinationRequest::new("write python code for this data"))
        .await
        .unwrap();

    assert_eq!(kinds(&result, ConflictKind::ArtifactConflict), 1);
    let conflict = &result.conflicts[0];
    assert_eq!(
        conflict.strategy,
        ResolutionStrategy::FavorAgent(code[0].worker_id().to_string())
    );
    assert!(conflict.resolved);
    assert_eq!(result.primary_response.worker_id, code[0].worker_id());
    assert_eq!(result.primary_response.artifacts, vec!["DEBUG = True"]);
}

// ── Capability and recommended-type union ──────────────────────────

#[tokio::test]
async fn test_recommended_type_joins_capability_candidates() {
    let registry = AgentRegistry::new().shared();
    register(&registry, "code", &["python"], Script::answering(0.8));
    register(&registry, "visualization", &["matplotlib"], Script::answering(0.8));
    let code = spawn(&registry, "code", 1);
    let viz = spawn(&registry, "visualization", 1);

    let coordinator = Coordinator::new(registry, fast_config());
    let result = coordinator
        .coordinate(
            CoordinationRequest::new("plot a chart histogram of this")
                .with_capability("python")
                .with_max_agents(2),
        )
        .await
        .unwrap();

    let mut ids: Vec<&str> = result.all_responses().map(|r| r.worker_id.as_str()).collect();
    ids.sort();
    let mut expected = vec![code[0].worker_id(), viz[0].worker_id()];
    expected.sort();
    assert_eq!(ids, expected);
}

// ── Out-of-range confidence ────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_nan_confidence_is_rejected_and_consensus_stays_finite() {
    let registry = AgentRegistry::new().shared();
    register(&registry, "code", &["python"], Script::answering(0.8));
    let broken = Script::answering(f64::NAN);
    register(&registry, "data", &["pandas"], broken.clone());
    let code = spawn(&registry, "code", 1);
    let data = spawn(&registry, "data", 1);

    let coordinator = Coordinator::new(registry, fast_config());
    let result = coordinator
        .coordinate(CoordinationRequest::new("write python code for this data"))
        .await
        .unwrap();

    // Rejected on every attempt, then replaced by its fallback.
    assert_eq!(broken.calls(), 3);
    assert_eq!(result.primary_response.worker_id, code[0].worker_id());
    assert_eq!(result.consensus_score, 1.0);
    let fallback_id = format!("{}{}", FALLBACK_PREFIX, data[0].worker_id());
    assert!(result
        .supporting_responses
        .iter()
        .any(|r| r.worker_id == fallback_id));
    assert!(result
        .all_responses()
        .all(|r| (0.0..=1.0).contains(&r.confidence)));
}

// ── Scenario C: worker past its deadline ───────────────────────────

#[tokio::test(start_paused = true)]
async fn test_slow_worker_falls_back_after_two_retries() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
    let registry = AgentRegistry::new().shared();
    let slow = Script::sleeping(Duration::from_secs(5)).compatibility(0.9);
    register(&registry, "code", &["python"], Script::answering(0.8));
    register(&registry, "slowcode", &["python"], slow.clone());
    let fast = spawn(&registry, "code", 1);
    let sleeper = spawn(&registry, "slowcode", 1);

    let coordinator = Coordinator::new(registry, fast_config());
    let mut events = coordinator.subscribe();
    let result = coordinator
        .coordinate(CoordinationRequest::new("write python code").with_capability("python"))
        .await
        .unwrap();

    assert_eq!(slow.calls(), 3);
    assert_eq!(result.primary_response.worker_id, fast[0].worker_id());

    let fallback_id = format!("{}{}", FALLBACK_PREFIX, sleeper[0].worker_id());
    let fallback = result
        .supporting_responses
        .iter()
        .find(|r| r.worker_id == fallback_id)
        .expect("fallback response present");
    assert_eq!(fallback.confidence, 0.1);

    assert_eq!(kinds(&result, ConflictKind::PartialFailure), 1);
    let partial = result.conflicts.last().unwrap();
    assert_eq!(partial.severity, ConflictSeverity::Medium);
    assert_eq!(partial.strategy, ResolutionStrategy::ProceedWithAvailable);
    assert!(!partial.resolved);
    assert_eq!(partial.workers, vec![sleeper[0].worker_id().to_string()]);

    let mut retries = 0;
    let mut fell_back = None;
    while let Ok(event) = events.try_recv() {
        match event {
            CoordinationEvent::WorkerRetried { .. } => retries += 1,
            CoordinationEvent::WorkerFellBack { attempts, .. } => fell_back = Some(attempts),
            _ => {}
        }
    }
    assert_eq!(retries, 2);
    assert_eq!(fell_back, Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_group_deadline_keeps_finished_answers() {
    let registry = AgentRegistry::new().shared();
    register(&registry, "code", &["python"], Script::answering(0.8));
    register(
        &registry,
        "slowcode",
        &["python"],
        Script::sleeping(Duration::from_secs(60)),
    );
    let fast = spawn(&registry, "code", 1);
    let sleeper = spawn(&registry, "slowcode", 1);

    let mut config = fast_config();
    config.dispatch.worker_timeout_ms = 120_000;
    let coordinator = Coordinator::new(registry, config);
    let result = coordinator
        .coordinate(
            CoordinationRequest::new("write python code")
                .with_capability("python")
                .with_timeout_ms(500),
        )
        .await
        .unwrap();

    assert_eq!(result.primary_response.worker_id, fast[0].worker_id());
    let partial = result
        .conflicts
        .iter()
        .find(|c| c.kind == ConflictKind::PartialFailure)
        .unwrap();
    assert_eq!(partial.workers, vec![sleeper[0].worker_id().to_string()]);
}

// ── Scenario D: every worker fails ─────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_total_failure_returns_emergency_result() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
    let registry = AgentRegistry::new().shared();
    register(&registry, "code", &["python"], Script::failing());
    let workers = spawn(&registry, "code", 2);

    let coordinator = Coordinator::new(registry, fast_config());
    let mut events = coordinator.subscribe();
    let result = coordinator
        .coordinate(CoordinationRequest::new("debug my python function"))
        .await
        .unwrap();

    assert!(result.is_emergency());
    assert_eq!(result.primary_response.worker_id, "emergency_fallback");
    assert_eq!(result.primary_response.confidence, 0.05);
    assert_eq!(result.consensus_score, 0.0);
    assert_eq!(result.conflicts.len(), 1);

    let conflict = &result.conflicts[0];
    assert_eq!(conflict.kind, ConflictKind::CompleteFailure);
    assert_eq!(conflict.severity, ConflictSeverity::High);
    assert_eq!(conflict.strategy, ResolutionStrategy::EmergencyFallback);
    assert!(!conflict.resolved);
    assert_eq!(conflict.workers.len(), 2);

    assert_eq!(result.supporting_responses.len(), workers.len());
    assert!(result.supporting_responses.iter().all(|r| r.is_fallback()));
    assert_eq!(
        result.phases.last().copied(),
        Some(CoordinationPhase::EmergencyFallback)
    );

    let metrics = coordinator.metrics();
    assert_eq!(metrics.total_coordinations, 1);
    assert_eq!(metrics.emergency_fallbacks, 1);
    assert_eq!(metrics.successful_coordinations, 0);

    let mut saw_emergency = false;
    while let Ok(event) = events.try_recv() {
        if let CoordinationEvent::EmergencyFallback { failed_workers, .. } = event {
            assert_eq!(failed_workers.len(), 2);
            saw_emergency = true;
        }
    }
    assert!(saw_emergency);
}

// ── Team size and diversity ────────────────────────────────────────

#[tokio::test]
async fn test_team_never_exceeds_cap() {
    let registry = AgentRegistry::new().shared();
    register(&registry, "code", &["python"], Script::answering(0.8));
    spawn(&registry, "code", 5);
    let coordinator = Coordinator::new(registry, fast_config());

    // Low complexity caps at two regardless of max_agents.
    let result = coordinator
        .coordinate(CoordinationRequest::new("write python code").with_max_agents(4))
        .await
        .unwrap();
    assert_eq!(result.all_responses().count(), 2);

    let result = coordinator
        .coordinate(CoordinationRequest::new("write python code").with_max_agents(1))
        .await
        .unwrap();
    assert_eq!(result.all_responses().count(), 1);
}

#[tokio::test]
async fn test_high_complexity_covers_every_recommended_type() {
    let registry = AgentRegistry::new().shared();
    register(
        &registry,
        "code",
        &["python", "rust", "testing", "profiling"],
        Script::answering(0.8).compatibility(0.95),
    );
    register(
        &registry,
        "data",
        &["pandas"],
        Script::answering(0.8).compatibility(0.2),
    );
    register(
        &registry,
        "visualization",
        &["matplotlib"],
        Script::answering(0.8).compatibility(0.2),
    );
    spawn(&registry, "code", 3);
    spawn(&registry, "data", 1);
    spawn(&registry, "visualization", 1);

    let coordinator = Coordinator::new(registry, fast_config());
    let mut events = coordinator.subscribe();
    let result = coordinator
        .coordinate(
            CoordinationRequest::new(
                "optimize a complex distributed pipeline in python code and plot the data",
            )
            .with_max_agents(4),
        )
        .await
        .unwrap();

    let types: Vec<&str> = result
        .all_responses()
        .map(|r| r.worker_type.as_str())
        .collect();
    assert_eq!(types.len(), 4);
    assert!(types.contains(&"data"));
    assert!(types.contains(&"visualization"));
    assert_eq!(types.iter().filter(|t| **t == "code").count(), 2);

    let mut saw_team = false;
    while let Ok(event) = events.try_recv() {
        if let CoordinationEvent::TeamSelected {
            complexity,
            workers,
            ..
        } = event
        {
            assert_eq!(complexity.to_string(), "high");
            assert_eq!(workers.len(), 4);
            saw_team = true;
        }
    }
    assert!(saw_team);
}

// ── Metrics and history ────────────────────────────────────────────

#[tokio::test]
async fn test_metrics_and_history_accumulate() {
    let registry = AgentRegistry::new().shared();
    register(&registry, "code", &["python"], Script::answering(0.8));
    spawn(&registry, "code", 1);
    let coordinator = Coordinator::new(registry, fast_config());

    let mut request_ids = Vec::new();
    for query in ["write python code", "debug this function", "refactor the class"] {
        let result = coordinator
            .coordinate(CoordinationRequest::new(query))
            .await
            .unwrap();
        request_ids.push(result.request_id);
    }
    let _ = coordinator
        .coordinate(CoordinationRequest::new("write code").with_max_agents(0))
        .await
        .unwrap_err();

    let metrics = coordinator.metrics();
    assert_eq!(metrics.total_coordinations, 4);
    assert_eq!(metrics.successful_coordinations, 3);
    assert_eq!(metrics.average_resolution_rate, 1.0);

    let history = coordinator.history(2);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].request_id, request_ids[1]);
    assert_eq!(history[1].request_id, request_ids[2]);
    assert!(!history[1].emergency);
    assert_eq!(history[1].conflict_count, 0);
}

#[tokio::test]
async fn test_shutdown_releases_workers() {
    let registry = AgentRegistry::new().shared();
    register(&registry, "code", &["python"], Script::answering(0.8));
    let workers = spawn(&registry, "code", 2);
    let coordinator = Coordinator::new(registry, fast_config());

    coordinator.shutdown().await;

    assert!(coordinator.is_shut_down());
    assert!(coordinator.registry().is_empty());
    assert!(workers.iter().all(|w| !w.state().is_active()));

    let err = coordinator
        .coordinate(CoordinationRequest::new("write python code"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinationError::NoSuitableAgents { .. }));
}
