//! Scripted workers shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use team_coordination::{
    AgentRegistry, CoordinationConfig, Response, SessionContext, SharedWorker, Worker,
    WorkerError, WorkerState,
};

/// Behaviour shared by every instance of one registered type.
#[derive(Clone)]
pub struct Script {
    pub compatibility: f64,
    pub confidence: f64,
    pub suggestions: Vec<String>,
    pub artifacts: Vec<String>,
    pub delay: Duration,
    pub fails: bool,
    /// process_query calls across all instances
    pub calls: Arc<AtomicU32>,
}

impl Script {
    pub fn answering(confidence: f64) -> Self {
        Self {
            compatibility: 0.8,
            confidence,
            suggestions: Vec::new(),
            artifacts: Vec::new(),
            delay: Duration::ZERO,
            fails: false,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            fails: true,
            ..Self::answering(0.8)
        }
    }

    pub fn sleeping(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::answering(0.8)
        }
    }

    pub fn compatibility(mut self, compatibility: f64) -> Self {
        self.compatibility = compatibility;
        self
    }

    pub fn suggestions(mut self, suggestions: &[&str]) -> Self {
        self.suggestions = suggestions.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn artifacts(mut self, artifacts: &[&str]) -> Self {
        self.artifacts = artifacts.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

pub struct ScriptedWorker {
    state: WorkerState,
    script: Script,
}

#[async_trait]
impl Worker for ScriptedWorker {
    fn state(&self) -> &WorkerState {
        &self.state
    }

    fn score_query(&self, _query: &str, _context: &SessionContext) -> f64 {
        self.script.compatibility
    }

    async fn process_query(
        &self,
        _query: &str,
        _context: &SessionContext,
    ) -> Result<Response, WorkerError> {
        self.script.calls.fetch_add(1, Ordering::SeqCst);
        if !self.script.delay.is_zero() {
            tokio::time::sleep(self.script.delay).await;
        }
        if self.script.fails {
            return Err(WorkerError::Unavailable("backend offline".to_string()));
        }

        let mut response = Response::new(
            self.worker_id(),
            self.worker_type(),
            format!("Here is a careful answer from the {} worker.", self.worker_type()),
            self.script.confidence,
        )
        .with_capabilities(self.capabilities().to_vec())
        .with_suggestions(self.script.suggestions.clone())
        .with_artifacts(self.script.artifacts.clone());
        // Unclamped, as a careless worker might report it.
        response.confidence = self.script.confidence;
        Ok(response)
    }
}

/// Register `worker_type` so every instance follows `script`.
pub fn register(registry: &AgentRegistry, worker_type: &str, capabilities: &[&str], script: Script) {
    let type_name = worker_type.to_string();
    let capabilities: Vec<String> = capabilities.iter().map(|c| c.to_string()).collect();
    registry.register_type(worker_type, move |id| {
        Arc::new(ScriptedWorker {
            state: WorkerState::new(id, type_name.clone(), capabilities.clone()),
            script: script.clone(),
        }) as SharedWorker
    });
}

/// Create `count` live instances of a registered type.
pub fn spawn(registry: &AgentRegistry, worker_type: &str, count: usize) -> Vec<SharedWorker> {
    (0..count)
        .map(|_| registry.create_worker(worker_type).unwrap())
        .collect()
}

/// Short deadlines so paused-time tests stay readable.
pub fn fast_config() -> CoordinationConfig {
    let mut config = CoordinationConfig::default();
    config.dispatch.worker_timeout_ms = 1_000;
    config.dispatch.retry_base_delay_ms = 100;
    config.dispatch.group_timeout_ms = 10_000;
    config
}
