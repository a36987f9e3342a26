//! Deterministic demo workers
//!
//! A `TemplateWorker` scores a query by keyword overlap with its domain and
//! answers from a fixed per-domain template after a simulated delay.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use team_coordination::team::lexicon::tokenize;
use team_coordination::{
    AgentRegistry, Lexicon, Response, SessionContext, SharedAgentRegistry, SharedWorker, Worker,
    WorkerError, WorkerState,
};

use crate::config::{CliConfig, WorkerSpec};

/// Compatibility every worker starts from
const BASE_COMPATIBILITY: f64 = 0.2;
/// Added per domain keyword or declared capability found in the query
const HIT_WEIGHT: f64 = 0.2;

struct Template {
    text: &'static str,
    suggestions: &'static [&'static str],
    artifacts: &'static [&'static str],
}

fn template(worker_type: &str) -> Template {
    match worker_type {
        "code" => Template {
            text: "Break the change into small functions, give each branch a unit test, \
                   and run the whole suite before refactoring further.",
            suggestions: &["add unit tests for edge cases", "use type hints on public functions"],
            artifacts: &["def solve(items):\n    return sorted(items)"],
        },
        "data" => Template {
            text: "Load the dataset, check column types and missing values first, then \
                   aggregate by the key columns.",
            suggestions: &["remove duplicate rows", "use a categorical dtype for repeated strings"],
            artifacts: &["df = df.drop_duplicates()"],
        },
        "visualization" => Template {
            text: "Start with a simple plot of the raw values, label both axes, and leave \
                   styling for last.",
            suggestions: &["use a colorblind-safe palette"],
            artifacts: &["plt.plot(x, y)"],
        },
        "research" => Template {
            text: "Start from recent review articles, then follow their citations to the \
                   primary studies.",
            suggestions: &["include the publication year in every citation"],
            artifacts: &[],
        },
        _ => Template {
            text: "Here is a general answer based on the request and the session context.",
            suggestions: &[],
            artifacts: &[],
        },
    }
}

/// Demo worker backed by a static answer template
pub struct TemplateWorker {
    state: WorkerState,
    lexicon: Arc<Lexicon>,
    confidence: f64,
    latency: Duration,
}

impl TemplateWorker {
    pub fn new(id: String, spec: &WorkerSpec, lexicon: Arc<Lexicon>) -> Self {
        Self {
            state: WorkerState::new(id, spec.worker_type.clone(), spec.capabilities.clone()),
            lexicon,
            confidence: spec.confidence,
            latency: Duration::from_millis(spec.latency_ms),
        }
    }
}

#[async_trait]
impl Worker for TemplateWorker {
    fn state(&self) -> &WorkerState {
        &self.state
    }

    fn score_query(&self, query: &str, _context: &SessionContext) -> f64 {
        let domain_hits = self
            .lexicon
            .domain_scores(query)
            .get(self.worker_type())
            .copied()
            .unwrap_or(0);
        let capability_hits = tokenize(query)
            .filter(|word| self.state.has_capability(word))
            .count();

        (BASE_COMPATIBILITY + HIT_WEIGHT * (domain_hits + capability_hits) as f64).min(1.0)
    }

    async fn process_query(
        &self,
        _query: &str,
        context: &SessionContext,
    ) -> Result<Response, WorkerError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let template = template(self.worker_type());
        let mut text = template.text.to_string();
        if let Some(language) = &context.language {
            text.push_str(&format!("\nExamples target {}.", language));
        }

        Ok(Response::new(self.worker_id(), self.worker_type(), text, self.confidence)
            .with_capabilities(self.capabilities().to_vec())
            .with_suggestions(template.suggestions.iter().map(|s| s.to_string()).collect())
            .with_artifacts(template.artifacts.iter().map(|s| s.to_string()).collect()))
    }
}

/// Register every configured type and start its instances.
pub fn build_registry(config: &CliConfig, lexicon: Arc<Lexicon>) -> Result<SharedAgentRegistry> {
    let registry = AgentRegistry::new();
    for spec in &config.workers {
        let worker_spec = spec.clone();
        let lexicon = lexicon.clone();
        registry.register_type(spec.worker_type.clone(), move |id| {
            Arc::new(TemplateWorker::new(id, &worker_spec, lexicon.clone())) as SharedWorker
        });
        for _ in 0..spec.instances {
            registry.create_worker(&spec.worker_type)?;
        }
    }
    Ok(registry.shared())
}
