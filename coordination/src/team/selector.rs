//! Candidate scoring and team assembly
//!
//! Each candidate gets a weighted score:
//!
//! ```text
//! 0.40 * compatibility + 0.20 * synergy + 0.25 * specialization + 0.15 * performance
//! ```
//!
//! HIGH complexity teams take the best candidate of every recommended type
//! before filling by score; everything else fills purely by score.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::composer::{ComplexityLevel, TeamComposition};
use super::lexicon::SynergyTable;
use crate::session::SessionContext;
use crate::worker::{PerformanceRecord, SharedWorker};
use crate::types::{WorkerId, WorkerType};

const COMPATIBILITY_WEIGHT: f64 = 0.40;
const SYNERGY_WEIGHT: f64 = 0.20;
const SPECIALIZATION_WEIGHT: f64 = 0.25;
const PERFORMANCE_WEIGHT: f64 = 0.15;

/// Synergy for a candidate joining an empty team
const NEUTRAL_SYNERGY: f64 = 0.5;
/// Subtracted when the candidate's type is already on the team
const DUPLICATE_TYPE_PENALTY: f64 = 0.40;
/// Latency at or beyond which the latency term bottoms out
const LATENCY_CEILING_SECS: f64 = 5.0;

/// Per-term scores, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub compatibility: f64,
    pub synergy: f64,
    pub specialization: f64,
    pub performance: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        COMPATIBILITY_WEIGHT * self.compatibility
            + SYNERGY_WEIGHT * self.synergy
            + SPECIALIZATION_WEIGHT * self.specialization
            + PERFORMANCE_WEIGHT * self.performance
    }
}

/// A scored candidate worker
#[derive(Clone)]
pub struct CandidateScore {
    pub worker: SharedWorker,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

impl CandidateScore {
    pub fn worker_id(&self) -> &str {
        self.worker.worker_id()
    }

    pub fn worker_type(&self) -> &str {
        self.worker.worker_type()
    }
}

impl std::fmt::Debug for CandidateScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidateScore")
            .field("worker_id", &self.worker_id())
            .field("score", &self.score)
            .field("breakdown", &self.breakdown)
            .finish()
    }
}

/// Scores candidates and assembles the final team
pub struct AgentSelector {
    synergy: SynergyTable,
    min_score: f64,
}

impl AgentSelector {
    pub fn new(synergy: SynergyTable, min_score: f64) -> Self {
        Self { synergy, min_score }
    }

    /// Synergy of `candidate_type` with the types already on the team
    pub fn synergy(&self, candidate_type: &str, team_types: &[WorkerType]) -> f64 {
        if team_types.is_empty() {
            return NEUTRAL_SYNERGY;
        }

        let mut score: f64 = team_types
            .iter()
            .map(|t| self.synergy.bonus(candidate_type, t))
            .sum();
        if team_types.iter().any(|t| t == candidate_type) {
            score -= DUPLICATE_TYPE_PENALTY;
        }
        score.clamp(0.0, 1.0)
    }

    /// Fit of a worker's breadth to the query complexity
    pub fn specialization(capability_count: usize, complexity: ComplexityLevel) -> f64 {
        match complexity {
            ComplexityLevel::High if capability_count >= 4 => 0.8,
            ComplexityLevel::High => 0.6,
            ComplexityLevel::Medium if (2..=4).contains(&capability_count) => 0.7,
            ComplexityLevel::Medium => 0.5,
            ComplexityLevel::Low => 0.5,
        }
    }

    /// Historical performance term; 0.5 without history
    pub fn performance(record: &PerformanceRecord) -> f64 {
        if !record.has_history() {
            return 0.5;
        }
        let latency =
            (LATENCY_CEILING_SECS - record.avg_latency_secs()).max(0.0) / LATENCY_CEILING_SECS;
        (0.4 * record.avg_confidence + 0.3 * latency + 0.3 * record.success_rate()).clamp(0.0, 1.0)
    }

    /// Score every candidate against the query, drop those below the
    /// threshold, and sort best first (ties by id).
    ///
    /// `session_team` is the session's active workers; a candidate never
    /// counts towards its own synergy.
    pub fn score_candidates(
        &self,
        query: &str,
        context: &SessionContext,
        candidates: &[SharedWorker],
        composition: &TeamComposition,
        session_team: &[(WorkerId, WorkerType)],
    ) -> Vec<CandidateScore> {
        let mut scored: Vec<CandidateScore> = candidates
            .iter()
            .map(|worker| {
                let team_types: Vec<WorkerType> = session_team
                    .iter()
                    .filter(|(id, _)| id != worker.worker_id())
                    .map(|(_, t)| t.clone())
                    .collect();

                let compatibility = worker.score_query(query, context);
                let breakdown = ScoreBreakdown {
                    compatibility: if compatibility.is_finite() {
                        compatibility.clamp(0.0, 1.0)
                    } else {
                        0.0
                    },
                    synergy: self.synergy(worker.worker_type(), &team_types),
                    specialization: Self::specialization(
                        worker.capabilities().len(),
                        composition.complexity,
                    ),
                    performance: Self::performance(&worker.performance()),
                };

                CandidateScore {
                    worker: worker.clone(),
                    score: breakdown.total(),
                    breakdown,
                }
            })
            .filter(|candidate| {
                let keep = candidate.score >= self.min_score;
                if !keep {
                    debug!(
                        worker_id = candidate.worker_id(),
                        score = candidate.score,
                        "Candidate below threshold"
                    );
                }
                keep
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.worker_id().cmp(b.worker_id()))
        });
        scored
    }

    /// Pick the team from candidates already sorted best first.
    pub fn assemble(
        &self,
        scored: Vec<CandidateScore>,
        composition: &TeamComposition,
    ) -> Vec<CandidateScore> {
        let cap = composition.team_cap;
        if composition.complexity != ComplexityLevel::High {
            return scored.into_iter().take(cap).collect();
        }

        let mut picked = vec![false; scored.len()];
        let mut team_order: Vec<usize> = Vec::with_capacity(cap);

        // Diversity pass: best candidate of each recommended type.
        for worker_type in &composition.recommended_types {
            if team_order.len() == cap {
                break;
            }
            if let Some(idx) = scored
                .iter()
                .enumerate()
                .position(|(i, c)| !picked[i] && c.worker_type() == worker_type)
            {
                picked[idx] = true;
                team_order.push(idx);
            }
        }

        for idx in 0..scored.len() {
            if team_order.len() == cap {
                break;
            }
            if !picked[idx] {
                picked[idx] = true;
                team_order.push(idx);
            }
        }

        let mut slots: Vec<Option<CandidateScore>> = scored.into_iter().map(Some).collect();
        team_order
            .into_iter()
            .filter_map(|idx| slots[idx].take())
            .collect()
    }
}

impl Default for AgentSelector {
    fn default() -> Self {
        Self::new(SynergyTable::default(), 0.10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Response;
    use crate::worker::{Worker, WorkerError, WorkerState};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct FixedScoreWorker {
        state: WorkerState,
        compatibility: f64,
    }

    #[async_trait]
    impl Worker for FixedScoreWorker {
        fn state(&self) -> &WorkerState {
            &self.state
        }

        fn score_query(&self, _query: &str, _context: &SessionContext) -> f64 {
            self.compatibility
        }

        async fn process_query(
            &self,
            query: &str,
            _context: &SessionContext,
        ) -> Result<Response, WorkerError> {
            Ok(Response::new(self.worker_id(), self.worker_type(), query, 0.5))
        }
    }

    fn worker(id: &str, worker_type: &str, caps: usize, compatibility: f64) -> SharedWorker {
        let capabilities: Vec<String> = (0..caps).map(|i| format!("cap{}", i)).collect();
        Arc::new(FixedScoreWorker {
            state: WorkerState::new(id, worker_type, capabilities),
            compatibility,
        })
    }

    fn composition(complexity: ComplexityLevel, cap: usize, types: &[&str]) -> TeamComposition {
        TeamComposition {
            complexity,
            complexity_hits: 0,
            team_cap: cap,
            recommended_types: types.iter().map(|t| t.to_string()).collect(),
            domain_scores: BTreeMap::new(),
        }
    }

    #[test]
    fn test_synergy_empty_team_is_neutral() {
        let selector = AgentSelector::default();
        assert_eq!(selector.synergy("code", &[]), 0.5);
    }

    #[test]
    fn test_synergy_sums_pair_bonuses() {
        let selector = AgentSelector::default();
        let team = vec!["code".to_string(), "visualization".to_string()];
        assert!((selector.synergy("data", &team) - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_type_penalty_is_exact() {
        let selector = AgentSelector::default();
        let without = vec!["code".to_string(), "visualization".to_string()];
        let with = vec![
            "code".to_string(),
            "visualization".to_string(),
            "data".to_string(),
        ];
        let base = selector.synergy("data", &without);
        let penalized = selector.synergy("data", &with);
        assert!((base - penalized - 0.40).abs() < 1e-9);

        // Floored at zero.
        assert_eq!(selector.synergy("code", &["code".to_string()]), 0.0);
    }

    #[test]
    fn test_specialization_table() {
        use ComplexityLevel::*;
        assert_eq!(AgentSelector::specialization(4, High), 0.8);
        assert_eq!(AgentSelector::specialization(3, High), 0.6);
        assert_eq!(AgentSelector::specialization(2, Medium), 0.7);
        assert_eq!(AgentSelector::specialization(4, Medium), 0.7);
        assert_eq!(AgentSelector::specialization(5, Medium), 0.5);
        assert_eq!(AgentSelector::specialization(1, Low), 0.5);
    }

    #[test]
    fn test_performance_term() {
        assert_eq!(AgentSelector::performance(&PerformanceRecord::default()), 0.5);

        let mut record = PerformanceRecord::default();
        record.record(true, Some(1.0), 0);
        assert!((AgentSelector::performance(&record) - 1.0).abs() < 1e-9);

        let mut slow = PerformanceRecord::default();
        slow.record(false, None, 10_000);
        assert!(AgentSelector::performance(&slow).abs() < 1e-9);
    }

    #[test]
    fn test_score_candidates_sorts_and_filters() {
        let selector = AgentSelector::new(SynergyTable::default(), 0.35);
        let candidates = vec![
            worker("code_a", "code", 2, 0.2),
            worker("data_a", "data", 2, 0.9),
            worker("viz_a", "visualization", 1, 0.0),
        ];
        let composition = composition(ComplexityLevel::Low, 2, &["data"]);
        let context = SessionContext::new("s");

        let scored = selector.score_candidates("q", &context, &candidates, &composition, &[]);
        let ids: Vec<&str> = scored.iter().map(|c| c.worker_id()).collect();
        // viz_a scores 0.30 on neutral terms alone and is dropped.
        assert_eq!(ids, vec!["data_a", "code_a"]);
        assert!((scored[0].score - (0.36 + 0.1 + 0.125 + 0.075)).abs() < 1e-9);
    }

    #[test]
    fn test_candidate_excluded_from_own_synergy() {
        let selector = AgentSelector::default();
        let candidates = vec![worker("code_a", "code", 2, 0.5)];
        let composition = composition(ComplexityLevel::Low, 2, &[]);
        let team = vec![("code_a".to_string(), "code".to_string())];

        let scored = selector.score_candidates(
            "q",
            &SessionContext::new("s"),
            &candidates,
            &composition,
            &team,
        );
        assert_eq!(scored[0].breakdown.synergy, 0.5);
    }

    #[test]
    fn test_assemble_top_score_for_low_complexity() {
        let selector = AgentSelector::default();
        let candidates = vec![
            worker("code_a", "code", 2, 0.9),
            worker("code_b", "code", 2, 0.8),
            worker("data_a", "data", 2, 0.3),
        ];
        let composition = composition(ComplexityLevel::Low, 2, &["code", "data"]);
        let scored = selector.score_candidates(
            "q",
            &SessionContext::new("s"),
            &candidates,
            &composition,
            &[],
        );

        let team = selector.assemble(scored, &composition);
        let ids: Vec<&str> = team.iter().map(|c| c.worker_id()).collect();
        assert_eq!(ids, vec!["code_a", "code_b"]);
    }

    #[test]
    fn test_assemble_diversity_first_for_high_complexity() {
        let selector = AgentSelector::default();
        let candidates = vec![
            worker("code_a", "code", 4, 0.9),
            worker("code_b", "code", 4, 0.8),
            worker("code_c", "code", 4, 0.7),
            worker("data_a", "data", 4, 0.3),
        ];
        let composition = composition(ComplexityLevel::High, 3, &["code", "data"]);
        let scored = selector.score_candidates(
            "q",
            &SessionContext::new("s"),
            &candidates,
            &composition,
            &[],
        );

        let team = selector.assemble(scored, &composition);
        let ids: Vec<&str> = team.iter().map(|c| c.worker_id()).collect();
        assert_eq!(ids, vec!["code_a", "data_a", "code_b"]);
    }
}
