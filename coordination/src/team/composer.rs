//! Team composition: complexity classification and type coverage
//!
//! Runs before candidate scoring to decide how big the team may be and
//! which worker types it should cover.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::lexicon::Lexicon;
use crate::types::{CoordinationRequest, WorkerType};

/// Query complexity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

impl ComplexityLevel {
    /// Classify from the number of complexity keyword hits
    pub fn from_hits(hits: usize) -> Self {
        match hits {
            0 => Self::Low,
            1 | 2 => Self::Medium,
            _ => Self::High,
        }
    }

    /// Largest team this level allows
    pub fn max_team_size(self) -> usize {
        match self {
            Self::Low => 2,
            Self::Medium => 3,
            Self::High => 4,
        }
    }
}

impl fmt::Display for ComplexityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Output of the composer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamComposition {
    pub complexity: ComplexityLevel,
    pub complexity_hits: usize,
    /// `min(request.max_agents, complexity cap)`
    pub team_cap: usize,
    /// Types the team should cover, best first
    pub recommended_types: Vec<WorkerType>,
    pub domain_scores: BTreeMap<String, usize>,
}

impl TeamComposition {
    pub fn summary(&self) -> String {
        format!(
            "complexity={} cap={} types=[{}]",
            self.complexity,
            self.team_cap,
            self.recommended_types.join(",")
        )
    }
}

/// Classifies requests and recommends type coverage
pub struct TeamComposer {
    lexicon: Arc<Lexicon>,
}

impl TeamComposer {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self { lexicon }
    }

    pub fn compose(&self, request: &CoordinationRequest) -> TeamComposition {
        // Capability tags count as part of the text to scan.
        let text = if request.required_capabilities.is_empty() {
            request.query.clone()
        } else {
            format!("{} {}", request.query, request.required_capabilities.join(" "))
        };

        let complexity_hits = self.lexicon.complexity_hits(&text);
        let complexity = ComplexityLevel::from_hits(complexity_hits);
        let team_cap = request.max_agents.min(complexity.max_team_size());

        let ranked = self.lexicon.ranked_domains(&text);
        let mut domains: Vec<WorkerType> = ranked
            .iter()
            .map(|(name, _)| name.clone())
            .take(team_cap)
            .collect();

        if complexity == ComplexityLevel::High && ranked.len() == 1 && domains.len() < team_cap {
            if let Some(partner) = self.lexicon.complement(&ranked[0].0) {
                if !domains.iter().any(|d| d == partner) {
                    domains.push(partner.to_string());
                }
            }
        }

        let mut recommended_types: Vec<WorkerType> = Vec::with_capacity(team_cap);
        for worker_type in request.preferred_types.iter().chain(domains.iter()) {
            if !recommended_types.contains(worker_type) {
                recommended_types.push(worker_type.clone());
            }
        }
        recommended_types.truncate(team_cap);

        TeamComposition {
            complexity,
            complexity_hits,
            team_cap,
            recommended_types,
            domain_scores: self.lexicon.domain_scores(&text),
        }
    }
}

impl Default for TeamComposer {
    fn default() -> Self {
        Self::new(Arc::new(Lexicon::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compose(request: CoordinationRequest) -> TeamComposition {
        TeamComposer::default().compose(&request)
    }

    #[test]
    fn test_complexity_thresholds() {
        assert_eq!(ComplexityLevel::from_hits(0), ComplexityLevel::Low);
        assert_eq!(ComplexityLevel::from_hits(1), ComplexityLevel::Medium);
        assert_eq!(ComplexityLevel::from_hits(2), ComplexityLevel::Medium);
        assert_eq!(ComplexityLevel::from_hits(3), ComplexityLevel::High);
    }

    #[test]
    fn test_low_complexity_caps_at_two() {
        let composition = compose(
            CoordinationRequest::new("plot the data and write a python script").with_max_agents(5),
        );
        assert_eq!(composition.complexity, ComplexityLevel::Low);
        assert_eq!(composition.team_cap, 2);
        assert_eq!(composition.recommended_types.len(), 2);
    }

    #[test]
    fn test_requested_size_wins_when_smaller() {
        let composition = compose(
            CoordinationRequest::new("optimize a complex distributed pipeline").with_max_agents(1),
        );
        assert_eq!(composition.complexity, ComplexityLevel::High);
        assert_eq!(composition.team_cap, 1);
    }

    #[test]
    fn test_ranked_by_hits() {
        let composition = compose(CoordinationRequest::new(
            "plot a chart of the dataset as a histogram",
        ));
        assert_eq!(composition.recommended_types[0], "visualization");
        assert_eq!(composition.recommended_types[1], "data");
    }

    #[test]
    fn test_high_complexity_single_domain_gets_complement() {
        let composition = compose(
            CoordinationRequest::new("optimize the complex, scalable function").with_max_agents(4),
        );
        assert_eq!(composition.complexity, ComplexityLevel::High);
        assert_eq!(composition.recommended_types, vec!["code", "data"]);
    }

    #[test]
    fn test_no_complement_below_high() {
        let composition = compose(CoordinationRequest::new("optimize the function"));
        assert_eq!(composition.complexity, ComplexityLevel::Medium);
        assert_eq!(composition.recommended_types, vec!["code"]);
    }

    #[test]
    fn test_preferred_types_come_first() {
        let composition = compose(
            CoordinationRequest::new("plot the data")
                .with_preferred_type("research")
                .with_max_agents(2),
        );
        assert_eq!(composition.recommended_types, vec!["research", "data"]);
    }

    #[test]
    fn test_capabilities_are_scanned() {
        let composition = compose(CoordinationRequest::new("help me").with_capability("matplotlib"));
        assert_eq!(composition.recommended_types, vec!["visualization"]);
        assert_eq!(composition.domain_scores["visualization"], 1);
    }
}
