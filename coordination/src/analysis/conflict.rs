//! Pairwise conflict detection
//!
//! Three kinds of disagreement are looked for between every pair of
//! responses: contradicting suggestions, contradicting artifacts, and a
//! wide gap in confidence.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::team::lexicon::tokenize;
use crate::types::{Conflict, ConflictKind, ConflictSeverity, ResolutionStrategy, Response};

/// Opposing word pairs for suggestions (matched as whole words)
const SUGGESTION_PAIRS: &[(&str, &str)] = &[
    ("increase", "decrease"),
    ("enable", "disable"),
    ("use", "avoid"),
    ("fast", "slow"),
    ("simple", "complex"),
    ("add", "remove"),
    ("more", "less"),
    ("include", "exclude"),
];

/// Opposing markers for code/text artifacts
const ARTIFACT_PAIRS: &[(&str, &str)] = &[
    ("true", "false"),
    ("enable", "disable"),
    ("++", "--"),
    ("add", "remove"),
    ("create", "delete"),
];

/// Confidence gap above which two responses diverge
const DIVERGENCE_THRESHOLD: f64 = 0.3;
/// Divergence at or above this gap is medium severity
const DIVERGENCE_MEDIUM: f64 = 0.5;
/// Confidence gap above which one side is simply favored
const FAVOR_GAP: f64 = 0.2;

/// Words and symbol markers present in one item
struct Markers {
    words: HashSet<String>,
    text: String,
}

impl Markers {
    fn new(item: &str) -> Self {
        Self {
            words: tokenize(item).collect(),
            text: item.to_string(),
        }
    }

    fn has(&self, marker: &str) -> bool {
        if marker.chars().all(char::is_alphanumeric) {
            self.words.contains(marker)
        } else {
            self.text.contains(marker)
        }
    }
}

fn opposes(a: &Markers, b: &Markers, pairs: &[(&str, &str)]) -> bool {
    pairs
        .iter()
        .any(|&(pos, neg)| (a.has(pos) && b.has(neg)) || (a.has(neg) && b.has(pos)))
}

/// Contradicting item pairs between two lists
fn contradictions(
    left: &[String],
    right: &[String],
    pairs: &[(&str, &str)],
) -> Vec<(String, String)> {
    let right_markers: Vec<Markers> = right.iter().map(|r| Markers::new(r)).collect();
    let mut found = Vec::new();
    for l in left {
        let left_markers = Markers::new(l);
        for (r, r_markers) in right.iter().zip(&right_markers) {
            if opposes(&left_markers, r_markers, pairs) {
                found.push((l.clone(), r.clone()));
            }
        }
    }
    found
}

/// Detects conflicts between responses and picks a strategy for each
#[derive(Debug, Clone, Default)]
pub struct ConflictDetector;

impl ConflictDetector {
    pub fn new() -> Self {
        Self
    }

    /// All conflicts among `responses`, pair by pair in input order.
    pub fn detect(&self, responses: &[Response]) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        for (i, a) in responses.iter().enumerate() {
            for b in &responses[i + 1..] {
                conflicts.extend(self.suggestion_conflict(a, b));
                conflicts.extend(self.artifact_conflict(a, b));
                conflicts.extend(self.confidence_divergence(a, b));
            }
        }
        conflicts
    }

    pub fn suggestion_conflict(&self, a: &Response, b: &Response) -> Option<Conflict> {
        let found = contradictions(&a.suggestions, &b.suggestions, SUGGESTION_PAIRS);
        if found.is_empty() {
            return None;
        }

        let strategy = favor_by_gap(a, b).unwrap_or(ResolutionStrategy::HybridApproach);
        Some(Conflict::new(
            ConflictKind::SuggestionConflict,
            vec![a.worker_id.clone(), b.worker_id.clone()],
            ConflictSeverity::from_count(found.len()),
            strategy,
            describe(&found),
        ))
    }

    pub fn artifact_conflict(&self, a: &Response, b: &Response) -> Option<Conflict> {
        let found = contradictions(&a.artifacts, &b.artifacts, ARTIFACT_PAIRS);
        if found.is_empty() {
            return None;
        }

        let strategy = favor_by_gap(a, b).unwrap_or_else(|| {
            match a.capabilities_used.len().cmp(&b.capabilities_used.len()) {
                Ordering::Greater => ResolutionStrategy::FavorAgent(a.worker_id.clone()),
                Ordering::Less => ResolutionStrategy::FavorAgent(b.worker_id.clone()),
                Ordering::Equal => ResolutionStrategy::CombineApproaches,
            }
        });
        Some(Conflict::new(
            ConflictKind::ArtifactConflict,
            vec![a.worker_id.clone(), b.worker_id.clone()],
            ConflictSeverity::from_count(found.len()),
            strategy,
            format!("{} contradicting artifact pair(s)", found.len()),
        ))
    }

    pub fn confidence_divergence(&self, a: &Response, b: &Response) -> Option<Conflict> {
        let gap = (a.confidence - b.confidence).abs();
        if gap <= DIVERGENCE_THRESHOLD {
            return None;
        }

        let severity = if gap < DIVERGENCE_MEDIUM {
            ConflictSeverity::Low
        } else {
            ConflictSeverity::Medium
        };
        Some(Conflict::new(
            ConflictKind::ConfidenceDivergence,
            vec![a.worker_id.clone(), b.worker_id.clone()],
            severity,
            ResolutionStrategy::FavorHigherConfidence,
            format!(
                "confidence {:.2} vs {:.2} (gap {:.2})",
                a.confidence, b.confidence, gap
            ),
        ))
    }
}

fn favor_by_gap(a: &Response, b: &Response) -> Option<ResolutionStrategy> {
    if a.confidence - b.confidence > FAVOR_GAP {
        Some(ResolutionStrategy::FavorAgent(a.worker_id.clone()))
    } else if b.confidence - a.confidence > FAVOR_GAP {
        Some(ResolutionStrategy::FavorAgent(b.worker_id.clone()))
    } else {
        None
    }
}

fn describe(found: &[(String, String)]) -> String {
    found
        .iter()
        .map(|(l, r)| format!("'{}' vs '{}'", l, r))
        .collect::<Vec<_>>()
        .join("; ")
}
