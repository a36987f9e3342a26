//! Response analysis
//!
//! Turns the usable responses of a dispatch into a primary/supporting split,
//! finds where the team disagrees, applies resolution strategies and scores
//! consensus over what is left.

pub mod conflict;
pub mod consensus;
pub mod resolver;

use tracing::debug;

use crate::types::{Conflict, Response, HYBRID_WORKER_ID};

pub use conflict::ConflictDetector;
pub use consensus::{consensus_from_confidences, consensus_score};
pub use resolver::ConflictResolver;

/// Output of [`ResponseAnalyzer::analyze`]
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub primary: Response,
    pub supporting: Vec<Response>,
    pub conflicts: Vec<Conflict>,
    pub consensus_score: f64,
}

/// Ranks, checks and reconciles a set of genuine responses
#[derive(Debug, Clone, Default)]
pub struct ResponseAnalyzer {
    detector: ConflictDetector,
    resolver: ConflictResolver,
}

impl ResponseAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze a non-empty response set. Returns `None` when empty.
    pub fn analyze(&self, mut responses: Vec<Response>) -> Option<AnalysisReport> {
        // Stable sort keeps team order among equal confidences
        responses.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut conflicts = self.detector.detect(&responses);

        let mut iter = responses.into_iter();
        let mut primary = iter.next()?;
        let mut supporting: Vec<Response> = iter.collect();

        self.resolver
            .resolve(&mut primary, &mut supporting, &mut conflicts);

        // Workers' own answers only; a hybrid merely restates them.
        let consensus_score = consensus_score(
            std::iter::once(&primary)
                .chain(supporting.iter())
                .filter(|r| r.worker_id != HYBRID_WORKER_ID),
        );

        debug!(
            primary = %primary.worker_id,
            supporting = supporting.len(),
            conflicts = conflicts.len(),
            consensus_score,
            "Responses analyzed"
        );

        Some(AnalysisReport {
            primary,
            supporting,
            conflicts,
            consensus_score,
        })
    }
}
