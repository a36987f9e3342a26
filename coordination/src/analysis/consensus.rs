//! Consensus scoring

use crate::types::Response;

/// `mean * (1 - min(1, variance))` over confidences, clamped to [0, 1].
///
/// A single response is in full agreement with itself (1.0); no responses
/// means no agreement (0.0). Variance is the population variance.
pub fn consensus_from_confidences(confidences: &[f64]) -> f64 {
    match confidences.len() {
        0 => 0.0,
        1 => 1.0,
        n => {
            let n = n as f64;
            let mean = confidences.iter().sum::<f64>() / n;
            let variance = confidences.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
            (mean * (1.0 - variance.min(1.0))).clamp(0.0, 1.0)
        }
    }
}

/// Consensus over a response set
pub fn consensus_score<'a>(responses: impl IntoIterator<Item = &'a Response>) -> f64 {
    let confidences: Vec<f64> = responses.into_iter().map(|r| r.confidence).collect();
    consensus_from_confidences(&confidences)
}
