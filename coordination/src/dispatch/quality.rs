//! Response quality gate
//!
//! Rejects answers that are too short, too unsure, or that read like an
//! error report rather than an answer.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::QualityConfig;
use crate::types::Response;

static FAILURE_INDICATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(error|failed|failure|unable|cannot|sorry|exception|unavailable)\b")
        .expect("FAILURE_INDICATOR_RE regex should compile")
});

/// Distinct failure/apology words in `text`, lowercased
pub fn failure_indicators(text: &str) -> BTreeSet<String> {
    FAILURE_INDICATOR_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Validates worker responses against [`QualityConfig`] thresholds
#[derive(Debug, Clone, Default)]
pub struct QualityValidator {
    config: QualityConfig,
}

impl QualityValidator {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// `Ok` if the response is usable, otherwise the rejection reason.
    pub fn validate(&self, response: &Response) -> Result<(), String> {
        let text = response.text.trim();
        if text.chars().count() < self.config.min_text_len {
            return Err(format!(
                "response text too short ({} < {} chars)",
                text.chars().count(),
                self.config.min_text_len
            ));
        }

        if !(0.0..=1.0).contains(&response.confidence) {
            return Err(format!("confidence {} outside [0, 1]", response.confidence));
        }

        if response.confidence < self.config.min_confidence {
            return Err(format!(
                "confidence {:.2} below {:.2}",
                response.confidence, self.config.min_confidence
            ));
        }

        let indicators = failure_indicators(text);
        if indicators.len() >= self.config.max_failure_indicators {
            let words: Vec<&str> = indicators.iter().map(String::as_str).collect();
            return Err(format!("response reads as a failure ({})", words.join(", ")));
        }

        Ok(())
    }
}
