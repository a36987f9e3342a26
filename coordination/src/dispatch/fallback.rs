//! Synthesized responses for workers (or teams) that produced nothing usable
//!
//! Fallbacks carry low confidence so downstream consumers can tell them
//! apart from genuine answers by threshold alone.

use crate::team::lexicon::{self, Lexicon};
use crate::types::{Response, EMERGENCY_WORKER_ID, FALLBACK_PREFIX};

/// Confidence of a per-worker fallback
pub const FALLBACK_CONFIDENCE: f64 = 0.1;

/// Confidence of the team-level emergency fallback
pub const EMERGENCY_CONFIDENCE: f64 = 0.05;

/// Worker type reported on the emergency response
pub const EMERGENCY_WORKER_TYPE: &str = "coordinator";

const GENERIC_GUIDANCE: &str =
    "Try rephrasing the request with more specific details about what you need.";

fn domain_guidance(domain: &str) -> Option<&'static str> {
    match domain {
        lexicon::CODE => Some(
            "For code problems, break the task into small functions and test each one in isolation.",
        ),
        lexicon::DATA => Some(
            "For data work, inspect the dataset's shape, column types and missing values first.",
        ),
        lexicon::VISUALIZATION => Some(
            "For charts, start with a simple plot of the raw values before adding styling.",
        ),
        lexicon::RESEARCH => Some(
            "For research questions, start from recent review articles and primary sources.",
        ),
        _ => None,
    }
}

/// Guidance lines for the domains the query touches, or a generic hint
pub fn guidance(query: &str, lexicon: &Lexicon) -> Vec<&'static str> {
    let lines: Vec<&'static str> = lexicon
        .ranked_domains(query)
        .iter()
        .filter_map(|(domain, _)| domain_guidance(domain))
        .collect();

    if lines.is_empty() {
        vec![GENERIC_GUIDANCE]
    } else {
        lines
    }
}

/// Stand-in for a worker that exhausted its retries
pub fn fallback_response(
    worker_id: &str,
    worker_type: &str,
    query: &str,
    lexicon: &Lexicon,
) -> Response {
    let mut text = format!(
        "I apologize, but the {} agent could not produce an answer for this request.",
        worker_type
    );
    for line in guidance(query, lexicon) {
        text.push('\n');
        text.push_str(line);
    }

    Response::new(
        format!("{}{}", FALLBACK_PREFIX, worker_id),
        worker_type,
        text,
        FALLBACK_CONFIDENCE,
    )
}

/// Primary response when the whole team failed
pub fn emergency_response(query: &str, lexicon: &Lexicon) -> Response {
    let mut text = String::from(
        "I apologize, but none of the available agents could answer this request right now.",
    );
    for line in guidance(query, lexicon) {
        text.push('\n');
        text.push_str(line);
    }
    text.push_str("\nPlease try again in a moment.");

    Response::new(
        EMERGENCY_WORKER_ID,
        EMERGENCY_WORKER_TYPE,
        text,
        EMERGENCY_CONFIDENCE,
    )
}
