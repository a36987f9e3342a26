//! Conflict resolution
//!
//! Strategies are applied in conflict order against the current
//! primary/supporting split. A strategy that cannot be applied leaves its
//! conflict unresolved with the reason recorded; it never aborts the call.

use std::mem;

use tracing::{debug, warn};

use crate::error::ResolutionError;
use crate::types::{Conflict, ResolutionStrategy, Response, HYBRID_WORKER_ID};

/// Confidence ceiling for a synthesized hybrid response
const HYBRID_CONFIDENCE_CAP: f64 = 0.95;

/// Applies each conflict's resolution strategy
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve `conflicts` in order, mutating the response split in place.
    pub fn resolve(
        &self,
        primary: &mut Response,
        supporting: &mut Vec<Response>,
        conflicts: &mut [Conflict],
    ) {
        for conflict in conflicts.iter_mut() {
            match self.apply(conflict, primary, supporting) {
                Ok(()) => {
                    debug!(
                        kind = %conflict.kind,
                        strategy = %conflict.strategy,
                        primary = %primary.worker_id,
                        "Conflict resolved"
                    );
                    conflict.resolved = true;
                    conflict.resolution_error = None;
                }
                Err(e) => {
                    warn!(
                        kind = %conflict.kind,
                        strategy = %conflict.strategy,
                        error = %e,
                        "Conflict left unresolved"
                    );
                    conflict.resolved = false;
                    conflict.resolution_error = Some(e.to_string());
                }
            }
        }
    }

    fn apply(
        &self,
        conflict: &Conflict,
        primary: &mut Response,
        supporting: &mut Vec<Response>,
    ) -> Result<(), ResolutionError> {
        match &conflict.strategy {
            ResolutionStrategy::FavorAgent(worker_id) => promote(worker_id, primary, supporting),
            ResolutionStrategy::FavorHigherConfidence => {
                let involved = lookup_all(&conflict.workers, primary, supporting)?;
                let best = involved
                    .iter()
                    .reduce(|best, r| if r.confidence > best.confidence { r } else { best })
                    .ok_or_else(|| {
                        ResolutionError::Inapplicable(conflict.strategy.to_string())
                    })?;
                // A pair below the current primary has no say over it.
                if involved.iter().any(|r| represents(primary, &r.worker_id))
                    || primary.confidence >= best.confidence
                {
                    return Ok(());
                }
                promote(&best.worker_id, primary, supporting)
            }
            ResolutionStrategy::HybridApproach => {
                let contributors = lookup_all(&conflict.workers, primary, supporting)?;
                hybridize(contributors, primary, supporting);
                Ok(())
            }
            ResolutionStrategy::CombineApproaches => {
                let contributors = lookup_all(&conflict.workers, primary, supporting)?;
                for contributor in &contributors {
                    union_into(&mut primary.suggestions, &contributor.suggestions);
                    union_into(&mut primary.artifacts, &contributor.artifacts);
                }
                Ok(())
            }
            other => Err(ResolutionError::Inapplicable(other.to_string())),
        }
    }
}

fn find<'a>(worker_id: &str, primary: &'a Response, supporting: &'a [Response]) -> Option<&'a Response> {
    std::iter::once(primary)
        .chain(supporting.iter())
        .find(|r| r.worker_id == worker_id)
}

fn lookup_all(
    worker_ids: &[String],
    primary: &Response,
    supporting: &[Response],
) -> Result<Vec<Response>, ResolutionError> {
    if worker_ids.is_empty() {
        return Err(ResolutionError::Inapplicable(
            "conflict names no workers".to_string(),
        ));
    }
    worker_ids
        .iter()
        .map(|id| {
            find(id, primary, supporting)
                .cloned()
                .ok_or_else(|| ResolutionError::MissingResponse(id.clone()))
        })
        .collect()
}

/// True if `primary` is `worker_id`'s response or a merge that includes it.
fn represents(primary: &Response, worker_id: &str) -> bool {
    primary.worker_id == worker_id
        || (primary.worker_id == HYBRID_WORKER_ID
            && primary.text.contains(&format!("({})\n", worker_id)))
}

/// Swap `worker_id`'s response into the primary slot.
fn promote(
    worker_id: &str,
    primary: &mut Response,
    supporting: &mut [Response],
) -> Result<(), ResolutionError> {
    if primary.worker_id == worker_id {
        return Ok(());
    }
    let position = supporting
        .iter()
        .position(|r| r.worker_id == worker_id)
        .ok_or_else(|| ResolutionError::MissingResponse(worker_id.to_string()))?;
    mem::swap(primary, &mut supporting[position]);
    Ok(())
}

fn section(response: &Response) -> String {
    format!(
        "### {} ({})\n{}",
        response.worker_type, response.worker_id, response.text
    )
}

fn union_into(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

/// Replace the primary with a merged response, or extend an existing merge.
fn hybridize(contributors: Vec<Response>, primary: &mut Response, supporting: &mut Vec<Response>) {
    if primary.worker_id == HYBRID_WORKER_ID {
        for contributor in contributors
            .iter()
            .filter(|c| c.worker_id != HYBRID_WORKER_ID)
        {
            let header = format!("({})\n", contributor.worker_id);
            if !primary.text.contains(&header) {
                primary.text.push_str("\n\n");
                primary.text.push_str(&section(contributor));
            }
            union_into(&mut primary.suggestions, &contributor.suggestions);
            union_into(&mut primary.artifacts, &contributor.artifacts);
            union_into(&mut primary.capabilities_used, &contributor.capabilities_used);
        }
        return;
    }

    let mut hybrid = Response::new(
        HYBRID_WORKER_ID,
        HYBRID_WORKER_ID,
        contributors
            .iter()
            .map(section)
            .collect::<Vec<_>>()
            .join("\n\n"),
        (contributors.iter().map(|c| c.confidence).sum::<f64>() / contributors.len() as f64)
            .min(HYBRID_CONFIDENCE_CAP),
    );
    for contributor in &contributors {
        union_into(&mut hybrid.suggestions, &contributor.suggestions);
        union_into(&mut hybrid.artifacts, &contributor.artifacts);
        union_into(&mut hybrid.capabilities_used, &contributor.capabilities_used);
    }
    hybrid.elapsed_ms = contributors.iter().map(|c| c.elapsed_ms).max().unwrap_or(0);

    let displaced = mem::replace(primary, hybrid);
    supporting.insert(0, displaced);
}
