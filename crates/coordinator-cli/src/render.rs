//! Human-readable result output

use std::fmt::{self, Write};

use team_coordination::CoordinationResult;

/// Multi-line summary of a coordination result
pub fn render_summary(result: &CoordinationResult) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_summary(&mut out, result);
    out
}

fn write_summary(out: &mut String, result: &CoordinationResult) -> fmt::Result {
    let primary = &result.primary_response;

    writeln!(
        out,
        "request {} (session {}) in {}ms",
        result.request_id, result.session_id, result.coordination_time_ms
    )?;
    if result.is_emergency() {
        writeln!(out, "status: emergency fallback")?;
    }
    writeln!(
        out,
        "primary: {} [{}] confidence {:.2}",
        primary.worker_id, primary.worker_type, primary.confidence
    )?;
    writeln!(out, "consensus: {:.2}", result.consensus_score)?;
    writeln!(out)?;
    writeln!(out, "{}", primary.text)?;

    if !primary.suggestions.is_empty() {
        writeln!(out)?;
        writeln!(out, "suggestions:")?;
        for suggestion in &primary.suggestions {
            writeln!(out, "  - {}", suggestion)?;
        }
    }
    if !primary.artifacts.is_empty() {
        writeln!(out)?;
        writeln!(out, "artifacts:")?;
        for artifact in &primary.artifacts {
            writeln!(out, "  {}", artifact.replace('\n', "\n  "))?;
        }
    }

    if !result.supporting_responses.is_empty() {
        writeln!(out)?;
        writeln!(out, "supporting:")?;
        for response in &result.supporting_responses {
            writeln!(
                out,
                "  {} [{}] confidence {:.2}",
                response.worker_id, response.worker_type, response.confidence
            )?;
        }
    }

    if !result.conflicts.is_empty() {
        writeln!(out)?;
        writeln!(out, "conflicts:")?;
        for conflict in &result.conflicts {
            writeln!(
                out,
                "  {} ({}) -> {} [{}]",
                conflict.kind,
                conflict.severity,
                conflict.strategy,
                if conflict.resolved { "resolved" } else { "unresolved" }
            )?;
        }
    }

    Ok(())
}
