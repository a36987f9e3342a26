//! Coordination error taxonomy.
//!
//! Only [`CoordinationError`] ever reaches a caller of
//! [`Coordinator::coordinate`](crate::coordinator::Coordinator::coordinate),
//! and only for request validation or team assembly. Everything downstream of
//! a formed team is carried as a [`WorkerFailure`] value through the retry
//! cascade and ends as a fallback response, or as a conflict record on a
//! still-successful result.
//!
//! ## Retry categories
//!
//! | Failure              | Retriable | Surfaced as                 |
//! |----------------------|-----------|-----------------------------|
//! | HealthCheckFailed    | yes       | fallback response           |
//! | Timeout              | yes       | fallback response           |
//! | WorkerError          | yes       | fallback response           |
//! | LowQualityResponse   | yes       | fallback response           |
//! | Cancelled            | no        | partial_failure conflict    |

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type for caller-facing coordination operations
pub type CoordinatorResult<T> = Result<T, CoordinationError>;

/// Errors a caller of the coordinator can observe.
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// The request failed validation before any work was done.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No registered worker matched the request.
    #[error("No suitable agents for capabilities {required:?}")]
    NoSuitableAgents { required: Vec<String> },

    /// `create_worker` was asked for a type nobody registered.
    #[error("Unknown worker type: {0}")]
    UnknownWorkerType(String),

    /// The session id is not known to the session manager.
    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

/// Classification used by the dispatcher to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// Worker was not fit to run; it may recover before the next attempt.
    Unhealthy,
    /// The per-worker deadline elapsed.
    Deadline,
    /// The worker itself returned an error.
    Transient,
    /// The worker answered but the answer was rejected.
    Quality,
    /// The group deadline or a shutdown cancelled the task. Terminal.
    Cancelled,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::Deadline => write!(f, "deadline"),
            Self::Transient => write!(f, "transient"),
            Self::Quality => write!(f, "quality"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Why a single dispatch attempt against one worker did not produce a
/// usable response.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkerFailure {
    #[error("Health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Worker timed out after {0:?}")]
    Timeout(Duration),

    #[error("Worker error: {0}")]
    WorkerError(String),

    #[error("Low quality response: {0}")]
    LowQualityResponse(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl WorkerFailure {
    /// Classify this failure for retry logic.
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::HealthCheckFailed(_) => RetryCategory::Unhealthy,
            Self::Timeout(_) => RetryCategory::Deadline,
            Self::WorkerError(_) => RetryCategory::Transient,
            Self::LowQualityResponse(_) => RetryCategory::Quality,
            Self::Cancelled(_) => RetryCategory::Cancelled,
        }
    }

    /// Returns `true` if the dispatcher may try the worker again.
    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }

    /// Whether the failure came from a query that actually ran, and so
    /// should count against the worker's success rate.
    pub fn counts_as_query(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::WorkerError(_) | Self::LowQualityResponse(_)
        )
    }
}

/// Failure while applying a resolution strategy to a conflict.
///
/// Recorded as text on the conflict; never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("Worker {0} has no response in this result")]
    MissingResponse(String),

    #[error("Strategy {0} cannot be applied to this conflict")]
    Inapplicable(String),
}
