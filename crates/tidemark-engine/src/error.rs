//! Pipeline-level error model and retry backoff helper.

use std::time::Duration;

use crate::graph::GraphError;

const BACKOFF_MAX_MS: u64 = 60_000;

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Errors that stop a pipeline before or outside task execution.
///
/// Task failures are not `PipelineError`s; they are recorded on the run
/// report as [`TaskError`](tidemark_types::error::TaskError)s.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The pipeline's task graph is structurally invalid.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Configuration, backend setup, or runtime failures.
    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

impl PipelineError {
    /// Returns the graph error if this is a `Graph` variant.
    #[must_use]
    pub fn as_graph_error(&self) -> Option<&GraphError> {
        match self {
            Self::Graph(e) => Some(e),
            Self::Infrastructure(_) => None,
        }
    }
}

/// Delay before re-attempt number `attempt + 1`, given the configured base.
///
/// Doubles per attempt (`base`, `2 * base`, `4 * base`, ...) and never
/// exceeds 60 seconds.
pub(crate) fn compute_backoff(base: Duration, attempt: u32) -> Duration {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let factor = 2u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(factor);
    Duration::from_millis(delay_ms.min(BACKOFF_MAX_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_from_anyhow() {
        let err: PipelineError = anyhow::anyhow!("sqlite file is read-only").into();
        assert!(matches!(err, PipelineError::Infrastructure(_)));
        assert!(err.as_graph_error().is_none());
        assert_eq!(err.to_string(), "sqlite file is read-only");
    }

    #[test]
    fn test_pipeline_error_from_graph() {
        let err: PipelineError = GraphError::SelfDependency("load_users".into()).into();
        assert_eq!(
            err.as_graph_error(),
            Some(&GraphError::SelfDependency("load_users".into()))
        );
        assert_eq!(err.to_string(), "task 'load_users' depends on itself");
    }

    #[test]
    fn test_compute_backoff_doubles() {
        let base = Duration::from_millis(1_000);
        assert_eq!(compute_backoff(base, 1), Duration::from_millis(1_000));
        assert_eq!(compute_backoff(base, 2), Duration::from_millis(2_000));
        assert_eq!(compute_backoff(base, 3), Duration::from_millis(4_000));
    }

    #[test]
    fn test_compute_backoff_capped_at_max() {
        let base = Duration::from_millis(1_000);
        assert_eq!(compute_backoff(base, 10), Duration::from_millis(60_000));
        assert_eq!(compute_backoff(base, 200), Duration::from_millis(60_000));
    }

    #[test]
    fn test_compute_backoff_zero_base() {
        assert_eq!(compute_backoff(Duration::ZERO, 5), Duration::ZERO);
    }
}
