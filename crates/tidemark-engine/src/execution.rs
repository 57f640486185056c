//! Runtime options for a pipeline run.

use std::time::Duration;

use crate::config::types::ResourceConfig;

/// Retry policy for transient (`CONNECT_FAILED` / `TIMEOUT`) task failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first; `0` disables retries.
    pub max_retries: u32,
    /// Delay before the first retry; doubles per attempt up to 60s.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Scheduling options for [`run_graph`](crate::orchestrator::run_graph).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Upper bound on tasks running at once. Values below 1 act as 1.
    pub max_parallel_tasks: usize,
    /// Per-attempt time allowance; `None` waits indefinitely.
    pub task_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 4,
            task_timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&ResourceConfig> for RunOptions {
    fn from(resources: &ResourceConfig) -> Self {
        Self {
            max_parallel_tasks: usize::try_from(resources.max_parallel_tasks).unwrap_or(usize::MAX),
            task_timeout: resources.task_timeout_seconds.map(Duration::from_secs),
            retry: RetryPolicy {
                max_retries: resources.max_retries,
                backoff: Duration::from_millis(resources.retry_backoff_ms),
            },
        }
    }
}
