//! Structured error model for task execution.
//!
//! [`TaskError`] carries the failure kind plus the diagnostic payload the
//! run report needs (offending SQL, quality violations, failed upstream).
//! Construct via the kind-specific factory methods.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Classification of a task failure.
///
/// Determines retry eligibility and operator-facing categorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The warehouse could not be reached or refused the session (retryable).
    ConnectFailed,
    /// The source object could not be resolved.
    LocateFailed,
    /// The bulk copy into a staging table was rejected.
    StageFailed,
    /// A delete or insert against a target table was rejected.
    LoadFailed,
    /// One or more quality assertions did not hold.
    QualityViolation,
    /// The task exceeded its allotted time (retryable).
    Timeout,
    /// An upstream task failed, so this task was never attempted.
    DependencyFailed,
}

impl ErrorKind {
    /// Wire-format string for reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectFailed => "CONNECT_FAILED",
            Self::LocateFailed => "LOCATE_FAILED",
            Self::StageFailed => "STAGE_FAILED",
            Self::LoadFailed => "LOAD_FAILED",
            Self::QualityViolation => "QUALITY_VIOLATION",
            Self::Timeout => "TIMEOUT",
            Self::DependencyFailed => "DEPENDENCY_FAILED",
        }
    }

    /// Whether the failure points at infrastructure rather than data or logic.
    ///
    /// Only these kinds are eligible for the orchestrator's retry policy.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::ConnectFailed | Self::Timeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single failed quality assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub check: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(
                f,
                "{} (table {table}): expected {}, actual {}",
                self.check, self.expected, self.actual
            ),
            None => write!(
                f,
                "{}: expected {}, actual {}",
                self.check, self.expected, self.actual
            ),
        }
    }
}

/// Terminal failure of a task, with the diagnostics needed to attribute it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{kind}] {message}")]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
    /// SQL text of the statement that failed, credentials redacted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
    /// Name of the failed upstream task for `DEPENDENCY_FAILED`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
}

impl TaskError {
    /// Failure of an arbitrary kind with no extra diagnostics.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            sql: None,
            violations: Vec::new(),
            upstream: None,
        }
    }

    /// Warehouse unreachable or session refused.
    #[must_use]
    pub fn connect_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectFailed, message)
    }

    /// Source location could not be resolved.
    #[must_use]
    pub fn locate_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LocateFailed, message)
    }

    /// Bulk copy rejected by the warehouse.
    #[must_use]
    pub fn stage_failed(message: impl Into<String>, sql: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorKind::StageFailed, message);
        err.sql = Some(sql.into());
        err
    }

    /// Delete or insert rejected by the warehouse.
    #[must_use]
    pub fn load_failed(message: impl Into<String>, sql: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorKind::LoadFailed, message);
        err.sql = Some(sql.into());
        err
    }

    /// One or more quality assertions failed.
    #[must_use]
    pub fn quality_violation(violations: Vec<Violation>) -> Self {
        let names: Vec<&str> = violations.iter().map(|v| v.check.as_str()).collect();
        let message = format!(
            "{} quality check(s) failed: {}",
            violations.len(),
            names.join(", ")
        );
        let mut err = Self::new(ErrorKind::QualityViolation, message);
        err.violations = violations;
        err
    }

    /// Task exceeded its time allowance.
    #[must_use]
    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("task exceeded its timeout of {}s", after.as_secs_f64()),
        )
    }

    /// Task skipped because `upstream` failed.
    #[must_use]
    pub fn dependency_failed(upstream: impl Into<String>) -> Self {
        let upstream = upstream.into();
        let mut err = Self::new(
            ErrorKind::DependencyFailed,
            format!("upstream task '{upstream}' failed"),
        );
        err.upstream = Some(upstream);
        err
    }

    /// Returns `true` if the orchestrator's retry policy may re-attempt the task.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind.is_transient()
    }
}
