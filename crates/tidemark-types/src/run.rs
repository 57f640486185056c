//! Run and task bookkeeping types.
//!
//! A [`Run`] is one execution of a pipeline for a [`LogicalKey`]. It is
//! kept in memory for the duration of an invocation and returned by value
//! once terminal.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TaskError;
use crate::table::LoadPolicy;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Partition identifier that scopes one run's source data (usually a date).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalKey(String);

impl LogicalKey {
    /// Create a new logical key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Logical key for a calendar date, formatted `YYYY-MM-DD`.
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.format("%Y-%m-%d").to_string())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interpret the key as a date.
    ///
    /// Accepts `YYYY-MM-DD` and full RFC 3339 timestamps (the date part is
    /// kept). Returns `None` for keys that are not dates.
    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.0, "%Y-%m-%d")
            .ok()
            .or_else(|| {
                DateTime::parse_from_rfc3339(&self.0)
                    .ok()
                    .map(|dt| dt.date_naive())
            })
    }
}

impl std::fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for LogicalKey {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

// ---------------------------------------------------------------------------
// Status machines
// ---------------------------------------------------------------------------

/// Lifecycle of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    /// Wire-format string for reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single task: `Pending -> Running -> {Succeeded, Failed}`.
///
/// A task may also go straight from `Pending` to `Failed` when an upstream
/// dependency failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    /// Wire-format string for reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which component operation a task is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    Stage,
    Load,
    QualityCheck,
}

impl TaskKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stage => "STAGE",
            Self::Load => "LOAD",
            Self::QualityCheck => "QUALITY_CHECK",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// What a successful task produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskOutput {
    Staged {
        table: String,
        source: String,
        rows: u64,
    },
    Loaded {
        table: String,
        policy: LoadPolicy,
        rows: u64,
    },
    Checked {
        checks: usize,
    },
}

/// Per-task entry of a run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub name: String,
    pub kind: TaskKind,
    pub depends_on: Vec<String>,
    pub status: TaskStatus,
    /// Number of execution attempts; `0` for tasks never started.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<TaskOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

impl TaskResult {
    /// Fresh `Pending` entry for a task that has not been scheduled yet.
    #[must_use]
    pub fn pending(name: impl Into<String>, kind: TaskKind, depends_on: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            depends_on,
            status: TaskStatus::Pending,
            attempts: 0,
            started_at: None,
            finished_at: None,
            output: None,
            error: None,
        }
    }
}

/// One execution of the pipeline for a logical key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub pipeline: String,
    pub logical_key: LogicalKey,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Task results in graph declaration order.
    pub tasks: Vec<TaskResult>,
}

impl Run {
    /// Look up a task result by name.
    #[must_use]
    pub fn task(&self, name: &str) -> Option<&TaskResult> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Tasks that ended in `Failed`, in declaration order.
    pub fn failed_tasks(&self) -> impl Iterator<Item = &TaskResult> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Wall-clock duration, if the run is terminal.
    #[must_use]
    pub fn duration_secs(&self) -> Option<f64> {
        self.finished_at.map(|end| {
            #[allow(clippy::cast_precision_loss)]
            let millis = (end - self.started_at).num_milliseconds() as f64;
            millis / 1000.0
        })
    }
}
