//! Pipeline YAML configuration types.

use serde::Deserialize;
use tidemark_types::table::TableDescriptor;
use tidemark_warehouse::{CopyOptions, Credentials};

/// Top-level pipeline configuration, deserialized from YAML.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub version: String,
    pub pipeline: String,
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub copy: CopyOptions,
    #[serde(default)]
    pub resources: ResourceConfig,
    pub tasks: Vec<TaskConfig>,
}

// ---------------------------------------------------------------------------
// Warehouse / object store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarehouseBackendKind {
    Postgres,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    pub backend: WarehouseBackendKind,
    /// Connection string (`postgres`) or database file path (`sqlite`).
    #[serde(default)]
    pub connection: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStoreKind {
    S3,
    #[default]
    Local,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectStoreConfig {
    #[serde(default)]
    pub kind: ObjectStoreKind,
    #[serde(default)]
    pub bucket: Option<String>,
    /// Local root directory; defaults to the working directory.
    #[serde(default)]
    pub root: Option<String>,
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

fn default_max_parallel_tasks() -> u32 {
    4
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

/// Scheduling and retry knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    /// Upper bound on concurrently running tasks. `1` runs sequentially.
    #[serde(default = "default_max_parallel_tasks")]
    pub max_parallel_tasks: u32,
    #[serde(default)]
    pub task_timeout_seconds: Option<u64>,
    /// Extra attempts for `CONNECT_FAILED` / `TIMEOUT` failures.
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: default_max_parallel_tasks(),
            task_timeout_seconds: None,
            max_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// One node of the pipeline graph. Exactly one of `stage`, `load`, or
/// `quality_check` must be set.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub stage: Option<StageConfig>,
    #[serde(default)]
    pub load: Option<TableDescriptor>,
    #[serde(default)]
    pub quality_check: Option<QualityGateConfig>,
}

impl TaskConfig {
    /// Number of action sections present on this task.
    #[must_use]
    pub fn action_count(&self) -> usize {
        usize::from(self.stage.is_some())
            + usize::from(self.load.is_some())
            + usize::from(self.quality_check.is_some())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    pub table: String,
    /// Source key template, e.g. `log_data/{year}/{month}/`.
    pub source: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QualityGateConfig {
    pub checks: Vec<QualityCheckConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    NonEmpty,
    NotNull,
    Scalar,
}

impl CheckKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NonEmpty => "non_empty",
            Self::NotNull => "not_null",
            Self::Scalar => "scalar",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityCheckConfig {
    pub name: String,
    pub kind: CheckKind,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub expected: Option<serde_json::Value>,
}
