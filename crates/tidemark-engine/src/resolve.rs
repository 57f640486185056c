//! Turn a parsed [`PipelineConfig`] into runnable pieces: warehouse
//! connector, object locator, and task graph.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tidemark_warehouse::{PostgresConnector, SqliteConnector, Value, WarehouseConnector};

use crate::config::types::{
    CheckKind, ObjectStoreKind, PipelineConfig, QualityCheckConfig, TaskConfig,
    WarehouseBackendKind,
};
use crate::error::PipelineError;
use crate::graph::TaskGraph;
use crate::locator::{LocalLocator, ObjectLocator, S3Locator};
use crate::quality::QualityCheck;
use crate::task::{StageSpec, Task, TaskSpec};

/// Connector for the configured warehouse backend.
///
/// # Errors
///
/// Returns an error if the backend requires a connection string that is
/// missing.
pub fn create_connector(config: &PipelineConfig) -> Result<Arc<dyn WarehouseConnector>> {
    let connection = config
        .warehouse
        .connection
        .as_deref()
        .context("warehouse.connection is required")?;
    match config.warehouse.backend {
        WarehouseBackendKind::Postgres => {
            Ok(Arc::new(PostgresConnector::new(connection)) as Arc<dyn WarehouseConnector>)
        }
        WarehouseBackendKind::Sqlite => {
            let connector = if connection == ":memory:" {
                SqliteConnector::in_memory()
                    .map_err(|e| anyhow::anyhow!("failed to open in-memory warehouse: {e}"))?
            } else {
                SqliteConnector::open(Path::new(connection))
            };
            Ok(Arc::new(connector) as Arc<dyn WarehouseConnector>)
        }
    }
}

/// Locator for the configured object store.
///
/// # Errors
///
/// Returns an error if an `s3` store has no bucket.
pub fn create_locator(config: &PipelineConfig) -> Result<Arc<dyn ObjectLocator>> {
    let store = &config.object_store;
    match store.kind {
        ObjectStoreKind::S3 => {
            let bucket = store
                .bucket
                .as_deref()
                .context("object_store.bucket is required for kind 's3'")?;
            Ok(Arc::new(S3Locator::new(bucket)) as Arc<dyn ObjectLocator>)
        }
        ObjectStoreKind::Local => {
            let root = store.root.as_deref().unwrap_or(".");
            Ok(Arc::new(LocalLocator::new(root)) as Arc<dyn ObjectLocator>)
        }
    }
}

fn compile_check(task: &str, check: &QualityCheckConfig) -> Result<QualityCheck> {
    let context = || format!("task '{task}' check '{}'", check.name);
    let table = || {
        check
            .table
            .clone()
            .with_context(|| format!("{}: {} requires table", context(), check.kind.as_str()))
    };

    let compiled = match check.kind {
        CheckKind::NonEmpty => QualityCheck::non_empty(&check.name, table()?),
        CheckKind::NotNull => {
            let column = check
                .column
                .clone()
                .with_context(|| format!("{}: not_null requires column", context()))?;
            QualityCheck::not_null(&check.name, table()?, column)
        }
        CheckKind::Scalar => {
            let sql = check
                .sql
                .clone()
                .with_context(|| format!("{}: scalar requires sql", context()))?;
            let expected = check
                .expected
                .as_ref()
                .with_context(|| format!("{}: scalar requires expected", context()))?;
            let compiled = QualityCheck::scalar(&check.name, sql, Value::from_json(expected));
            match &check.table {
                Some(table) => compiled.on_table(table),
                None => compiled,
            }
        }
    };
    Ok(compiled)
}

fn compile_task(config: &PipelineConfig, task: &TaskConfig) -> Result<Task> {
    let spec = match (&task.stage, &task.load, &task.quality_check) {
        (Some(stage), None, None) => TaskSpec::Stage(StageSpec {
            table: stage.table.clone(),
            source: stage.source.clone(),
            credentials: config.credentials.clone(),
            options: config.copy.clone(),
        }),
        (None, Some(descriptor), None) => TaskSpec::Load(descriptor.clone()),
        (None, None, Some(gate)) => TaskSpec::QualityCheck(
            gate.checks
                .iter()
                .map(|check| compile_check(&task.name, check))
                .collect::<Result<_>>()?,
        ),
        _ => bail!(
            "task '{}' must define exactly one of stage, load, quality_check",
            task.name
        ),
    };
    Ok(Task {
        name: task.name.clone(),
        depends_on: task.depends_on.clone(),
        spec,
    })
}

/// Compile every configured task and validate the dependency graph.
///
/// # Errors
///
/// Returns [`PipelineError::Infrastructure`] for malformed task definitions
/// and [`PipelineError::Graph`] for structural graph problems.
pub fn build_graph(config: &PipelineConfig) -> Result<TaskGraph, PipelineError> {
    let tasks = config
        .tasks
        .iter()
        .map(|task| compile_task(config, task))
        .collect::<Result<Vec<_>>>()?;
    Ok(TaskGraph::new(tasks)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::parse_pipeline_str;
    use crate::graph::GraphError;
    use crate::quality::Assertion;
    use tidemark_types::run::LogicalKey;

    fn config(extra_tasks: &str) -> PipelineConfig {
        let yaml = format!(
            r#"
version: "1.0"
pipeline: sparkify
warehouse:
  backend: sqlite
  connection: ":memory:"
object_store:
  kind: s3
  bucket: udacity-dend
credentials:
  iam_role: arn:aws:iam::123456789012:role/dwhRole
tasks:
  - name: stage_events
    stage: {{ table: staging_events, source: "log_data/{{year}}/{{month}}/" }}
  - name: quality
    depends_on: [stage_events]
    quality_check:
      checks:
        - {{ name: events_present, kind: non_empty, table: staging_events }}
        - {{ name: paid, kind: scalar, table: staging_events, sql: "SELECT 1", expected: 1 }}
{extra_tasks}"#
        );
        parse_pipeline_str(&yaml).unwrap()
    }

    #[test]
    fn test_build_graph_compiles_tasks() {
        let graph = build_graph(&config("")).unwrap();
        assert_eq!(graph.len(), 2);

        let TaskSpec::Stage(stage) = &graph.tasks()[0].spec else {
            panic!("expected stage task");
        };
        assert_eq!(stage.table, "staging_events");
        assert!(stage.credentials.is_some());

        let TaskSpec::QualityCheck(checks) = &graph.tasks()[1].spec else {
            panic!("expected quality task");
        };
        assert_eq!(checks[0], QualityCheck::non_empty("events_present", "staging_events"));
        assert!(matches!(
            &checks[1].assertion,
            Assertion::Scalar { expected: Value::Int(1), table: Some(t), .. } if t == "staging_events"
        ));
    }

    #[test]
    fn test_build_graph_rejects_unknown_dependency() {
        let cfg = config("  - name: load_users\n    depends_on: [ghost]\n    load: { table: users, policy: append, sql: SELECT 1 }\n");
        let err = build_graph(&cfg).unwrap_err();
        assert!(matches!(
            err.as_graph_error(),
            Some(GraphError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_build_graph_rejects_taskless_action() {
        let cfg = config("  - name: nothing\n");
        let err = build_graph(&cfg).unwrap_err().to_string();
        assert!(err.contains("exactly one of stage, load, quality_check"));
    }

    #[test]
    fn test_create_locator_s3() {
        let locator = create_locator(&config("")).unwrap();
        let uri = locator
            .locate("log_data/{year}/{month}/", &LogicalKey::new("2018-11-30"))
            .unwrap();
        assert_eq!(uri, "s3://udacity-dend/log_data/2018/11/");
    }

    #[test]
    fn test_create_locator_s3_without_bucket_fails() {
        let mut cfg = config("");
        cfg.object_store.bucket = None;
        assert!(create_locator(&cfg).is_err());
    }

    #[test]
    fn test_create_connector_sqlite_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config("");
        let db_path = dir.path().join("dwh.db");
        cfg.warehouse.connection = Some(db_path.to_string_lossy().into_owned());

        let connector = create_connector(&cfg).unwrap();
        connector.connect().unwrap().ping().unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_create_connector_requires_connection() {
        let mut cfg = config("");
        cfg.warehouse.connection = None;
        let err = create_connector(&cfg).err().unwrap().to_string();
        assert!(err.contains("warehouse.connection is required"));
    }
}
