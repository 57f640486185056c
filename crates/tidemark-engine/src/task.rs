//! Pipeline tasks: the closed set of operations a graph node can perform.

use tidemark_types::error::TaskError;
use tidemark_types::run::{LogicalKey, TaskKind, TaskOutput};
use tidemark_types::table::TableDescriptor;
use tidemark_warehouse::{CopyOptions, Credentials, Warehouse};

use crate::load::load;
use crate::locator::ObjectLocator;
use crate::quality::{self, CheckResult, QualityCheck};
use crate::stage::stage;

/// Static description of a stage task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub table: String,
    /// Source key template resolved by the run's [`ObjectLocator`].
    pub source: String,
    pub credentials: Option<Credentials>,
    pub options: CopyOptions,
}

/// What a task does when it runs.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskSpec {
    Stage(StageSpec),
    Load(TableDescriptor),
    QualityCheck(Vec<QualityCheck>),
}

/// A named graph node.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub name: String,
    pub depends_on: Vec<String>,
    pub spec: TaskSpec,
}

/// Per-attempt resources handed to a running task.
pub struct TaskContext<'a> {
    /// Connection owned by this attempt alone.
    pub warehouse: &'a mut dyn Warehouse,
    pub locator: &'a dyn ObjectLocator,
    pub logical_key: &'a LogicalKey,
}

impl TaskSpec {
    #[must_use]
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Stage(_) => TaskKind::Stage,
            Self::Load(_) => TaskKind::Load,
            Self::QualityCheck(_) => TaskKind::QualityCheck,
        }
    }

    /// Execute once against `ctx`.
    ///
    /// # Errors
    ///
    /// Returns the component's [`TaskError`]: `LOCATE_FAILED` or
    /// `STAGE_FAILED` for stages, `LOAD_FAILED` for loads,
    /// `QUALITY_VIOLATION` for gates, and `CONNECT_FAILED` for any of them
    /// when the connection drops.
    pub fn run(&self, ctx: &mut TaskContext<'_>) -> Result<TaskOutput, TaskError> {
        match self {
            Self::Stage(spec) => {
                let location = ctx
                    .locator
                    .locate(&spec.source, ctx.logical_key)
                    .map_err(|e| TaskError::locate_failed(e.to_string()))?;
                let result = stage(
                    ctx.warehouse,
                    &spec.table,
                    &location,
                    spec.credentials.as_ref(),
                    &spec.options,
                )?;
                Ok(TaskOutput::Staged {
                    table: result.table,
                    source: result.location,
                    rows: result.rows,
                })
            }
            Self::Load(descriptor) => {
                let result = load(ctx.warehouse, descriptor)?;
                Ok(TaskOutput::Loaded {
                    table: result.table,
                    policy: result.policy,
                    rows: result.rows,
                })
            }
            Self::QualityCheck(checks) => {
                match quality::check(ctx.warehouse, checks)
                    .map_err(|e| TaskError::connect_failed(e.to_string()))?
                {
                    CheckResult::Passed { checks } => Ok(TaskOutput::Checked { checks }),
                    CheckResult::Failed { violations, .. } => {
                        Err(TaskError::quality_violation(violations))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::LocalLocator;
    use tidemark_types::error::ErrorKind;
    use tidemark_types::table::LoadPolicy;
    use tidemark_warehouse::{SqliteConnector, Value, WarehouseConnector};

    fn stage_spec(source: &str) -> TaskSpec {
        TaskSpec::Stage(StageSpec {
            table: "staging_songs".into(),
            source: source.into(),
            credentials: None,
            options: CopyOptions::default(),
        })
    }

    #[test]
    fn kinds() {
        assert_eq!(stage_spec("song_data/").kind(), TaskKind::Stage);
        assert_eq!(TaskSpec::QualityCheck(Vec::new()).kind(), TaskKind::QualityCheck);
    }

    #[test]
    fn stage_resolves_template_then_copies() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("song_data/A")).unwrap();
        std::fs::write(
            dir.path().join("song_data/A/TRAAAAW128F429D538.json"),
            r#"{"song_id":"SOMZWCG12A8C13C480","title":"I Didn't Mean To","duration":218.93179}"#,
        )
        .unwrap();

        let mut warehouse = SqliteConnector::in_memory().unwrap().connect().unwrap();
        warehouse
            .execute("CREATE TABLE staging_songs (song_id TEXT, title TEXT, duration REAL)")
            .unwrap();
        let locator = LocalLocator::new(dir.path());
        let key = LogicalKey::new("2018-11-01");
        let mut ctx = TaskContext {
            warehouse: warehouse.as_mut(),
            locator: &locator,
            logical_key: &key,
        };

        let output = stage_spec("song_data/").run(&mut ctx).unwrap();
        match output {
            TaskOutput::Staged { table, rows, .. } => {
                assert_eq!(table, "staging_songs");
                assert_eq!(rows, 1);
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn unresolvable_source_is_locate_failed() {
        let dir = tempfile::tempdir().unwrap();
        let mut warehouse = SqliteConnector::in_memory().unwrap().connect().unwrap();
        let locator = LocalLocator::new(dir.path());
        let key = LogicalKey::new("2018-11-01");
        let mut ctx = TaskContext {
            warehouse: warehouse.as_mut(),
            locator: &locator,
            logical_key: &key,
        };

        let err = stage_spec("log_data/{year}/{month}/").run(&mut ctx).unwrap_err();
        assert_eq!(err.kind, ErrorKind::LocateFailed);
        assert!(err.message.contains("does not exist"));
    }

    #[test]
    fn failed_gate_is_quality_violation() {
        let dir = tempfile::tempdir().unwrap();
        let mut warehouse = SqliteConnector::in_memory().unwrap().connect().unwrap();
        warehouse.execute("CREATE TABLE artists (artist_id TEXT)").unwrap();
        let locator = LocalLocator::new(dir.path());
        let key = LogicalKey::new("2018-11-01");
        let mut ctx = TaskContext {
            warehouse: warehouse.as_mut(),
            locator: &locator,
            logical_key: &key,
        };

        let spec = TaskSpec::QualityCheck(vec![
            QualityCheck::non_empty("artists_not_empty", "artists"),
            QualityCheck::scalar("zero", "SELECT 0", Value::Int(0)),
        ]);
        let err = spec.run(&mut ctx).unwrap_err();
        assert_eq!(err.kind, ErrorKind::QualityViolation);
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].check, "artists_not_empty");
    }

    #[test]
    fn load_reports_policy_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut warehouse = SqliteConnector::in_memory().unwrap().connect().unwrap();
        warehouse.execute("CREATE TABLE start_times (start_time INTEGER)").unwrap();
        let locator = LocalLocator::new(dir.path());
        let key = LogicalKey::new("2018-11-01");
        let mut ctx = TaskContext {
            warehouse: warehouse.as_mut(),
            locator: &locator,
            logical_key: &key,
        };

        let spec = TaskSpec::Load(TableDescriptor {
            table: "start_times".into(),
            columns: Vec::new(),
            select_sql: "SELECT 1541105830796 UNION SELECT 1541106106796".into(),
            policy: LoadPolicy::Append,
        });
        assert_eq!(
            spec.run(&mut ctx).unwrap(),
            TaskOutput::Loaded {
                table: "start_times".into(),
                policy: LoadPolicy::Append,
                rows: 2,
            }
        );
    }
}
