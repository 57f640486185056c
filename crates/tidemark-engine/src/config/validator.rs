//! Semantic validation for parsed pipeline configuration values.

use std::collections::HashSet;
use std::sync::LazyLock;

use anyhow::{bail, Result};
use regex::Regex;

use crate::config::types::{
    CheckKind, ObjectStoreKind, PipelineConfig, QualityCheckConfig, TaskConfig,
};
use crate::graph::dependency_errors;
use crate::locator::validate_template;

static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*(\.[A-Za-z_][A-Za-z0-9_$]*)?$")
        .expect("valid identifier regex")
});

fn check_identifier(value: &str, what: &str, context: &str, errors: &mut Vec<String>) {
    if !IDENTIFIER_RE.is_match(value) {
        errors.push(format!("{context}: invalid {what} '{value}'"));
    }
}

fn validate_check(check: &QualityCheckConfig, context: &str, errors: &mut Vec<String>) {
    let context = format!("{context} check '{}'", check.name);
    if check.name.trim().is_empty() {
        errors.push(format!("{context}: check name must not be empty"));
    }

    match check.kind {
        CheckKind::NonEmpty | CheckKind::NotNull => {
            match &check.table {
                Some(table) => check_identifier(table, "table", &context, errors),
                None => errors.push(format!(
                    "{context}: kind '{}' requires table",
                    check.kind.as_str()
                )),
            }
            if check.kind == CheckKind::NotNull {
                match &check.column {
                    Some(column) => check_identifier(column, "column", &context, errors),
                    None => errors.push(format!("{context}: kind 'not_null' requires column")),
                }
            }
            if check.sql.is_some() || check.expected.is_some() {
                errors.push(format!(
                    "{context}: sql/expected only apply to kind 'scalar'"
                ));
            }
        }
        CheckKind::Scalar => {
            if check.sql.as_deref().map_or(true, |s| s.trim().is_empty()) {
                errors.push(format!("{context}: kind 'scalar' requires sql"));
            }
            if check.expected.is_none() {
                errors.push(format!("{context}: kind 'scalar' requires expected"));
            }
            if let Some(table) = &check.table {
                check_identifier(table, "table", &context, errors);
            }
        }
    }
}

fn validate_task(task: &TaskConfig, errors: &mut Vec<String>) {
    let context = format!("Task '{}'", task.name);
    if task.action_count() != 1 {
        errors.push(format!(
            "{context}: must define exactly one of stage, load, quality_check"
        ));
    }

    if let Some(stage) = &task.stage {
        check_identifier(&stage.table, "table", &context, errors);
        if stage.source.trim().is_empty() {
            errors.push(format!("{context}: stage source must not be empty"));
        } else if let Err(e) = validate_template(&stage.source) {
            errors.push(format!("{context}: {e}"));
        }
    }

    if let Some(load) = &task.load {
        check_identifier(&load.table, "table", &context, errors);
        for column in &load.columns {
            check_identifier(column, "column", &context, errors);
        }
        if load.select_sql.trim().is_empty() {
            errors.push(format!("{context}: load sql must not be empty"));
        }
    }

    if let Some(gate) = &task.quality_check {
        if gate.checks.is_empty() {
            errors.push(format!("{context}: quality_check must define at least one check"));
        }
        let mut names = HashSet::new();
        for check in &gate.checks {
            if !names.insert(check.name.as_str()) {
                errors.push(format!("{context}: duplicate check name '{}'", check.name));
            }
            validate_check(check, &context, errors);
        }
    }
}

/// Validate a parsed pipeline configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the pipeline config.
pub fn validate_pipeline(config: &PipelineConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported pipeline version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.pipeline.trim().is_empty() {
        errors.push("Pipeline name must not be empty".to_string());
    }

    if config
        .warehouse
        .connection
        .as_deref()
        .map_or(true, |c| c.trim().is_empty())
    {
        errors.push("warehouse.connection must not be empty".to_string());
    }

    match config.object_store.kind {
        ObjectStoreKind::S3 => {
            if config
                .object_store
                .bucket
                .as_deref()
                .map_or(true, |b| b.trim().is_empty())
            {
                errors.push("object_store.bucket is required for kind 's3'".to_string());
            }
        }
        ObjectStoreKind::Local => {
            if config.object_store.bucket.is_some() {
                errors.push("object_store.bucket only applies to kind 's3'".to_string());
            }
        }
    }

    if config.resources.max_parallel_tasks == 0 {
        errors.push("max_parallel_tasks must be at least 1".to_string());
    }
    if config.resources.task_timeout_seconds == Some(0) {
        errors.push("task_timeout_seconds must be > 0".to_string());
    }

    for task in &config.tasks {
        validate_task(task, &mut errors);
    }
    errors.extend(
        dependency_errors(
            config
                .tasks
                .iter()
                .map(|t| (t.name.as_str(), t.depends_on.as_slice())),
        )
        .into_iter()
        .map(|e| e.to_string()),
    );

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Pipeline validation failed:\n  - {}", errors.join("\n  - "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::parse_pipeline_str;

    fn valid_yaml() -> &'static str {
        r#"
version: "1.0"
pipeline: sparkify
warehouse:
  backend: postgres
  connection: "host=localhost port=5439 dbname=dev"
object_store:
  kind: s3
  bucket: udacity-dend
tasks:
  - name: stage_events
    stage: { table: staging_events, source: "log_data/{year}/{month}/" }
  - name: load_users
    depends_on: [stage_events]
    load:
      table: users
      columns: [user_id, first_name]
      policy: truncate_insert
      sql: SELECT DISTINCT userId, firstName FROM staging_events
  - name: run_quality_checks
    depends_on: [load_users]
    quality_check:
      checks:
        - { name: users_not_empty, kind: non_empty, table: users }
        - { name: users_id_not_null, kind: not_null, table: users, column: user_id }
"#
    }

    fn validation_error(yaml: &str) -> String {
        let config = parse_pipeline_str(yaml).unwrap();
        validate_pipeline(&config).unwrap_err().to_string()
    }

    #[test]
    fn test_valid_pipeline_passes() {
        let config = parse_pipeline_str(valid_yaml()).unwrap();
        assert!(validate_pipeline(&config).is_ok());
    }

    #[test]
    fn test_wrong_version_fails() {
        let err = validation_error(&valid_yaml().replace("\"1.0\"", "\"2.0\""));
        assert!(err.contains("Unsupported pipeline version"));
    }

    #[test]
    fn test_empty_pipeline_name_fails() {
        let err = validation_error(&valid_yaml().replace("pipeline: sparkify", "pipeline: \"\""));
        assert!(err.contains("Pipeline name must not be empty"));
    }

    #[test]
    fn test_s3_without_bucket_fails() {
        let err = validation_error(&valid_yaml().replace("  bucket: udacity-dend\n", ""));
        assert!(err.contains("object_store.bucket is required"));
    }

    #[test]
    fn test_bad_template_fails() {
        let err = validation_error(&valid_yaml().replace("{month}", "{hour}"));
        assert!(err.contains("unknown placeholder {hour}"));
    }

    #[test]
    fn test_bad_identifier_fails() {
        let err = validation_error(&valid_yaml().replace(
            "table: users, column: user_id",
            "table: users, column: \"user_id; DROP TABLE users\"",
        ));
        assert!(err.contains("invalid column"));
    }

    #[test]
    fn test_schema_qualified_table_passes() {
        let yaml = valid_yaml().replace("table: staging_events,", "table: staging.events,");
        let config = parse_pipeline_str(&yaml).unwrap();
        assert!(validate_pipeline(&config).is_ok());
    }

    #[test]
    fn test_not_null_without_column_fails() {
        let err = validation_error(&valid_yaml().replace(", column: user_id", ""));
        assert!(err.contains("kind 'not_null' requires column"));
    }

    #[test]
    fn test_scalar_requires_sql_and_expected() {
        let err = validation_error(&valid_yaml().replace(
            "{ name: users_not_empty, kind: non_empty, table: users }",
            "{ name: paid_count, kind: scalar }",
        ));
        assert!(err.contains("kind 'scalar' requires sql"));
        assert!(err.contains("kind 'scalar' requires expected"));
    }

    #[test]
    fn test_two_actions_fail() {
        let err = validation_error(&valid_yaml().replace(
            "    depends_on: [stage_events]\n",
            "    depends_on: [stage_events]\n    stage: { table: staging_songs, source: song_data/ }\n",
        ));
        assert!(err.contains("Task 'load_users': must define exactly one of"));
    }

    #[test]
    fn test_cycle_fails() {
        let yaml = valid_yaml().replace(
            "  - name: stage_events\n",
            "  - name: stage_events\n    depends_on: [run_quality_checks]\n",
        );
        let err = validation_error(&yaml);
        assert!(err.contains("dependency cycle among tasks"));
    }

    #[test]
    fn test_all_errors_reported_together() {
        let yaml = valid_yaml()
            .replace("\"1.0\"", "\"9\"")
            .replace("[stage_events]", "[ghost]");
        let err = validation_error(&yaml);
        assert!(err.starts_with("Pipeline validation failed:"));
        assert!(err.contains("Unsupported pipeline version"));
        assert!(err.contains("depends on unknown task 'ghost'"));
    }

    #[test]
    fn test_zero_parallelism_fails() {
        let yaml = format!("{}resources:\n  max_parallel_tasks: 0\n", valid_yaml());
        let err = validation_error(&yaml);
        assert!(err.contains("max_parallel_tasks must be at least 1"));
    }
}
