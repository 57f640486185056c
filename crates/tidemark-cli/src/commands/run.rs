use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use chrono::Utc;
use tidemark_engine::orchestrator;
use tidemark_types::run::{LogicalKey, Run, TaskOutput, TaskResult};

/// Execute the `run` command: parse, validate, and run a pipeline.
///
/// Exits non-zero when any task fails.
pub async fn execute(pipeline_path: &Path, key: Option<&str>, json: bool) -> Result<ExitCode> {
    let config = super::load_pipeline(pipeline_path)?;
    let logical_key = key.map_or_else(
        || LogicalKey::from_date(Utc::now().date_naive()),
        LogicalKey::new,
    );

    tracing::info!(
        pipeline = config.pipeline,
        logical_key = %logical_key,
        tasks = config.tasks.len(),
        "Pipeline validated"
    );

    let run = orchestrator::run_pipeline(&config, &logical_key).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_report(&run);
    }

    Ok(if run.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_report(run: &Run) {
    println!(
        "Pipeline '{}' [{}] {}.",
        run.pipeline,
        run.logical_key,
        run.status.as_str().to_lowercase()
    );
    for task in &run.tasks {
        println!("  {:24} {:10} {}", task.name, task.status.as_str(), summary(task));
        if let Some(error) = &task.error {
            for violation in &error.violations {
                println!("    - {violation}");
            }
            if let Some(sql) = &error.sql {
                println!("    sql: {sql}");
            }
        }
    }
    if let Some(secs) = run.duration_secs() {
        println!("  Duration: {secs:.2}s");
    }
}

fn summary(task: &TaskResult) -> String {
    if let Some(error) = &task.error {
        return error.to_string();
    }
    match &task.output {
        Some(TaskOutput::Staged { source, rows, .. }) => format!("{rows} rows from {source}"),
        Some(TaskOutput::Loaded { policy, rows, .. }) => format!("{rows} rows ({policy})"),
        Some(TaskOutput::Checked { checks }) => format!("{checks} checks passed"),
        None => String::new(),
    }
}
