//! Pipeline orchestrator: schedules a [`TaskGraph`] against a warehouse.
//!
//! Each task attempt runs on the blocking pool with its own connection.
//! Ready tasks start in declaration order, bounded by
//! `max_parallel_tasks`; a failed task fails every pending dependent with
//! `DEPENDENCY_FAILED` without running it.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tidemark_types::error::{ErrorKind, TaskError};
use tidemark_types::run::{
    LogicalKey, Run, RunStatus, TaskKind, TaskOutput, TaskResult, TaskStatus,
};
use tidemark_warehouse::{AbortHandle, WarehouseConnector};
use tokio::task::{JoinError, JoinSet};
use uuid::Uuid;

use crate::config::types::PipelineConfig;
use crate::error::{compute_backoff, PipelineError};
use crate::execution::{RetryPolicy, RunOptions};
use crate::graph::TaskGraph;
use crate::locator::ObjectLocator;
use crate::resolve::{build_graph, create_connector, create_locator};
use crate::result::CheckReport;
use crate::task::TaskContext;

/// Shared, read-only inputs of one run.
struct RunEnv {
    graph: Arc<TaskGraph>,
    connector: Arc<dyn WarehouseConnector>,
    locator: Arc<dyn ObjectLocator>,
    logical_key: LogicalKey,
    task_timeout: Option<Duration>,
    retry: RetryPolicy,
}

/// How long a timed-out attempt may take to wind down after its abort.
const ABORT_GRACE: Duration = Duration::from_secs(30);

/// Final outcome of a task after all of its attempts.
struct Completion {
    index: usize,
    attempts: u32,
    result: Result<TaskOutput, TaskError>,
}

/// Outcome of a single attempt.
struct Attempt {
    result: Result<TaskOutput, TaskError>,
    /// `false` when a timed-out worker committed or may still be running.
    retry_safe: bool,
}

/// Deadline state shared by an attempt's worker and its supervisor.
#[derive(Default)]
struct AttemptControl {
    timed_out: bool,
    abort: Option<Arc<dyn AbortHandle>>,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Compile `config` and run it for `logical_key`.
///
/// Task failures are reported on the returned [`Run`], not as errors.
///
/// # Errors
///
/// Returns a `PipelineError` if the graph is invalid or the warehouse /
/// object store cannot be configured.
pub async fn run_pipeline(
    config: &PipelineConfig,
    logical_key: &LogicalKey,
) -> Result<Run, PipelineError> {
    let graph = Arc::new(build_graph(config)?);
    let connector = create_connector(config)?;
    let locator = create_locator(config)?;
    tracing::info!(
        pipeline = config.pipeline,
        warehouse = %connector.describe(),
        object_store = %locator.describe(),
        tasks = graph.len(),
        "Resolved pipeline"
    );
    let options = RunOptions::from(&config.resources);
    Ok(run_graph(
        &config.pipeline,
        graph,
        connector,
        locator,
        logical_key.clone(),
        &options,
    )
    .await)
}

/// Run every task of `graph` and return the run report.
///
/// A task starts only after all of its dependencies succeeded. The run is
/// `SUCCEEDED` iff every task succeeded.
pub async fn run_graph(
    pipeline: &str,
    graph: Arc<TaskGraph>,
    connector: Arc<dyn WarehouseConnector>,
    locator: Arc<dyn ObjectLocator>,
    logical_key: LogicalKey,
    options: &RunOptions,
) -> Run {
    let mut run = Run {
        id: Uuid::new_v4(),
        pipeline: pipeline.to_string(),
        logical_key: logical_key.clone(),
        status: RunStatus::Running,
        started_at: Utc::now(),
        finished_at: None,
        tasks: graph
            .tasks()
            .iter()
            .map(|t| TaskResult::pending(&t.name, t.spec.kind(), t.depends_on.clone()))
            .collect(),
    };
    tracing::info!(
        pipeline,
        run_id = %run.id,
        logical_key = %logical_key,
        tasks = graph.len(),
        max_parallel_tasks = options.max_parallel_tasks,
        "Starting pipeline run"
    );

    let env = Arc::new(RunEnv {
        graph: Arc::clone(&graph),
        connector,
        locator,
        logical_key,
        task_timeout: options.task_timeout,
        retry: options.retry,
    });
    let max_parallel = options.max_parallel_tasks.max(1);
    let mut join_set: JoinSet<Completion> = JoinSet::new();
    let mut running = 0usize;
    let mut supervisor_failure: Option<String> = None;

    loop {
        propagate_failures(&graph, &mut run.tasks);

        for index in 0..graph.len() {
            if running >= max_parallel {
                break;
            }
            if !is_ready(&graph, &run.tasks, index) {
                continue;
            }
            let task = &mut run.tasks[index];
            task.status = TaskStatus::Running;
            task.started_at = Some(Utc::now());
            tracing::info!(task = task.name, kind = %task.kind, "Task started");

            let env = Arc::clone(&env);
            join_set.spawn(async move { execute_with_retry(&env, index).await });
            running += 1;
        }

        if running == 0 {
            break;
        }

        match join_set.join_next().await {
            Some(Ok(completion)) => {
                running -= 1;
                record_completion(&mut run.tasks[completion.index], completion);
            }
            Some(Err(e)) => {
                // The crashed task is the one still Running once the set drains.
                tracing::error!(error = %e, "Task supervisor failed");
                running = running.saturating_sub(1);
                supervisor_failure = Some(e.to_string());
            }
            None => break,
        }
    }

    if let Some(message) = supervisor_failure {
        settle_crashed(&graph, &mut run.tasks, &message);
    }

    run.finished_at = Some(Utc::now());
    run.status = if run.tasks.iter().all(|t| t.status == TaskStatus::Succeeded) {
        RunStatus::Succeeded
    } else {
        RunStatus::Failed
    };

    let failed = run.failed_tasks().count();
    if run.succeeded() {
        tracing::info!(
            pipeline,
            run_id = %run.id,
            duration_secs = run.duration_secs().unwrap_or_default(),
            "Pipeline run succeeded"
        );
    } else {
        tracing::error!(
            pipeline,
            run_id = %run.id,
            failed_tasks = failed,
            "Pipeline run failed"
        );
    }
    run
}

/// Parse-level checks plus a warehouse round trip.
///
/// # Errors
///
/// Returns a `PipelineError` if the graph is invalid or the backends cannot
/// be configured. An unreachable warehouse is reported on the
/// [`CheckReport`] instead.
pub async fn check_pipeline(config: &PipelineConfig) -> Result<CheckReport, PipelineError> {
    tracing::info!(
        pipeline = config.pipeline,
        "Checking pipeline configuration"
    );
    let graph = build_graph(config)?;
    let connector = create_connector(config)?;
    let locator = create_locator(config)?;

    let target = connector.describe();
    let pinger = Arc::clone(&connector);
    let connectivity = tokio::task::spawn_blocking(move || {
        let mut warehouse = pinger.connect()?;
        warehouse.ping()
    })
    .await
    .map_err(|e| {
        PipelineError::Infrastructure(anyhow::anyhow!("connectivity check panicked: {e}"))
    })?
    .map_err(|e| e.to_string());

    match &connectivity {
        Ok(()) => tracing::info!(warehouse = %target, "Warehouse: OK"),
        Err(e) => tracing::error!(warehouse = %target, error = %e, "Warehouse: FAILED"),
    }

    Ok(CheckReport {
        pipeline: config.pipeline.clone(),
        warehouse: target,
        object_store: locator.describe(),
        tasks: graph.len(),
        levels: graph.levels().len(),
        connectivity,
    })
}

// ---------------------------------------------------------------------------
// Scheduling helpers
// ---------------------------------------------------------------------------

fn is_ready(graph: &TaskGraph, tasks: &[TaskResult], index: usize) -> bool {
    tasks[index].status == TaskStatus::Pending
        && graph
            .dependencies(index)
            .iter()
            .all(|&d| tasks[d].status == TaskStatus::Succeeded)
}

/// Fail every pending task that has a failed dependency, transitively.
fn propagate_failures(graph: &TaskGraph, tasks: &mut [TaskResult]) {
    loop {
        let mut changed = false;
        for index in 0..tasks.len() {
            if tasks[index].status != TaskStatus::Pending {
                continue;
            }
            let Some(&upstream) = graph
                .dependencies(index)
                .iter()
                .find(|&&d| tasks[d].status == TaskStatus::Failed)
            else {
                continue;
            };

            let upstream_name = tasks[upstream].name.clone();
            let task = &mut tasks[index];
            tracing::warn!(
                task = task.name,
                upstream = upstream_name,
                "Skipping task, upstream failed"
            );
            task.status = TaskStatus::Failed;
            task.finished_at = Some(Utc::now());
            task.error = Some(TaskError::dependency_failed(upstream_name));
            changed = true;
        }
        if !changed {
            break;
        }
    }
}

fn record_completion(task: &mut TaskResult, completion: Completion) {
    task.attempts = completion.attempts;
    task.finished_at = Some(Utc::now());
    match completion.result {
        Ok(output) => {
            tracing::info!(
                task = task.name,
                attempts = completion.attempts,
                "Task succeeded"
            );
            task.status = TaskStatus::Succeeded;
            task.output = Some(output);
        }
        Err(err) => {
            tracing::error!(
                task = task.name,
                attempts = completion.attempts,
                kind = %err.kind,
                error = %err.message,
                "Task failed"
            );
            task.status = TaskStatus::Failed;
            task.error = Some(err);
        }
    }
}

/// Fail tasks left `Running` after every supervisor has returned, then
/// their dependents.
fn settle_crashed(graph: &TaskGraph, tasks: &mut [TaskResult], message: &str) {
    for task in tasks.iter_mut().filter(|t| t.status == TaskStatus::Running) {
        task.status = TaskStatus::Failed;
        task.finished_at = Some(Utc::now());
        task.error = Some(worker_failure(task.kind, message));
    }
    propagate_failures(graph, tasks);
}

/// Map a crashed worker onto its component's failure kind.
fn worker_failure(kind: TaskKind, message: &str) -> TaskError {
    let kind = match kind {
        TaskKind::Stage => ErrorKind::StageFailed,
        TaskKind::Load => ErrorKind::LoadFailed,
        TaskKind::QualityCheck => ErrorKind::QualityViolation,
    };
    TaskError::new(kind, format!("task worker crashed: {message}"))
}

// ---------------------------------------------------------------------------
// Attempts
// ---------------------------------------------------------------------------

async fn execute_with_retry(env: &RunEnv, index: usize) -> Completion {
    let name = &env.graph.tasks()[index].name;
    let max_retries = env.retry.max_retries;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let Attempt { result, retry_safe } = execute_once(env, index).await;

        match result {
            Err(ref err) if retry_safe && err.is_retryable() && attempt <= max_retries => {
                let delay = compute_backoff(env.retry.backoff, attempt);
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(
                    task = name,
                    attempt,
                    max_retries,
                    delay_ms,
                    kind = %err.kind,
                    error = %err.message,
                    "Retryable task error, will retry"
                );
                tokio::time::sleep(delay).await;
            }
            result => {
                if matches!(&result, Err(err) if err.is_retryable() && max_retries > 0) {
                    if retry_safe {
                        tracing::error!(
                            task = name,
                            attempt,
                            max_retries,
                            "Max retries exhausted"
                        );
                    } else {
                        tracing::error!(task = name, attempt, "Timed-out attempt not retried");
                    }
                }
                return Completion {
                    index,
                    attempts: attempt,
                    result,
                };
            }
        }
    }
}

/// One attempt: connect, run, and enforce the timeout.
///
/// A timed-out attempt is aborted and then awaited, so it never overlaps a
/// retry of the same task.
async fn execute_once(env: &RunEnv, index: usize) -> Attempt {
    let control: Arc<Mutex<AttemptControl>> = Arc::default();
    let worker_control = Arc::clone(&control);
    let graph = Arc::clone(&env.graph);
    let connector = Arc::clone(&env.connector);
    let locator = Arc::clone(&env.locator);
    let logical_key = env.logical_key.clone();

    let mut handle = tokio::task::spawn_blocking(move || {
        let mut warehouse = connector
            .connect()
            .map_err(|e| TaskError::connect_failed(e.to_string()))?;
        {
            let mut control = worker_control
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if control.timed_out {
                return Err(TaskError::new(
                    ErrorKind::Timeout,
                    "attempt cancelled before it started",
                ));
            }
            control.abort = warehouse.abort_handle();
        }
        let mut ctx = TaskContext {
            warehouse: warehouse.as_mut(),
            locator: locator.as_ref(),
            logical_key: &logical_key,
        };
        graph.tasks()[index].spec.run(&mut ctx)
    });

    let Some(limit) = env.task_timeout else {
        return Attempt {
            result: joined_result(env, index, handle.await),
            retry_safe: true,
        };
    };
    if let Ok(joined) = tokio::time::timeout(limit, &mut handle).await {
        return Attempt {
            result: joined_result(env, index, joined),
            retry_safe: true,
        };
    }

    let task = &env.graph.tasks()[index].name;
    tracing::warn!(
        task,
        timeout_secs = limit.as_secs_f64(),
        "Task timed out, aborting"
    );
    let abort = {
        let mut control = control.lock().unwrap_or_else(PoisonError::into_inner);
        control.timed_out = true;
        control.abort.take()
    };
    if let Some(abort) = abort {
        abort.abort();
    }

    let mut error = TaskError::timeout(limit);
    // Each task writes in one transaction: a worker that failed committed nothing.
    let retry_safe = match tokio::time::timeout(ABORT_GRACE, handle).await {
        Ok(Ok(Err(_))) => true,
        Ok(Ok(Ok(_))) => {
            tracing::warn!(task, "Timed-out task committed before it could be aborted");
            error.message.push_str("; the attempt committed after the deadline");
            false
        }
        Ok(Err(e)) => {
            tracing::error!(task, error = %e, "Timed-out task worker crashed");
            error.message.push_str("; the attempt worker crashed after the deadline");
            false
        }
        Err(_) => {
            tracing::error!(
                task,
                grace_secs = ABORT_GRACE.as_secs(),
                "Timed-out task still running after abort"
            );
            error.message.push_str("; the attempt was still running after abort");
            false
        }
    };
    Attempt {
        result: Err(error),
        retry_safe,
    }
}

fn joined_result(
    env: &RunEnv,
    index: usize,
    joined: Result<Result<TaskOutput, TaskError>, JoinError>,
) -> Result<TaskOutput, TaskError> {
    joined.unwrap_or_else(|e| {
        let kind = env.graph.tasks()[index].spec.kind();
        Err(worker_failure(kind, &e.to_string()))
    })
}
