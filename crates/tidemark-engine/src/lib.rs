//! Core orchestration crate for tidemark warehouse pipelines.
//!
//! Moves raw records from object storage into staging tables, loads
//! dimension and fact tables from staging, and gates each run on
//! data-quality assertions, all driven by an explicit task graph.

#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod execution;
pub mod graph;
pub mod load;
pub mod locator;
pub mod orchestrator;
pub mod quality;
pub mod resolve;
pub mod result;
pub mod stage;
pub mod task;

// Re-export public API for convenience
pub use error::PipelineError;
pub use execution::{RetryPolicy, RunOptions};
pub use graph::TaskGraph;
pub use orchestrator::{check_pipeline, run_graph, run_pipeline};
pub use result::CheckReport;
