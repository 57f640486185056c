pub mod check;
pub mod plan;
pub mod run;

use std::path::Path;

use anyhow::{Context, Result};
use tidemark_engine::config::parser;
use tidemark_engine::config::types::PipelineConfig;
use tidemark_engine::config::validator;

/// Parse and validate the pipeline file at `path`.
fn load_pipeline(path: &Path) -> Result<PipelineConfig> {
    let config = parser::parse_pipeline(path)
        .with_context(|| format!("Failed to parse pipeline: {}", path.display()))?;
    validator::validate_pipeline(&config)?;
    Ok(config)
}
