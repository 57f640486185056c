//! Pipeline YAML parsing with `${VAR}` environment substitution.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::{Captures, Regex};

use crate::config::types::PipelineConfig;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Replace every `${VAR_NAME}` with the variable's value.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = BTreeSet::new();
    let output = ENV_VAR_RE.replace_all(input, |caps: &Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| {
            missing.insert(caps[1].to_string());
            String::new()
        })
    });

    if !missing.is_empty() {
        let names: Vec<String> = missing.into_iter().collect();
        anyhow::bail!("Missing environment variable(s): {}", names.join(", "));
    }
    Ok(output.into_owned())
}

/// Parse pipeline YAML text (after env var substitution).
///
/// # Errors
///
/// Returns an error if substitution fails or the YAML does not match the
/// pipeline schema.
pub fn parse_pipeline_str(yaml: &str) -> Result<PipelineConfig> {
    let substituted = substitute_env_vars(yaml)?;
    serde_yaml::from_str(&substituted).context("Failed to parse pipeline YAML")
}

/// Parse a pipeline YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or its contents are invalid.
pub fn parse_pipeline(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;
    parse_pipeline_str(&content)
}
