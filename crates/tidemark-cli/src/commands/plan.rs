use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use tidemark_engine::resolve::build_graph;

/// Execute the `plan` command: print tasks grouped by dependency level.
pub fn execute(pipeline_path: &Path) -> Result<ExitCode> {
    let config = super::load_pipeline(pipeline_path)?;
    let graph = build_graph(&config)?;

    println!("Pipeline '{}': {} task(s)", config.pipeline, graph.len());
    for (depth, level) in graph.levels().iter().enumerate() {
        println!("  level {depth}:");
        for name in level {
            let Some(task) = graph.task(name) else {
                continue;
            };
            if task.depends_on.is_empty() {
                println!("    {name} ({})", task.spec.kind());
            } else {
                println!(
                    "    {name} ({}) <- {}",
                    task.spec.kind(),
                    task.depends_on.join(", ")
                );
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
