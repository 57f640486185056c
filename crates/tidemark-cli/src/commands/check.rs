use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use tidemark_engine::orchestrator;

/// Execute the `check` command: validate pipeline config and warehouse connectivity.
pub async fn execute(pipeline_path: &Path) -> Result<ExitCode> {
    let config = super::load_pipeline(pipeline_path)?;
    println!("Pipeline structure: OK");

    let report = orchestrator::check_pipeline(&config).await?;

    println!("{:18} {}", "Object store:", report.object_store);
    println!(
        "{:18} {} task(s) in {} level(s)",
        "Task graph:", report.tasks, report.levels
    );
    match &report.connectivity {
        Ok(()) => println!("{:18} OK ({})", "Warehouse:", report.warehouse),
        Err(e) => {
            println!("{:18} FAILED ({})", "Warehouse:", report.warehouse);
            println!("  {e}");
        }
    }

    if report.is_ok() {
        println!("\nAll checks passed.");
        Ok(ExitCode::SUCCESS)
    } else {
        anyhow::bail!("One or more checks failed")
    }
}
