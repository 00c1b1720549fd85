//! Single task command

use std::path::Path;

use assetpipe_pipeline::TaskName;
use color_eyre::eyre::Result;

use super::load_pipeline;

/// Run one task with its own run context.
///
/// A task that aborts is reported but does not fail the command.
pub fn run(config_path: &Path, name: TaskName) -> Result<()> {
    let pipeline = load_pipeline(config_path)?;

    match pipeline.run_task(name) {
        Ok(report) => {
            println!();
            println!(
                "  ✓ {name}: {} written, {} up to date, {} failed in {}ms",
                report.written, report.skipped, report.failed, report.duration_ms
            );
            println!();
        }
        Err(e) => {
            tracing::error!(task = %name, error = %e, "Task aborted");
            eprintln!("  ✗ {name}: {e}");
        }
    }

    Ok(())
}
