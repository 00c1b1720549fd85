//! Command implementations

pub mod build;
pub mod clean;
pub mod fonts;
pub mod task;
pub mod watch;

use std::path::Path;

use assetpipe_core::Config;
use assetpipe_pipeline::{BuildReport, Pipeline};
use color_eyre::eyre::{Result, WrapErr};

/// Load the configuration and create a pipeline rooted at the current directory.
pub fn load_pipeline(config_path: &Path) -> Result<Pipeline> {
    let config = Config::load_with_env(config_path).wrap_err("Failed to load configuration")?;
    tracing::debug!(?config, "Loaded configuration");

    let root = std::env::current_dir().wrap_err("Failed to resolve project directory")?;
    Ok(Pipeline::new(config, root))
}

/// Print build statistics in a user-friendly format.
pub fn print_build_report(report: &BuildReport) {
    println!();
    println!("  Build Statistics:");
    println!("  ─────────────────────────────────");
    for task in &report.tasks {
        let mut line = format!("  {:<12} {:>6} written", task.task.as_str(), task.written);
        if task.skipped > 0 {
            line.push_str(&format!(", {} up to date", task.skipped));
        }
        if task.failed > 0 {
            line.push_str(&format!(", {} failed", task.failed));
        }
        println!("{line}");
    }
    for failure in &report.failures {
        println!("  {:<12} ✗ {}", failure.step, failure.error);
    }
    println!("  ─────────────────────────────────");
    println!("  Total:       {:>6} files", report.written());
    println!("  Duration:    {:>6}ms", report.duration_ms);
    println!();
}
