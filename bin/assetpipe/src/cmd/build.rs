//! Build command - runs every task in order

use std::path::Path;

use color_eyre::eyre::Result;

use super::{load_pipeline, print_build_report};

/// Run the build command.
///
/// Task failures are reported but do not fail the command.
pub fn run(config_path: &Path) -> Result<()> {
    tracing::info!(?config_path, "Starting build");

    let pipeline = load_pipeline(config_path)?;
    let report = pipeline.build();
    print_build_report(&report);

    tracing::info!(
        written = report.written(),
        failures = report.failures.len(),
        duration_ms = report.duration_ms,
        "Build finished"
    );

    Ok(())
}
