//! Clean command - removes the build directory

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};

use super::load_pipeline;

/// Run the clean command.
pub fn run(config_path: &Path) -> Result<()> {
    let pipeline = load_pipeline(config_path)?;
    let build_root = pipeline.build_root();

    pipeline
        .clean()
        .wrap_err_with(|| format!("Failed to clean {}", build_root.display()))?;

    println!("  ✓ Removed {}", build_root.display());
    Ok(())
}
