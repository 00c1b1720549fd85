//! Font manifest command

use std::path::Path;

use color_eyre::eyre::Result;

use super::load_pipeline;

/// Regenerate the SCSS font manifest from the converted fonts.
///
/// A filesystem failure is reported but does not fail the command; the
/// fragment may be left empty.
pub fn run(config_path: &Path) -> Result<()> {
    let pipeline = load_pipeline(config_path)?;
    let generator = pipeline.font_manifest();
    let manifest = generator.manifest_path();

    match pipeline.add_fonts_to_scss() {
        Ok(families) => {
            println!();
            println!("  ✓ Wrote {} font families to {}", families.len(), manifest.display());
            for family in &families {
                println!("    - {family}");
            }
            println!();
        }
        Err(e) => eprintln!("  ✗ Font manifest: {e}"),
    }

    Ok(())
}
