//! SCSS font manifest generation.
//!
//! The fragment is truncated first, then rebuilt from the names found in the
//! fonts output directory: one `@include font(...)` line per font family, where
//! the family is the file name up to its first `.`.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use assetpipe_core::{AssetCategory, Config};
use tracing::{error, info};

use crate::error::ManifestError;

/// Result type for manifest generation.
pub type Result<T> = std::result::Result<T, ManifestError>;

/// Generator for the font import fragment.
#[derive(Debug, Clone)]
pub struct FontManifest {
    fonts_dir: PathBuf,
    manifest: PathBuf,
    vars_import: String,
    weight: String,
    style: String,
}

impl FontManifest {
    /// Generator reading `fonts_dir` and writing `manifest`, with default
    /// weight `400` and style `normal`.
    pub fn new(fonts_dir: impl Into<PathBuf>, manifest: impl Into<PathBuf>) -> Self {
        Self {
            fonts_dir: fonts_dir.into(),
            manifest: manifest.into(),
            vars_import: "_vars.scss".to_string(),
            weight: "400".to_string(),
            style: "normal".to_string(),
        }
    }

    /// Generator configured for a project.
    #[must_use]
    pub fn from_config(config: &Config, project_root: &Path) -> Self {
        Self {
            fonts_dir: config.output_dir(project_root, AssetCategory::Fonts),
            manifest: config.manifest_path(project_root),
            vars_import: config.fonts.vars_import.clone(),
            weight: config.fonts.weight.clone(),
            style: config.fonts.style.clone(),
        }
    }

    /// Path of the generated fragment.
    #[must_use]
    pub fn manifest_path(&self) -> &Path {
        &self.manifest
    }

    /// Regenerate the fragment and return the families written.
    ///
    /// If the fonts directory cannot be listed the fragment stays empty.
    pub fn generate(&self) -> Result<Vec<String>> {
        let write_err = |source: std::io::Error| ManifestError::Write {
            path: self.manifest.clone(),
            source,
        };

        if let Some(parent) = self.manifest.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let file = File::create(&self.manifest).map_err(write_err)?;

        let families = match list_families(&self.fonts_dir) {
            Ok(families) => families,
            Err(e) => {
                error!(error = %e, "failed to list fonts");
                return Err(e);
            }
        };

        let mut out = BufWriter::new(file);
        write!(out, "@import \"{}\";\r\n", self.vars_import).map_err(write_err)?;
        for family in &families {
            write!(
                out,
                "@include font(\"{family}\", \"{family}\", \"{}\", \"{}\");\r\n",
                self.weight, self.style
            )
            .map_err(write_err)?;
        }
        out.flush().map_err(write_err)?;

        info!(
            path = %self.manifest.display(),
            families = families.len(),
            "font manifest written"
        );
        Ok(families)
    }
}

/// Family names in sorted listing order, first appearance kept.
fn list_families(dir: &Path) -> Result<Vec<String>> {
    let list_err = |source: std::io::Error| ManifestError::List {
        dir: dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(list_err)? {
        let entry = entry.map_err(list_err)?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();

    let mut families: Vec<String> = Vec::new();
    for name in names {
        let family = name.split('.').next().unwrap_or_default();
        if !family.is_empty() && !families.iter().any(|f| f == family) {
            families.push(family.to_string());
        }
    }
    Ok(families)
}
