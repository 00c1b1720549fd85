//! Source file selection.
//!
//! Patterns are relative to a root directory and use `/` separators; a leading
//! `!` marks an exclude. `*` never crosses a directory boundary, `**` does, and
//! `{a,b}` alternates. Each selected file keeps its path relative to the literal
//! directory prefix of the pattern that matched it, so `img/**/*.png` maps
//! `img/icons/a.png` to `icons/a.png`.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use assetpipe_core::CategoryPaths;
use globset::{Glob, GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use tracing::trace;
use walkdir::WalkDir;

use crate::error::{PipelineError, Result};

const GLOB_CHARS: [char; 4] = ['*', '?', '[', '{'];

/// A file picked by a [`Selection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected {
    /// Absolute source path.
    pub path: PathBuf,

    /// Path relative to the glob base.
    pub relative: PathBuf,
}

#[derive(Debug, Clone)]
struct Include {
    base: PathBuf,
    matcher: GlobMatcher,
}

/// A set of include and exclude patterns resolved against a root directory.
#[derive(Debug, Clone)]
pub struct Selection {
    root: PathBuf,
    includes: Vec<Include>,
    excludes: GlobSet,
    extensions: Option<Vec<String>>,
}

/// Compile one pattern.
pub fn compile_glob(pattern: &str) -> Result<Glob> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|source| PipelineError::Glob {
            pattern: pattern.to_string(),
            source,
        })
}

/// Literal directory prefix of a pattern.
///
/// A pattern without wildcards names a file, so its base is the parent.
#[must_use]
pub fn glob_base(pattern: &str) -> PathBuf {
    let parts: Vec<&str> = pattern.split('/').filter(|p| !p.is_empty()).collect();
    let literal = parts
        .iter()
        .position(|p| p.contains(GLOB_CHARS))
        .unwrap_or(parts.len().saturating_sub(1));

    parts[..literal].iter().collect()
}

impl Selection {
    /// Build a selection from patterns relative to `root`.
    pub fn new<'a>(
        root: impl Into<PathBuf>,
        patterns: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        let (excludes, includes): (Vec<&str>, Vec<&str>) =
            patterns.into_iter().partition(|p| p.starts_with('!'));
        let excludes = excludes.into_iter().filter_map(|p| p.strip_prefix('!'));
        Self::build(root.into(), includes, excludes)
    }

    /// Selection over one registry category.
    pub fn for_category(root: impl Into<PathBuf>, paths: &CategoryPaths) -> Result<Self> {
        Self::build(root.into(), paths.includes(), paths.excludes())
    }

    fn build<'a>(
        root: PathBuf,
        includes: impl IntoIterator<Item = &'a str>,
        excludes: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        let includes = includes
            .into_iter()
            .map(|pattern| {
                Ok(Include {
                    base: glob_base(pattern),
                    matcher: compile_glob(pattern)?.compile_matcher(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut set = GlobSetBuilder::new();
        for exclude in excludes {
            set.add(compile_glob(exclude)?);
        }
        let excludes = set.build().map_err(|source| PipelineError::Glob {
            pattern: "<excludes>".to_string(),
            source,
        })?;

        Ok(Self {
            root,
            includes,
            excludes,
            extensions: None,
        })
    }

    /// Keep only files with one of the given extensions (case-insensitive).
    #[must_use]
    pub fn only_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = Some(extensions.iter().map(|e| e.to_ascii_lowercase()).collect());
        self
    }

    fn extension_allowed(&self, path: &Path) -> bool {
        let Some(allowed) = &self.extensions else {
            return true;
        };
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| allowed.contains(&e.to_ascii_lowercase()))
    }

    /// Expand the selection, sorted by source path.
    ///
    /// A file matched by several includes keeps the relative path of the first.
    /// Missing base directories select nothing.
    pub fn files(&self) -> Result<Vec<Selected>> {
        let mut found = BTreeMap::new();

        for include in &self.includes {
            let dir = self.root.join(&include.base);
            if !dir.is_dir() {
                trace!(dir = %dir.display(), "glob base missing");
                continue;
            }

            for entry in WalkDir::new(&dir).follow_links(true).sort_by_file_name() {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }

                let path = entry.path();
                let Ok(from_root) = path.strip_prefix(&self.root) else {
                    continue;
                };
                if !include.matcher.is_match(from_root)
                    || self.excludes.is_match(from_root)
                    || !self.extension_allowed(from_root)
                {
                    continue;
                }

                if let Ok(relative) = path.strip_prefix(&dir) {
                    found
                        .entry(path.to_path_buf())
                        .or_insert_with(|| relative.to_path_buf());
                }
            }
        }

        Ok(found
            .into_iter()
            .map(|(path, relative)| Selected { path, relative })
            .collect())
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Whether `output` exists and is at least as new as `source`.
#[must_use]
pub fn is_fresh(source: &Path, output: &Path) -> bool {
    match (modified(source), modified(output)) {
        (Some(source), Some(output)) => output >= source,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, relative).unwrap();
    }

    fn relatives(files: &[Selected]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.relative.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_glob_base() {
        assert_eq!(glob_base("*.html"), PathBuf::new());
        assert_eq!(glob_base("scss/*.scss"), PathBuf::from("scss"));
        assert_eq!(glob_base("img/**/*.{jpg,png}"), PathBuf::from("img"));
        assert_eq!(glob_base("js/index.js"), PathBuf::from("js"));
        assert_eq!(glob_base("favicons/**"), PathBuf::from("favicons"));
    }

    #[test]
    fn test_star_stays_in_directory() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "index.html");
        touch(dir.path(), "_header.html");
        touch(dir.path(), "pages/about.html");

        let selection = Selection::new(dir.path(), ["*.html", "!_*.html"]).unwrap();
        assert_eq!(relatives(&selection.files().unwrap()), vec!["index.html"]);
    }

    #[test]
    fn test_relative_to_glob_base() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "img/a.png");
        touch(dir.path(), "img/icons/b.svg");
        touch(dir.path(), "img/icons/favicon.png");
        touch(dir.path(), "img/notes.txt");

        let selection = Selection::new(
            dir.path(),
            ["img/**/*.{jpg,png,svg}", "!**/favicon.*"],
        )
        .unwrap();

        assert_eq!(
            relatives(&selection.files().unwrap()),
            vec!["a.png", "icons/b.svg"]
        );
    }

    #[test]
    fn test_literal_files_and_missing_dirs() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "js/index.js");
        touch(dir.path(), "js/other.js");

        let selection =
            Selection::new(dir.path(), ["js/index.js", "js/libs.js", "php/**"]).unwrap();
        assert_eq!(relatives(&selection.files().unwrap()), vec!["index.js"]);
    }

    #[test]
    fn test_only_extensions() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "img/a.PNG");
        touch(dir.path(), "img/b.svg");

        let selection = Selection::new(dir.path(), ["img/**"])
            .unwrap()
            .only_extensions(&["png", "jpg"]);
        assert_eq!(relatives(&selection.files().unwrap()), vec!["a.PNG"]);
    }

    #[test]
    fn test_category_selection_applies_excludes() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "scss/style.scss");
        touch(dir.path(), "scss/_vars.scss");

        let registry = assetpipe_core::PathRegistry::default();
        let selection = Selection::for_category(dir.path(), &registry.css).unwrap();
        assert_eq!(relatives(&selection.files().unwrap()), vec!["style.scss"]);
    }

    #[test]
    fn test_invalid_glob() {
        let err = Selection::new("/tmp", ["img/{a,b"]).unwrap_err();
        assert!(matches!(err, PipelineError::Glob { .. }));
    }

    #[test]
    fn test_freshness() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.png");
        let output = dir.path().join("out.png");
        fs::write(&source, "src").unwrap();

        assert!(!is_fresh(&source, &output));

        fs::write(&output, "out").unwrap();
        assert!(is_fresh(&source, &output));
    }

    #[test]
    fn test_source_newer_than_output_is_stale() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.png");
        let output = dir.path().join("out.png");
        fs::write(&source, "src").unwrap();
        fs::write(&output, "out").unwrap();

        let later = modified(&output).unwrap() + Duration::from_secs(60);
        fs::File::options()
            .write(true)
            .open(&source)
            .unwrap()
            .set_modified(later)
            .unwrap();

        assert!(!is_fresh(&source, &output));
    }
}
