//! Stage abstraction shared by every transformation.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use thiserror::Error;

/// Stage errors.
#[derive(Debug, Error)]
pub enum StageError {
    /// The input could not be parsed or compiled.
    #[error("syntax error in {path}: {message}")]
    Syntax { path: PathBuf, message: String },

    /// An include directive could not be resolved.
    #[error("include error in {path}: {message}")]
    Include { path: PathBuf, message: String },

    /// An external tool ran but reported a failure.
    #[error("{program} failed on {path}: {message}")]
    ToolFailed {
        program: String,
        path: PathBuf,
        message: String,
    },

    /// An external tool could not be started.
    #[error("tool not available: {program}")]
    ToolUnavailable {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Text stage received non UTF-8 content.
    #[error("{0} is not valid UTF-8")]
    Encoding(PathBuf),

    /// Stage could not be configured.
    #[error("invalid stage configuration: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl StageError {
    /// Create a syntax error.
    pub fn syntax(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Syntax {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an include error.
    pub fn include(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Include {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Errors that make the whole task pointless rather than one file.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ToolUnavailable { .. } | Self::Config(_))
    }
}

/// Result type for stage operations.
pub type Result<T> = std::result::Result<T, StageError>;

/// A file travelling through a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Source file the asset was read from.
    pub source: PathBuf,

    /// Output path relative to the task's output directory.
    pub relative: PathBuf,

    /// Current contents.
    pub contents: Vec<u8>,
}

impl Asset {
    /// Create a new asset.
    pub fn new(
        source: impl Into<PathBuf>,
        relative: impl Into<PathBuf>,
        contents: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            source: source.into(),
            relative: relative.into(),
            contents: contents.into(),
        }
    }

    /// Contents as UTF-8 text.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.contents).map_err(|_| StageError::Encoding(self.source.clone()))
    }

    /// Replace the contents with text.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.contents = text.into().into_bytes();
        self
    }

    /// Replace the extension of the output path.
    #[must_use]
    pub fn with_extension(mut self, ext: &str) -> Self {
        self.relative.set_extension(ext);
        self
    }

    /// Lowercased extension of the output path.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        self.relative
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// Per-run state shared by every stage of one build or task run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Cache-busting token appended to stylesheet and script references.
    pub version: String,
}

impl RunContext {
    /// Context stamped with the current time in milliseconds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: Utc::now().timestamp_millis().to_string(),
        }
    }

    /// Context with a fixed version token.
    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A content transformation.
pub trait Stage: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Transform one asset.
    fn apply(&self, asset: Asset, ctx: &RunContext) -> Result<Asset>;
}

impl<S: Stage + ?Sized> Stage for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn apply(&self, asset: Asset, ctx: &RunContext) -> Result<Asset> {
        (**self).apply(asset, ctx)
    }
}

/// Output path rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rename {
    /// Insert a suffix between stem and extension (`app.js` → `app.min.js`).
    Suffix(String),

    /// Replace the extension (`photo.jpg` → `photo.webp`).
    Extension(String),
}

impl Rename {
    /// Suffix rename.
    pub fn suffix(suffix: impl Into<String>) -> Self {
        Self::Suffix(suffix.into())
    }

    /// Extension rename.
    pub fn extension(ext: impl Into<String>) -> Self {
        Self::Extension(ext.into())
    }

    /// Path produced by this rename.
    #[must_use]
    pub fn target(&self, relative: &Path) -> PathBuf {
        match self {
            Self::Extension(ext) => relative.with_extension(ext),
            Self::Suffix(suffix) => {
                let stem = relative
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let name = match relative.extension() {
                    Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
                    None => format!("{stem}{suffix}"),
                };
                relative.with_file_name(name)
            }
        }
    }
}

impl Stage for Rename {
    fn name(&self) -> &str {
        "rename"
    }

    fn apply(&self, mut asset: Asset, _ctx: &RunContext) -> Result<Asset> {
        asset.relative = self.target(&asset.relative);
        Ok(asset)
    }
}

/// Dispatches to a stage chosen by file extension; unmatched files pass through.
pub struct ByExtension {
    name: String,
    routes: Vec<(Vec<String>, Vec<Arc<dyn Stage>>)>,
}

impl ByExtension {
    /// Create an empty dispatcher.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routes: Vec::new(),
        }
    }

    /// Route the given extensions through a chain of stages.
    #[must_use]
    pub fn route(mut self, extensions: &[&str], chain: Vec<Arc<dyn Stage>>) -> Self {
        let extensions = extensions.iter().map(|e| e.to_ascii_lowercase()).collect();
        self.routes.push((extensions, chain));
        self
    }
}

impl std::fmt::Debug for ByExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let routes: Vec<_> = self
            .routes
            .iter()
            .map(|(exts, chain)| {
                let names: Vec<_> = chain.iter().map(|s| s.name().to_string()).collect();
                (exts.join(","), names)
            })
            .collect();
        f.debug_struct("ByExtension")
            .field("name", &self.name)
            .field("routes", &routes)
            .finish()
    }
}

impl Stage for ByExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, asset: Asset, ctx: &RunContext) -> Result<Asset> {
        let Some(ext) = asset.extension() else {
            return Ok(asset);
        };

        match self.routes.iter().find(|(exts, _)| exts.contains(&ext)) {
            Some((_, chain)) => chain
                .iter()
                .try_fold(asset, |asset, stage| stage.apply(asset, ctx)),
            None => Ok(asset),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Upper;

    impl Stage for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn apply(&self, asset: Asset, _ctx: &RunContext) -> Result<Asset> {
            let text = asset.text()?.to_uppercase();
            Ok(asset.with_text(text))
        }
    }

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl Stage for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn apply(&self, asset: Asset, _ctx: &RunContext) -> Result<Asset> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(asset)
        }
    }

    fn asset(name: &str, body: &str) -> Asset {
        Asset::new(format!("/src/{name}"), name, body)
    }

    #[test]
    fn test_rename_suffix() {
        let rename = Rename::suffix(".min");
        assert_eq!(rename.target(Path::new("app.js")), Path::new("app.min.js"));
        assert_eq!(
            rename.target(Path::new("css/style.css")),
            Path::new("css/style.min.css")
        );
        assert_eq!(rename.target(Path::new("LICENSE")), Path::new("LICENSE.min"));
    }

    #[test]
    fn test_rename_extension() {
        let rename = Rename::extension("webp");
        assert_eq!(
            rename.target(Path::new("img/photo.jpg")),
            Path::new("img/photo.webp")
        );
    }

    #[test]
    fn test_by_extension_routes_and_passes_through() {
        let counter = Arc::new(Counter::default());
        let stage = ByExtension::new("images")
            .route(&["txt"], vec![Arc::new(Upper)])
            .route(&["PNG"], vec![counter.clone()]);
        let ctx = RunContext::with_version("1");

        let out = stage.apply(asset("a.txt", "hello"), &ctx).unwrap();
        assert_eq!(out.text().unwrap(), "HELLO");

        let out = stage.apply(asset("b.png", "raw"), &ctx).unwrap();
        assert_eq!(out.contents, b"raw");
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        let out = stage.apply(asset("c.svg", "<svg/>"), &ctx).unwrap();
        assert_eq!(out.text().unwrap(), "<svg/>");
    }

    #[test]
    fn test_by_extension_runs_whole_chain_in_order() {
        let counter = Arc::new(Counter::default());
        let chain: Vec<Arc<dyn Stage>> = vec![
            Arc::new(Upper),
            counter.clone(),
            Arc::new(Rename::suffix(".min")),
        ];
        let stage = ByExtension::new("images").route(&["txt"], chain);
        let ctx = RunContext::with_version("1");

        let out = stage.apply(asset("a.txt", "hello"), &ctx).unwrap();
        assert_eq!(out.text().unwrap(), "HELLO");
        assert_eq!(out.relative, Path::new("a.min.txt"));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_text_rejects_binary() {
        let asset = Asset::new("/src/a.bin", "a.bin", vec![0xff, 0xfe]);
        assert!(matches!(asset.text(), Err(StageError::Encoding(_))));
    }

    #[test]
    fn test_run_context_version_is_numeric() {
        let ctx = RunContext::new();
        assert!(ctx.version.parse::<i64>().is_ok());
    }

    #[test]
    fn test_fatal_classification() {
        let missing = StageError::ToolUnavailable {
            program: "cwebp".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };
        assert!(missing.is_fatal());
        assert!(!StageError::syntax("a.scss", "expected ;").is_fatal());
    }
}
