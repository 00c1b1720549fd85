//! Pipeline configuration management.
//!
//! Every field has a default mirroring the stock project layout (`src/` in,
//! `build/` out), so a configuration file is optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    error::{CoreError, Result},
    registry::{AssetCategory, PathRegistry, is_contained},
};

/// Environment variable prefix for overrides (`ASSETPIPE__SERVER__PORT=8080`).
pub const ENV_PREFIX: &str = "ASSETPIPE";

/// Main configuration structure for assetpipe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Source and build roots.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Per-category source globs, output directories and watch globs.
    #[serde(default)]
    pub registry: PathRegistry,

    /// Pipeline behaviour.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Font conversion and manifest settings.
    #[serde(default)]
    pub fonts: FontsConfig,

    /// External tool invocations.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Development server settings.
    #[serde(default)]
    pub server: ServerConfig,
}

/// Source and build roots, relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the sources.
    #[serde(default = "default_source_dir")]
    pub source_dir: String,

    /// Directory receiving the build output. Deleted by `clean`.
    #[serde(default = "default_build_dir")]
    pub build_dir: String,
}

/// Pipeline behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Run the pug templating task as part of `build`.
    #[serde(default = "default_true")]
    pub templating: bool,

    /// Browserslist queries used for vendor prefixing.
    #[serde(default = "default_browsers")]
    pub browsers: Vec<String>,

    /// Query key of the cache-busting token.
    #[serde(default = "default_version_key")]
    pub version_key: String,

    /// Suffix inserted before the extension of minified outputs.
    #[serde(default = "default_min_suffix")]
    pub min_suffix: String,
}

/// Font settings. Paths are relative to the source directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontsConfig {
    /// Globs of editor fonts converted to TrueType by `fonts_otf`.
    #[serde(default = "default_otf_src")]
    pub otf_src: Vec<String>,

    /// Directory receiving the converted TrueType fonts.
    #[serde(default = "default_ttf_dir")]
    pub ttf_dir: String,

    /// Generated SCSS fragment listing the font families.
    #[serde(default = "default_manifest")]
    pub manifest: String,

    /// Shared variables partial imported at the top of the fragment.
    #[serde(default = "default_vars_import")]
    pub vars_import: String,

    /// Weight declared for every family.
    #[serde(default = "default_weight")]
    pub weight: String,

    /// Style declared for every family.
    #[serde(default = "default_style")]
    pub style: String,
}

/// An external program invocation.
///
/// Arguments may contain `{input}`, `{output}` and `{source}`. Without `{input}`
/// the content is piped to stdin; without `{output}` the result is read from stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    /// Program name or path.
    pub program: String,

    /// Argument template.
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    /// Create a tool command.
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
        }
    }
}

/// External tools used by the codec stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_pug_tool")]
    pub pug: ToolCommand,

    #[serde(default = "default_webp_tool")]
    pub webp: ToolCommand,

    #[serde(default = "default_png_tool")]
    pub png: ToolCommand,

    #[serde(default = "default_jpeg_tool")]
    pub jpeg: ToolCommand,

    /// Lossless pass run after `png`.
    #[serde(default = "default_png_optimize_tool")]
    pub png_optimize: ToolCommand,

    /// Lossless pass run after `jpeg`.
    #[serde(default = "default_jpeg_optimize_tool")]
    pub jpeg_optimize: ToolCommand,

    #[serde(default = "default_svg_tool")]
    pub svg: ToolCommand,

    #[serde(default = "default_gif_tool")]
    pub gif: ToolCommand,

    #[serde(default = "default_otf_tool")]
    pub otf_to_ttf: ToolCommand,

    #[serde(default = "default_woff_tool")]
    pub woff: ToolCommand,

    #[serde(default = "default_woff2_tool")]
    pub woff2: ToolCommand,
}

/// Development server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Open the browser once the server is up.
    #[serde(default)]
    pub open: bool,
}

// Default value functions
fn default_source_dir() -> String {
    "src".to_string()
}

fn default_build_dir() -> String {
    "build".to_string()
}

fn default_true() -> bool {
    true
}

fn default_browsers() -> Vec<String> {
    vec!["last 5 versions".to_string()]
}

fn default_version_key() -> String {
    "v".to_string()
}

fn default_min_suffix() -> String {
    ".min".to_string()
}

fn default_otf_src() -> Vec<String> {
    vec!["fonts/*.otf".to_string()]
}

fn default_ttf_dir() -> String {
    "fonts".to_string()
}

fn default_manifest() -> String {
    "scss/_fonts.scss".to_string()
}

fn default_vars_import() -> String {
    "_vars.scss".to_string()
}

fn default_weight() -> String {
    "400".to_string()
}

fn default_style() -> String {
    "normal".to_string()
}

fn default_pug_tool() -> ToolCommand {
    ToolCommand::new("pug", &["--path", "{source}"])
}

fn default_webp_tool() -> ToolCommand {
    ToolCommand::new("cwebp", &["-quiet", "-q", "75", "{input}", "-o", "{output}"])
}

fn default_png_tool() -> ToolCommand {
    ToolCommand::new(
        "pngquant",
        &["--quality", "50-50", "--force", "--output", "{output}", "{input}"],
    )
}

fn default_jpeg_tool() -> ToolCommand {
    ToolCommand::new(
        "cjpeg",
        &["-quality", "50", "-progressive", "-outfile", "{output}", "{input}"],
    )
}

fn default_png_optimize_tool() -> ToolCommand {
    ToolCommand::new("optipng", &["-quiet", "-o3", "{input}", "-out", "{output}"])
}

fn default_jpeg_optimize_tool() -> ToolCommand {
    ToolCommand::new(
        "jpegtran",
        &["-copy", "none", "-optimize", "-progressive", "-outfile", "{output}", "{input}"],
    )
}

fn default_svg_tool() -> ToolCommand {
    ToolCommand::new("svgo", &["--input", "{input}", "--output", "{output}"])
}

fn default_gif_tool() -> ToolCommand {
    ToolCommand::new("gifsicle", &["-O3", "--interlace", "{input}", "-o", "{output}"])
}

fn default_otf_tool() -> ToolCommand {
    ToolCommand::new(
        "fontforge",
        &["-lang=ff", "-c", "Open($1); Generate($2)", "{input}", "{output}"],
    )
}

fn default_woff_tool() -> ToolCommand {
    ToolCommand::new(
        "fonttools",
        &["ttLib", "--flavor", "woff", "-o", "{output}", "{input}"],
    )
}

fn default_woff2_tool() -> ToolCommand {
    ToolCommand::new(
        "fonttools",
        &["ttLib", "--flavor", "woff2", "-o", "{output}", "{input}"],
    )
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5500
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            build_dir: default_build_dir(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            templating: true,
            browsers: default_browsers(),
            version_key: default_version_key(),
            min_suffix: default_min_suffix(),
        }
    }
}

impl Default for FontsConfig {
    fn default() -> Self {
        Self {
            otf_src: default_otf_src(),
            ttf_dir: default_ttf_dir(),
            manifest: default_manifest(),
            vars_import: default_vars_import(),
            weight: default_weight(),
            style: default_style(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            pug: default_pug_tool(),
            webp: default_webp_tool(),
            png: default_png_tool(),
            jpeg: default_jpeg_tool(),
            png_optimize: default_png_optimize_tool(),
            jpeg_optimize: default_jpeg_optimize_tool(),
            svg: default_svg_tool(),
            gif: default_gif_tool(),
            otf_to_ttf: default_otf_tool(),
            woff: default_woff_tool(),
            woff2: default_woff2_tool(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            open: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            CoreError::config_with_source(
                format!("Failed to parse config file: {}", path.display()),
                e,
            )
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file layered with `ASSETPIPE__*`
    /// environment variables.
    ///
    /// The file goes through [`Config::load`] first, so TOML errors name the
    /// file and every default is filled in before the overrides apply.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let file = Self::load(path)?;
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&file)?)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let source = Path::new(&self.paths.source_dir);
        let build = Path::new(&self.paths.build_dir);

        if self.paths.source_dir.is_empty() {
            return Err(CoreError::config("paths.source_dir cannot be empty"));
        }

        if build.components().next().is_none() || !is_contained(build) || is_current_dir(build)
        {
            return Err(CoreError::config(
                "paths.build_dir must be a non-empty relative directory below the project root",
            ));
        }

        if source == build {
            return Err(CoreError::config(
                "paths.source_dir and paths.build_dir must differ",
            ));
        }

        for (key, value) in [
            ("fonts.ttf_dir", &self.fonts.ttf_dir),
            ("fonts.manifest", &self.fonts.manifest),
        ] {
            if !is_contained(Path::new(value)) {
                return Err(CoreError::config(format!(
                    "{key} must be relative to the source directory, got {value:?}"
                )));
            }
        }

        if self.pipeline.browsers.is_empty() {
            return Err(CoreError::config("pipeline.browsers cannot be empty"));
        }

        self.registry.validate()
    }

    /// Absolute source root for a project.
    #[must_use]
    pub fn source_root(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.paths.source_dir)
    }

    /// Absolute build root for a project.
    #[must_use]
    pub fn build_root(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.paths.build_dir)
    }

    /// Output directory of a category.
    #[must_use]
    pub fn output_dir(&self, project_root: &Path, category: AssetCategory) -> PathBuf {
        let dest = &self.registry.get(category).dest;
        let build = self.build_root(project_root);
        if dest.is_empty() { build } else { build.join(dest) }
    }

    /// Directory receiving the TrueType fonts produced by `fonts_otf`.
    #[must_use]
    pub fn ttf_dir(&self, project_root: &Path) -> PathBuf {
        self.source_root(project_root).join(&self.fonts.ttf_dir)
    }

    /// Path of the generated font manifest fragment.
    #[must_use]
    pub fn manifest_path(&self, project_root: &Path) -> PathBuf {
        self.source_root(project_root).join(&self.fonts.manifest)
    }
}

fn is_current_dir(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, std::path::Component::CurDir))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn create_test_config() -> String {
        r#"
[paths]
source_dir = "assets"
build_dir = "dist"

[registry.css]
src = ["styles/*.scss", "!styles/_*.scss"]
dest = "styles"
watch = "styles/**"

[pipeline]
templating = false
browsers = ["defaults"]

[tools.webp]
program = "cwebp"
args = ["-q", "80", "{input}", "-o", "{output}"]

[server]
port = 8080
"#
        .to_string()
    }

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("assetpipe.toml");
        let mut file = std::fs::File::create(&config_path).expect("create file");
        file.write_all(create_test_config().as_bytes())
            .expect("write");

        let config = Config::load(&config_path).expect("load config");

        assert_eq!(config.paths.source_dir, "assets");
        assert_eq!(config.paths.build_dir, "dist");
        assert_eq!(config.registry.css.dest, "styles");
        assert_eq!(config.registry.css.watch.as_deref(), Some("styles/**"));
        assert!(!config.pipeline.templating);
        assert_eq!(config.pipeline.browsers, vec!["defaults"]);
        assert_eq!(config.tools.webp.args[1], "80");
        assert_eq!(config.server.port, 8080);
        // untouched sections keep their defaults
        assert_eq!(config.registry.js.dest, "js");
        assert_eq!(config.tools.png.program, "pngquant");
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load(Path::new("/nonexistent/assetpipe.toml")).expect("defaults");
        assert_eq!(config, Config::default());
        assert_eq!(config.paths.source_dir, "src");
        assert_eq!(config.paths.build_dir, "build");
        assert_eq!(config.server.port, 5500);
        assert!(config.pipeline.templating);
        assert_eq!(config.fonts.manifest, "scss/_fonts.scss");
    }

    #[test]
    fn test_output_dirs_are_inside_build_root() {
        let config = Config::default();
        let root = Path::new("/project");

        assert_eq!(
            config.output_dir(root, AssetCategory::Html),
            Path::new("/project/build")
        );
        assert_eq!(
            config.output_dir(root, AssetCategory::Images),
            Path::new("/project/build/img")
        );
        assert_eq!(config.ttf_dir(root), Path::new("/project/src/fonts"));
        assert_eq!(
            config.manifest_path(root),
            Path::new("/project/src/scss/_fonts.scss")
        );
    }

    #[test]
    fn test_validation_rejects_build_dir_at_root() {
        let mut config = Config::default();
        config.paths.build_dir = ".".to_string();
        assert!(config.validate().is_err());

        config.paths.build_dir = String::new();
        assert!(config.validate().is_err());

        config.paths.build_dir = "../build".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_same_dirs() {
        let mut config = Config::default();
        config.paths.build_dir = "src".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("assetpipe.toml");
        std::fs::write(&config_path, "[server\nport = 1").expect("write");

        let err = Config::load(&config_path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_load_with_env_keeps_file_values() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("assetpipe.toml");
        std::fs::write(&config_path, create_test_config()).expect("write");

        let config = Config::load_with_env(&config_path).expect("load");
        assert_eq!(config, Config::load(&config_path).expect("load"));
    }

    #[test]
    fn test_load_with_env_reports_toml_errors() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("assetpipe.toml");
        std::fs::write(&config_path, "[server\nport = 1").expect("write");

        let err = Config::load_with_env(&config_path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_load_with_env_without_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = Config::load_with_env(&dir.path().join("missing.toml")).expect("load");
        assert_eq!(config.registry, PathRegistry::default());
    }
}
