//! Build orchestration.
//!
//! A full build runs in four stages: clean, `fonts_otf`, the independent asset
//! tasks in parallel, then `fonts`. A stage starts once every task of the
//! previous one has settled; failures are recorded but never gate later stages.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use assetpipe_core::Config;
use assetpipe_transform::RunContext;
use rayon::prelude::*;
use tracing::{error, info};

use crate::{
    catalog::Catalog,
    clean::clean,
    error::Result,
    fonts::FontManifest,
    reload::{NoopReload, ReloadSink},
    task::{Task, TaskName, TaskReport},
};

/// Tasks of the parallel build stage, before the templating flag is applied.
const PARALLEL_TASKS: [TaskName; 7] = [
    TaskName::Html,
    TaskName::Css,
    TaskName::Js,
    TaskName::Images,
    TaskName::Php,
    TaskName::Favicon,
    TaskName::Pug,
];

/// A build step that did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Step name (`clean` or a task name).
    pub step: String,

    /// Error message.
    pub error: String,
}

/// Build statistics.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Reports of the tasks that ran to completion.
    pub tasks: Vec<TaskReport>,

    /// Steps that aborted.
    pub failures: Vec<Failure>,

    /// Build duration in milliseconds.
    pub duration_ms: u64,
}

impl BuildReport {
    /// Total files written.
    #[must_use]
    pub fn written(&self) -> usize {
        self.tasks.iter().map(|t| t.written).sum()
    }

    /// Total sources that failed inside completed tasks.
    #[must_use]
    pub fn failed_files(&self) -> usize {
        self.tasks.iter().map(|t| t.failed).sum()
    }

    /// Report of one task, if it completed.
    #[must_use]
    pub fn task(&self, name: TaskName) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.task == name)
    }

    fn record(&mut self, name: TaskName, result: Result<TaskReport>) {
        match result {
            Ok(report) => self.tasks.push(report),
            Err(e) => self.fail(name.as_str(), &e),
        }
    }

    fn fail(&mut self, step: &str, e: &dyn fmt::Display) {
        error!(step, error = %e, "build step failed");
        self.failures.push(Failure {
            step: step.to_string(),
            error: e.to_string(),
        });
    }
}

/// Asset pipeline for one project.
pub struct Pipeline {
    config: Config,
    root: PathBuf,
    reload: Arc<dyn ReloadSink>,
    livereload: Option<String>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("root", &self.root)
            .field("livereload", &self.livereload.is_some())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a pipeline for the project at `root`.
    #[must_use]
    pub fn new(config: Config, root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            root: root.into(),
            reload: Arc::new(NoopReload),
            livereload: None,
        }
    }

    /// Send reload notifications to `sink`.
    #[must_use]
    pub fn with_reload(mut self, sink: Arc<dyn ReloadSink>) -> Self {
        self.reload = sink;
        self
    }

    /// Inject a live-reload client `snippet` into markup outputs.
    #[must_use]
    pub fn with_livereload(mut self, snippet: impl Into<String>) -> Self {
        self.livereload = Some(snippet.into());
        self
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Project root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute source directory.
    #[must_use]
    pub fn source_root(&self) -> PathBuf {
        self.config.source_root(&self.root)
    }

    /// Absolute build directory.
    #[must_use]
    pub fn build_root(&self) -> PathBuf {
        self.config.build_root(&self.root)
    }

    /// Build the definition of one task.
    pub fn task(&self, name: TaskName) -> Result<Task> {
        Catalog::new(&self.config, &self.root)
            .with_livereload(self.livereload.as_deref())
            .task(name)
    }

    /// Tasks of the parallel build stage.
    #[must_use]
    pub fn parallel_tasks(&self) -> Vec<TaskName> {
        PARALLEL_TASKS
            .into_iter()
            .filter(|name| *name != TaskName::Pug || self.config.pipeline.templating)
            .collect()
    }

    /// Run one task with its own run context.
    pub fn run_task(&self, name: TaskName) -> Result<TaskReport> {
        self.run_with(name, &RunContext::new())
    }

    /// Run one task within an existing run context.
    pub fn run_with(&self, name: TaskName, ctx: &RunContext) -> Result<TaskReport> {
        self.task(name)?.run(ctx, self.reload.as_ref())
    }

    /// Delete the build directory.
    pub fn clean(&self) -> Result<()> {
        clean(&self.build_root())
    }

    /// Font manifest generator for this project.
    #[must_use]
    pub fn font_manifest(&self) -> FontManifest {
        FontManifest::from_config(&self.config, &self.root)
    }

    /// Regenerate the SCSS font manifest from the fonts output directory.
    pub fn add_fonts_to_scss(&self) -> Result<Vec<String>> {
        Ok(self.font_manifest().generate()?)
    }

    /// Run the full build with a fresh run context.
    pub fn build(&self) -> BuildReport {
        self.build_with(&RunContext::new())
    }

    /// Run the full build within `ctx`.
    pub fn build_with(&self, ctx: &RunContext) -> BuildReport {
        let start = Instant::now();
        let mut report = BuildReport::default();

        info!(
            source = %self.source_root().display(),
            output = %self.build_root().display(),
            version = %ctx.version,
            "starting build"
        );

        // 1. Clean output directory
        if let Err(e) = self.clean() {
            report.fail("clean", &e);
        }

        // 2. Convert OpenType fonts into the source tree
        report.record(TaskName::FontsOtf, self.run_with(TaskName::FontsOtf, ctx));

        // 3. Independent asset tasks
        let results: Vec<_> = self
            .parallel_tasks()
            .into_par_iter()
            .map(|name| (name, self.run_with(name, ctx)))
            .collect();
        for (name, result) in results {
            report.record(name, result);
        }

        // 4. Web fonts from the (possibly new) TrueType fonts
        report.record(TaskName::Fonts, self.run_with(TaskName::Fonts, ctx));

        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            tasks = report.tasks.len(),
            failures = report.failures.len(),
            written = report.written(),
            duration_ms = report.duration_ms,
            "build complete"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_templating_flag_controls_pug() {
        let mut config = Config::default();
        assert!(Pipeline::new(config.clone(), "/p").parallel_tasks().contains(&TaskName::Pug));

        config.pipeline.templating = false;
        let tasks = Pipeline::new(config, "/p").parallel_tasks();
        assert!(!tasks.contains(&TaskName::Pug));
        assert_eq!(tasks.len(), 6);
    }

    #[test]
    fn test_build_empty_project() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("build/stale")).unwrap();
        fs::write(dir.path().join("build/stale/old.css"), "").unwrap();

        let report = Pipeline::new(Config::default(), dir.path()).build();

        assert!(report.failures.is_empty(), "{:?}", report.failures);
        assert_eq!(report.tasks.len(), 9);
        assert_eq!(report.written(), 0);
        assert!(!dir.path().join("build/stale").exists());
    }

    fn pipeline_manifest(root: &Path) -> PathBuf {
        Pipeline::new(Config::default(), root)
            .font_manifest()
            .manifest_path()
            .to_path_buf()
    }

    #[test]
    fn test_add_fonts_to_scss_reads_build_fonts() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("build/fonts")).unwrap();
        fs::write(dir.path().join("build/fonts/Inter.woff2"), "").unwrap();

        let families = Pipeline::new(Config::default(), dir.path())
            .add_fonts_to_scss()
            .unwrap();

        assert_eq!(families, vec!["Inter"]);
        let manifest = dir.path().join("src/scss/_fonts.scss");
        assert_eq!(pipeline_manifest(dir.path()), manifest);
        assert!(manifest.exists());
    }
}
