//! Declarative tasks: flows of selection, freshness filter and steps.

use std::{
    collections::HashSet,
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Instant,
};

use assetpipe_core::AssetCategory;
use assetpipe_transform::{Asset, Rename, RunContext, Stage, StageError};
use rayon::prelude::*;
use tracing::{debug, error, info, trace, warn};

use crate::{
    error::{PipelineError, Result},
    reload::{ReloadKind, ReloadSink},
    select::{Selected, Selection, is_fresh},
};

/// Names of the transform tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskName {
    Html,
    Pug,
    Css,
    Js,
    Images,
    Fonts,
    FontsOtf,
    Favicon,
    Php,
}

impl TaskName {
    /// All tasks.
    pub const ALL: [Self; 9] = [
        Self::Html,
        Self::Pug,
        Self::Css,
        Self::Js,
        Self::Images,
        Self::Fonts,
        Self::FontsOtf,
        Self::Favicon,
        Self::Php,
    ];

    /// Task name as used on the command line.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Pug => "pug",
            Self::Css => "css",
            Self::Js => "js",
            Self::Images => "images",
            Self::Fonts => "fonts",
            Self::FontsOtf => "fonts_otf",
            Self::Favicon => "favicon",
            Self::Php => "php",
        }
    }
}

impl From<AssetCategory> for TaskName {
    fn from(category: AssetCategory) -> Self {
        match category {
            AssetCategory::Html => Self::Html,
            AssetCategory::Pug => Self::Pug,
            AssetCategory::Css => Self::Css,
            AssetCategory::Js => Self::Js,
            AssetCategory::Images => Self::Images,
            AssetCategory::Fonts => Self::Fonts,
            AssetCategory::Favicon => Self::Favicon,
            AssetCategory::Php => Self::Php,
        }
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskName {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| PipelineError::UnknownTask(s.to_string()))
    }
}

/// One step of a flow.
pub enum Step {
    /// Transform the asset.
    Apply(Arc<dyn Stage>),

    /// Rewrite the output path.
    Rename(Rename),

    /// Write the asset in its current state.
    Write,
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apply(stage) => write!(f, "Apply({})", stage.name()),
            Self::Rename(rename) => write!(f, "Rename({rename:?})"),
            Self::Write => f.write_str("Write"),
        }
    }
}

/// Output a freshness check compares against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreshCheck {
    /// The output with the source's relative path.
    SameName,

    /// The output the rename would produce.
    Renamed(Rename),
}

impl FreshCheck {
    fn target(&self, relative: &Path) -> PathBuf {
        match self {
            Self::SameName => relative.to_path_buf(),
            Self::Renamed(rename) => rename.target(relative),
        }
    }
}

/// Selection, optional freshness filter and steps, writing under one directory.
#[derive(Debug)]
pub struct Flow {
    selection: Selection,
    out_dir: PathBuf,
    fresh: Option<FreshCheck>,
    steps: Vec<Step>,
}

#[derive(Debug, Default)]
struct FlowOutcome {
    written: usize,
    skipped: usize,
    failed: usize,
}

impl Flow {
    /// Flow over `selection` writing into `out_dir`.
    pub fn new(selection: Selection, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            selection,
            out_dir: out_dir.into(),
            fresh: None,
            steps: Vec::new(),
        }
    }

    /// Skip sources whose output is at least as new.
    #[must_use]
    pub fn skip_fresh(mut self, check: FreshCheck) -> Self {
        self.fresh = Some(check);
        self
    }

    /// Append a transform step.
    #[must_use]
    pub fn apply(mut self, stage: impl Stage + 'static) -> Self {
        self.steps.push(Step::Apply(Arc::new(stage)));
        self
    }

    /// Append a shared transform step.
    #[must_use]
    pub fn apply_shared(mut self, stage: Arc<dyn Stage>) -> Self {
        self.steps.push(Step::Apply(stage));
        self
    }

    /// Append a rename step.
    #[must_use]
    pub fn rename(mut self, rename: Rename) -> Self {
        self.steps.push(Step::Rename(rename));
        self
    }

    /// Append a write step.
    #[must_use]
    pub fn write(mut self) -> Self {
        self.steps.push(Step::Write);
        self
    }

    /// Directory outputs are written to.
    #[must_use]
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Steps in order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Sources sharing an output path are claimed in sorted order: the first
    /// one is processed and the rest are skipped with a warning.
    fn run(&self, task: TaskName, ctx: &RunContext) -> Result<FlowOutcome> {
        let mut outcome = FlowOutcome::default();
        let mut claimed = HashSet::new();

        let files: Vec<Selected> = self
            .selection
            .files()?
            .into_iter()
            .filter(|file| {
                let Some(check) = &self.fresh else {
                    return true;
                };

                let target = check.target(&file.relative);
                let output = self.out_dir.join(&target);
                if !claimed.insert(target) {
                    warn!(
                        task = %task,
                        path = %file.path.display(),
                        output = %output.display(),
                        "output already produced by another source, skipping"
                    );
                    outcome.skipped += 1;
                    return false;
                }

                let fresh = is_fresh(&file.path, &output);
                if fresh {
                    trace!(task = %task, path = %file.path.display(), "up to date");
                    outcome.skipped += 1;
                }
                !fresh
            })
            .collect();

        let results: Vec<_> = files
            .par_iter()
            .map(|file| (file, self.process(file, ctx)))
            .collect();

        let mut fatal = None;
        for (file, result) in results {
            match result {
                Ok(written) => outcome.written += written,
                Err(e) if e.is_fatal() => {
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    error!(task = %task, path = %file.path.display(), error = %e, "failed to process file");
                    outcome.failed += 1;
                }
            }
        }

        match fatal {
            Some(e) => Err(PipelineError::stage(task.as_str(), e)),
            None => Ok(outcome),
        }
    }

    fn process(&self, file: &Selected, ctx: &RunContext) -> std::result::Result<usize, StageError> {
        let contents = fs::read(&file.path)?;
        let mut asset = Asset::new(&file.path, &file.relative, contents);
        let mut written = 0;

        for step in &self.steps {
            match step {
                Step::Apply(stage) => {
                    trace!(stage = stage.name(), path = %asset.source.display(), "applying");
                    asset = stage.apply(asset, ctx)?;
                }
                Step::Rename(rename) => asset.relative = rename.target(&asset.relative),
                Step::Write => {
                    let dest = self.out_dir.join(&asset.relative);
                    if let Some(parent) = dest.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(&dest, &asset.contents)?;
                    debug!(path = %dest.display(), "wrote file");
                    written += 1;
                }
            }
        }

        Ok(written)
    }
}

/// Outcome of one task run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    /// Task that ran.
    pub task: TaskName,

    /// Files written.
    pub written: usize,

    /// Sources skipped as up to date.
    pub skipped: usize,

    /// Sources that failed.
    pub failed: usize,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

/// A named set of flows plus the reload event it triggers.
#[derive(Debug)]
pub struct Task {
    name: TaskName,
    flows: Vec<Flow>,
    notify: Option<ReloadKind>,
}

impl Task {
    /// Empty task.
    #[must_use]
    pub fn new(name: TaskName) -> Self {
        Self {
            name,
            flows: Vec::new(),
            notify: None,
        }
    }

    /// Add a flow.
    #[must_use]
    pub fn flow(mut self, flow: Flow) -> Self {
        self.flows.push(flow);
        self
    }

    /// Reload event sent after the task wrote output.
    #[must_use]
    pub fn notify(mut self, kind: ReloadKind) -> Self {
        self.notify = Some(kind);
        self
    }

    /// Task name.
    #[must_use]
    pub fn name(&self) -> TaskName {
        self.name
    }

    /// Flows in order.
    #[must_use]
    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    /// Reload event of the task, if any.
    #[must_use]
    pub fn reload_kind(&self) -> Option<ReloadKind> {
        self.notify
    }

    /// Run every flow in order.
    ///
    /// Per-file failures are logged and counted. A fatal stage error (missing
    /// tool, bad stage configuration) aborts the task.
    pub fn run(&self, ctx: &RunContext, sink: &dyn ReloadSink) -> Result<TaskReport> {
        let start = Instant::now();
        info!(task = %self.name, "starting task");

        let mut report = TaskReport {
            task: self.name,
            written: 0,
            skipped: 0,
            failed: 0,
            duration_ms: 0,
        };

        for flow in &self.flows {
            let outcome = flow.run(self.name, ctx)?;
            report.written += outcome.written;
            report.skipped += outcome.skipped;
            report.failed += outcome.failed;
        }

        if let Some(kind) = self.notify.filter(|_| report.written > 0) {
            sink.notify(kind);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            task = %self.name,
            written = report.written,
            skipped = report.skipped,
            failed = report.failed,
            duration_ms = report.duration_ms,
            "task complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use tempfile::TempDir;

    use super::*;

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl Stage for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn apply(&self, asset: Asset, _ctx: &RunContext) -> assetpipe_transform::Result<Asset> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(asset)
        }
    }

    struct FailOn(&'static str);

    impl Stage for FailOn {
        fn name(&self) -> &str {
            "fail-on"
        }

        fn apply(&self, asset: Asset, _ctx: &RunContext) -> assetpipe_transform::Result<Asset> {
            if asset.relative.to_string_lossy().contains(self.0) {
                return Err(StageError::syntax(&asset.source, "bad input"));
            }
            Ok(asset)
        }
    }

    struct Unconfigured;

    impl Stage for Unconfigured {
        fn name(&self) -> &str {
            "unconfigured"
        }

        fn apply(&self, _asset: Asset, _ctx: &RunContext) -> assetpipe_transform::Result<Asset> {
            Err(StageError::Config("no targets".to_string()))
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ReloadKind>>);

    impl ReloadSink for Recorder {
        fn notify(&self, kind: ReloadKind) {
            self.0.lock().unwrap().push(kind);
        }
    }

    fn project() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let out = dir.path().join("build");
        fs::create_dir_all(src.join("js")).unwrap();
        fs::write(src.join("js/a.js"), "a").unwrap();
        fs::write(src.join("js/b.js"), "b").unwrap();
        (dir, src, out)
    }

    fn ctx() -> RunContext {
        RunContext::with_version("1")
    }

    #[test]
    fn test_task_name_round_trip() {
        for name in TaskName::ALL {
            assert_eq!(name.as_str().parse::<TaskName>().unwrap(), name);
        }
        assert!(matches!(
            "sass".parse::<TaskName>(),
            Err(PipelineError::UnknownTask(_))
        ));
        assert_eq!(TaskName::from(AssetCategory::Css), TaskName::Css);
    }

    #[test]
    fn test_write_rename_write() {
        let (_dir, src, out) = project();
        let selection = Selection::new(&src, ["js/*.js"]).unwrap();
        let task = Task::new(TaskName::Js).flow(
            Flow::new(selection, &out)
                .write()
                .rename(Rename::suffix(".min"))
                .write(),
        );

        let report = task.run(&ctx(), &crate::NoopReload).unwrap();

        assert_eq!(report.written, 4);
        for name in ["a.js", "a.min.js", "b.js", "b.min.js"] {
            assert!(out.join(name).exists(), "{name} missing");
        }
    }

    #[test]
    fn test_per_file_failure_does_not_stop_task() {
        let (_dir, src, out) = project();
        let selection = Selection::new(&src, ["js/*.js"]).unwrap();
        let recorder = Recorder::default();
        let task = Task::new(TaskName::Js)
            .flow(Flow::new(selection, &out).apply(FailOn("a.js")).write())
            .notify(ReloadKind::Reload);

        let report = task.run(&ctx(), &recorder).unwrap();

        assert_eq!(report.written, 1);
        assert_eq!(report.failed, 1);
        assert!(out.join("b.js").exists());
        assert_eq!(*recorder.0.lock().unwrap(), vec![ReloadKind::Reload]);
    }

    #[test]
    fn test_fatal_error_aborts_task() {
        let (_dir, src, out) = project();
        let selection = Selection::new(&src, ["js/*.js"]).unwrap();
        let recorder = Recorder::default();
        let task = Task::new(TaskName::Js)
            .flow(Flow::new(selection, &out).apply(Unconfigured).write())
            .notify(ReloadKind::Reload);

        let err = task.run(&ctx(), &recorder).unwrap_err();

        assert!(matches!(err, PipelineError::Stage { .. }));
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_fresh_outputs_are_skipped() {
        let (_dir, src, out) = project();
        let counter = Arc::new(Counter::default());
        let task = Task::new(TaskName::Images).flow(
            Flow::new(Selection::new(&src, ["js/*.js"]).unwrap(), &out)
                .skip_fresh(FreshCheck::Renamed(Rename::extension("txt")))
                .apply_shared(counter.clone())
                .rename(Rename::extension("txt"))
                .write(),
        );

        let first = task.run(&ctx(), &crate::NoopReload).unwrap();
        assert_eq!(first.written, 2);
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);

        let second = task.run(&ctx(), &crate::NoopReload).unwrap();
        assert_eq!(second.written, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_sources_sharing_a_derivative_are_claimed_once() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let out = dir.path().join("build");
        fs::create_dir_all(src.join("img")).unwrap();
        fs::write(src.join("img/a.jpg"), "jpg").unwrap();
        fs::write(src.join("img/a.png"), "png").unwrap();

        let counter = Arc::new(Counter::default());
        let task = Task::new(TaskName::Images).flow(
            Flow::new(Selection::new(&src, ["img/*"]).unwrap(), &out)
                .skip_fresh(FreshCheck::Renamed(Rename::extension("webp")))
                .apply_shared(counter.clone())
                .rename(Rename::extension("webp"))
                .write(),
        );

        let report = task.run(&ctx(), &crate::NoopReload).unwrap();

        assert_eq!(report.written, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(fs::read_to_string(out.join("a.webp")).unwrap(), "jpg");
    }

    #[test]
    fn test_no_notification_without_output() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::default();
        let selection = Selection::new(dir.path(), ["php/**"]).unwrap();
        let task = Task::new(TaskName::Php)
            .flow(Flow::new(selection, dir.path().join("out")).write())
            .notify(ReloadKind::Reload);

        let report = task.run(&ctx(), &recorder).unwrap();
        assert_eq!(report.written, 0);
        assert!(recorder.0.lock().unwrap().is_empty());
    }
}
