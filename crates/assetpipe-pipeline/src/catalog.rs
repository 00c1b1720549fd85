//! Task definitions built from the configuration.

use std::{path::Path, sync::Arc};

use assetpipe_core::{AssetCategory, Config, ToolCommand};
use assetpipe_transform::{
    ByExtension, CssOptimizer, ExternalTool, FileInclude, InjectSnippet, MediaQueryGrouper,
    Rename, ScriptMinifier, ScssCompiler, Stage, VersionToken, WebpPicture, browser_targets,
};

use crate::{
    error::{PipelineError, Result},
    reload::ReloadKind,
    select::Selection,
    task::{FreshCheck, Flow, Task, TaskName},
};

/// Marker identifying an already injected live-reload client.
pub const LIVERELOAD_MARKER: &str = "__livereload";

/// Raster formats that get a `.webp` derivative.
const WEBP_SOURCES: [&str; 5] = ["jpg", "jpeg", "png", "tif", "tiff"];

/// Builds [`Task`]s for one project.
#[derive(Debug, Clone, Copy)]
pub struct Catalog<'a> {
    config: &'a Config,
    root: &'a Path,
    livereload: Option<&'a str>,
}

impl<'a> Catalog<'a> {
    /// Catalog for the project at `root`.
    #[must_use]
    pub fn new(config: &'a Config, root: &'a Path) -> Self {
        Self {
            config,
            root,
            livereload: None,
        }
    }

    /// Inject `snippet` into every markup output.
    #[must_use]
    pub fn with_livereload(mut self, snippet: Option<&'a str>) -> Self {
        self.livereload = snippet;
        self
    }

    /// Build one task.
    pub fn task(&self, name: TaskName) -> Result<Task> {
        match name {
            TaskName::Html => self.html(),
            TaskName::Pug => self.pug(),
            TaskName::Css => self.css(),
            TaskName::Js => self.js(),
            TaskName::Images => self.images(),
            TaskName::Fonts => self.fonts(),
            TaskName::FontsOtf => self.fonts_otf(),
            TaskName::Favicon => self.copy(TaskName::Favicon, AssetCategory::Favicon, None),
            TaskName::Php => self.copy(
                TaskName::Php,
                AssetCategory::Php,
                Some(ReloadKind::Reload),
            ),
        }
    }

    fn selection(&self, category: AssetCategory) -> Result<Selection> {
        Selection::for_category(
            self.config.source_root(self.root),
            self.config.registry.get(category),
        )
    }

    fn flow(&self, category: AssetCategory) -> Result<Flow> {
        Ok(Flow::new(
            self.selection(category)?,
            self.config.output_dir(self.root, category),
        ))
    }

    fn tool(&self, name: &str, command: &ToolCommand) -> ExternalTool {
        ExternalTool::new(name, command.clone())
    }

    fn with_livereload_snippet(&self, flow: Flow) -> Flow {
        match self.livereload {
            Some(snippet) => flow.apply(InjectSnippet::new(snippet, LIVERELOAD_MARKER)),
            None => flow,
        }
    }

    fn html(&self) -> Result<Task> {
        let flow = self
            .flow(AssetCategory::Html)?
            .apply(FileInclude::new())
            .apply(WebpPicture)
            .apply(VersionToken::new(&self.config.pipeline.version_key));

        Ok(Task::new(TaskName::Html)
            .flow(self.with_livereload_snippet(flow).write())
            .notify(ReloadKind::Reload))
    }

    fn pug(&self) -> Result<Task> {
        let flow = self
            .flow(AssetCategory::Pug)?
            .apply(self.tool("pug", &self.config.tools.pug))
            .rename(Rename::extension("html"));

        Ok(Task::new(TaskName::Pug)
            .flow(self.with_livereload_snippet(flow).write())
            .notify(ReloadKind::Reload))
    }

    fn css(&self) -> Result<Task> {
        let targets = browser_targets(&self.config.pipeline.browsers)
            .map_err(|e| PipelineError::stage(TaskName::Css.as_str(), e))?;
        let scss_dir = self.config.source_root(self.root).join("scss");

        let flow = self
            .flow(AssetCategory::Css)?
            .apply(ScssCompiler::new().with_load_path(scss_dir))
            .apply(MediaQueryGrouper::new(targets))
            .apply(CssOptimizer::prefixer(targets))
            .write()
            .apply(CssOptimizer::minifier(targets))
            .rename(Rename::suffix(&self.config.pipeline.min_suffix))
            .write();

        Ok(Task::new(TaskName::Css)
            .flow(flow)
            .notify(ReloadKind::CssReload))
    }

    fn js(&self) -> Result<Task> {
        let flow = self
            .flow(AssetCategory::Js)?
            .apply(FileInclude::new())
            .write()
            .apply(ScriptMinifier)
            .rename(Rename::suffix(&self.config.pipeline.min_suffix))
            .write();

        Ok(Task::new(TaskName::Js)
            .flow(flow)
            .notify(ReloadKind::Reload))
    }

    fn images(&self) -> Result<Task> {
        let tools = &self.config.tools;
        let out = self.config.output_dir(self.root, AssetCategory::Images);
        let chain = |stages: Vec<ExternalTool>| {
            stages
                .into_iter()
                .map(|tool| Arc::new(tool) as Arc<dyn Stage>)
                .collect::<Vec<_>>()
        };

        let webp = Flow::new(
            self.selection(AssetCategory::Images)?
                .only_extensions(&WEBP_SOURCES),
            &out,
        )
        .skip_fresh(FreshCheck::Renamed(Rename::extension("webp")))
        .apply(self.tool("webp", &tools.webp).with_output_ext("webp"))
        .write();

        let compress = ByExtension::new("imagemin")
            .route(
                &["png"],
                chain(vec![
                    self.tool("pngquant", &tools.png),
                    self.tool("optipng", &tools.png_optimize),
                ]),
            )
            .route(
                &["jpg", "jpeg"],
                chain(vec![
                    self.tool("mozjpeg", &tools.jpeg),
                    self.tool("jpegtran", &tools.jpeg_optimize),
                ]),
            )
            .route(&["svg"], chain(vec![self.tool("svgo", &tools.svg)]))
            .route(&["gif"], chain(vec![self.tool("gifsicle", &tools.gif)]));

        let originals = Flow::new(self.selection(AssetCategory::Images)?, &out)
            .skip_fresh(FreshCheck::SameName)
            .apply(compress)
            .write();

        Ok(Task::new(TaskName::Images).flow(webp).flow(originals))
    }

    fn fonts(&self) -> Result<Task> {
        let tools = &self.config.tools;
        let woff = self
            .flow(AssetCategory::Fonts)?
            .apply(self.tool("ttf2woff", &tools.woff).with_output_ext("woff"))
            .write();
        let woff2 = self
            .flow(AssetCategory::Fonts)?
            .apply(self.tool("ttf2woff2", &tools.woff2).with_output_ext("woff2"))
            .write();

        Ok(Task::new(TaskName::Fonts)
            .flow(woff)
            .flow(woff2)
            .notify(ReloadKind::Reload))
    }

    fn fonts_otf(&self) -> Result<Task> {
        let selection = Selection::new(
            self.config.source_root(self.root),
            self.config.fonts.otf_src.iter().map(String::as_str),
        )?;
        let flow = Flow::new(selection, self.config.ttf_dir(self.root))
            .apply(
                self.tool("fonter", &self.config.tools.otf_to_ttf)
                    .with_output_ext("ttf"),
            )
            .write();

        Ok(Task::new(TaskName::FontsOtf).flow(flow))
    }

    fn copy(
        &self,
        name: TaskName,
        category: AssetCategory,
        notify: Option<ReloadKind>,
    ) -> Result<Task> {
        let task = Task::new(name).flow(self.flow(category)?.write());
        Ok(match notify {
            Some(kind) => task.notify(kind),
            None => task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Step;

    fn step_names(flow: &Flow) -> Vec<String> {
        flow.steps()
            .iter()
            .map(|step| match step {
                Step::Apply(stage) => stage.name().to_string(),
                Step::Rename(_) => "rename".to_string(),
                Step::Write => "write".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_css_chain() {
        let config = Config::default();
        let task = Catalog::new(&config, Path::new("/project"))
            .task(TaskName::Css)
            .unwrap();

        assert_eq!(task.reload_kind(), Some(ReloadKind::CssReload));
        assert_eq!(
            step_names(&task.flows()[0]),
            vec![
                "scss",
                "group-media",
                "autoprefixer",
                "write",
                "clean-css",
                "rename",
                "write"
            ]
        );
        assert_eq!(task.flows()[0].out_dir(), Path::new("/project/build/css"));
    }

    #[test]
    fn test_markup_gets_livereload_only_in_watch_mode() {
        let config = Config::default();
        let root = Path::new("/project");

        let plain = Catalog::new(&config, root).task(TaskName::Html).unwrap();
        assert_eq!(
            step_names(&plain.flows()[0]),
            vec!["include", "webp-html", "version-number", "write"]
        );

        let watch = Catalog::new(&config, root)
            .with_livereload(Some("<script>/*__livereload*/</script>"))
            .task(TaskName::Pug)
            .unwrap();
        assert_eq!(
            step_names(&watch.flows()[0]),
            vec!["pug", "rename", "inject", "write"]
        );
    }

    #[test]
    fn test_images_have_two_flows_and_no_reload() {
        let config = Config::default();
        let task = Catalog::new(&config, Path::new("/project"))
            .task(TaskName::Images)
            .unwrap();

        assert_eq!(task.flows().len(), 2);
        assert_eq!(task.reload_kind(), None);
        assert_eq!(step_names(&task.flows()[0]), vec!["webp", "write"]);
        assert_eq!(step_names(&task.flows()[1]), vec!["imagemin", "write"]);
    }

    #[test]
    fn test_fonts_otf_writes_into_source_tree() {
        let config = Config::default();
        let task = Catalog::new(&config, Path::new("/project"))
            .task(TaskName::FontsOtf)
            .unwrap();
        assert_eq!(task.flows()[0].out_dir(), Path::new("/project/src/fonts"));
    }

    #[test]
    fn test_bad_browserslist_fails_css_only() {
        let mut config = Config::default();
        config.pipeline.browsers = vec!["definitely not a browser query".to_string()];
        let catalog = Catalog::new(&config, Path::new("/project"));

        assert!(matches!(
            catalog.task(TaskName::Css),
            Err(PipelineError::Stage { .. })
        ));
        assert!(catalog.task(TaskName::Js).is_ok());
    }
}
