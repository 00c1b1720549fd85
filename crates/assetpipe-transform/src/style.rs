//! Stylesheet stages: SCSS compilation, media query grouping, vendor prefixing
//! and minification.

use std::path::{Path, PathBuf};

use lightningcss::{
    declaration::DeclarationBlock,
    error::PrinterError,
    media_query::MediaList,
    properties::Property,
    rules::{CssRule, media::MediaRule},
    stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleAttribute, StyleSheet},
    targets::{Browsers, Targets},
    traits::{IntoOwned, ToCss},
};

use crate::stage::{Asset, Result, RunContext, Stage, StageError};

/// Resolve browserslist queries into lightningcss targets.
pub fn browser_targets(queries: &[String]) -> Result<Targets> {
    let browsers = Browsers::from_browserslist(queries.iter().map(String::as_str))
        .map_err(|e| StageError::Config(format!("browserslist {queries:?}: {e}")))?;

    Ok(Targets {
        browsers,
        ..Targets::default()
    })
}

fn file_name(asset: &Asset) -> String {
    asset.source.to_string_lossy().into_owned()
}

/// Compiles SCSS to expanded CSS.
#[derive(Debug, Clone, Default)]
pub struct ScssCompiler {
    load_paths: Vec<PathBuf>,
}

impl ScssCompiler {
    /// Compiler resolving imports next to each source file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an extra import search directory.
    #[must_use]
    pub fn with_load_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.load_paths.push(path.into());
        self
    }

    /// Compile one stylesheet.
    pub fn compile(&self, scss: &str, source: &Path) -> Result<String> {
        let mut options = grass::Options::default().style(grass::OutputStyle::Expanded);
        if let Some(parent) = source.parent() {
            options = options.load_path(parent);
        }
        for path in &self.load_paths {
            options = options.load_path(path);
        }

        grass::from_string(scss.to_owned(), &options)
            .map_err(|e| StageError::syntax(source, e.to_string()))
    }
}

impl Stage for ScssCompiler {
    fn name(&self) -> &str {
        "scss"
    }

    fn apply(&self, asset: Asset, _ctx: &RunContext) -> Result<Asset> {
        let css = self.compile(asset.text()?, &asset.source)?;
        Ok(asset.with_text(css).with_extension("css"))
    }
}

/// Moves every `@media` block to the end of the stylesheet, merging blocks with
/// identical queries in order of first appearance.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaQueryGrouper {
    targets: Targets,
}

impl MediaQueryGrouper {
    /// Grouper printing for the given targets.
    #[must_use]
    pub fn new(targets: Targets) -> Self {
        Self { targets }
    }

    /// Group the media queries of one stylesheet.
    pub fn group(&self, css: &str, filename: &str) -> std::result::Result<String, String> {
        let mut sheet = StyleSheet::parse(
            css,
            ParserOptions {
                filename: filename.to_string(),
                ..ParserOptions::default()
            },
        )
        .map_err(|e| e.to_string())?;

        hoist_media_rules(&mut sheet.rules.0).map_err(|e| e.to_string())?;

        sheet
            .to_css(PrinterOptions {
                targets: self.targets,
                ..PrinterOptions::default()
            })
            .map(|out| out.code)
            .map_err(|e| e.to_string())
    }
}

fn media_key(query: &MediaList<'_>) -> std::result::Result<String, PrinterError> {
    query.to_css_string(PrinterOptions::default())
}

fn hoist_media_rules(rules: &mut Vec<CssRule<'_>>) -> std::result::Result<(), PrinterError> {
    let mut plain = Vec::with_capacity(rules.len());
    let mut grouped: Vec<(String, MediaRule<'_>)> = Vec::new();

    for rule in rules.drain(..) {
        match rule {
            CssRule::Media(media) => {
                let key = media_key(&media.query)?;
                match grouped.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, existing)) => existing.rules.0.extend(media.rules.0),
                    None => grouped.push((key, media)),
                }
            }
            other => plain.push(other),
        }
    }

    plain.extend(grouped.into_iter().map(|(_, media)| CssRule::Media(media)));
    *rules = plain;
    Ok(())
}

impl Stage for MediaQueryGrouper {
    fn name(&self) -> &str {
        "group-media"
    }

    fn apply(&self, asset: Asset, _ctx: &RunContext) -> Result<Asset> {
        let css = self
            .group(asset.text()?, &file_name(&asset))
            .map_err(|e| StageError::syntax(&asset.source, e))?;
        Ok(asset.with_text(css))
    }
}

/// Adds vendor prefixes for the configured targets and optionally minifies.
///
/// The prefixer keeps every authored declaration and rule as written. Only the
/// minifying variant merges rules and collapses longhands into shorthands.
#[derive(Debug, Clone, Copy)]
pub struct CssOptimizer {
    targets: Targets,
    minify: bool,
}

impl CssOptimizer {
    /// Prefix only, keeping readable output.
    #[must_use]
    pub fn prefixer(targets: Targets) -> Self {
        Self {
            targets,
            minify: false,
        }
    }

    /// Prefix and minify.
    #[must_use]
    pub fn minifier(targets: Targets) -> Self {
        Self {
            targets,
            minify: true,
        }
    }

    /// Process one stylesheet.
    pub fn process(&self, css: &str, filename: &str) -> std::result::Result<String, String> {
        let mut sheet = StyleSheet::parse(
            css,
            ParserOptions {
                filename: filename.to_string(),
                ..ParserOptions::default()
            },
        )
        .map_err(|e| e.to_string())?;

        if self.minify {
            sheet
                .minify(MinifyOptions {
                    targets: self.targets,
                    ..MinifyOptions::default()
                })
                .map_err(|e| e.to_string())?;
        } else {
            prefix_rules(&mut sheet.rules.0, self.targets)?;
        }

        sheet
            .to_css(PrinterOptions {
                minify: self.minify,
                targets: self.targets,
                ..PrinterOptions::default()
            })
            .map(|out| out.code)
            .map_err(|e| e.to_string())
    }
}

fn prefix_rules(rules: &mut [CssRule<'_>], targets: Targets) -> std::result::Result<(), String> {
    for rule in rules {
        match rule {
            CssRule::Style(style) => {
                prefix_declarations(&mut style.declarations, targets)?;
                prefix_rules(&mut style.rules.0, targets)?;
            }
            CssRule::Nesting(nesting) => {
                prefix_declarations(&mut nesting.style.declarations, targets)?;
                prefix_rules(&mut nesting.style.rules.0, targets)?;
            }
            CssRule::Media(media) => prefix_rules(&mut media.rules.0, targets)?,
            CssRule::Supports(supports) => prefix_rules(&mut supports.rules.0, targets)?,
            CssRule::LayerBlock(layer) => prefix_rules(&mut layer.rules.0, targets)?,
            CssRule::Container(container) => prefix_rules(&mut container.rules.0, targets)?,
            _ => {}
        }
    }
    Ok(())
}

fn prefix_declarations(
    block: &mut DeclarationBlock<'_>,
    targets: Targets,
) -> std::result::Result<(), String> {
    block.declarations = prefix_each(&block.declarations, false, targets)?;
    block.important_declarations = prefix_each(&block.important_declarations, true, targets)?;
    Ok(())
}

/// Expands every declaration on its own, so neighbours are never combined.
fn prefix_each<'i>(
    properties: &[Property<'i>],
    important: bool,
    targets: Targets,
) -> std::result::Result<Vec<Property<'i>>, String> {
    let mut out = Vec::with_capacity(properties.len());
    for property in properties {
        let text = property
            .to_css_string(important, PrinterOptions::default())
            .map_err(|e| e.to_string())?;
        let mut single =
            StyleAttribute::parse(&text, ParserOptions::default()).map_err(|e| e.to_string())?;
        single.minify(MinifyOptions {
            targets,
            ..MinifyOptions::default()
        });

        let block = single.declarations;
        let expanded = if important {
            block.important_declarations
        } else {
            block.declarations
        };
        out.extend(expanded.into_iter().map(|p| p.into_owned()));
    }
    Ok(out)
}

impl Stage for CssOptimizer {
    fn name(&self) -> &str {
        if self.minify { "clean-css" } else { "autoprefixer" }
    }

    fn apply(&self, asset: Asset, _ctx: &RunContext) -> Result<Asset> {
        let css = self
            .process(asset.text()?, &file_name(&asset))
            .map_err(|e| StageError::syntax(&asset.source, e))?;
        Ok(asset.with_text(css))
    }
}
