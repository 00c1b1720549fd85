//! assetpipe Transform Library
//!
//! Content transformation stages applied to in-flight assets.
//!
//! # Modules
//!
//! - [`stage`] - The [`Stage`] trait, [`Asset`], run context and generic combinators
//! - [`include`] - `@@include` directive resolution for markup and scripts
//! - [`markup`] - WebP `<picture>` rewriting, cache-busting tokens, snippet injection
//! - [`style`] - SCSS compilation, media query grouping, prefixing and minification
//! - [`script`] - JavaScript minification
//! - [`command`] - Stages backed by external command-line tools

pub mod command;
pub mod include;
pub mod markup;
pub mod script;
pub mod stage;
pub mod style;

pub use command::ExternalTool;
pub use include::FileInclude;
pub use markup::{InjectSnippet, VersionToken, WebpPicture};
pub use script::ScriptMinifier;
pub use stage::{Asset, ByExtension, Rename, Result, RunContext, Stage, StageError};
pub use style::{CssOptimizer, MediaQueryGrouper, ScssCompiler, browser_targets};
