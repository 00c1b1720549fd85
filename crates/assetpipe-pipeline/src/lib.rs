//! assetpipe Pipeline Library
//!
//! Turns the configuration into runnable tasks and orchestrates them.
//!
//! # Modules
//!
//! - [`select`] - Glob-based source selection and freshness checks
//! - [`task`] - Tasks, flows and steps
//! - [`catalog`] - The task definitions for every asset category
//! - [`build`] - The [`Pipeline`] orchestrator
//! - [`clean`] - Build directory removal
//! - [`fonts`] - SCSS font manifest generation
//! - [`reload`] - Live-reload notification sink
//! - [`watch`] - Watch glob to task mapping

pub mod build;
pub mod catalog;
pub mod clean;
pub mod error;
pub mod fonts;
pub mod reload;
pub mod select;
pub mod task;
pub mod watch;

pub use build::{BuildReport, Failure, Pipeline};
pub use catalog::{Catalog, LIVERELOAD_MARKER};
pub use error::{ManifestError, PipelineError, Result};
pub use fonts::FontManifest;
pub use reload::{NoopReload, ReloadKind, ReloadSink};
pub use select::{Selected, Selection, is_fresh};
pub use task::{FreshCheck, Flow, Step, Task, TaskName, TaskReport};
pub use watch::WatchRules;
