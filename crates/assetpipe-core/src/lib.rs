//! assetpipe Core Library
//!
//! Configuration, the asset path registry and error handling shared by the
//! transform stages, the pipeline and the CLI.

pub mod config;
pub mod error;
pub mod registry;

pub use config::{Config, ToolCommand};
pub use error::{CoreError, Result};
pub use registry::{AssetCategory, CategoryPaths, PathRegistry};
