//! assetpipe CLI Library
//!
//! Command implementations and the development server behind the `assetpipe`
//! binary.
//!
//! # Modules
//!
//! - [`cmd`] - Command implementations (tasks, build, clean, fonts manifest, watch)
//! - [`server`] - Development server with live reload
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use assetpipe::cmd;
//!
//! // Build every asset into the build directory
//! cmd::build::run(Path::new("assetpipe.toml")).unwrap();
//! ```

pub mod cmd;
pub mod server;

// Re-export core types for convenience
pub use assetpipe_core::Config;
pub use assetpipe_pipeline::{BuildReport, Pipeline, TaskName};

/// Initialize tracing with the specified verbosity level.
///
/// # Arguments
///
/// * `verbose` - Verbosity level (0 = WARN, 1 = INFO, 2 = DEBUG, 3+ = TRACE)
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}
