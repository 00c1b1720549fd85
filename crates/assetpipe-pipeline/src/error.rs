//! Pipeline error types.

use std::{io, path::PathBuf};

use assetpipe_core::CoreError;
use assetpipe_transform::StageError;
use thiserror::Error;

/// Pipeline errors.
///
/// Per-file stage failures never surface here; they are logged and counted in
/// the task report. These errors abort a whole task or operation.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("config error: {0}")]
    Core(#[from] CoreError),

    /// A stage failure that makes the rest of the task pointless.
    #[error("task {task} aborted: {source}")]
    Stage {
        task: String,
        #[source]
        source: StageError,
    },

    /// Invalid glob pattern.
    #[error("invalid glob {pattern:?}: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// Unknown task name.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// Directory walk error.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Font manifest error.
    #[error("font manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl PipelineError {
    /// Wrap a stage error that aborted `task`.
    pub fn stage(task: impl Into<String>, source: StageError) -> Self {
        Self::Stage {
            task: task.into(),
            source,
        }
    }
}

/// Font manifest errors.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The fragment could not be created or written.
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The fonts directory could not be listed.
    #[error("cannot list {dir}: {source}")]
    List {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_display_names_task() {
        let err = PipelineError::stage(
            "images",
            StageError::ToolUnavailable {
                program: "cwebp".to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "not found"),
            },
        );
        assert_eq!(err.to_string(), "task images aborted: tool not available: cwebp");
    }

    #[test]
    fn test_manifest_error_converts() {
        let err: PipelineError = ManifestError::List {
            dir: PathBuf::from("build/fonts"),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        }
        .into();
        assert!(matches!(err, PipelineError::Manifest(_)));
        assert!(err.to_string().contains("build/fonts"));
    }
}
