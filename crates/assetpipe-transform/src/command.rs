//! Stages backed by external command-line tools (image and font codecs, pug).

use std::{
    fs,
    io::{self, Write},
    path::Path,
    process::{Command, Stdio},
};

use assetpipe_core::ToolCommand;
use tracing::trace;

use crate::stage::{Asset, Result, RunContext, Stage, StageError};

const INPUT: &str = "{input}";
const OUTPUT: &str = "{output}";
const SOURCE: &str = "{source}";

/// Runs an external program over the asset contents.
///
/// The contents are staged in a temporary directory as `input.<ext>`; the tool
/// writes `output.<ext>` (or stdout when the arguments have no `{output}`).
#[derive(Debug, Clone)]
pub struct ExternalTool {
    name: String,
    command: ToolCommand,
    output_ext: Option<String>,
}

impl ExternalTool {
    /// Stage named `name` running `command`.
    pub fn new(name: impl Into<String>, command: ToolCommand) -> Self {
        Self {
            name: name.into(),
            command,
            output_ext: None,
        }
    }

    /// Extension the tool's output file should carry; some tools pick the
    /// output format from it.
    #[must_use]
    pub fn with_output_ext(mut self, ext: impl Into<String>) -> Self {
        self.output_ext = Some(ext.into());
        self
    }

    fn uses(&self, placeholder: &str) -> bool {
        self.command.args.iter().any(|a| a.contains(placeholder))
    }

    fn render_args(&self, input: &Path, output: &Path, source: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        let source = source.to_string_lossy();

        self.command
            .args
            .iter()
            .map(|arg| {
                arg.replace(INPUT, &input)
                    .replace(OUTPUT, &output)
                    .replace(SOURCE, &source)
            })
            .collect()
    }

    fn run(&self, asset: &Asset) -> Result<Vec<u8>> {
        let dir = tempfile::tempdir()?;
        let in_ext = asset.extension().unwrap_or_else(|| "bin".to_string());
        let out_ext = self.output_ext.clone().unwrap_or_else(|| in_ext.clone());
        let input = dir.path().join(format!("input.{in_ext}"));
        let output = dir.path().join(format!("output.{out_ext}"));

        let file_input = self.uses(INPUT);
        let file_output = self.uses(OUTPUT);
        if file_input {
            fs::write(&input, &asset.contents)?;
        }

        let args = self.render_args(&input, &output, &asset.source);
        trace!(program = %self.command.program, ?args, "running tool");

        let mut child = Command::new(&self.command.program)
            .args(&args)
            .stdin(if file_input { Stdio::null() } else { Stdio::piped() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                    StageError::ToolUnavailable {
                        program: self.command.program.clone(),
                        source: e,
                    }
                }
                _ => StageError::Io(e),
            })?;

        // stdin is fed from a separate thread so a chatty tool cannot fill its
        // stdout pipe while we are still writing
        let stdin = child.stdin.take();
        let result = std::thread::scope(|scope| {
            if let Some(mut stdin) = stdin {
                let data = &asset.contents;
                scope.spawn(move || {
                    let _ = stdin.write_all(data);
                });
            }
            child.wait_with_output()
        })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(StageError::ToolFailed {
                program: self.command.program.clone(),
                path: asset.source.clone(),
                message: format!("{} ({})", stderr.trim(), result.status),
            });
        }

        if file_output {
            Ok(fs::read(&output)?)
        } else {
            Ok(result.stdout)
        }
    }
}

impl Stage for ExternalTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, mut asset: Asset, _ctx: &RunContext) -> Result<Asset> {
        asset.contents = self.run(&asset)?;
        if let Some(ext) = &self.output_ext {
            asset.relative.set_extension(ext);
        }
        Ok(asset)
    }
}
