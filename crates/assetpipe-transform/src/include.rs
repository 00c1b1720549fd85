//! `@@include` directive resolution.
//!
//! Supports `@@include('path')` and `@@include('path', {"name": "value"})`. Paths
//! are relative to the including file; variables replace `@@name` inside the
//! included text. Includes nest up to [`MAX_DEPTH`] levels.

use std::{fs, path::Path};

use regex::Regex;
use serde_json::{Map, Value};

use crate::stage::{Asset, Result, RunContext, Stage, StageError};

/// Maximum include nesting before the chain is treated as a cycle.
pub const MAX_DEPTH: usize = 32;

/// Include resolver.
#[derive(Debug)]
pub struct FileInclude {
    prefix: String,
    pattern: Regex,
}

impl Default for FileInclude {
    fn default() -> Self {
        Self::new()
    }
}

impl FileInclude {
    /// Resolver using the `@@` prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::with_prefix("@@")
    }

    /// Resolver using a custom directive prefix.
    #[must_use]
    pub fn with_prefix(prefix: &str) -> Self {
        let escaped = regex::escape(prefix);
        let pattern = Regex::new(&format!(
            r#"(?s){escaped}include\(\s*["']([^"']+)["']\s*(?:,\s*(\{{.*?\}}))?\s*\)"#
        ))
        .expect("escaped include pattern is a valid regex");

        Self {
            prefix: prefix.to_string(),
            pattern,
        }
    }

    /// Resolve every include in `text`, reading files relative to `base_dir`.
    pub fn resolve(&self, text: &str, base_dir: &Path, source: &Path) -> Result<String> {
        self.resolve_at(text, base_dir, source, 0)
    }

    fn resolve_at(&self, text: &str, base_dir: &Path, source: &Path, depth: usize) -> Result<String> {
        if depth > MAX_DEPTH {
            return Err(StageError::include(
                source,
                format!("includes nested deeper than {MAX_DEPTH} levels (cycle?)"),
            ));
        }

        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for caps in self.pattern.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&text[last..whole.start()]);

            let path = base_dir.join(&caps[1]);
            let included = fs::read_to_string(&path).map_err(|e| {
                StageError::include(source, format!("cannot read {}: {e}", path.display()))
            })?;

            let included = match caps.get(2) {
                Some(vars) => self.substitute(&included, vars.as_str(), source)?,
                None => included,
            };

            let nested_base = path.parent().unwrap_or(base_dir);
            out.push_str(&self.resolve_at(&included, nested_base, source, depth + 1)?);
            last = whole.end();
        }

        out.push_str(&text[last..]);
        Ok(out)
    }

    fn substitute(&self, text: &str, vars: &str, source: &Path) -> Result<String> {
        let vars: Map<String, Value> = serde_json::from_str(vars)
            .map_err(|e| StageError::include(source, format!("invalid include variables: {e}")))?;

        // longest names first so `@@titleLong` is not clobbered by `@@title`
        let mut names: Vec<_> = vars.keys().collect();
        names.sort_by_key(|name| std::cmp::Reverse(name.len()));

        let mut out = text.to_string();
        for name in names {
            let value = match &vars[name.as_str()] {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out = out.replace(&format!("{}{name}", self.prefix), &value);
        }
        Ok(out)
    }
}

impl Stage for FileInclude {
    fn name(&self) -> &str {
        "include"
    }

    fn apply(&self, asset: Asset, _ctx: &RunContext) -> Result<Asset> {
        let base_dir = asset.source.parent().unwrap_or(Path::new(".")).to_path_buf();
        let resolved = self.resolve(asset.text()?, &base_dir, &asset.source)?;
        Ok(asset.with_text(resolved))
    }
}
