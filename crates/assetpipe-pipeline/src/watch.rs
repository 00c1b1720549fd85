//! Mapping from changed source paths to the tasks they re-run.

use std::path::Path;

use assetpipe_core::PathRegistry;
use globset::GlobMatcher;

use crate::{error::Result, select::compile_glob, task::TaskName};

/// Watch globs of the registry, each bound to one task.
#[derive(Debug, Clone, Default)]
pub struct WatchRules {
    rules: Vec<(TaskName, GlobMatcher)>,
}

impl WatchRules {
    /// Rules for every category with a watch glob.
    pub fn from_registry(registry: &PathRegistry) -> Result<Self> {
        let rules = registry
            .watched()
            .map(|(category, glob)| {
                Ok((TaskName::from(category), compile_glob(glob)?.compile_matcher()))
            })
            .collect::<Result<_>>()?;
        Ok(Self { rules })
    }

    /// Tasks whose watch glob matches a path relative to the source root, in
    /// registry order.
    #[must_use]
    pub fn tasks_for(&self, relative: &Path) -> Vec<TaskName> {
        self.rules
            .iter()
            .filter(|(_, matcher)| matcher.is_match(relative))
            .map(|(task, _)| *task)
            .collect()
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no category is watched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
