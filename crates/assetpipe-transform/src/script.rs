//! JavaScript minification.

use minify_js::{Session, TopLevelMode, minify};

use crate::stage::{Asset, Result, RunContext, Stage, StageError};

/// Minifies scripts as global (non-module) code.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptMinifier;

impl ScriptMinifier {
    /// Minify one script.
    pub fn minify(source: &[u8]) -> std::result::Result<Vec<u8>, String> {
        let session = Session::new();
        let mut out = Vec::with_capacity(source.len());
        minify(&session, TopLevelMode::Global, source, &mut out).map_err(|e| format!("{e:?}"))?;
        Ok(out)
    }
}

impl Stage for ScriptMinifier {
    fn name(&self) -> &str {
        "uglify"
    }

    fn apply(&self, mut asset: Asset, _ctx: &RunContext) -> Result<Asset> {
        asset.contents =
            Self::minify(&asset.contents).map_err(|e| StageError::syntax(&asset.source, e))?;
        Ok(asset)
    }
}
