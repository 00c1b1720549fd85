//! Build directory removal.

use std::{fs, path::Path};

use tracing::debug;

use crate::error::Result;

/// Remove `dir` and everything below it. Succeeds when it does not exist.
pub fn clean(dir: &Path) -> Result<()> {
    if dir.exists() {
        debug!(dir = %dir.display(), "cleaning output directory");
        fs::remove_dir_all(dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_clean_removes_tree() {
        let dir = TempDir::new().unwrap();
        let build = dir.path().join("build");
        fs::create_dir_all(build.join("css")).unwrap();
        fs::write(build.join("css/style.css"), "a{}").unwrap();

        clean(&build).unwrap();
        assert!(!build.exists());
        assert!(dir.path().exists());
    }

    #[test]
    fn test_clean_twice() {
        let dir = TempDir::new().unwrap();
        let build = dir.path().join("build");
        fs::create_dir_all(&build).unwrap();

        clean(&build).unwrap();
        clean(&build).unwrap();
    }
}
