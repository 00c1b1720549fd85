//! Asset path registry.
//!
//! Maps every asset category to its source globs, its output directory inside the
//! build root and, for categories that trigger rebuilds, a watch glob. Globs are
//! relative to the source directory; a leading `!` marks an exclude pattern.

use std::{
    fmt,
    path::{Component, Path},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Asset categories known to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetCategory {
    Html,
    Pug,
    Css,
    Js,
    Images,
    Fonts,
    Favicon,
    Php,
}

impl AssetCategory {
    /// Every category, in registry order.
    pub const ALL: [Self; 8] = [
        Self::Html,
        Self::Pug,
        Self::Css,
        Self::Js,
        Self::Images,
        Self::Fonts,
        Self::Favicon,
        Self::Php,
    ];

    /// Registry key of the category.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Pug => "pug",
            Self::Css => "css",
            Self::Js => "js",
            Self::Images => "images",
            Self::Fonts => "fonts",
            Self::Favicon => "favicon",
            Self::Php => "php",
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CoreError::UnknownCategory(s.to_string()))
    }
}

/// Paths registered for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPaths {
    /// Source globs; entries starting with `!` exclude matches.
    pub src: Vec<String>,

    /// Output directory relative to the build root (empty = the root itself).
    #[serde(default)]
    pub dest: String,

    /// Glob whose changes re-run this category's task.
    #[serde(default)]
    pub watch: Option<String>,
}

impl CategoryPaths {
    fn new(src: &[&str], dest: &str, watch: Option<&str>) -> Self {
        Self {
            src: src.iter().map(|s| (*s).to_string()).collect(),
            dest: dest.to_string(),
            watch: watch.map(str::to_string),
        }
    }

    /// Positive source globs.
    pub fn includes(&self) -> impl Iterator<Item = &str> {
        self.src
            .iter()
            .map(String::as_str)
            .filter(|p| !p.starts_with('!'))
    }

    /// Exclude globs with the leading `!` stripped.
    pub fn excludes(&self) -> impl Iterator<Item = &str> {
        self.src.iter().filter_map(|p| p.strip_prefix('!'))
    }
}

/// Static registry of every asset category's paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRegistry {
    #[serde(default = "default_html")]
    pub html: CategoryPaths,

    #[serde(default = "default_pug")]
    pub pug: CategoryPaths,

    #[serde(default = "default_css")]
    pub css: CategoryPaths,

    #[serde(default = "default_js")]
    pub js: CategoryPaths,

    #[serde(default = "default_images")]
    pub images: CategoryPaths,

    #[serde(default = "default_fonts")]
    pub fonts: CategoryPaths,

    #[serde(default = "default_favicon")]
    pub favicon: CategoryPaths,

    #[serde(default = "default_php")]
    pub php: CategoryPaths,
}

const IMAGE_GLOB: &str = "img/**/*.{jpg,jpeg,png,svg,gif,ico,webp}";

fn default_html() -> CategoryPaths {
    CategoryPaths::new(&["*.html", "!_*.html"], "", Some("**/**"))
}

fn default_pug() -> CategoryPaths {
    CategoryPaths::new(&["*.pug", "!_*.pug"], "", None)
}

fn default_css() -> CategoryPaths {
    CategoryPaths::new(&["scss/*.scss", "!scss/_*.scss"], "css", Some("scss/**/**"))
}

fn default_js() -> CategoryPaths {
    CategoryPaths::new(&["js/index.js", "js/libs.js"], "js", Some("**/**"))
}

fn default_images() -> CategoryPaths {
    CategoryPaths::new(&[IMAGE_GLOB, "!**/favicon.*"], "img", Some(IMAGE_GLOB))
}

fn default_fonts() -> CategoryPaths {
    CategoryPaths::new(&["fonts/*.ttf"], "fonts", None)
}

fn default_favicon() -> CategoryPaths {
    CategoryPaths::new(&["favicons/**"], "favicons", None)
}

fn default_php() -> CategoryPaths {
    CategoryPaths::new(&["php/**"], "", Some("php/**"))
}

impl Default for PathRegistry {
    fn default() -> Self {
        Self {
            html: default_html(),
            pug: default_pug(),
            css: default_css(),
            js: default_js(),
            images: default_images(),
            fonts: default_fonts(),
            favicon: default_favicon(),
            php: default_php(),
        }
    }
}

impl PathRegistry {
    /// Look up the paths of a category.
    #[must_use]
    pub fn get(&self, category: AssetCategory) -> &CategoryPaths {
        match category {
            AssetCategory::Html => &self.html,
            AssetCategory::Pug => &self.pug,
            AssetCategory::Css => &self.css,
            AssetCategory::Js => &self.js,
            AssetCategory::Images => &self.images,
            AssetCategory::Fonts => &self.fonts,
            AssetCategory::Favicon => &self.favicon,
            AssetCategory::Php => &self.php,
        }
    }

    /// Watch glob of a category, if it is watched.
    #[must_use]
    pub fn watch_glob(&self, category: AssetCategory) -> Option<&str> {
        self.get(category).watch.as_deref()
    }

    /// All watched categories with their globs.
    pub fn watched(&self) -> impl Iterator<Item = (AssetCategory, &str)> {
        AssetCategory::ALL
            .into_iter()
            .filter_map(|c| self.watch_glob(c).map(|g| (c, g)))
    }

    /// Check that every output directory stays inside the build root.
    pub fn validate(&self) -> Result<()> {
        for category in AssetCategory::ALL {
            let paths = self.get(category);
            if paths.includes().next().is_none() {
                return Err(CoreError::config(format!(
                    "registry.{category}.src has no include pattern"
                )));
            }
            if !is_contained(Path::new(&paths.dest)) {
                return Err(CoreError::config(format!(
                    "registry.{category}.dest must be a relative path inside the build directory, got {:?}",
                    paths.dest
                )));
            }
        }
        Ok(())
    }
}

/// Relative path without `..` or root components.
pub(crate) fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip_names() {
        for category in AssetCategory::ALL {
            let parsed: AssetCategory = category.as_str().parse().unwrap();
            assert_eq!(parsed, category);
        }
        assert!("sass".parse::<AssetCategory>().is_err());
    }

    #[test]
    fn test_default_registry_lookup() {
        let registry = PathRegistry::default();
        let css = registry.get(AssetCategory::Css);

        assert_eq!(css.dest, "css");
        assert_eq!(css.includes().collect::<Vec<_>>(), vec!["scss/*.scss"]);
        assert_eq!(css.excludes().collect::<Vec<_>>(), vec!["scss/_*.scss"]);
        assert_eq!(
            registry.get(AssetCategory::Js).src,
            vec!["js/index.js", "js/libs.js"]
        );
    }

    #[test]
    fn test_watched_categories() {
        let registry = PathRegistry::default();
        let watched: Vec<_> = registry.watched().map(|(c, _)| c).collect();

        assert_eq!(
            watched,
            vec![
                AssetCategory::Html,
                AssetCategory::Css,
                AssetCategory::Js,
                AssetCategory::Images,
                AssetCategory::Php
            ]
        );
        assert!(registry.watch_glob(AssetCategory::Fonts).is_none());
    }

    #[test]
    fn test_validate_rejects_escaping_dest() {
        let mut registry = PathRegistry::default();
        registry.css.dest = "../outside".to_string();
        let err = registry.validate().unwrap_err();
        assert!(err.to_string().contains("registry.css.dest"));

        registry.css.dest = "/abs".to_string();
        assert!(registry.validate().is_err());
    }

    #[test]
    fn test_validate_requires_include() {
        let mut registry = PathRegistry::default();
        registry.php.src = vec!["!php/secret.php".to_string()];
        assert!(registry.validate().is_err());
    }

    #[test]
    fn test_default_registry_is_valid() {
        assert!(PathRegistry::default().validate().is_ok());
    }
}
