//! Markup rewriting stages.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::stage::{Asset, Result, RunContext, Stage};

static IMG_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("valid img pattern"));

static SRC_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bsrc\s*=\s*["']([^"']+)["']"#).expect("valid src pattern")
});

static URL_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(href|src)(\s*=\s*)(["'])([^"']*)(["'])"#).expect("valid url pattern")
});

/// Extensions that get a WebP `<source>`.
const WEBP_SOURCES: [&str; 3] = ["jpg", "jpeg", "png"];

/// Split a URL into path and the `?query#fragment` tail.
fn split_url(url: &str) -> (&str, &str) {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    url.split_at(end)
}

fn url_extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

/// Wraps `<img>` tags referencing JPEG/PNG files in a `<picture>` with a WebP source.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebpPicture;

impl WebpPicture {
    /// Rewrite every eligible `<img>` in `html`.
    #[must_use]
    pub fn rewrite(html: &str) -> String {
        let lower = html.to_ascii_lowercase();
        let mut out = String::with_capacity(html.len());
        let mut last = 0;

        for tag in IMG_TAG.find_iter(html) {
            out.push_str(&html[last..tag.start()]);
            last = tag.end();

            match webp_source(tag.as_str()) {
                Some(webp) if !inside_picture(&lower[..tag.start()]) => {
                    out.push_str(&format!(
                        r#"<picture><source srcset="{webp}" type="image/webp">{}</picture>"#,
                        tag.as_str()
                    ));
                }
                _ => out.push_str(tag.as_str()),
            }
        }

        out.push_str(&html[last..]);
        out
    }
}

fn webp_source(img: &str) -> Option<String> {
    let src = SRC_ATTR.captures(img)?.get(1)?.as_str();
    if src.starts_with("data:") {
        return None;
    }

    let (path, _) = split_url(src);
    let ext = url_extension(path)?;
    if !WEBP_SOURCES.contains(&ext.as_str()) {
        return None;
    }

    let stem = &path[..path.len() - ext.len()];
    Some(format!("{stem}webp"))
}

fn inside_picture(before: &str) -> bool {
    match (before.rfind("<picture"), before.rfind("</picture")) {
        (Some(open), Some(close)) => open > close,
        (Some(_), None) => true,
        _ => false,
    }
}

impl Stage for WebpPicture {
    fn name(&self) -> &str {
        "webp-html"
    }

    fn apply(&self, asset: Asset, _ctx: &RunContext) -> Result<Asset> {
        let html = Self::rewrite(asset.text()?);
        Ok(asset.with_text(html))
    }
}

/// Appends the run's version token to stylesheet and script URLs.
#[derive(Debug, Clone)]
pub struct VersionToken {
    key: String,
    extensions: Vec<String>,
}

impl VersionToken {
    /// Token stage for `.css` and `.js` references.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            extensions: vec!["css".to_string(), "js".to_string()],
        }
    }

    /// Rewrite every eligible `href`/`src` in `html`.
    #[must_use]
    pub fn rewrite(&self, html: &str, token: &str) -> String {
        URL_ATTR
            .replace_all(html, |caps: &Captures<'_>| {
                let url = &caps[4];
                match self.versioned(url, token) {
                    Some(url) => format!("{}{}{}{url}{}", &caps[1], &caps[2], &caps[3], &caps[5]),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    fn versioned(&self, url: &str, token: &str) -> Option<String> {
        let (path, tail) = split_url(url);
        let ext = url_extension(path)?;
        if !self.extensions.contains(&ext) {
            return None;
        }

        let (query, fragment) = match tail.find('#') {
            Some(i) => tail.split_at(i),
            None => (tail, ""),
        };
        let param = format!("{}={token}", self.key);

        let query = if query.is_empty() || query == "?" {
            format!("?{param}")
        } else {
            format!("{query}&{param}")
        };
        Some(format!("{path}{query}{fragment}"))
    }
}

impl Stage for VersionToken {
    fn name(&self) -> &str {
        "version-number"
    }

    fn apply(&self, asset: Asset, ctx: &RunContext) -> Result<Asset> {
        let html = self.rewrite(asset.text()?, &ctx.version);
        Ok(asset.with_text(html))
    }
}

/// Injects a snippet before `</body>` unless its marker is already present.
#[derive(Debug, Clone)]
pub struct InjectSnippet {
    snippet: String,
    marker: String,
}

impl InjectSnippet {
    /// Inject `snippet`, skipping documents that already contain `marker`.
    pub fn new(snippet: impl Into<String>, marker: impl Into<String>) -> Self {
        Self {
            snippet: snippet.into(),
            marker: marker.into(),
        }
    }

    /// Inject into one document.
    #[must_use]
    pub fn inject(&self, html: &str) -> String {
        if html.contains(&self.marker) {
            return html.to_string();
        }

        match html.to_ascii_lowercase().rfind("</body>") {
            Some(pos) => format!("{}{}{}", &html[..pos], self.snippet, &html[pos..]),
            None => format!("{html}{}", self.snippet),
        }
    }
}

impl Stage for InjectSnippet {
    fn name(&self) -> &str {
        "inject"
    }

    fn apply(&self, asset: Asset, _ctx: &RunContext) -> Result<Asset> {
        let html = self.inject(asset.text()?);
        Ok(asset.with_text(html))
    }
}
