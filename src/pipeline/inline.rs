//! Asset resolution: embed images into the HTML as base64 data URIs.
//!
//! Two passes run in order over the HTML text:
//!
//! 1. **Remote reconciliation**: every URL the client reported as skipped
//!    is fetched, normalised and substituted for each literal
//!    `src="<url>"`.
//! 2. **Static inlining**: every `src="..."`/`src='...'` whose path starts
//!    with the static prefix is read from the static root, normalised and
//!    substituted in place.
//!
//! Any `src` that does not match is left exactly as written: external
//! assets the engine should fetch itself, data URIs, relative paths. A
//! failure for one image leaves that occurrence untouched and is logged;
//! it never aborts the pass.

use crate::config::{NormalizeOptions, PipelineConfig};
use crate::error::{AssetError, PipelineError};
use crate::output::{ImageAsset, InlineReport};
use crate::pipeline::fetch::ImageFetcher;
use crate::pipeline::normalize::{normalize_in_background, NormalizedImage};
use crate::progress::RenderProgressCallback;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

static RE_SRC_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"src=["']([^"']+)["']"#).unwrap());

/// A located `src` attribute paired with the asset that replaces it.
#[derive(Debug)]
pub struct InlineDirective<'a> {
    /// Byte range of the whole `src="..."` attribute in the HTML.
    pub span: Range<usize>,
    pub asset: &'a ImageAsset,
}

/// Splice directives into `html`. Directives must be sorted by position
/// and must not overlap.
pub fn apply_directives(html: &str, directives: &[InlineDirective<'_>]) -> String {
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;
    for d in directives {
        out.push_str(&html[cursor..d.span.start]);
        out.push_str(&d.asset.src_attribute());
        cursor = d.span.end;
    }
    out.push_str(&html[cursor..]);
    out
}

/// Map a `src` value to a file under `root`.
///
/// Returns `Ok(None)` when the path component does not start with
/// `prefix`; such sources are not ours to touch.
///
/// # Errors
/// [`AssetError::PathRejected`] when the remainder is empty, not valid
/// percent-encoded UTF-8, or tries to leave `root`.
pub fn resolve_static_path(
    src: &str,
    prefix: &str,
    root: &Path,
) -> Result<Option<PathBuf>, AssetError> {
    if src.starts_with("data:") {
        return Ok(None);
    }

    let path = match reqwest::Url::parse(src) {
        Ok(url) => url.path().to_string(),
        Err(_) => src.split(['?', '#']).next().unwrap_or(src).to_string(),
    };

    let Some(rest) = path.strip_prefix(prefix) else {
        return Ok(None);
    };

    let rejected = || AssetError::PathRejected {
        src: src.to_string(),
    };
    let decoded = urlencoding::decode(rest).map_err(|_| rejected())?;
    let relative = Path::new(decoded.as_ref());

    let mut clean = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return Err(rejected()),
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(rejected());
    }

    Ok(Some(root.join(clean)))
}

/// Outcome counts of one pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    pub inlined: usize,
    pub failed: usize,
}

/// Locates, loads and embeds the images referenced by an HTML document.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    fetcher: ImageFetcher,
    static_root: PathBuf,
    static_prefix: String,
    normalize: NormalizeOptions,
    concurrency: usize,
}

impl AssetResolver {
    pub fn new(
        fetcher: ImageFetcher,
        static_root: impl Into<PathBuf>,
        static_prefix: impl Into<String>,
        normalize: NormalizeOptions,
        concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            static_root: static_root.into(),
            static_prefix: static_prefix.into(),
            normalize,
            concurrency: concurrency.max(1),
        }
    }

    /// Build a resolver from pipeline settings.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let fetcher = ImageFetcher::new(config.fetch_timeout_secs, config.max_remote_image_bytes)
            .map_err(|e| PipelineError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self::new(
            fetcher,
            config.static_root.clone(),
            config.static_prefix.clone(),
            config.normalize,
            config.fetch_concurrency,
        ))
    }

    /// Run both passes: remote reconciliation, then static inlining.
    pub async fn resolve(
        &self,
        html: String,
        skipped_images: &[String],
        progress: &dyn RenderProgressCallback,
    ) -> (String, InlineReport) {
        let (html, remote) = self.inline_remote(html, skipped_images, progress).await;
        let (html, local) = self.inline_static(html, progress).await;

        let report = InlineReport {
            remote_inlined: remote.inlined,
            remote_failed: remote.failed,
            static_inlined: local.inlined,
            static_failed: local.failed,
            final_html_len: html.len(),
        };
        info!(
            "Inlining done: remote {}/{} ok, static {}/{} ok, html {} bytes",
            remote.inlined,
            remote.inlined + remote.failed,
            local.inlined,
            local.inlined + local.failed,
            report.final_html_len
        );
        (html, report)
    }

    /// Fetch each client-skipped URL and replace every `src="<url>"`.
    pub async fn inline_remote(
        &self,
        html: String,
        urls: &[String],
        progress: &dyn RenderProgressCallback,
    ) -> (String, PassStats) {
        let mut stats = PassStats::default();
        if urls.is_empty() {
            return (html, stats);
        }

        let mut seen = HashSet::new();
        let wanted: Vec<String> = urls
            .iter()
            .filter(|u| seen.insert(u.as_str()))
            .filter(|u| {
                let referenced = html.contains(&src_needle(u));
                if !referenced {
                    debug!("Skipped image {} is not referenced by the HTML", u);
                }
                referenced
            })
            .cloned()
            .collect();

        let fetched: Vec<(String, Result<ImageAsset, AssetError>)> = stream::iter(wanted)
            .map(|url| async move {
                let result = self.fetch_asset(&url).await;
                (url, result)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut html = html;
        for (url, result) in fetched {
            let url = url.as_str();
            match result {
                Ok(asset) => {
                    html = html.replace(&src_needle(url), &asset.src_attribute());
                    info!("Inlined remote image {} ({} bytes)", url, asset.bytes.len());
                    progress.on_asset_inlined(url, asset.bytes.len());
                    stats.inlined += 1;
                }
                Err(AssetError::UnsupportedScheme { .. }) => {
                    warn!("Skipping non-http url for remote fetch: {}", url);
                    progress.on_asset_failed(url, "scheme not allowed");
                    stats.failed += 1;
                }
                Err(e) => {
                    warn!("Failed to fetch remote image {}: {}", url, e);
                    progress.on_asset_failed(url, &e.to_string());
                    stats.failed += 1;
                }
            }
        }

        (html, stats)
    }

    /// Replace every static-prefixed `src` with the file's data URI.
    pub async fn inline_static(
        &self,
        html: String,
        progress: &dyn RenderProgressCallback,
    ) -> (String, PassStats) {
        let mut stats = PassStats::default();

        let occurrences: Vec<(Range<usize>, &str)> = RE_SRC_ATTR
            .captures_iter(&html)
            .filter_map(|caps| Some((caps.get(0)?.range(), caps.get(1)?.as_str())))
            .collect();

        let mut targets: Vec<(String, PathBuf)> = Vec::new();
        let mut seen = HashSet::new();
        for (_, src) in &occurrences {
            if !seen.insert(*src) {
                continue;
            }
            match resolve_static_path(src, &self.static_prefix, &self.static_root) {
                Ok(Some(path)) => targets.push((src.to_string(), path)),
                Ok(None) => {}
                Err(e) => {
                    warn!("Could not inline local static image: {}", e);
                    progress.on_asset_failed(src, &e.to_string());
                    stats.failed += 1;
                }
            }
        }

        if targets.is_empty() {
            return (html, stats);
        }

        let loaded: Vec<(String, Result<ImageAsset, AssetError>)> = stream::iter(targets)
            .map(|(src, path)| async move {
                let result = self.load_static(&src, &path).await;
                (src, result)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut assets: HashMap<String, ImageAsset> = HashMap::new();
        for (src, result) in loaded {
            match result {
                Ok(asset) => {
                    debug!("Loaded static image {} ({} bytes)", src, asset.bytes.len());
                    progress.on_asset_inlined(&src, asset.bytes.len());
                    stats.inlined += 1;
                    assets.insert(src, asset);
                }
                Err(e) => {
                    warn!("Could not inline local static image: {}", e);
                    progress.on_asset_failed(&src, &e.to_string());
                    stats.failed += 1;
                }
            }
        }

        let directives: Vec<InlineDirective<'_>> = occurrences
            .into_iter()
            .filter_map(|(span, src)| {
                assets.get(src).map(|asset| InlineDirective { span, asset })
            })
            .collect();

        let rewritten = apply_directives(&html, &directives);
        (rewritten, stats)
    }

    async fn fetch_asset(&self, url: &str) -> Result<ImageAsset, AssetError> {
        let bytes = self.fetcher.fetch(url).await?;
        let normalized = normalize_in_background(bytes, self.normalize).await?;
        Ok(into_asset(url, normalized))
    }

    async fn load_static(&self, src: &str, path: &Path) -> Result<ImageAsset, AssetError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AssetError::StaticReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
        let normalized = normalize_in_background(bytes, self.normalize).await?;
        Ok(into_asset(src, normalized))
    }
}

fn src_needle(url: &str) -> String {
    format!("src=\"{url}\"")
}

fn into_asset(source_ref: &str, img: NormalizedImage) -> ImageAsset {
    ImageAsset {
        source_ref: source_ref.to_string(),
        bytes: img.bytes,
        mime_type: img.mime_type,
        width: img.width,
        height: img.height,
    }
}
