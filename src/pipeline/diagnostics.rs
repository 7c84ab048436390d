//! Failure diagnostics for the retry ladder.
//!
//! After a failed attempt we log what usually explains a print crash
//! (how many images, how much of the document is base64) and try to save a
//! full-page screenshot for later inspection. Nothing in here may turn a
//! failed attempt into a different failure: every error is logged and
//! swallowed.

use crate::pipeline::engine::RenderSurface;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

static RE_IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<img[^>]+src=["']([^"']+)["']"#).unwrap());

/// Size figures for an HTML document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HtmlMetrics {
    /// Number of `<img ... src=...>` tags.
    pub img_count: usize,
    /// Total length of every `data:` image source.
    pub base64_len: usize,
    /// Byte length of the whole document.
    pub html_len: usize,
}

/// Measure `html`.
pub fn html_metrics(html: &str) -> HtmlMetrics {
    let mut metrics = HtmlMetrics {
        html_len: html.len(),
        ..Default::default()
    };
    for caps in RE_IMG_SRC.captures_iter(html) {
        metrics.img_count += 1;
        if let Some(src) = caps.get(1) {
            if src.as_str().starts_with("data:") {
                metrics.base64_len += src.len();
            }
        }
    }
    metrics
}

/// File name for the screenshot of a failed attempt.
pub fn screenshot_file_name(unix_secs: u64, scale: f64) -> String {
    format!(
        "pdf_error_screenshot_{}_{}.png",
        unix_secs,
        (scale * 100.0).round() as u32
    )
}

/// Log metrics and optionally save a screenshot after attempt `attempt`
/// failed at `scale`.
///
/// `html` is the document we rendered, when we have it; for URL sources it
/// is read back from the surface.
///
/// Returns the screenshot path when one was written.
pub async fn capture_failure(
    surface: &mut dyn RenderSurface,
    html: Option<&str>,
    attempt: usize,
    scale: f64,
    screenshot_dir: Option<&Path>,
) -> Option<PathBuf> {
    let fetched;
    let html = match html {
        Some(h) => Some(h),
        None => match surface.content().await {
            Ok(h) => {
                fetched = h;
                Some(fetched.as_str())
            }
            Err(e) => {
                warn!("Could not read document for diagnostics: {}", e);
                None
            }
        },
    };

    if let Some(html) = html {
        let m = html_metrics(html);
        error!(
            "PDF diagnostics (attempt {}, scale {}): img_count={}, total_b64_len={}, html_len={}",
            attempt, scale, m.img_count, m.base64_len, m.html_len
        );
    }

    let dir = screenshot_dir?;
    let png = match surface.screenshot().await {
        Ok(png) => png,
        Err(e) => {
            warn!("Could not capture screenshot for diagnostics: {}", e);
            return None;
        }
    };

    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let path = dir.join(screenshot_file_name(secs, scale));
    match tokio::fs::write(&path, &png).await {
        Ok(()) => {
            info!("Saved failure screenshot to {}", path.display());
            Some(path)
        }
        Err(e) => {
            warn!("Could not write screenshot {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::pipeline::engine::PdfOptions;
    use async_trait::async_trait;

    /// Screenshots work, reading the document back does not.
    struct Unreadable;

    #[async_trait]
    impl RenderSurface for Unreadable {
        async fn pdf(&mut self, _: &PdfOptions) -> Result<Vec<u8>, RenderError> {
            Err(RenderError::RenderFailed("crash".into()))
        }
        async fn screenshot(&mut self) -> Result<Vec<u8>, RenderError> {
            Ok(b"png".to_vec())
        }
        async fn content(&mut self) -> Result<String, RenderError> {
            Err(RenderError::RenderFailed("page gone".into()))
        }
        async fn release(self: Box<Self>) -> Result<(), RenderError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn unwritable_screenshot_dir_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("shots");
        std::fs::write(&not_a_dir, b"").unwrap();

        let saved = capture_failure(&mut Unreadable, None, 2, 0.9, Some(&not_a_dir)).await;
        assert!(saved.is_none());
    }

    #[tokio::test]
    async fn screenshot_is_saved_even_when_content_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();

        let saved = capture_failure(&mut Unreadable, None, 2, 0.9, Some(dir.path()))
            .await
            .unwrap();
        let name = saved.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("pdf_error_screenshot_"), "{name}");
        assert!(name.ends_with("_90.png"), "{name}");
        assert_eq!(std::fs::read(&saved).unwrap(), b"png");
    }

    #[test]
    fn metrics_count_images_and_data_uris() {
        let html = r#"<p>x</p><img src="data:image/png;base64,AAAA"><img alt='a' src='/static/a.png'><img src="https://cdn/x.jpg">"#;
        let m = html_metrics(html);
        assert_eq!(m.img_count, 3);
        assert_eq!(m.base64_len, "data:image/png;base64,AAAA".len());
        assert_eq!(m.html_len, html.len());
    }

    #[test]
    fn metrics_ignore_non_img_sources() {
        let m = html_metrics(r#"<script src="/app.js"></script><iframe src="x"></iframe>"#);
        assert_eq!(m.img_count, 0);
        assert_eq!(m.base64_len, 0);
    }

    #[test]
    fn screenshot_name_encodes_time_and_scale() {
        assert_eq!(
            screenshot_file_name(1_700_000_000, 0.8),
            "pdf_error_screenshot_1700000000_80.png"
        );
        assert_eq!(
            screenshot_file_name(5, 1.0),
            "pdf_error_screenshot_5_100.png"
        );
    }
}
