//! Configuration types for HTML/URL-to-PDF rendering.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built
//! via its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share a config between the HTTP server and the CLI, log it
//! at start-up, and diff two deployments.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default cap on the UTF-8 size of `html` (5 MiB).
pub const MAX_HTML_SIZE_BYTES: usize = 5 * 1024 * 1024;

/// Width bound used when inlining images into a PDF.
pub const PDF_INLINE_MAX_WIDTH: u32 = 1024;

/// Width bound used by the upload-resize path.
pub const UPLOAD_MAX_WIDTH: u32 = 512;

/// Configuration for the rendering pipeline.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use folio_render::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .static_root("public/static")
///     .fetch_timeout_secs(5)
///     .retry_scales(vec![0.85, 0.7])
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Maximum UTF-8 byte length of `html`. Default: 5 MiB.
    ///
    /// Checked before any fetch or render work so an oversized body costs
    /// nothing but the parse.
    pub max_html_bytes: usize,

    /// Directory that `static_prefix` maps to. Default: `app/static`.
    pub static_root: PathBuf,

    /// Path prefix identifying local static assets. Default: `/static/`.
    pub static_prefix: String,

    /// Width bound and encoder settings for inlined images.
    pub normalize: NormalizeOptions,

    /// Per-image fetch timeout in seconds. Default: 10.
    pub fetch_timeout_secs: u64,

    /// Number of remote images fetched at once. Default: 4.
    pub fetch_concurrency: usize,

    /// Largest remote image body accepted, in bytes. Default: 20 MiB.
    pub max_remote_image_bytes: u64,

    /// Fixed page geometry handed to the render engine.
    pub layout: PageLayout,

    /// Scale factors tried, in order, after the initial attempt fails.
    pub retry: RetryLadder,

    /// Take a full-page screenshot when an attempt fails. Default: true.
    pub capture_screenshots: bool,

    /// Where diagnostics screenshots are written. Default: OS temp dir.
    pub debug_dir: PathBuf,

    /// End-to-end deadline for one request in seconds. Default: 120.
    ///
    /// Covers inlining and every rung of the retry ladder.
    pub request_timeout_secs: u64,

    /// File name sent in `Content-Disposition`. Default: `portfolio.pdf`.
    pub download_filename: String,

    /// Optional observer for pipeline events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_html_bytes: MAX_HTML_SIZE_BYTES,
            static_root: PathBuf::from("app/static"),
            static_prefix: "/static/".to_string(),
            normalize: NormalizeOptions::pdf_inline(),
            fetch_timeout_secs: 10,
            fetch_concurrency: 4,
            max_remote_image_bytes: 20 * 1024 * 1024,
            layout: PageLayout::default(),
            retry: RetryLadder::default(),
            capture_screenshots: true,
            debug_dir: std::env::temp_dir(),
            request_timeout_secs: 120,
            download_filename: "portfolio.pdf".to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("max_html_bytes", &self.max_html_bytes)
            .field("static_root", &self.static_root)
            .field("static_prefix", &self.static_prefix)
            .field("normalize", &self.normalize)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("fetch_concurrency", &self.fetch_concurrency)
            .field("max_remote_image_bytes", &self.max_remote_image_bytes)
            .field("layout", &self.layout)
            .field("retry", &self.retry)
            .field("capture_screenshots", &self.capture_screenshots)
            .field("debug_dir", &self.debug_dir)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("download_filename", &self.download_filename)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn RenderProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_html_bytes(mut self, n: usize) -> Self {
        self.config.max_html_bytes = n;
        self
    }

    pub fn static_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.static_root = dir.into();
        self
    }

    pub fn static_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.static_prefix = prefix.into();
        self
    }

    pub fn inline_max_width(mut self, px: u32) -> Self {
        self.config.normalize.max_width = px.max(1);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.normalize.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn fetch_concurrency(mut self, n: usize) -> Self {
        self.config.fetch_concurrency = n.max(1);
        self
    }

    pub fn max_remote_image_bytes(mut self, n: u64) -> Self {
        self.config.max_remote_image_bytes = n;
        self
    }

    pub fn layout(mut self, layout: PageLayout) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn retry_scales(mut self, scales: Vec<f64>) -> Self {
        self.config.retry = RetryLadder::new(scales);
        self
    }

    pub fn capture_screenshots(mut self, v: bool) -> Self {
        self.config.capture_screenshots = v;
        self
    }

    pub fn debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.debug_dir = dir.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn download_filename(mut self, name: impl Into<String>) -> Self {
        self.config.download_filename = name.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if !c.static_prefix.starts_with('/') || !c.static_prefix.ends_with('/') {
            return Err(PipelineError::InvalidConfig(format!(
                "static prefix must start and end with '/', got {:?}",
                c.static_prefix
            )));
        }
        if let Some(bad) = c.retry.scales.iter().find(|s| !(0.1..=2.0).contains(*s)) {
            return Err(PipelineError::InvalidConfig(format!(
                "retry scale must be within 0.1..=2.0, got {bad}"
            )));
        }
        if c.fetch_timeout_secs == 0 || c.request_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "timeouts must be >= 1 second".into(),
            ));
        }
        if c.download_filename.is_empty() || c.download_filename.contains(['"', '\r', '\n']) {
            return Err(PipelineError::InvalidConfig(format!(
                "invalid download filename {:?}",
                c.download_filename
            )));
        }
        Ok(self.config)
    }
}

// ── Value types ──────────────────────────────────────────────────────────

/// Output bound and encoder settings for the image normaliser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeOptions {
    /// Images wider than this are downsized to exactly this width.
    pub max_width: u32,
    /// Quality used when re-encoding JPEG output.
    pub jpeg_quality: u8,
}

impl NormalizeOptions {
    /// Settings used when inlining into a PDF: 1024 px, JPEG q85.
    pub const fn pdf_inline() -> Self {
        Self {
            max_width: PDF_INLINE_MAX_WIDTH,
            jpeg_quality: 85,
        }
    }

    /// Settings used by the upload-resize path: 512 px, JPEG q90.
    pub const fn upload() -> Self {
        Self {
            max_width: UPLOAD_MAX_WIDTH,
            jpeg_quality: 90,
        }
    }
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self::pdf_inline()
    }
}

/// Page geometry for the printed PDF.
///
/// Lengths are in inches because that is what the DevTools protocol takes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    pub paper_width_in: f64,
    pub paper_height_in: f64,
    pub margin_in: f64,
    pub print_background: bool,
    pub display_header_footer: bool,
}

impl PageLayout {
    /// A4 portrait with 15 mm margins on every side.
    pub fn a4() -> Self {
        Self {
            paper_width_in: 8.27,
            paper_height_in: 11.69,
            margin_in: mm_to_in(15.0),
            print_background: true,
            display_header_footer: false,
        }
    }
}

impl Default for PageLayout {
    fn default() -> Self {
        Self::a4()
    }
}

/// Millimetres to inches.
pub fn mm_to_in(mm: f64) -> f64 {
    mm / 25.4
}

/// Scale factors tried after the initial (unscaled) attempt fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryLadder {
    pub scales: Vec<f64>,
}

impl RetryLadder {
    pub fn new(scales: Vec<f64>) -> Self {
        Self { scales }
    }

    /// Total number of attempts including the initial one.
    pub fn total_attempts(&self) -> usize {
        1 + self.scales.len()
    }
}

impl Default for RetryLadder {
    fn default() -> Self {
        Self::new(vec![0.9, 0.8, 0.7])
    }
}
