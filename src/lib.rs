//! # folio-render
//!
//! Render HTML documents or live URLs to print-ready PDFs with headless
//! Chromium.
//!
//! ## Why this crate?
//!
//! Printing a rich page from a browser fails in boring ways: images that
//! need cookies or CORS never load, `/static/` paths mean nothing to a
//! detached renderer, and a few oversized photos are enough to crash the
//! print step. This crate embeds every image as a bounded-size data URI
//! before the browser sees the document, then prints with a retry ladder
//! that steps the page scale down until the renderer copes.
//!
//! ## Pipeline Overview
//!
//! ```text
//! request (html | url)
//!  │
//!  ├─ 1. Validate  400 when empty, 413 when html > 5 MiB
//!  ├─ 2. Remote    fetch client-skipped images, inline as data URIs
//!  ├─ 3. Static    inline /static/ images from the static root
//!  ├─ 4. Render    A4, 15 mm margins, backgrounds, scale 1.0 → 0.9 → 0.8 → 0.7
//!  └─ 5. Output    PDF bytes + attempt trail
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use folio_render::{ChromiumOptions, Pipeline, PipelineConfig, RenderRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder().static_root("public/static").build()?;
//!     let pipeline = Pipeline::with_chromium(config, ChromiumOptions::default())?;
//!     let output = pipeline
//!         .generate(RenderRequest::from_html("<h1>Hello</h1>"))
//!         .await?;
//!     std::fs::write("hello.pdf", &output.pdf)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `folio` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when embedding only the library:
//! ```toml
//! folio-render = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod request;
pub mod resize;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{NormalizeOptions, PageLayout, PipelineConfig, PipelineConfigBuilder, RetryLadder};
pub use convert::Pipeline;
pub use error::{AssetError, PipelineError, RenderError};
pub use output::{ImageAsset, InlineReport, RenderAttempt, RenderOutput};
pub use pipeline::chromium::{ChromiumEngine, ChromiumOptions};
pub use pipeline::engine::{PdfOptions, RenderEngine, RenderSurface};
pub use progress::{NoopProgressCallback, ProgressCallback, RenderProgressCallback};
pub use request::{RenderJob, RenderRequest, RenderSource};
pub use resize::{resize_directory, ResizeSummary};
pub use server::router;
