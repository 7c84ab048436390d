//! Pipeline stages for HTML/URL-to-PDF rendering.
//!
//! Each submodule implements one step. The render engine sits behind a
//! trait so the ladder and the inliner are testable without a browser.
//!
//! ## Data Flow
//!
//! ```text
//! request ──▶ inline ──────────────────────────▶ retry ──▶ PDF
//!             │ fetch (skipped remote images)      │ engine / chromium
//!             │ static (/static/ files)            │ diagnostics on failure
//!             └─ normalize (width bound, re-encode)
//! ```
//!
//! 1. [`fetch`]    : download client-skipped images (http/https, timeout, cap)
//! 2. [`normalize`]: bound image width with Lanczos3; runs in
//!    `spawn_blocking` because decoding is CPU-bound
//! 3. [`inline`]   : rewrite `src` attributes to base64 data URIs
//! 4. [`engine`]   : the [`engine::RenderEngine`] / [`engine::RenderSurface`] seam
//! 5. [`chromium`] : headless Chromium over CDP
//! 6. [`retry`]    : initial attempt plus scale ladder, release exactly once
//! 7. [`diagnostics`]: failure metrics and screenshots

pub mod chromium;
pub mod diagnostics;
pub mod engine;
pub mod fetch;
pub mod inline;
pub mod normalize;
pub mod retry;
