//! Error types for the folio-render library.
//!
//! Three distinct error types reflect three distinct failure scopes:
//!
//! * [`PipelineError`] (**fatal**): the request cannot produce a PDF
//!   (no content, oversized payload, every render attempt failed). Returned
//!   as `Err(PipelineError)` from [`crate::convert::Pipeline::generate`].
//!
//! * [`AssetError`] (**non-fatal**): a single image could not be fetched,
//!   read or decoded. It never leaves the asset boundary: the occurrence is
//!   left as-is (or inlined unmodified) and the failure is logged and
//!   counted in [`crate::output::InlineReport`].
//!
//! * [`RenderError`]: one failed call into the render engine. It drives the
//!   retry ladder; only the last one is surfaced, wrapped in
//!   [`PipelineError::RenderExhausted`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the folio-render library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Request errors ────────────────────────────────────────────────────
    /// Neither `html` nor `url` was supplied.
    #[error("Either 'html' or 'url' must be provided")]
    InvalidRequest,

    /// `html` exceeds the configured byte limit.
    #[error("HTML payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    /// `url` is not an absolute http/https URL.
    #[error("Invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    // ── Render errors ─────────────────────────────────────────────────────
    /// The render engine could not be started or could not load the content.
    #[error("Render engine unavailable: {0}")]
    EngineUnavailable(#[source] RenderError),

    /// Every rung of the retry ladder failed. `last_error` is the error of
    /// the final (most constrained) attempt.
    #[error("PDF rendering failed after {attempts} attempts: {last_error}")]
    RenderExhausted {
        attempts: usize,
        #[source]
        last_error: RenderError,
    },

    /// The end-to-end request deadline expired.
    #[error("PDF generation exceeded the {secs}s deadline")]
    DeadlineExceeded { secs: u64 },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory to process could not be listed.
    #[error("Cannot read directory '{path}': {source}")]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// `true` when the caller sent something we refuse to process.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidRequest
                | PipelineError::PayloadTooLarge { .. }
                | PipelineError::InvalidUrl { .. }
        )
    }
}

/// A non-fatal error for a single image.
#[derive(Debug, Error)]
pub enum AssetError {
    /// The bytes could not be decoded as an image. Callers fall back to the
    /// original bytes.
    #[error("Image decode failed: {0}")]
    ImageDecodeFailed(#[from] image::ImageError),

    /// Only `http` and `https` are ever fetched.
    #[error("Refusing to fetch '{url}': scheme not allowed")]
    UnsupportedScheme { url: String },

    /// Network error or non-success status.
    #[error("Failed to fetch '{url}': {reason}")]
    AssetFetchFailed { url: String, reason: String },

    /// The per-fetch timeout elapsed.
    #[error("Fetching '{url}' timed out after {secs}s")]
    FetchTimeout { url: String, secs: u64 },

    /// Remote body larger than the configured cap.
    #[error("Image '{url}' is {size} bytes, above the {limit} byte cap")]
    AssetTooLarge { url: String, size: u64, limit: u64 },

    /// A static file could not be read.
    #[error("Could not read static image '{path}': {source}")]
    StaticReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A resized upload could not be written back over the original.
    #[error("Could not write resized image '{path}': {source}")]
    ResizeWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A static `src` tried to escape the static root.
    #[error("Rejected static path '{src}'")]
    PathRejected { src: String },

    /// The blocking normalisation task panicked or was cancelled.
    #[error("Image normalisation task failed: {0}")]
    NormalizeTaskFailed(String),
}

/// One failed call into the render engine.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// Browser launch, page creation or content loading failed.
    #[error("Failed to load content: {0}")]
    LoadFailed(String),

    /// `print to PDF` failed.
    #[error("Render failed: {0}")]
    RenderFailed(String),

    /// Screenshot capture failed (diagnostics only).
    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),
}
