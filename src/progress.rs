//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn RenderProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to observe
//! each request as it moves through inlining and the retry ladder.
//!
//! The CLI drives a spinner from these events; tests use them to assert
//! which assets were inlined and which attempts ran, without reaching into
//! the pipeline's internals.
//!
//! # Example
//!
//! ```rust
//! use folio_render::{RenderProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     inlined: AtomicUsize,
//! }
//!
//! impl RenderProgressCallback for CountingCallback {
//!     fn on_asset_inlined(&self, source: &str, bytes: usize) {
//!         self.inlined.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("inlined {source} ({bytes} bytes)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { inlined: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn RenderProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes one request.
///
/// Implementations must be `Send + Sync`: remote images are fetched
/// concurrently and the server shares one callback across requests. All
/// methods have default no-op implementations so callers only override
/// what they care about.
pub trait RenderProgressCallback: Send + Sync {
    /// Called once the request has passed validation.
    ///
    /// # Arguments
    /// * `remote_images`: number of client-skipped URLs to reconcile
    fn on_request_start(&self, remote_images: usize) {
        let _ = remote_images;
    }

    /// Called when an image was replaced by a data URI.
    ///
    /// # Arguments
    /// * `source`: the URL or static path that was inlined
    /// * `bytes` : size of the embedded (normalised) image
    fn on_asset_inlined(&self, source: &str, bytes: usize) {
        let _ = (source, bytes);
    }

    /// Called when an image was left untouched because it failed.
    fn on_asset_failed(&self, source: &str, error: &str) {
        let _ = (source, error);
    }

    /// Called just before the engine is asked for a PDF.
    ///
    /// # Arguments
    /// * `attempt`: 1-indexed attempt number
    /// * `scale`  : page scale for this attempt (1.0 for the first)
    fn on_attempt_start(&self, attempt: usize, scale: f64) {
        let _ = (attempt, scale);
    }

    /// Called when an attempt fails.
    fn on_attempt_failed(&self, attempt: usize, scale: f64, error: &str) {
        let _ = (attempt, scale, error);
    }

    /// Called once with the final PDF size.
    fn on_render_complete(&self, pdf_bytes: usize, attempts: usize) {
        let _ = (pdf_bytes, attempts);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl RenderProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn RenderProgressCallback>;
