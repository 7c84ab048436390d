//! The seam between the pipeline and a headless browser.
//!
//! [`RenderEngine`] opens a [`RenderSurface`]: one loaded document that can
//! be printed any number of times at different scales, screenshotted for
//! diagnostics, and finally released. The retry ladder only ever talks to
//! these two traits, so tests drive it with a scripted engine and the
//! production path uses [`crate::pipeline::chromium::ChromiumEngine`].

use crate::config::PageLayout;
use crate::error::RenderError;
use crate::request::RenderSource;
use async_trait::async_trait;

/// Print settings for one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfOptions {
    pub layout: PageLayout,
    pub landscape: bool,
    /// `None` leaves the engine at its natural scale.
    pub scale: Option<f64>,
    /// Let `@page` CSS size win over the paper size.
    pub prefer_css_page_size: bool,
}

impl PdfOptions {
    /// Settings for the first attempt: natural scale, CSS page size honoured.
    pub fn initial(layout: PageLayout, landscape: bool) -> Self {
        Self {
            layout,
            landscape,
            scale: None,
            prefer_css_page_size: true,
        }
    }

    /// Settings for a degraded retry at `scale`.
    pub fn degraded(layout: PageLayout, landscape: bool, scale: f64) -> Self {
        Self {
            layout,
            landscape,
            scale: Some(scale),
            prefer_css_page_size: false,
        }
    }

    /// Scale as reported in logs and the attempt trail.
    pub fn effective_scale(&self) -> f64 {
        self.scale.unwrap_or(1.0)
    }
}

/// Starts a browser session and loads content into it.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Load `source` and return a surface ready to print.
    ///
    /// For [`RenderSource::Html`] the content is set directly and the call
    /// returns once the document and its images have loaded. For
    /// [`RenderSource::Url`] the engine navigates and waits for the network
    /// to go idle.
    ///
    /// Implementations must release anything they started when this
    /// returns `Err`.
    async fn open(&self, source: &RenderSource) -> Result<Box<dyn RenderSurface>, RenderError>;
}

/// One loaded document.
#[async_trait]
pub trait RenderSurface: Send {
    /// Print the current document to PDF bytes.
    async fn pdf(&mut self, opts: &PdfOptions) -> Result<Vec<u8>, RenderError>;

    /// Full-page PNG of the current document.
    async fn screenshot(&mut self) -> Result<Vec<u8>, RenderError>;

    /// The document's current HTML, used for diagnostics after a URL load.
    async fn content(&mut self) -> Result<String, RenderError>;

    /// Shut the surface down. Consumes the surface so it cannot be released
    /// twice.
    async fn release(self: Box<Self>) -> Result<(), RenderError>;
}
