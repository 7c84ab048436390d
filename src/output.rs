//! Result and transient value types produced by the pipeline.
//!
//! None of these outlive a single request: [`ImageAsset`]s are dropped as
//! soon as their data URI is spliced into the HTML, and the
//! [`RenderAttempt`] trail exists only to be logged and returned to the
//! caller alongside the PDF.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// An image ready to be embedded, owned by the request that fetched it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    /// URL or static path the bytes came from.
    pub source_ref: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Pixel width, 0 when the bytes could not be decoded.
    pub width: u32,
    /// Pixel height, 0 when the bytes could not be decoded.
    pub height: u32,
}

impl ImageAsset {
    /// `data:<mime>;base64,<payload>`
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }

    /// The attribute text that replaces the original `src="..."`.
    pub fn src_attribute(&self) -> String {
        format!("src=\"{}\"", self.data_uri())
    }
}

/// One rung of the retry ladder, kept for logs and the response trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderAttempt {
    /// Page scale used; 1.0 for the initial attempt.
    pub scale: f64,
    pub succeeded: bool,
    pub error_detail: Option<String>,
    pub duration_ms: u64,
}

/// Counts from the two inlining passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineReport {
    pub remote_inlined: usize,
    pub remote_failed: usize,
    pub static_inlined: usize,
    pub static_failed: usize,
    /// Byte length of the HTML handed to the render engine.
    pub final_html_len: usize,
}

/// A finished PDF plus what it took to get it.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub pdf: Vec<u8>,
    pub attempts: Vec<RenderAttempt>,
    pub inline: InlineReport,
    pub total_duration_ms: u64,
}

impl RenderOutput {
    /// Scale of the attempt that produced the PDF.
    pub fn final_scale(&self) -> Option<f64> {
        self.attempts.iter().find(|a| a.succeeded).map(|a| a.scale)
    }
}
