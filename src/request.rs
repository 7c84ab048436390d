//! Request wire type and validation.
//!
//! Validation runs before any fetch or render work: an empty or oversized
//! request is rejected at the cost of a length check.

use crate::error::PipelineError;
use serde::{Deserialize, Deserializer, Serialize};

/// A render request as received on the wire.
///
/// `null` is accepted for every field and treated like an absent field;
/// empty strings for `html`/`url` count as absent too.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Raw HTML document. Takes precedence over `url` for content.
    #[serde(default)]
    pub html: Option<String>,

    /// Page to navigate to when no `html` is given.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub landscape: bool,

    /// Images the client failed to inline; logged for diagnosis only.
    #[serde(default, deserialize_with = "null_as_default")]
    pub failed_images: Vec<String>,

    /// Remote images the client skipped; fetched and inlined server-side.
    #[serde(default, deserialize_with = "null_as_default")]
    pub skipped_images: Vec<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// What the render engine is pointed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderSource {
    /// Set as the document content directly; no navigation.
    Html(String),
    /// Navigated to; the engine waits for the network to settle.
    Url(String),
}

impl RenderSource {
    /// The HTML text, when there is one.
    pub fn html(&self) -> Option<&str> {
        match self {
            RenderSource::Html(h) => Some(h),
            RenderSource::Url(_) => None,
        }
    }
}

/// A request that passed validation.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub source: RenderSource,
    pub landscape: bool,
    pub failed_images: Vec<String>,
    pub skipped_images: Vec<String>,
}

impl RenderRequest {
    /// Convenience constructor for an HTML request.
    pub fn from_html(html: impl Into<String>) -> Self {
        Self {
            html: Some(html.into()),
            ..Self::default()
        }
    }

    /// Convenience constructor for a URL request.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Check the request and turn it into a [`RenderJob`].
    ///
    /// # Errors
    /// - [`PipelineError::InvalidRequest`] when neither `html` nor `url` is set
    /// - [`PipelineError::PayloadTooLarge`] when `html` exceeds `max_html_bytes`
    /// - [`PipelineError::InvalidUrl`] when only a non-http(s) `url` is set
    pub fn validate(self, max_html_bytes: usize) -> Result<RenderJob, PipelineError> {
        let html = self.html.filter(|h| !h.is_empty());
        let url = self.url.filter(|u| !u.is_empty());

        let source = match (html, url) {
            (None, None) => return Err(PipelineError::InvalidRequest),
            (Some(html), _) => {
                // String::len is the UTF-8 byte length.
                if html.len() > max_html_bytes {
                    return Err(PipelineError::PayloadTooLarge {
                        size: html.len(),
                        limit: max_html_bytes,
                    });
                }
                RenderSource::Html(html)
            }
            (None, Some(url)) => {
                check_navigable(&url)?;
                RenderSource::Url(url)
            }
        };

        Ok(RenderJob {
            source,
            landscape: self.landscape,
            failed_images: self.failed_images,
            skipped_images: self.skipped_images,
        })
    }
}

fn check_navigable(url: &str) -> Result<(), PipelineError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| PipelineError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(PipelineError::InvalidUrl {
            url: url.to_string(),
            reason: format!("scheme '{other}' is not allowed"),
        }),
    }
}
