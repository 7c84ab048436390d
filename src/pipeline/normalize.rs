//! Image normalisation: bound an image's width before it is embedded.
//!
//! Huge data URIs are the most common way to crash the print pipeline, so
//! every inlined image goes through here first. Images at or under the
//! width bound are passed through byte-for-byte; wider ones are resampled
//! with Lanczos3 to exactly the bound, keeping the aspect ratio, and
//! re-encoded in their own format when that is JPEG, PNG or WebP (JPEG
//! otherwise).
//!
//! Decoding runs on the blocking pool: a 6000 px JPEG takes long enough to
//! stall a Tokio worker.

use crate::config::NormalizeOptions;
use crate::error::AssetError;
use image::codecs::jpeg::JpegEncoder;
use image::error::{ImageFormatHint, UnsupportedError, UnsupportedErrorKind};
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat, ImageReader};
use std::io::Cursor;
use tracing::{debug, warn};

/// MIME type used when the bytes could not be identified.
pub const FALLBACK_MIME: &str = "image/png";

/// Bytes ready to embed, plus what we learned about them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    /// `true` when the bytes were re-encoded.
    pub resized: bool,
}

/// What [`try_normalize`] decided.
#[derive(Debug)]
pub enum Normalized {
    /// Already within bounds; use the input bytes as they are.
    Unchanged {
        mime_type: &'static str,
        width: u32,
        height: u32,
    },
    /// Downsized and re-encoded.
    Resized(NormalizedImage),
}

/// Height for `target_width` that keeps the `width:height` ratio.
pub fn target_height(width: u32, height: u32, target_width: u32) -> u32 {
    let h = (target_width as f64 * height as f64 / width as f64).round();
    (h as u32).max(1)
}

/// Decide whether `data` needs resizing and do it.
///
/// # Errors
/// [`AssetError::ImageDecodeFailed`] when the format cannot be identified
/// or the pixels cannot be decoded or re-encoded.
pub fn try_normalize(data: &[u8], opts: &NormalizeOptions) -> Result<Normalized, AssetError> {
    Ok(normalize_inner(data, opts)?)
}

fn normalize_inner(data: &[u8], opts: &NormalizeOptions) -> Result<Normalized, ImageError> {
    let reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
    let format = reader.format().ok_or_else(|| {
        ImageError::Unsupported(UnsupportedError::from_format_and_kind(
            ImageFormatHint::Unknown,
            UnsupportedErrorKind::Format(ImageFormatHint::Unknown),
        ))
    })?;
    let (width, height) = reader.into_dimensions()?;

    if width <= opts.max_width {
        return Ok(Normalized::Unchanged {
            mime_type: format.to_mime_type(),
            width,
            height,
        });
    }

    let img = ImageReader::with_format(Cursor::new(data), format).decode()?;
    let new_height = target_height(width, height, opts.max_width);
    let resized = img.resize_exact(opts.max_width, new_height, FilterType::Lanczos3);

    let out_format = match format {
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP => format,
        _ => ImageFormat::Jpeg,
    };
    let bytes = encode(&resized, out_format, opts.jpeg_quality)?;

    debug!(
        "Resized {:?} {}x{} → {}x{} ({} → {} bytes)",
        format,
        width,
        height,
        resized.width(),
        resized.height(),
        data.len(),
        bytes.len()
    );

    Ok(Normalized::Resized(NormalizedImage {
        bytes,
        mime_type: out_format.to_mime_type().to_string(),
        width: resized.width(),
        height: resized.height(),
        resized: true,
    }))
}

/// Encode `img` as `format`. JPEG drops alpha first since it cannot carry it.
pub fn encode(img: &DynamicImage, format: ImageFormat, jpeg_quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buf, jpeg_quality);
            rgb.write_with_encoder(encoder)?;
        }
        other => img.write_to(&mut Cursor::new(&mut buf), other)?,
    }
    Ok(buf)
}

/// Normalise `data`, falling back to the original bytes on any error.
///
/// One corrupt image must never abort an inlining pass: on decode failure
/// the original bytes are returned with [`FALLBACK_MIME`] and zero
/// dimensions.
pub fn normalize_or_original(data: Vec<u8>, opts: &NormalizeOptions) -> NormalizedImage {
    match try_normalize(&data, opts) {
        Ok(Normalized::Resized(img)) => img,
        Ok(Normalized::Unchanged {
            mime_type,
            width,
            height,
        }) => NormalizedImage {
            bytes: data,
            mime_type: mime_type.to_string(),
            width,
            height,
            resized: false,
        },
        Err(e) => {
            warn!("Resize failed, using original ({} bytes): {}", data.len(), e);
            NormalizedImage {
                bytes: data,
                mime_type: FALLBACK_MIME.to_string(),
                width: 0,
                height: 0,
                resized: false,
            }
        }
    }
}

/// [`normalize_or_original`] on the blocking thread pool.
pub async fn normalize_in_background(
    data: Vec<u8>,
    opts: NormalizeOptions,
) -> Result<NormalizedImage, AssetError> {
    tokio::task::spawn_blocking(move || normalize_or_original(data, &opts))
        .await
        .map_err(|e| AssetError::NormalizeTaskFailed(e.to_string()))
}
