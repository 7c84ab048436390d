//! Batch resize of an upload directory.
//!
//! Uploaded images are stored at a bounded width so that the PDF path
//! rarely has to resample them again. [`resize_directory`] walks one
//! directory (not recursively) and rewrites every image wider than the
//! bound in place, in its own format. Narrower images are left alone.
//! One unreadable or corrupt file is counted and skipped; it never stops
//! the batch.

use crate::config::NormalizeOptions;
use crate::error::{AssetError, PipelineError};
use crate::pipeline::normalize::{encode, target_height};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extensions considered images (matched case-insensitively).
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOutcome {
    Resized { from_width: u32, to_width: u32 },
    /// Already within the bound.
    Skipped { width: u32 },
}

/// Counts for a whole directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResizeSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<(PathBuf, String)>,
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Resize one file in place if it is wider than `opts.max_width`.
///
/// The output format follows the file extension, so a `.png` stays a PNG.
/// The new bytes go to a sibling temp file first and are renamed over the
/// original.
pub fn resize_file(path: &Path, opts: &NormalizeOptions) -> Result<ResizeOutcome, AssetError> {
    let read_err = |e: std::io::Error| AssetError::StaticReadFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let reader = ImageReader::open(path).map_err(read_err)?.with_guessed_format().map_err(read_err)?;
    let img = reader.decode()?;
    let (width, height) = (img.width(), img.height());
    if width <= opts.max_width {
        return Ok(ResizeOutcome::Skipped { width });
    }

    let resized = img.resize_exact(
        opts.max_width,
        target_height(width, height, opts.max_width),
        FilterType::Lanczos3,
    );

    let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Jpeg);
    let resized = match format {
        ImageFormat::Gif => DynamicImage::ImageRgba8(resized.to_rgba8()),
        _ => resized,
    };
    let bytes = encode(&resized, format, opts.jpeg_quality)?;

    let tmp = path.with_extension("resize.tmp");
    if let Err(e) = std::fs::write(&tmp, &bytes).and_then(|()| std::fs::rename(&tmp, path)) {
        let _ = std::fs::remove_file(&tmp);
        return Err(AssetError::ResizeWriteFailed {
            path: path.to_path_buf(),
            source: e,
        });
    }

    Ok(ResizeOutcome::Resized {
        from_width: width,
        to_width: opts.max_width,
    })
}

/// Resize every supported image directly inside `dir`.
///
/// # Errors
/// [`PipelineError::DirectoryUnreadable`] when `dir` cannot be listed.
/// Per-file problems are counted in the summary instead.
pub fn resize_directory(dir: &Path, opts: &NormalizeOptions) -> Result<ResizeSummary, PipelineError> {
    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source: e,
    })?;

    info!(
        "Resizing images in {} to {}px wide",
        dir.display(),
        opts.max_width
    );

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_supported_extension(p))
        .collect();
    paths.sort();

    let mut summary = ResizeSummary::default();
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match resize_file(&path, opts) {
            Ok(ResizeOutcome::Resized {
                from_width,
                to_width,
            }) => {
                info!("[OK] {} ({}px → {}px)", name, from_width, to_width);
                summary.processed += 1;
            }
            Ok(ResizeOutcome::Skipped { width }) => {
                debug!("[SKIP] {} ({}px)", name, width);
                summary.skipped += 1;
            }
            Err(e) => {
                warn!("[FAIL] {}: {}", name, e);
                summary.failed += 1;
                summary.failures.push((path, e.to_string()));
            }
        }
    }

    info!(
        "Resize done: processed={}, skipped={}, failed={}",
        summary.processed, summary.skipped, summary.failed
    );
    Ok(summary)
}

/// [`resize_directory`] on the blocking thread pool.
pub async fn resize_directory_in_background(
    dir: PathBuf,
    opts: NormalizeOptions,
) -> Result<ResizeSummary, PipelineError> {
    tokio::task::spawn_blocking(move || resize_directory(&dir, &opts))
        .await
        .map_err(|e| PipelineError::Internal(format!("Resize task panicked: {e}")))?
}
