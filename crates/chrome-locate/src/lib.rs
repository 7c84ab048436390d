//! # chrome-locate
//!
//! Find a Chromium / Google Chrome executable for a headless CDP renderer,
//! so that users of the PDF service do not need to pass `--chrome` on every
//! start-up.
//!
//! ## How it works
//!
//! On first call to [`locate_chrome`]:
//!
//! 1. Uses `CHROME_PATH` when it points at an existing file.
//! 2. Checks `~/.cache/folio/chromium/` for a browser unpacked there
//!    (e.g. a Chrome-for-Testing build dropped in by a provisioning script).
//! 3. Searches every directory of `PATH` for the platform's binary names.
//! 4. Falls back to well-known install locations for the platform.
//!
//! The first hit is memoised for the lifetime of the process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chrome_locate::{locate_chrome, is_chrome_available};
//!
//! if is_chrome_available() {
//!     let path = locate_chrome().expect("checked above");
//!     println!("using {}", path.display());
//! }
//! ```
//!
//! ## Platform support
//!
//! | OS      | Binary names searched on `PATH`                                  |
//! |---------|------------------------------------------------------------------|
//! | macOS   | `chromium`, `google-chrome`                                      |
//! | Linux   | `chromium`, `chromium-browser`, `google-chrome`, `google-chrome-stable`, `chrome` |
//! | Windows | `chrome.exe`, `msedge.exe`                                       |
//!
//! ## Environment variable overrides
//!
//! - `CHROME_PATH`: path to an existing browser executable; skips searching.
//! - `FOLIO_CHROME_CACHE_DIR`: override the default cache directory.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by chrome-locate operations.
#[derive(Error, Debug)]
pub enum ChromeLocateError {
    /// The current OS is not one we know install locations for.
    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    /// `CHROME_PATH` or an explicit path does not point at a file.
    #[error("Browser path '{path}' does not exist")]
    EnvPathMissing { path: PathBuf },

    /// Nothing was found after checking every source.
    #[error(
        "No Chromium or Chrome executable found.\n\
Install chromium (e.g. `apt install chromium`) or set CHROME_PATH=/path/to/chrome.\n\
Searched: {searched} locations"
    )]
    NotFound { searched: usize },
}

// ── Internal: platform metadata ──────────────────────────────────────────────

struct PlatformInfo {
    /// File names looked up in each `PATH` directory and the cache dir.
    binary_names: &'static [&'static str],
    /// Absolute install locations checked last.
    well_known: &'static [&'static str],
}

fn detect_platform() -> Result<PlatformInfo, ChromeLocateError> {
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;

    match os {
        "macos" => Ok(PlatformInfo {
            binary_names: &["chromium", "google-chrome"],
            well_known: &[
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                "/Applications/Chromium.app/Contents/MacOS/Chromium",
                "/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
            ],
        }),
        "linux" => Ok(PlatformInfo {
            binary_names: &[
                "chromium",
                "chromium-browser",
                "google-chrome",
                "google-chrome-stable",
                "chrome",
            ],
            well_known: &[
                "/usr/bin/chromium",
                "/usr/bin/chromium-browser",
                "/usr/bin/google-chrome",
                "/snap/bin/chromium",
                "/opt/google/chrome/chrome",
            ],
        }),
        "windows" => Ok(PlatformInfo {
            binary_names: &["chrome.exe", "msedge.exe"],
            well_known: &[
                r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
                r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
            ],
        }),
        os => Err(ChromeLocateError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        }),
    }
}

// ── Cache directory resolution ───────────────────────────────────────────────

/// Returns the cache directory searched for a provisioned browser.
///
/// Default locations:
/// - **macOS**: `~/Library/Caches/folio/chromium/`
/// - **Linux**: `~/.cache/folio/chromium/`
/// - **Windows**: `%LOCALAPPDATA%\folio\chromium\`
///
/// Override by setting `FOLIO_CHROME_CACHE_DIR`.
pub fn chrome_cache_dir() -> PathBuf {
    if let Ok(override_dir) = std::env::var("FOLIO_CHROME_CACHE_DIR") {
        return PathBuf::from(override_dir).join("chromium");
    }

    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);

    base.join("folio").join("chromium")
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Returns `true` if [`locate_chrome`] would succeed.
pub fn is_chrome_available() -> bool {
    locate_chrome().is_ok()
}

/// Returns the path to a browser executable.
///
/// Sources are checked in the order listed in the crate docs. A set but
/// dangling `CHROME_PATH` is an error rather than a silent fall-through, so
/// a typo in deployment config is noticed.
///
/// # Thread safety
///
/// Safe to call from multiple threads; the search happens at most once per
/// process lifetime after the first success.
pub fn locate_chrome() -> Result<PathBuf, ChromeLocateError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let path = search(
        std::env::var_os("CHROME_PATH"),
        std::env::var_os("PATH"),
        &chrome_cache_dir(),
    )?;

    let _ = RESOLVED_PATH.set(path.clone());
    Ok(path)
}

/// Like [`locate_chrome`], but an explicit path wins when given.
pub fn locate_chrome_or(explicit: Option<&Path>) -> Result<PathBuf, ChromeLocateError> {
    match explicit {
        Some(p) if p.is_file() => Ok(p.to_path_buf()),
        Some(p) => Err(ChromeLocateError::EnvPathMissing {
            path: p.to_path_buf(),
        }),
        None => locate_chrome(),
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn search(
    env_override: Option<OsString>,
    path_var: Option<OsString>,
    cache_dir: &Path,
) -> Result<PathBuf, ChromeLocateError> {
    if let Some(env_path) = env_override.filter(|v| !v.is_empty()) {
        let p = PathBuf::from(env_path);
        if p.is_file() {
            return Ok(p);
        }
        return Err(ChromeLocateError::EnvPathMissing { path: p });
    }

    let info = detect_platform()?;
    let candidates = candidates(&info, path_var, cache_dir);
    let searched = candidates.len();

    candidates
        .into_iter()
        .find(|p| p.is_file())
        .ok_or(ChromeLocateError::NotFound { searched })
}

fn candidates(info: &PlatformInfo, path_var: Option<OsString>, cache_dir: &Path) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = info
        .binary_names
        .iter()
        .map(|name| cache_dir.join(name))
        .collect();

    if let Some(path_var) = path_var {
        for dir in std::env::split_paths(&path_var) {
            out.extend(info.binary_names.iter().map(|name| dir.join(name)));
        }
    }

    out.extend(info.well_known.iter().map(PathBuf::from));
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
