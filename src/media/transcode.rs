//! Raster image normalization to WebP.

use std::io::Write;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Lossy quality used when nothing is configured
pub const DEFAULT_WEBP_QUALITY: u8 = 60;

/// libwebp effort level, 6 is the slowest and smallest
const WEBP_METHOD: i32 = 6;

/// Errors converting an image
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode {path} as WebP: {reason}")]
    Encode { path: PathBuf, reason: String },
}

/// Decode `source` and write it to `target` as lossy WebP at `quality` (0-100).
///
/// The encoder only accepts 8-bit RGB(A), so other pixel layouts are
/// converted first. `target` is replaced atomically; `source` is left alone.
pub fn transcode_to_webp(source: &Path, target: &Path, quality: u8) -> Result<(), TranscodeError> {
    let bytes = std::fs::read(source).map_err(io_err(source))?;
    let decoded = image::load_from_memory(&bytes).map_err(|e| TranscodeError::Decode {
        path: source.to_path_buf(),
        source: e,
    })?;

    let image = if matches!(
        decoded,
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_)
    ) {
        decoded
    } else if decoded.color().has_alpha() {
        DynamicImage::ImageRgba8(decoded.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(decoded.to_rgb8())
    };

    let encode_err = |reason: String| TranscodeError::Encode {
        path: target.to_path_buf(),
        reason,
    };
    let encoder = webp::Encoder::from_image(&image).map_err(|e| encode_err(e.to_string()))?;
    let mut config =
        webp::WebPConfig::new().map_err(|_| encode_err("invalid encoder config".to_string()))?;
    config.lossless = 0;
    config.quality = f32::from(quality.min(100));
    config.method = WEBP_METHOD;
    let encoded = encoder
        .encode_advanced(&config)
        .map_err(|e| encode_err(format!("{:?}", e)))?;

    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err(target))?;
    tmp.write_all(&encoded).map_err(io_err(target))?;
    tmp.as_file().sync_all().map_err(io_err(target))?;
    tmp.persist(target)
        .map_err(|e| TranscodeError::Io {
            path: target.to_path_buf(),
            source: e.error,
        })?;

    Ok(())
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> TranscodeError {
    let path = path.to_path_buf();
    move |source| TranscodeError::Io { path, source }
}
