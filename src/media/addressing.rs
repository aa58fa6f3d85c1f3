//! Deterministic names for stored media.
//!
//! A file is named after the SHA-256 of the URL that first produced it
//! (first 16 bytes, 32 hex chars). Raster images are normalized to WebP on
//! store, so their canonical extension is `.webp` whatever the source served;
//! every other extension is kept as it appears in the URL path.

use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Extension given to normalized raster images
pub const NORMALIZED_EXTENSION: &str = ".webp";

/// Read size when hashing files on disk
const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Maps URLs and file contents to storage names
#[derive(Debug, Clone)]
pub struct ContentAddresser {
    /// Lower-case extensions (with leading dot) that are normalized
    convert_extensions: Vec<String>,
}

impl Default for ContentAddresser {
    fn default() -> Self {
        Self::new([".jpg", ".jpeg", ".png"])
    }
}

impl ContentAddresser {
    /// Create an addresser normalizing the given extensions
    pub fn new(convert_extensions: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let convert_extensions = convert_extensions
            .into_iter()
            .map(|ext| {
                let ext = ext.as_ref().to_lowercase();
                if ext.starts_with('.') {
                    ext
                } else {
                    format!(".{}", ext)
                }
            })
            .collect();
        Self { convert_extensions }
    }

    /// Canonical stored filename for `url`, `None` for an empty URL
    pub fn canonical_name(&self, url: &str) -> Option<String> {
        if url.is_empty() {
            return None;
        }
        let ext = url_extension(url).to_lowercase();
        if self.is_convertible(&ext) {
            Some(format!("{}{}", url_digest(url), NORMALIZED_EXTENSION))
        } else {
            Some(format!("{}{}", url_digest(url), ext))
        }
    }

    /// Name a download is written under before any conversion
    pub fn staging_name(&self, url: &str) -> Option<String> {
        if url.is_empty() {
            return None;
        }
        Some(format!("{}{}", url_digest(url), url_extension(url)))
    }

    /// Whether bytes fetched from `url` get normalized to WebP
    pub fn needs_conversion(&self, url: &str) -> bool {
        self.is_convertible(&url_extension(url).to_lowercase())
    }

    fn is_convertible(&self, lower_ext: &str) -> bool {
        !lower_ext.is_empty() && self.convert_extensions.iter().any(|e| e == lower_ext)
    }
}

/// Hex digest of a URL, used as the base of every stored filename
pub fn url_digest(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(&digest[..16])
}

/// Full hex SHA-256 of file contents
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex SHA-256 of a file, read in chunks so large videos never sit in memory
pub fn file_hash(path: &Path) -> std::io::Result<String> {
    let mut reader = BufReader::with_capacity(HASH_CHUNK_SIZE, std::fs::File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Extension (with leading dot, original case) of the URL path's last segment.
///
/// Query string and fragment are ignored; names without an extension, dot
/// files and names ending in a dot yield an empty string.
pub fn url_extension(url: &str) -> String {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url
            .split(|c| c == '?' || c == '#')
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let name = path.rsplit('/').next().unwrap_or_default();
    match name.rfind('.') {
        Some(i) if i > 0 && i + 1 < name.len() => name[i..].to_string(),
        _ => String::new(),
    }
}
