//! Persisted lookup tables for the media store.
//!
//! Two flat JSON objects live next to the media folders:
//! - `.media_hashes.json`: content hash -> filename
//! - `.duplicate_urls.json`: URL -> filename of an existing file with the same bytes

use std::collections::BTreeMap;
use std::path::Path;

use tracing::warn;

use crate::config::OutputLayout;
use crate::persist::write_json_atomic;

/// In-memory copy of both store indices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaIndex {
    /// Content hash -> canonical filename
    pub hashes: BTreeMap<String, String>,

    /// URL -> filename holding identical content under another URL's name
    pub duplicates: BTreeMap<String, String>,
}

impl MediaIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Load both index files from `layout`.
    ///
    /// A missing file is an empty map. A corrupt file is logged and also
    /// treated as empty; the next garbage collection rebuilds the hash map.
    pub fn load(layout: &OutputLayout) -> Self {
        Self {
            hashes: load_map(&layout.hash_index()),
            duplicates: load_map(&layout.duplicate_index()),
        }
    }

    /// Overwrite both index files
    pub fn save(&self, layout: &OutputLayout) -> std::io::Result<()> {
        write_json_atomic(&layout.hash_index(), &self.hashes)?;
        write_json_atomic(&layout.duplicate_index(), &self.duplicates)?;
        Ok(())
    }

    /// Filename already holding content with this hash
    pub fn owner_of(&self, hash: &str) -> Option<&str> {
        self.hashes.get(hash).map(String::as_str)
    }

    /// Filename a URL was redirected to by an earlier dedup
    pub fn duplicate_of(&self, url: &str) -> Option<&str> {
        self.duplicates.get(url).map(String::as_str)
    }
}

fn load_map(path: &Path) -> BTreeMap<String, String> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable media index, starting empty");
            return BTreeMap::new();
        }
    };

    match serde_json::from_str(&content) {
        Ok(map) => map,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt media index, starting empty");
            BTreeMap::new()
        }
    }
}
