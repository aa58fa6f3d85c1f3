//! Canonical on-disk layout of the output directory.
//!
//! Single source of truth - build paths from an [`OutputLayout`] instead of
//! joining names by hand.
//!
//! ```text
//! <output>/
//! ├── corpus.json              # Harvested records, newest first
//! ├── data.json                # Gallery view with media rewritten to filenames
//! ├── .media_hashes.json       # content hash -> filename
//! ├── .duplicate_urls.json     # URL -> filename shortcut
//! └── images/
//!     ├── media/
//!     └── avatars/
//! ```

use std::path::{Path, PathBuf};

/// Corpus file name
pub const CORPUS_FILE: &str = "corpus.json";

/// Gallery file name
pub const GALLERY_FILE: &str = "data.json";

/// Content hash index file name
pub const HASH_INDEX_FILE: &str = ".media_hashes.json";

/// Duplicate URL index file name
pub const DUPLICATE_INDEX_FILE: &str = ".duplicate_urls.json";

/// Paths rooted at one output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    /// Create a layout rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Output root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persisted corpus
    pub fn corpus(&self) -> PathBuf {
        self.root.join(CORPUS_FILE)
    }

    /// Media-rewritten gallery records
    pub fn gallery(&self) -> PathBuf {
        self.root.join(GALLERY_FILE)
    }

    /// Content hash -> filename index
    pub fn hash_index(&self) -> PathBuf {
        self.root.join(HASH_INDEX_FILE)
    }

    /// URL -> filename index
    pub fn duplicate_index(&self) -> PathBuf {
        self.root.join(DUPLICATE_INDEX_FILE)
    }

    /// Post media folder
    pub fn media_dir(&self) -> PathBuf {
        self.root.join("images").join("media")
    }

    /// Author avatar folder
    pub fn avatar_dir(&self) -> PathBuf {
        self.root.join("images").join("avatars")
    }
}
