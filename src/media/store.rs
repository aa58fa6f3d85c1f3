//! Content-addressed media store.
//!
//! Files are named by [`ContentAddresser`] and deduplicated a second time by
//! content hash: when two URLs serve identical bytes only the first file is
//! kept and the second URL is recorded in the duplicate map. Both indices sit
//! behind a single mutex so concurrent `put`s cannot register one content
//! under two names.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use super::addressing::{file_hash, ContentAddresser};
use super::index::MediaIndex;
use super::transcode::{transcode_to_webp, TranscodeError, DEFAULT_WEBP_QUALITY};
use crate::config::OutputLayout;
use crate::domain::Record;
use crate::persist::write_bytes_atomic;

/// Errors storing media
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("URL has no storable name: {0:?}")]
    Unnamed(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Which folder a download lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// Post media
    Media,

    /// Author avatars
    Avatar,
}

impl Destination {
    /// Folder for this destination under `layout`
    pub fn dir(self, layout: &OutputLayout) -> PathBuf {
        match self {
            Destination::Media => layout.media_dir(),
            Destination::Avatar => layout.avatar_dir(),
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Media => write!(f, "media"),
            Destination::Avatar => write!(f, "avatar"),
        }
    }
}

/// Garbage collection step a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GcStep {
    Scan,
    Prune,
    Hash,
    Dedup,
}

/// A file garbage collection had to skip
#[derive(Debug, Clone, Serialize)]
pub struct GcFailure {
    pub step: GcStep,
    pub path: PathBuf,
    pub error: String,
}

/// What a garbage collection pass did
#[derive(Debug, Clone, Default, Serialize)]
pub struct GcReport {
    /// Files removed because no record references them
    pub orphans_removed: usize,

    /// Files removed because an earlier file has the same content
    pub duplicates_removed: usize,

    /// Duplicate-map entries redirected to a surviving file
    pub pointers_repaired: usize,

    /// Duplicate-map entries whose target no longer exists
    pub pointers_dropped: usize,

    /// Per-file errors that were skipped
    pub failures: Vec<GcFailure>,
}

impl GcReport {
    /// Files deleted by this pass
    pub fn removed(&self) -> usize {
        self.orphans_removed + self.duplicates_removed
    }

    fn fail(&mut self, step: GcStep, path: &Path, error: impl std::fmt::Display) {
        warn!(?step, path = %path.display(), error = %error, "Skipping file during cleanup");
        self.failures.push(GcFailure {
            step,
            path: path.to_path_buf(),
            error: error.to_string(),
        });
    }
}

/// Media files plus their hash and duplicate indices
#[derive(Debug)]
pub struct ContentStore {
    layout: OutputLayout,
    addresser: ContentAddresser,
    webp_quality: u8,
    index: Mutex<MediaIndex>,
}

impl ContentStore {
    /// Open the store under `layout`, creating folders and loading indices
    pub fn open(layout: OutputLayout, addresser: ContentAddresser) -> Result<Self, StoreError> {
        for dir in [layout.media_dir(), layout.avatar_dir()] {
            std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
        }

        let index = MediaIndex::load(&layout);
        debug!(
            hashes = index.hashes.len(),
            duplicates = index.duplicates.len(),
            "Opened media store"
        );

        Ok(Self {
            layout,
            addresser,
            webp_quality: DEFAULT_WEBP_QUALITY,
            index: Mutex::new(index),
        })
    }

    /// Lossy quality (0-100) for images normalized to WebP
    pub fn with_webp_quality(mut self, quality: u8) -> Self {
        self.webp_quality = quality.min(100);
        self
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn addresser(&self) -> &ContentAddresser {
        &self.addresser
    }

    /// Copy of the current indices
    pub fn index_snapshot(&self) -> MediaIndex {
        self.index().clone()
    }

    fn index(&self) -> MutexGuard<'_, MediaIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Path of a stored file in either folder
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        [self.layout.media_dir(), self.layout.avatar_dir()]
            .into_iter()
            .map(|dir| dir.join(name))
            .find(|path| path.is_file())
    }

    fn exists(&self, name: &str) -> bool {
        self.locate(name).is_some()
    }

    /// Stored filename for `url` without touching the network.
    ///
    /// A live duplicate-map entry wins, then the URL's own canonical file.
    pub fn resolve(&self, url: &str) -> Option<String> {
        let duplicate = self.index().duplicate_of(url).map(str::to_string);
        if let Some(name) = duplicate {
            if self.exists(&name) {
                return Some(name);
            }
        }

        self.addresser
            .canonical_name(url)
            .filter(|name| self.exists(name))
    }

    /// Store downloaded bytes for `url` and return the filename holding them
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn put(
        &self,
        url: &str,
        destination: Destination,
        bytes: &[u8],
    ) -> Result<String, StoreError> {
        if let Some(name) = self.resolve(url) {
            return Ok(name);
        }

        let unnamed = || StoreError::Unnamed(url.to_string());
        let canonical = self.addresser.canonical_name(url).ok_or_else(unnamed)?;
        let staging = self.addresser.staging_name(url).ok_or_else(unnamed)?;

        let dir = destination.dir(&self.layout);
        let final_path = dir.join(&canonical);
        let staging_path = dir.join(&staging);
        let convert = self
            .addresser
            .needs_conversion(url)
            .then_some(self.webp_quality);
        let bytes = bytes.to_vec();

        let hash = {
            let final_path = final_path.clone();
            tokio::task::spawn_blocking(move || {
                stage_file(&staging_path, &final_path, &bytes, convert)
            })
            .await??
        };

        let existing = {
            let mut index = self.index();
            match index.owner_of(&hash).map(str::to_string) {
                Some(owner) if owner != canonical && self.exists(&owner) => {
                    index.duplicates.insert(url.to_string(), owner.clone());
                    Some(owner)
                }
                _ => {
                    index.hashes.insert(hash, canonical.clone());
                    None
                }
            }
        };

        match existing {
            Some(owner) => {
                if let Err(e) = fs::remove_file(&final_path).await {
                    warn!(path = %final_path.display(), error = %e, "Failed to remove duplicate");
                }
                debug!(url, owner = %owner, "Identical content already stored");
                Ok(owner)
            }
            None => {
                debug!(url, name = %canonical, "Stored");
                Ok(canonical)
            }
        }
    }

    /// Write both indices to disk
    pub fn persist(&self) -> Result<(), StoreError> {
        let snapshot = self.index_snapshot();
        snapshot
            .save(&self.layout)
            .map_err(|source| StoreError::Io {
                path: self.layout.root().to_path_buf(),
                source,
            })
    }

    /// Remove orphaned and duplicate files, then rebuild both indices.
    ///
    /// Takes `&mut self`: nothing else may touch the store while this runs.
    #[instrument(skip(self, corpus), fields(records = corpus.len()))]
    pub async fn garbage_collect(&mut self, corpus: &[Record]) -> Result<GcReport, StoreError> {
        let mut report = GcReport::default();
        let previous = std::mem::take(
            self.index
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let dirs = [self.layout.media_dir(), self.layout.avatar_dir()];

        // Reference prune
        let mut referenced = HashSet::new();
        for url in corpus.iter().flat_map(Record::referenced_urls) {
            if let Some(name) = self.addresser.canonical_name(url) {
                referenced.insert(name);
            }
            if let Some(target) = previous.duplicate_of(url) {
                referenced.insert(target.to_string());
            }
        }

        if referenced.is_empty() {
            info!("Corpus references no media, skipping orphan prune");
        } else {
            for dir in &dirs {
                for (name, path) in list_files(dir, &mut report).await {
                    if referenced.contains(&name) {
                        continue;
                    }
                    match fs::remove_file(&path).await {
                        Ok(()) => {
                            debug!(name = %name, "Removed unreferenced file");
                            report.orphans_removed += 1;
                        }
                        Err(e) => report.fail(GcStep::Prune, &path, e),
                    }
                }
            }
        }

        // Content dedup
        let mut hashes = BTreeMap::new();
        let mut replaced: HashMap<String, String> = HashMap::new();
        for dir in &dirs {
            for (name, path) in list_files(dir, &mut report).await {
                let hashed = {
                    let path = path.clone();
                    tokio::task::spawn_blocking(move || file_hash(&path)).await
                };
                let hash = match hashed {
                    Ok(Ok(hash)) => hash,
                    Ok(Err(e)) => {
                        report.fail(GcStep::Hash, &path, e);
                        continue;
                    }
                    Err(e) => {
                        report.fail(GcStep::Hash, &path, e);
                        continue;
                    }
                };

                let Some(kept) = hashes.get(&hash).cloned() else {
                    hashes.insert(hash, name);
                    continue;
                };

                match fs::remove_file(&path).await {
                    Ok(()) => {
                        debug!(name = %name, kept = %kept, "Removed duplicate file");
                        report.duplicates_removed += 1;
                        replaced.insert(name, kept);
                    }
                    Err(e) => report.fail(GcStep::Dedup, &path, e),
                }
            }
        }

        // Pointer repair
        let mut duplicates = BTreeMap::new();
        for (url, target) in previous.duplicates {
            if let Some(kept) = replaced.get(&target) {
                report.pointers_repaired += 1;
                duplicates.insert(url, kept.clone());
            } else if self.exists(&target) {
                duplicates.insert(url, target);
            } else {
                report.pointers_dropped += 1;
            }
        }

        // A referenced URL whose own file was a duplicate now points at the survivor
        for url in corpus.iter().flat_map(Record::referenced_urls) {
            if duplicates.contains_key(url) {
                continue;
            }
            let Some(kept) = self
                .addresser
                .canonical_name(url)
                .and_then(|name| replaced.get(&name))
            else {
                continue;
            };
            report.pointers_repaired += 1;
            duplicates.insert(url.to_string(), kept.clone());
        }

        *self
            .index
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner) = MediaIndex { hashes, duplicates };
        self.persist()?;

        info!(
            orphans = report.orphans_removed,
            duplicates = report.duplicates_removed,
            repaired = report.pointers_repaired,
            dropped = report.pointers_dropped,
            failures = report.failures.len(),
            "Media cleanup complete"
        );

        Ok(report)
    }
}

/// Write `bytes` to the staging path, normalize, and hash the final file.
///
/// `webp_quality` is set when the file is a raster image to normalize.
fn stage_file(
    staging: &Path,
    target: &Path,
    bytes: &[u8],
    webp_quality: Option<u8>,
) -> Result<String, StoreError> {
    let io_err = |path: &Path, source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    write_bytes_atomic(staging, bytes).map_err(|e| io_err(staging, e))?;

    if let Some(quality) = webp_quality {
        let result = transcode_to_webp(staging, target, quality);
        if staging != target {
            if let Err(e) = std::fs::remove_file(staging) {
                warn!(path = %staging.display(), error = %e, "Failed to remove staging file");
            }
        }
        result?;
    } else if staging != target {
        std::fs::rename(staging, target).map_err(|e| io_err(target, e))?;
    }

    file_hash(target).map_err(|e| io_err(target, e))
}

/// Regular files in `dir` as (name, path), sorted by name
async fn list_files(dir: &Path, report: &mut GcReport) -> Vec<(String, PathBuf)> {
    let mut files = Vec::new();

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return files,
        Err(e) => {
            report.fail(GcStep::Scan, dir, e);
            return files;
        }
    };

    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let is_file = entry
                    .file_type()
                    .await
                    .map(|t| t.is_file())
                    .unwrap_or(false);
                if !is_file {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str() {
                    files.push((name.to_string(), entry.path()));
                }
            }
            Ok(None) => break,
            Err(e) => {
                report.fail(GcStep::Scan, dir, e);
                break;
            }
        }
    }

    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(temp: &TempDir) -> ContentStore {
        ContentStore::open(OutputLayout::new(temp.path()), ContentAddresser::default()).unwrap()
    }

    #[tokio::test]
    async fn test_put_stores_under_canonical_name() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);
        let url = "https://video.example/clip.MP4";

        let name = store.put(url, Destination::Media, b"movie").await.unwrap();

        assert_eq!(Some(name.clone()), store.addresser().canonical_name(url));
        assert!(name.ends_with(".mp4"));
        let path = store.layout().media_dir().join(&name);
        assert_eq!(std::fs::read(path).unwrap(), b"movie");
        // staging file was renamed away
        assert_eq!(std::fs::read_dir(store.layout().media_dir()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_put_existing_file_is_noop() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);
        let url = "https://pbs.example/a.gif";

        let first = store.put(url, Destination::Media, b"one").await.unwrap();
        let second = store.put(url, Destination::Media, b"two").await.unwrap();

        assert_eq!(first, second);
        let path = store.locate(&first).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"one");
    }

    #[tokio::test]
    async fn test_identical_bytes_collapse_to_first_file() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);

        let a = store
            .put("https://pbs.example/a.gif", Destination::Media, b"same")
            .await
            .unwrap();
        let b = store
            .put("https://pbs.example/b.gif", Destination::Avatar, b"same")
            .await
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(std::fs::read_dir(store.layout().avatar_dir()).unwrap().count(), 0);

        let index = store.index_snapshot();
        assert_eq!(index.hashes.len(), 1);
        assert_eq!(index.duplicate_of("https://pbs.example/b.gif"), Some(a.as_str()));
        assert_eq!(store.resolve("https://pbs.example/b.gif"), Some(a));
    }

    #[tokio::test]
    async fn test_failed_transcode_leaves_nothing() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);

        let result = store
            .put("https://pbs.example/broken.jpg", Destination::Media, b"not an image")
            .await;

        assert!(matches!(result, Err(StoreError::Transcode(_))));
        assert_eq!(std::fs::read_dir(store.layout().media_dir()).unwrap().count(), 0);
        assert!(store.index_snapshot().hashes.is_empty());
        assert!(store.resolve("https://pbs.example/broken.jpg").is_none());
    }

    #[tokio::test]
    async fn test_empty_url_rejected() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);
        assert!(matches!(
            store.put("", Destination::Media, b"x").await,
            Err(StoreError::Unnamed(_))
        ));
    }

    #[tokio::test]
    async fn test_gc_with_empty_corpus_keeps_files() {
        let temp = TempDir::new().unwrap();
        let mut store = open(&temp);
        store
            .put("https://pbs.example/a.gif", Destination::Media, b"a")
            .await
            .unwrap();

        let report = store.garbage_collect(&[]).await.unwrap();
        assert_eq!(report.orphans_removed, 0);
        assert_eq!(std::fs::read_dir(store.layout().media_dir()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_persist_round_trips_through_open() {
        let temp = TempDir::new().unwrap();
        let store = open(&temp);
        store
            .put("https://pbs.example/a.gif", Destination::Media, b"same")
            .await
            .unwrap();
        store
            .put("https://pbs.example/b.gif", Destination::Media, b"same")
            .await
            .unwrap();
        store.persist().unwrap();

        let reopened = open(&temp);
        assert_eq!(reopened.index_snapshot(), store.index_snapshot());
    }
}
