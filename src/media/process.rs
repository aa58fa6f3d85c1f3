//! Media stage: clean the store, download what the corpus references, and
//! write the gallery file with URLs rewritten to stored filenames.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use super::addressing::ContentAddresser;
use super::fetcher::{ConcurrentFetcher, FetchError, FetchSummary};
use super::store::{ContentStore, Destination, GcReport, StoreError};
use crate::config::{MediaSettings, OutputLayout};
use crate::domain::Record;
use crate::persist::write_json_atomic;

/// Errors in the media stage
#[derive(Debug, Error)]
pub enum MediaError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to write gallery {path}: {source}")]
    Gallery {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Gallery view of a record.
///
/// Stored filenames carry no folder. Identical bytes are kept once across
/// both folders, so an avatar name may live under `images/media/` and a media
/// name under `images/avatars/`; look names up in both (see
/// [`ContentStore::locate`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub id: String,
    /// Stored avatar filename (in either folder), or the original URL when not stored
    pub avatar: String,
    pub username: String,
    pub handle: String,
    pub content: String,
    /// Stored media filenames (in either folder), falling back to URLs
    pub media: Vec<String>,
    pub is_video: bool,
    pub possibly_sensitive: bool,
}

impl ProcessedRecord {
    /// Build the gallery view, mapping each URL through `stored`
    pub fn from_record<F>(record: &Record, stored: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let rewrite = |url: &str| stored(url).unwrap_or_else(|| url.to_string());

        Self {
            id: record.id.clone(),
            avatar: record.avatar().map(&rewrite).unwrap_or_default(),
            username: record.author_name.clone(),
            handle: record.author_handle.clone(),
            content: record.content.clone(),
            media: record.media().iter().map(|url| rewrite(url)).collect(),
            is_video: record.is_video(),
            possibly_sensitive: record.possibly_sensitive,
        }
    }
}

/// What the media stage did
#[derive(Debug, Default, Serialize)]
pub struct MediaReport {
    /// Cleanup result, when downloads are enabled
    pub gc: Option<GcReport>,

    /// Fetch result, when anything was requested
    pub fetch: Option<FetchSummary>,

    /// Records written to the gallery
    pub gallery_records: usize,
}

/// Runs the media stage against one output directory
#[derive(Debug, Clone)]
pub struct MediaProcessor {
    layout: OutputLayout,
    settings: MediaSettings,
}

impl MediaProcessor {
    pub fn new(layout: OutputLayout, settings: MediaSettings) -> Self {
        Self { layout, settings }
    }

    fn open_store(&self) -> Result<ContentStore, StoreError> {
        let addresser = ContentAddresser::new(&self.settings.convert_extensions);
        Ok(ContentStore::open(self.layout.clone(), addresser)?
            .with_webp_quality(self.settings.webp_quality))
    }

    /// Garbage-collect the store against `corpus` without downloading anything.
    ///
    /// Returns `None` when downloads are disabled: the store is left untouched.
    pub async fn collect_garbage(
        &self,
        corpus: &[Record],
    ) -> Result<Option<GcReport>, MediaError> {
        if !self.settings.download {
            info!("Media downloads disabled, skipping cleanup");
            return Ok(None);
        }
        let mut store = self.open_store()?;
        Ok(Some(store.garbage_collect(corpus).await?))
    }

    /// Run the full stage and write the gallery file
    #[instrument(skip(self, corpus), fields(records = corpus.len()))]
    pub async fn process(&self, corpus: &[Record]) -> Result<MediaReport, MediaError> {
        let with_media: Vec<&Record> = corpus.iter().filter(|r| !r.media().is_empty()).collect();
        let mut report = MediaReport::default();

        let gallery: Vec<ProcessedRecord> = if self.settings.download {
            let mut store = self.open_store()?;
            report.gc = Some(store.garbage_collect(corpus).await?);

            let mut pairs = Vec::new();
            for record in &with_media {
                if let Some(avatar) = record.avatar() {
                    pairs.push((avatar.to_string(), Destination::Avatar));
                }
                pairs.extend(
                    record
                        .media()
                        .iter()
                        .map(|url| (url.clone(), Destination::Media)),
                );
            }

            let fetcher = ConcurrentFetcher::new(Arc::new(store), &self.settings)?;
            let summary = fetcher.fetch_all(pairs).await;

            let gallery = with_media
                .iter()
                .map(|record| {
                    ProcessedRecord::from_record(record, |url| {
                        summary.filename(url).map(str::to_string)
                    })
                })
                .collect();
            report.fetch = Some(summary);
            gallery
        } else {
            with_media
                .iter()
                .map(|record| ProcessedRecord::from_record(record, |_| None))
                .collect()
        };

        let path = self.layout.gallery();
        let to_write = gallery.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_json_atomic(&target, &to_write))
            .await
            .map_err(|e| MediaError::Store(StoreError::Task(e)))?
            .map_err(|source| MediaError::Gallery {
                path: path.clone(),
                source,
            })?;

        report.gallery_records = gallery.len();
        info!(
            records = report.gallery_records,
            path = %path.display(),
            "Gallery written"
        );

        Ok(report)
    }
}
