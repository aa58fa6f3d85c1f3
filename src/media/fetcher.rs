//! Bounded concurrent media downloads.
//!
//! Each unique URL gets its own task; a semaphore caps how many run at once.
//! A failing URL only affects itself: the batch always completes and reports
//! per-URL results.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, info, instrument, warn};

use super::store::{ContentStore, Destination, StoreError};
use crate::config::MediaSettings;

/// Errors fetching a single URL
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Server returned status {status}")]
    Status { status: u16 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A URL that could not be stored
#[derive(Debug, Clone, Serialize)]
pub struct FetchFailure {
    pub url: String,
    pub destination: String,
    pub error: String,
}

/// Result of one batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchSummary {
    /// URL -> stored filename, `None` when the URL failed
    pub resolved: HashMap<String, Option<String>>,

    /// URLs served from the store without a request
    pub cached: usize,

    /// URLs downloaded during this batch
    pub downloaded: usize,

    /// Why each failed URL failed
    pub failures: Vec<FetchFailure>,
}

impl FetchSummary {
    /// Stored filename for `url`, if it was fetched successfully
    pub fn filename(&self, url: &str) -> Option<&str> {
        self.resolved.get(url).and_then(|name| name.as_deref())
    }

    /// Fold one finished task into the summary; a panicked task counts as a failure
    fn record(
        &mut self,
        url: String,
        destination: Destination,
        joined: Result<Result<Outcome, FetchError>, JoinError>,
    ) {
        let error = match joined {
            Ok(Ok(Outcome::Cached(name))) => {
                self.cached += 1;
                self.resolved.insert(url, Some(name));
                return;
            }
            Ok(Ok(Outcome::Downloaded(name))) => {
                self.downloaded += 1;
                self.resolved.insert(url, Some(name));
                return;
            }
            Ok(Err(e)) => {
                warn!(url = %url, error = %e, "Media download failed");
                e.to_string()
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Media task panicked");
                format!("Task failed: {}", e)
            }
        };

        self.failures.push(FetchFailure {
            url: url.clone(),
            destination: destination.to_string(),
            error,
        });
        self.resolved.insert(url, None);
    }
}

enum Outcome {
    Cached(String),
    Downloaded(String),
}

/// Downloads batches of URLs into a [`ContentStore`]
#[derive(Debug, Clone)]
pub struct ConcurrentFetcher {
    client: reqwest::Client,
    store: Arc<ContentStore>,
    workers: usize,
}

impl ConcurrentFetcher {
    /// Build a fetcher with a client configured from `settings`
    pub fn new(store: Arc<ContentStore>, settings: &MediaSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self::with_client(store, client, settings.workers()))
    }

    /// Build a fetcher around an existing client
    pub fn with_client(store: Arc<ContentStore>, client: reqwest::Client, workers: usize) -> Self {
        Self {
            client,
            store,
            workers: workers.max(1),
        }
    }

    pub fn store(&self) -> &Arc<ContentStore> {
        &self.store
    }

    /// Fetch every (URL, destination) pair and persist the store indices once.
    ///
    /// Repeated URLs are fetched once, into the first destination given for
    /// them. Empty URLs are ignored.
    #[instrument(skip(self, pairs))]
    pub async fn fetch_all<I>(&self, pairs: I) -> FetchSummary
    where
        I: IntoIterator<Item = (String, Destination)>,
    {
        let mut unique: Vec<(String, Destination)> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for (url, destination) in pairs {
            if url.is_empty() || !seen.insert(url.clone()) {
                continue;
            }
            unique.push((url, destination));
        }

        let mut summary = FetchSummary::default();
        if unique.is_empty() {
            return summary;
        }

        let workers = self.workers.min(unique.len());
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut handles = Vec::with_capacity(unique.len());

        info!(urls = unique.len(), workers, "Fetching media");

        for (url, destination) in unique {
            let semaphore = Arc::clone(&semaphore);
            let client = self.client.clone();
            let store = Arc::clone(&self.store);

            let task_url = url.clone();
            let handle = tokio::spawn(async move {
                // Permit is released when the task finishes
                let _permit = semaphore.acquire_owned().await.ok();
                fetch_one(&client, &store, &task_url, destination).await
            });
            handles.push((url, destination, handle));
        }

        for (url, destination, handle) in handles {
            summary.record(url, destination, handle.await);
        }

        if let Err(e) = self.store.persist() {
            warn!(error = %e, "Failed to persist media indices");
        }

        info!(
            cached = summary.cached,
            downloaded = summary.downloaded,
            failed = summary.failures.len(),
            "Media fetch complete"
        );

        summary
    }
}

async fn fetch_one(
    client: &reqwest::Client,
    store: &ContentStore,
    url: &str,
    destination: Destination,
) -> Result<Outcome, FetchError> {
    if let Some(name) = store.resolve(url) {
        return Ok(Outcome::Cached(name));
    }

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
        });
    }

    let bytes = response.bytes().await?;
    debug!(url, size = bytes.len(), "Downloaded");

    let name = store.put(url, destination, &bytes).await?;
    Ok(Outcome::Downloaded(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputLayout;
    use crate::media::ContentAddresser;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(temp: &TempDir, workers: usize) -> ConcurrentFetcher {
        let store = ContentStore::open(
            OutputLayout::new(temp.path()),
            ContentAddresser::default(),
        )
        .unwrap();
        ConcurrentFetcher::with_client(Arc::new(store), reqwest::Client::new(), workers)
    }

    #[tokio::test]
    async fn test_cached_url_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.gif"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"gif".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let fetcher = fetcher(&temp, 2);
        let url = format!("{}/a.gif", server.uri());

        let first = fetcher
            .fetch_all([(url.clone(), Destination::Media)])
            .await;
        let second = fetcher
            .fetch_all([(url.clone(), Destination::Media)])
            .await;

        assert_eq!(first.downloaded, 1);
        assert_eq!(second.cached, 1);
        assert_eq!(first.filename(&url), second.filename(&url));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let temp = TempDir::new().unwrap();
        let summary = fetcher(&temp, 4)
            .fetch_all([(String::new(), Destination::Avatar)])
            .await;
        assert!(summary.resolved.is_empty());
    }

    #[tokio::test]
    async fn test_panicked_task_recorded_as_failure() {
        let joined = tokio::spawn(async {
            if true {
                panic!("decoder blew up");
            }
            Ok::<Outcome, FetchError>(Outcome::Cached(String::new()))
        })
        .await;
        assert!(joined.is_err());

        let mut summary = FetchSummary::default();
        let url = "https://pbs.example/a.jpg".to_string();
        summary.record(url.clone(), Destination::Avatar, joined);

        assert_eq!(summary.resolved.get(&url), Some(&None));
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].destination, "avatar");
        assert!(summary.failures[0].error.contains("panic"));
    }
}
