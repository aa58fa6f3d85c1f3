//! Paginated harvest of the likes feed.
//!
//! Walks pages newest-first and stops as soon as the feed has caught up with
//! the persisted corpus (a run of already-known records), runs out of pages,
//! stops advancing its cursor, or fails. Whatever was collected before the
//! stop is returned; a failed page never discards earlier pages.

use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};

use crate::adapters::{parse_entry, FeedError, FeedSource};
use crate::domain::Record;

/// Why a harvest ended
#[derive(Debug)]
pub enum StopReason {
    /// The feed returned an empty page
    Exhausted,

    /// `limit` consecutive records were already in the corpus
    KnownStreak { limit: usize },

    /// No next cursor, or the cursor did not advance
    CursorStalled,

    /// A page request failed; the window holds everything before it
    FetchFailed(FeedError),
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Exhausted => write!(f, "feed exhausted"),
            StopReason::KnownStreak { limit } => {
                write!(f, "{} consecutive known records", limit)
            }
            StopReason::CursorStalled => write!(f, "cursor stopped advancing"),
            StopReason::FetchFailed(e) => write!(f, "page fetch failed: {}", e),
        }
    }
}

/// Result of one harvest
#[derive(Debug)]
pub struct HarvestOutcome {
    /// Fetched records, newest first
    pub window: Vec<Record>,

    /// Number of page requests issued
    pub pages: usize,

    /// Why the walk ended
    pub stop_reason: StopReason,
}

/// Walks a [`FeedSource`] against the identifiers of a persisted corpus
pub struct Harvester<'a> {
    source: &'a dyn FeedSource,
    known_ids: &'a HashSet<String>,
}

impl<'a> Harvester<'a> {
    /// Create a harvester; `known_ids` are the identifiers already persisted
    pub fn new(source: &'a dyn FeedSource, known_ids: &'a HashSet<String>) -> Self {
        Self { source, known_ids }
    }

    /// Fetch pages until the stopping heuristic or the feed ends the walk
    #[instrument(skip(self), fields(source = self.source.name()))]
    pub async fn harvest(&self, stopping_limit: usize, page_size: u32) -> HarvestOutcome {
        let stopping_limit = stopping_limit.max(1);
        let mut window = Vec::new();
        let mut cursor: Option<String> = None;
        let mut streak = 0usize;
        let mut pages = 0usize;

        let stop_reason = loop {
            pages += 1;
            debug!(page = pages, cursor = ?cursor, "requesting page");

            let page = match self.source.fetch_page(cursor.as_deref(), page_size).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(page = pages, error = %e, "page fetch failed, keeping partial window");
                    break StopReason::FetchFailed(e);
                }
            };

            if page.is_empty() {
                break StopReason::Exhausted;
            }

            let mut hit_limit = false;
            for record in page.entries.iter().filter_map(parse_entry) {
                if self.known_ids.contains(&record.id) {
                    streak += 1;
                    if streak >= stopping_limit {
                        hit_limit = true;
                        break;
                    }
                } else {
                    streak = 0;
                }
                window.push(record);
            }

            if hit_limit {
                info!(limit = stopping_limit, "hit consecutive known records, stopping");
                break StopReason::KnownStreak {
                    limit: stopping_limit,
                };
            }

            match page.cursor {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => break StopReason::CursorStalled,
            }
        };

        info!(
            fetched = window.len(),
            pages,
            reason = %stop_reason,
            "harvest finished"
        );

        HarvestOutcome {
            window,
            pages,
            stop_reason,
        }
    }
}
