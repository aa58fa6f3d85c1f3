//! One refresh cycle: harvest, reconcile, persist.
//!
//! This is the operation the serving layer calls. The corpus file is only
//! written after a complete reconciliation and only when the result differs
//! from what is already on disk.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use super::corpus::{CorpusError, CorpusFile};
use super::harvester::Harvester;
use super::reconciler::reconcile;
use crate::adapters::FeedSource;
use crate::config::SyncSettings;
use crate::domain::{corpus_ids, Record};

/// What a refresh did
#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    /// Whether the persisted corpus was rewritten
    pub changed: bool,

    /// Newly added records, newest first
    pub added: Vec<Record>,

    /// Number of records added
    pub added_count: usize,

    /// Number of records removed
    pub removed_count: usize,

    /// Corpus size after the refresh
    pub total: usize,

    /// Pages requested from the feed
    pub pages: usize,

    /// Why the harvest stopped
    pub stop_reason: String,

    /// When the refresh finished
    pub completed_at: DateTime<Utc>,
}

impl RefreshOutcome {
    /// Short human summary, e.g. "3 new, 1 removed, 120 total"
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.added_count > 0 {
            parts.push(format!("{} new", self.added_count));
        }
        if self.removed_count > 0 {
            parts.push(format!("{} removed", self.removed_count));
        }
        parts.push(format!("{} total", self.total));
        parts.join(", ")
    }
}

/// Refreshes a corpus file from a feed source
pub struct Syncer<'a> {
    source: &'a dyn FeedSource,
    corpus: CorpusFile,
    settings: SyncSettings,
}

impl<'a> Syncer<'a> {
    /// Create a syncer writing to `corpus`
    pub fn new(source: &'a dyn FeedSource, corpus: CorpusFile, settings: SyncSettings) -> Self {
        Self {
            source,
            corpus,
            settings,
        }
    }

    /// The corpus file this syncer maintains
    pub fn corpus(&self) -> &CorpusFile {
        &self.corpus
    }

    /// Run one harvest + reconcile cycle
    #[instrument(skip(self), fields(corpus = %self.corpus.path().display()))]
    pub async fn refresh(&self) -> Result<RefreshOutcome, CorpusError> {
        let existing = self.corpus.load_or_empty().await;
        let known = corpus_ids(&existing);

        let harvest = Harvester::new(self.source, &known)
            .harvest(self.settings.consecutive_seen_limit, self.settings.page_size)
            .await;

        let reconciliation = reconcile(harvest.window, &existing);
        let changed = reconciliation.corpus != existing;

        if changed {
            self.corpus.save(&reconciliation.corpus).await?;
        }

        let outcome = RefreshOutcome {
            changed,
            added: reconciliation.added_records(),
            added_count: reconciliation.added.len(),
            removed_count: reconciliation.removed.len(),
            total: reconciliation.corpus.len(),
            pages: harvest.pages,
            stop_reason: harvest.stop_reason.to_string(),
            completed_at: Utc::now(),
        };

        info!(changed, summary = %outcome.summary(), "refresh complete");

        Ok(outcome)
    }
}
