//! Merge of a freshly fetched window into the persisted corpus.
//!
//! The feed is one linearly ordered list and a harvest window is a
//! contiguous prefix of it, so reconciliation is upsert-by-prefix-replacement:
//! the window replaces everything in the old corpus up to and including the
//! window's oldest record, and older history is kept verbatim.

use std::collections::{BTreeSet, HashSet};

use crate::domain::Record;

/// New corpus plus the identifier-level diff against the old one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Merged corpus, newest first, identifiers unique
    pub corpus: Vec<Record>,

    /// Identifiers present now but not before
    pub added: BTreeSet<String>,

    /// Identifiers present before but not now
    pub removed: BTreeSet<String>,
}

impl Reconciliation {
    /// Whether the identifier sets differ
    pub fn has_membership_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    /// Records that were added, in corpus order
    pub fn added_records(&self) -> Vec<Record> {
        self.corpus
            .iter()
            .filter(|r| self.added.contains(&r.id))
            .cloned()
            .collect()
    }
}

/// Splice `window` (newest first) into `existing`
pub fn reconcile(window: Vec<Record>, existing: &[Record]) -> Reconciliation {
    let oldest_id = window.last().map(|r| r.id.clone());
    let merged = match oldest_id {
        None => existing.to_vec(),
        Some(oldest_id) => {
            let tail = match existing.iter().position(|r| r.id == oldest_id) {
                Some(boundary) => &existing[boundary + 1..],
                // No overlap with what we fetched: keep all of it and let the
                // identifier dedup below drop anything repeated.
                None => existing,
            };
            let mut merged = window;
            merged.extend_from_slice(tail);
            merged
        }
    };

    let corpus = dedup_by_id(merged);

    let before: HashSet<&str> = existing.iter().map(|r| r.id.as_str()).collect();
    let after: HashSet<&str> = corpus.iter().map(|r| r.id.as_str()).collect();

    let added = after
        .difference(&before)
        .map(|id| id.to_string())
        .collect();
    let removed = before
        .difference(&after)
        .map(|id| id.to_string())
        .collect();

    Reconciliation {
        corpus,
        added,
        removed,
    }
}

/// Keep the first record for each identifier
fn dedup_by_id(records: Vec<Record>) -> Vec<Record> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|r| seen.insert(r.id.clone()))
        .collect()
}
