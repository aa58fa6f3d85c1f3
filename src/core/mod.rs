//! Incremental synchronization engine.
//!
//! This module contains:
//! - Harvester: paginated feed walk with the consecutive-seen stop
//! - Reconciler: prefix-replacement merge into the existing corpus
//! - CorpusFile: corpus persistence
//! - Syncer: the refresh operation tying them together

pub mod corpus;
pub mod harvester;
pub mod reconciler;
pub mod sync;

// Re-export commonly used types
pub use corpus::{CorpusError, CorpusFile};
pub use harvester::{HarvestOutcome, Harvester, StopReason};
pub use reconciler::{reconcile, Reconciliation};
pub use sync::{RefreshOutcome, Syncer};
