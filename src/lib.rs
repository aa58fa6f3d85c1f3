//! likevault - incremental archive of a likes feed
//!
//! Keeps a local, newest-first corpus of liked posts in sync with an
//! upstream paginated feed, and mirrors the media those posts reference into
//! a content-addressed cache.
//!
//! # Architecture
//!
//! - A refresh walks the feed from the newest page and stops once it has seen
//!   enough already-known records in a row
//! - The fetched window replaces the matching prefix of the stored corpus
//! - Media files are named by URL digest and deduplicated by content hash;
//!   garbage collection keeps the store in step with the corpus
//!
//! # Modules
//!
//! - `adapters`: Upstream feed integration (HTTP feed, entry parsing)
//! - `core`: Sync engine (Harvester, reconcile, CorpusFile, Syncer)
//! - `media`: Media cache (ContentStore, ConcurrentFetcher, MediaProcessor)
//! - `domain`: Data structures (Record)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Pull new likes and update media
//! likevault refresh
//!
//! # Only clean the media store
//! likevault gc
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod media;
pub mod persist;

// Re-export main types at crate root for convenience
pub use adapters::{FeedError, FeedPage, FeedSource, HttpFeed};
pub use core::{reconcile, CorpusFile, Harvester, RefreshOutcome, StopReason, Syncer};
pub use domain::Record;
pub use media::{ConcurrentFetcher, ContentAddresser, ContentStore, Destination, MediaProcessor};
