//! Domain types for likevault.
//!
//! - Record: one harvested post
//! - Corpus helpers: identifier sets over an ordered record list

pub mod record;

pub use record::{corpus_ids, Record, MAX_MEDIA_PER_RECORD};
