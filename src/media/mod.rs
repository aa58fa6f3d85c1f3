//! Content-addressed media cache.
//!
//! # Storage Layout
//!
//! ```text
//! <output>/
//! ├── .media_hashes.json        # content hash -> filename
//! ├── .duplicate_urls.json      # URL -> filename of identical content
//! └── images/
//!     ├── media/<digest>.<ext>  # SHA256(url)[0:16], rasters stored as .webp
//!     └── avatars/<digest>.<ext>
//! ```

pub mod addressing;
pub mod fetcher;
pub mod index;
pub mod process;
pub mod store;
pub mod transcode;

pub use addressing::{content_hash, file_hash, ContentAddresser};
pub use fetcher::{ConcurrentFetcher, FetchError, FetchFailure, FetchSummary};
pub use index::MediaIndex;
pub use process::{MediaError, MediaProcessor, MediaReport, ProcessedRecord};
pub use store::{ContentStore, Destination, GcFailure, GcReport, GcStep, StoreError};
pub use transcode::{transcode_to_webp, TranscodeError, DEFAULT_WEBP_QUALITY};
