//! Adapter interfaces for the upstream likes feed.
//!
//! The harvester only sees [`FeedSource`]; the HTTP implementation lives in
//! [`http_feed`] and raw entry validation in [`entry`].

pub mod entry;
pub mod http_feed;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use entry::parse_entry;
pub use http_feed::HttpFeed;

/// Errors from fetching a single feed page
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Upstream returned HTTP {status}")]
    Status { status: u16 },

    #[error("Malformed feed response: {0}")]
    Malformed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One page of raw feed entries
#[derive(Debug, Clone, Default)]
pub struct FeedPage {
    /// Entries in upstream order (newest first); not yet validated
    pub entries: Vec<Value>,

    /// Continuation token for the next page
    pub cursor: Option<String>,
}

impl FeedPage {
    /// Build a page, taking the cursor from the trailing entry
    pub fn from_entries(entries: Vec<Value>) -> Self {
        let cursor = trailing_cursor(&entries);
        Self { entries, cursor }
    }

    /// Check if the page has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Extract the continuation token carried by the last entry of a page
pub fn trailing_cursor(entries: &[Value]) -> Option<String> {
    entries
        .last()?
        .pointer("/content/value")?
        .as_str()
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

/// Trait for paginated feed sources
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Human-readable source name
    fn name(&self) -> &str;

    /// Fetch one page starting at `cursor` (the first page when `None`)
    async fn fetch_page(&self, cursor: Option<&str>, page_size: u32) -> Result<FeedPage, FeedError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trailing_cursor_from_last_entry() {
        let entries = vec![
            json!({"entryId": "tweet-1", "content": {}}),
            json!({"entryId": "cursor-top", "content": {"value": "TOP"}}),
            json!({"entryId": "cursor-bottom", "content": {"value": "BOTTOM"}}),
        ];
        assert_eq!(trailing_cursor(&entries), Some("BOTTOM".to_string()));
    }

    #[test]
    fn test_trailing_cursor_missing() {
        assert_eq!(trailing_cursor(&[]), None);
        assert_eq!(trailing_cursor(&[json!({"content": {}})]), None);
        assert_eq!(trailing_cursor(&[json!({"content": {"value": ""}})]), None);
    }
}
