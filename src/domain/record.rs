//! Harvested records and the corpus they form.
//!
//! A record is identified solely by its `id`. Everything else is captured
//! once at fetch time and never edited afterwards; a newer copy of the same
//! record simply replaces the older one during reconciliation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Upper bound on media URLs kept per record
pub const MAX_MEDIA_PER_RECORD: usize = 4;

/// One liked post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Upstream identifier (unique within a corpus)
    pub id: String,

    /// Media URLs in display order (at most [`MAX_MEDIA_PER_RECORD`])
    #[serde(default)]
    pub media_urls: Vec<String>,

    /// Author avatar URL (empty when unknown)
    #[serde(default)]
    pub avatar_url: String,

    /// Post text
    #[serde(default)]
    pub content: String,

    /// Upstream sensitivity flag
    #[serde(default)]
    pub possibly_sensitive: bool,

    /// Author display name
    #[serde(default)]
    pub author_name: String,

    /// Author handle (without the leading @)
    #[serde(default)]
    pub author_handle: String,
}

impl Record {
    /// Create a record with only an identifier set
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            media_urls: Vec::new(),
            avatar_url: String::new(),
            content: String::new(),
            possibly_sensitive: false,
            author_name: String::new(),
            author_handle: String::new(),
        }
    }

    /// Add a media URL, ignoring anything past the per-record limit
    pub fn with_media(mut self, url: impl Into<String>) -> Self {
        if self.media_urls.len() < MAX_MEDIA_PER_RECORD {
            self.media_urls.push(url.into());
        }
        self
    }

    /// Set the avatar URL
    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = url.into();
        self
    }

    /// Set the post text
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Set author name and handle
    pub fn with_author(mut self, name: impl Into<String>, handle: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_handle = handle.into();
        self
    }

    /// Media URLs clamped to the per-record limit.
    ///
    /// Records loaded from an older corpus file may carry more than the
    /// limit, so consumers go through this instead of `media_urls`.
    pub fn media(&self) -> &[String] {
        let end = self.media_urls.len().min(MAX_MEDIA_PER_RECORD);
        &self.media_urls[..end]
    }

    /// Avatar URL, if one is set
    pub fn avatar(&self) -> Option<&str> {
        if self.avatar_url.is_empty() {
            None
        } else {
            Some(&self.avatar_url)
        }
    }

    /// Whether any media URL points at a video thumbnail
    pub fn is_video(&self) -> bool {
        self.media().iter().any(|url| url.contains("video_thumb"))
    }

    /// Every URL this record keeps alive in the media store
    pub fn referenced_urls(&self) -> impl Iterator<Item = &str> {
        self.avatar()
            .into_iter()
            .chain(self.media().iter().map(String::as_str))
    }
}

/// Collect the identifiers of a corpus
pub fn corpus_ids(corpus: &[Record]) -> HashSet<String> {
    corpus.iter().map(|r| r.id.clone()).collect()
}
