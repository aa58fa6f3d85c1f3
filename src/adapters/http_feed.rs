//! HTTP adapter for the upstream likes query.
//!
//! Each page is a GET with two JSON-encoded query parameters, `variables`
//! and `features`. Request shape beyond that (auth headers, feature flags,
//! extra variables) comes from [`FeedSettings`].

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::{FeedError, FeedPage, FeedSource};
use crate::config::FeedSettings;

/// Likes feed over HTTP
pub struct HttpFeed {
    settings: FeedSettings,
    client: reqwest::Client,
}

impl HttpFeed {
    /// Create a feed client from settings
    pub fn new(settings: FeedSettings) -> Result<Self, FeedError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &settings.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FeedError::Malformed(format!("invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| FeedError::Malformed(format!("invalid value for header '{}': {}", name, e)))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(settings.request_timeout())
            .build()?;

        Ok(Self { settings, client })
    }

    /// Build the `variables` parameter for a page request
    fn variables(&self, cursor: Option<&str>, page_size: u32) -> Map<String, Value> {
        let mut variables = self.settings.variables.clone();
        variables.insert("userId".to_string(), Value::from(self.settings.user_id.clone()));
        variables.insert("count".to_string(), Value::from(page_size));
        if let Some(cursor) = cursor {
            variables.insert("cursor".to_string(), Value::from(cursor));
        }
        variables
    }

    /// Pull the entry list out of a response body
    fn extract_entries(&self, body: Value) -> Result<Vec<Value>, FeedError> {
        let pointer = &self.settings.entries_pointer;
        match body.pointer(pointer) {
            Some(Value::Array(entries)) => Ok(entries.clone()),
            Some(_) => Err(FeedError::Malformed(format!("'{}' is not an array", pointer))),
            None => Err(FeedError::Malformed(format!("missing '{}'", pointer))),
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self), fields(endpoint = %self.settings.endpoint))]
    async fn fetch_page(&self, cursor: Option<&str>, page_size: u32) -> Result<FeedPage, FeedError> {
        let variables = serde_json::to_string(&self.variables(cursor, page_size))?;
        let features = serde_json::to_string(&self.settings.features)?;

        let response = self
            .client
            .get(&self.settings.endpoint)
            .query(&[("variables", variables), ("features", features)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await?;
        let entries = self.extract_entries(body)?;
        let page = FeedPage::from_entries(entries);

        debug!(
            entries = page.entries.len(),
            has_cursor = page.cursor.is_some(),
            "fetched feed page"
        );

        Ok(page)
    }
}
