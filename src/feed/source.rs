//! Feed transport.
//!
//! [`FeedSource`] is the seam between the fetcher and the network so the
//! dedup logic can be exercised against in-memory documents.

use async_trait::async_trait;
use reqwest::Client;

use crate::config::FeedConfig;
use crate::error::{FeedwatchError, Result};

/// Retrieves the raw bytes of a feed document.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Retrieve the document at `url`.
    ///
    /// Any transport failure, non-success status, or oversized body is
    /// reported as [`FeedwatchError::Fetch`].
    async fn retrieve(&self, url: &str) -> Result<Vec<u8>>;
}

/// HTTP(S) feed source backed by reqwest.
pub struct HttpFeedSource {
    client: Client,
    max_feed_size: u64,
}

impl HttpFeedSource {
    /// Create a new HTTP source with the given settings.
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .timeout(config.total_timeout())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| FeedwatchError::Fetch(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_feed_size: config.max_feed_size_bytes,
        })
    }

    fn check_size(&self, size: u64) -> Result<()> {
        if size > self.max_feed_size {
            return Err(FeedwatchError::Fetch(format!(
                "feed too large: {} bytes (max {} bytes)",
                size, self.max_feed_size
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn retrieve(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FeedwatchError::Fetch(format!("failed to fetch feed: {}", e)))?;

        if !response.status().is_success() {
            return Err(FeedwatchError::Fetch(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        if let Some(content_length) = response.content_length() {
            self.check_size(content_length)?;
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FeedwatchError::Fetch(format!("failed to read response: {}", e)))?;
        self.check_size(bytes.len() as u64)?;

        Ok(bytes.to_vec())
    }
}
