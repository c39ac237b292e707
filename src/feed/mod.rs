//! Feed retrieval for feedwatch.
//!
//! This module fetches feed documents and selects the items that are new
//! for a subscription.

pub mod fetcher;
pub mod source;
pub mod types;

pub use fetcher::{build_feed_url, collect_new_items, FeedFetcher};
pub use source::{FeedSource, HttpFeedSource};
pub use types::{FeedItem, DEFAULT_INITIAL_BATCH};
