//! Feed fetch-and-deduplicate.
//!
//! Turns a raw feed document into the ordered list of items that are newer
//! than a subscription's dedup boundary.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use feed_rs::parser;
use tracing::debug;
use url::Url;

use crate::config::FeedConfig;
use crate::error::{FeedwatchError, Result};
use crate::feed::source::FeedSource;
use crate::feed::types::FeedItem;

/// Fetches feeds and selects the items newer than a cutoff.
pub struct FeedFetcher {
    source: Arc<dyn FeedSource>,
    format_param: String,
    max_description_length: usize,
}

impl FeedFetcher {
    /// Create a new fetcher on top of the given transport.
    pub fn new(source: Arc<dyn FeedSource>, config: &FeedConfig) -> Self {
        Self {
            source,
            format_param: config.format_param.clone(),
            max_description_length: config.max_description_length,
        }
    }

    /// Fetch the items of `feed_query` published strictly after `cutoff`.
    ///
    /// Items are returned in feed order (newest first) and the walk stops at
    /// the first item that is not newer than `cutoff`. With a `limit`, at most
    /// that many items are returned.
    ///
    /// Items dated in the future are held back until their timestamp has
    /// passed, so the dedup boundary never has to move past the clock.
    ///
    /// An empty list means the request succeeded but nothing is new; any
    /// transport or document parse failure is an error instead.
    pub async fn fetch_since(
        &self,
        feed_query: &str,
        cutoff: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<FeedItem>> {
        let url = build_feed_url(feed_query, &self.format_param)?;
        debug!("Fetching {} (cutoff {})", url, cutoff);

        let bytes = self.source.retrieve(&url).await?;
        let items = parse_items(&bytes, self.max_description_length)?;

        let now = Utc::now();
        let visible = items.into_iter().filter(|item| {
            let due = item.published_at <= now;
            if !due {
                debug!("Holding back {} until {}", item.link, item.published_at);
            }
            due
        });

        Ok(collect_new_items(visible, cutoff, limit))
    }
}

/// Append the format selector to a feed query.
///
/// Existing query parameters are kept as they are; a parameter with the
/// same key as the selector is replaced.
pub fn build_feed_url(feed_query: &str, format_param: &str) -> Result<String> {
    let mut url = Url::parse(feed_query)
        .map_err(|e| FeedwatchError::Fetch(format!("invalid feed query: {}", e)))?;

    if format_param.is_empty() {
        return Ok(url.to_string());
    }

    let key = format_param.split('=').next().unwrap_or(format_param);
    let mut params: Vec<String> = url
        .query()
        .map(|query| {
            query
                .split('&')
                .filter(|pair| !pair.is_empty() && pair.split('=').next() != Some(key))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    params.push(format_param.to_string());

    url.set_query(Some(&params.join("&")));
    Ok(url.to_string())
}

/// Walk items in feed order and keep the ones newer than `cutoff`.
///
/// Assumes the feed is sorted newest first: the walk stops at the first
/// stale item, so newer items behind it are not returned.
pub fn collect_new_items(
    items: impl IntoIterator<Item = FeedItem>,
    cutoff: DateTime<Utc>,
    limit: Option<usize>,
) -> Vec<FeedItem> {
    let mut new_items = Vec::new();

    for item in items {
        if limit.is_some_and(|limit| new_items.len() >= limit) {
            break;
        }
        if !item.is_newer_than(cutoff) {
            break;
        }
        new_items.push(item);
    }

    new_items
}

/// Parse a feed document into its well-formed items, in feed order.
fn parse_items(bytes: &[u8], max_description_length: usize) -> Result<Vec<FeedItem>> {
    let feed = parser::parse(bytes)
        .map_err(|e| FeedwatchError::Fetch(format!("failed to parse feed: {}", e)))?;

    let items = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let id = entry.id.clone();
            let item = extract_item(entry, max_description_length);
            if item.is_none() {
                debug!("Skipping malformed item {}", id);
            }
            item
        })
        .collect();

    Ok(items)
}

/// Extract the required fields of an entry, or `None` if any is missing.
fn extract_item(entry: Entry, max_description_length: usize) -> Option<FeedItem> {
    let title = entry.title?.content.trim().to_string();
    let link = entry.links.into_iter().next()?.href;
    let description = entry
        .summary
        .map(|text| text.content)
        .or_else(|| entry.content.and_then(|content| content.body))?;
    let published_at = entry.published.or(entry.updated)?;

    Some(FeedItem {
        title,
        link,
        description: truncate(&strip_html(&description), max_description_length),
        published_at,
    })
}

/// Longest entity name worth decoding, e.g. `#x1F600`.
const MAX_ENTITY_LEN: usize = 10;

/// Strip HTML tags, decode entities, and collapse whitespace.
///
/// A bare `&` that does not start an entity is kept as text.
fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut entity: Option<String> = None;

    for ch in html.chars() {
        if in_tag {
            if ch == '>' {
                in_tag = false;
                text.push(' ');
            }
            continue;
        }

        if let Some(name) = entity.as_mut() {
            if ch == ';' {
                decode_entity(name, &mut text);
                entity = None;
                continue;
            }
            let fits = name.len() < MAX_ENTITY_LEN;
            if fits && (ch.is_ascii_alphanumeric() || (ch == '#' && name.is_empty())) {
                name.push(ch);
                continue;
            }
            text.push('&');
            text.push_str(name);
            entity = None;
        }

        match ch {
            '<' => in_tag = true,
            '&' => entity = Some(String::new()),
            _ => text.push(ch),
        }
    }

    if let Some(name) = entity {
        text.push('&');
        text.push_str(&name);
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Push the character for `&name;`, or the entity itself if unknown.
fn decode_entity(name: &str, text: &mut String) {
    let decoded = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => parse_numeric_entity(name).and_then(char::from_u32),
    };

    match decoded {
        Some(c) => text.push(c),
        None => {
            text.push('&');
            text.push_str(name);
            text.push(';');
        }
    }
}

/// Code point of a numeric entity name such as `#8217` or `#x2019`.
fn parse_numeric_entity(name: &str) -> Option<u32> {
    let digits = name.strip_prefix('#')?;
    match digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => digits.parse().ok(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
