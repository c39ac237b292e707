//! Feed item types.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Number of items fetched by the enrollment run of a new subscription.
pub const DEFAULT_INITIAL_BATCH: usize = 10;

/// A single item from a feed.
///
/// Items are transient: they are handed to the notification sink and never
/// persisted. Within one fetch result they keep the order the feed provided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    /// Item title.
    pub title: String,
    /// Link to the original posting.
    pub link: String,
    /// Item description (HTML tags stripped).
    pub description: String,
    /// When the item was published.
    pub published_at: DateTime<Utc>,
}

impl FeedItem {
    /// Create a new feed item.
    pub fn new(
        title: impl Into<String>,
        link: impl Into<String>,
        description: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            description: description.into(),
            published_at,
        }
    }

    /// Check whether this item is strictly newer than `cutoff`.
    pub fn is_newer_than(&self, cutoff: DateTime<Utc>) -> bool {
        self.published_at > cutoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_is_newer_than_is_strict() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let item = FeedItem::new("Bike", "https://example.org/1", "Red bike", at);

        assert!(item.is_newer_than(at - Duration::seconds(1)));
        assert!(!item.is_newer_than(at));
        assert!(!item.is_newer_than(at + Duration::seconds(1)));
    }
}
