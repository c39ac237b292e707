//! Subscription types for feedwatch.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::{FeedwatchError, Result};
use crate::feed::FeedItem;

/// How often a subscription is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    TenSeconds,
    Minute,
    TenMinutes,
    ThirtyMinutes,
    Hour,
    Day,
    Week,
}

impl Frequency {
    /// All frequencies, shortest first.
    pub const ALL: [Frequency; 7] = [
        Frequency::TenSeconds,
        Frequency::Minute,
        Frequency::TenMinutes,
        Frequency::ThirtyMinutes,
        Frequency::Hour,
        Frequency::Day,
        Frequency::Week,
    ];

    /// Time between two polls.
    pub fn period(&self) -> Duration {
        let secs = match self {
            Frequency::TenSeconds => 10,
            Frequency::Minute => 60,
            Frequency::TenMinutes => 10 * 60,
            Frequency::ThirtyMinutes => 30 * 60,
            Frequency::Hour => 60 * 60,
            Frequency::Day => 24 * 60 * 60,
            Frequency::Week => 7 * 24 * 60 * 60,
        };
        Duration::from_secs(secs)
    }

    /// Stable label used in persisted records.
    pub fn label(&self) -> &'static str {
        match self {
            Frequency::TenSeconds => "ten_seconds",
            Frequency::Minute => "minute",
            Frequency::TenMinutes => "ten_minutes",
            Frequency::ThirtyMinutes => "thirty_minutes",
            Frequency::Hour => "hour",
            Frequency::Day => "day",
            Frequency::Week => "week",
        }
    }

    /// Human readable description, e.g. "ten minutes".
    pub fn description(&self) -> &'static str {
        match self {
            Frequency::TenSeconds => "ten seconds",
            Frequency::Minute => "one minute",
            Frequency::TenMinutes => "ten minutes",
            Frequency::ThirtyMinutes => "thirty minutes",
            Frequency::Hour => "one hour",
            Frequency::Day => "one day",
            Frequency::Week => "one week",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Frequency {
    type Err = FeedwatchError;

    fn from_str(s: &str) -> Result<Self> {
        Frequency::ALL
            .into_iter()
            .find(|frequency| frequency.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FeedwatchError::Validation(format!("unknown frequency: {s}")))
    }
}

/// Request to create a subscription.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    /// Feed address the subscription polls.
    pub feed_query: String,
    /// Notification destination.
    pub recipient: String,
    /// Polling frequency.
    pub frequency: Frequency,
    /// Label shown to the recipient.
    pub display_name: String,
}

impl NewSubscription {
    /// Create a new subscription request.
    pub fn new(
        feed_query: impl Into<String>,
        recipient: impl Into<String>,
        frequency: Frequency,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            feed_query: feed_query.into(),
            recipient: recipient.into(),
            frequency,
            display_name: display_name.into(),
        }
    }

    /// Check the request before anything is scheduled or persisted.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.feed_query)
            .map_err(|e| FeedwatchError::Validation(format!("invalid feed query: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FeedwatchError::Validation(format!(
                "unsupported feed query scheme: {}",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(FeedwatchError::Validation(
                "feed query has no host".to_string(),
            ));
        }
        if self.display_name.trim().is_empty() {
            return Err(FeedwatchError::Validation(
                "display name is empty".to_string(),
            ));
        }
        if self.recipient.trim().is_empty() {
            return Err(FeedwatchError::Validation("recipient is empty".to_string()));
        }
        Ok(())
    }
}

/// A periodically polled feed subscription.
///
/// Everything except the two timestamps is fixed at creation. Timestamps
/// are persisted as epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique identifier, also the persistence key.
    pub id: String,
    /// Feed address the subscription polls.
    pub feed_query: String,
    /// Notification destination.
    pub recipient: String,
    /// Polling frequency.
    pub frequency: Frequency,
    /// Label shown to the recipient.
    pub display_name: String,
    /// Most recent poll attempt, successful or not.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_poll_at: DateTime<Utc>,
    /// Newest item ever delivered; the dedup boundary.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_seen_item_at: DateTime<Utc>,
}

impl Subscription {
    /// Create a subscription from a validated request.
    ///
    /// Nothing has been seen yet, so the dedup boundary starts at the epoch.
    pub fn create(new: NewSubscription, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            feed_query: new.feed_query,
            recipient: new.recipient,
            frequency: new.frequency,
            display_name: new.display_name,
            last_poll_at: now,
            last_seen_item_at: DateTime::UNIX_EPOCH,
        }
    }

    /// Delay until the next periodic poll is due, never negative.
    pub fn next_poll_delay(&self, now: DateTime<Utc>) -> Duration {
        let period = chrono::Duration::from_std(self.frequency.period())
            .unwrap_or(chrono::Duration::MAX);
        let due = self
            .last_poll_at
            .checked_add_signed(period)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        (due - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Record a poll attempt.
    pub fn record_poll(&mut self, now: DateTime<Utc>) {
        self.last_poll_at = now;
    }

    /// Move the dedup boundary to the newest of `items`.
    ///
    /// The boundary never moves backward and never passes `now`. Returns
    /// whether it moved.
    pub fn advance_last_seen(&mut self, items: &[FeedItem], now: DateTime<Utc>) -> bool {
        let Some(newest) = items.iter().map(|item| item.published_at).max() else {
            return false;
        };
        let newest = newest.min(now);

        if newest > self.last_seen_item_at {
            self.last_seen_item_at = newest;
            true
        } else {
            false
        }
    }
}
