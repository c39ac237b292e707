//! feedwatch - feed polling and new-item notification
//!
//! Polls feeds on behalf of many independently scheduled subscriptions,
//! detects the items that are new since each subscription's last poll, and
//! hands them to a notification sink while pacing all outbound fetches.

pub mod config;
pub mod error;
pub mod feed;
pub mod logging;
pub mod notify;
pub mod rate_limit;
pub mod scheduler;
pub mod subscription;

pub use config::Config;
pub use error::{FeedwatchError, Result};
pub use feed::{FeedFetcher, FeedItem, FeedSource, HttpFeedSource};
pub use notify::{LogNotifier, NotificationSink};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use scheduler::Scheduler;
pub use subscription::{Frequency, NewSubscription, Subscription, SubscriptionStore};
