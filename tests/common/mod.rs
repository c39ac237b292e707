//! Test helpers for scheduler integration tests.
//!
//! Provides an in-memory feed, a recording notification sink, and helpers
//! to build a scheduler on a temporary store.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;
use tokio::time::Instant;

use feedwatch::config::{FeedConfig, SchedulerConfig};
use feedwatch::{
    FeedFetcher, FeedItem, FeedSource, FeedwatchError, Frequency, NewSubscription,
    NotificationSink, RateLimiter, Result, Scheduler, Subscription, SubscriptionStore,
};

/// Wall-clock time `minutes` ago, truncated to whole seconds so it survives
/// an RFC 2822 round trip.
pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(Utc::now().timestamp() - minutes * 60, 0).unwrap()
}

/// Feed item published `minutes` ago.
pub fn item(minutes: i64) -> FeedItem {
    FeedItem::new(
        format!("Listing {minutes}"),
        format!("https://example.org/listing/{minutes}"),
        format!("Posted {minutes} minutes ago"),
        minutes_ago(minutes),
    )
}

/// Render items as an RSS 2.0 document, in the given order.
pub fn render_rss(items: &[FeedItem]) -> String {
    let items: String = items
        .iter()
        .map(|item| {
            format!(
                "<item><title>{}</title><link>{}</link><description>{}</description>\
                 <pubDate>{}</pubDate></item>",
                item.title,
                item.link,
                item.description,
                item.published_at.to_rfc2822()
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Search results</title>
<link>https://example.org/search</link><description>Listings</description>
{items}</channel></rss>"#
    )
}

/// In-memory feed whose items, failure mode, and latency tests can change.
#[derive(Default)]
pub struct FakeFeed {
    items: Mutex<Vec<FeedItem>>,
    failing: AtomicBool,
    latency: Mutex<Duration>,
    fetches: Mutex<Vec<(Instant, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeFeed {
    pub fn new(items: Vec<FeedItem>) -> Arc<Self> {
        let feed = Self::default();
        *feed.items.lock().unwrap() = items;
        Arc::new(feed)
    }

    pub fn set_items(&self, items: Vec<FeedItem>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub fn fetch_times(&self) -> Vec<Instant> {
        self.fetches.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    pub fn fetched_urls(&self) -> Vec<String> {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .map(|(_, url)| url.clone())
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for FakeFeed {
    async fn retrieve(&self, url: &str) -> Result<Vec<u8>> {
        self.fetches
            .lock()
            .unwrap()
            .push((Instant::now(), url.to_string()));

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(FeedwatchError::Fetch("connection refused".to_string()));
        }
        let body = render_rss(&self.items.lock().unwrap());
        Ok(body.into_bytes())
    }
}

/// A notification received by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    NewResults {
        id: String,
        items: Vec<FeedItem>,
    },
    Enrollment {
        id: String,
        items: Option<Vec<FeedItem>>,
    },
}

/// Sink that records every notification.
#[derive(Default)]
pub struct RecordingNotifier {
    received: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn received(&self) -> Vec<Notification> {
        self.received.lock().unwrap().clone()
    }

    pub fn new_results_for(&self, id: &str) -> Vec<Vec<FeedItem>> {
        self.received()
            .into_iter()
            .filter_map(|notification| match notification {
                Notification::NewResults { id: got, items } if got == id => Some(items),
                _ => None,
            })
            .collect()
    }

    pub fn enrollments_for(&self, id: &str) -> Vec<Option<Vec<FeedItem>>> {
        self.received()
            .into_iter()
            .filter_map(|notification| match notification {
                Notification::Enrollment { id: got, items } if got == id => Some(items),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify_new_results(
        &self,
        subscription: &Subscription,
        items: &[FeedItem],
    ) -> Result<()> {
        self.received.lock().unwrap().push(Notification::NewResults {
            id: subscription.id.clone(),
            items: items.to_vec(),
        });
        Ok(())
    }

    async fn notify_enrollment(
        &self,
        subscription: &Subscription,
        items: Option<&[FeedItem]>,
    ) -> Result<()> {
        self.received.lock().unwrap().push(Notification::Enrollment {
            id: subscription.id.clone(),
            items: items.map(<[FeedItem]>::to_vec),
        });
        Ok(())
    }
}

/// A scheduler wired to fakes on a temporary store.
pub struct Harness {
    pub dir: TempDir,
    pub store: SubscriptionStore,
    pub feed: Arc<FakeFeed>,
    pub notifier: Arc<RecordingNotifier>,
    pub scheduler: Scheduler,
}

impl Harness {
    /// New harness serving `items` with the given global fetch rate.
    pub fn new(items: Vec<FeedItem>, max_per_minute: u32) -> Self {
        let dir = TempDir::new().unwrap();
        let store = SubscriptionStore::new(dir.path().join("subscriptions")).unwrap();
        let feed = FakeFeed::new(items);
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = build_scheduler(store.directory(), &feed, &notifier, max_per_minute);

        Self {
            dir,
            store,
            feed,
            notifier,
            scheduler,
        }
    }

    /// Build a second scheduler on the same store, as after a restart.
    pub fn restart(&self, max_per_minute: u32) -> Scheduler {
        build_scheduler(
            self.store.directory(),
            &self.feed,
            &self.notifier,
            max_per_minute,
        )
    }
}

pub fn build_scheduler(
    store_dir: &Path,
    feed: &Arc<FakeFeed>,
    notifier: &Arc<RecordingNotifier>,
    max_per_minute: u32,
) -> Scheduler {
    let store = SubscriptionStore::new(store_dir).unwrap();
    let fetcher = FeedFetcher::new(feed.clone(), &FeedConfig::default());

    Scheduler::new(
        store,
        fetcher,
        Arc::new(RateLimiter::per_minute(max_per_minute)),
        notifier.clone(),
        &SchedulerConfig::default(),
    )
}

/// Request for a subscription polled at `frequency`.
pub fn new_subscription(name: &str, frequency: Frequency) -> NewSubscription {
    NewSubscription::new(
        "https://example.org/search/bia?query=touring",
        format!("{}@example.org", name.to_lowercase()),
        frequency,
        name,
    )
}

/// Persisted subscription with explicit timestamps, as left by an earlier run.
pub fn persisted_subscription(
    name: &str,
    frequency: Frequency,
    last_poll_at: DateTime<Utc>,
    last_seen_item_at: DateTime<Utc>,
) -> Subscription {
    let mut subscription = Subscription::create(new_subscription(name, frequency), last_poll_at);
    subscription.last_seen_item_at = last_seen_item_at;
    subscription
}
