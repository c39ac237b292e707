//! Per-subscription polling scheduler.
//!
//! Every active subscription owns one tokio task. The task runs the
//! enrollment poll (for new subscriptions), then ticks on a fixed-rate
//! interval and runs one poll cycle per tick. Because a subscription's
//! polls all run on its own task they can never overlap, while different
//! subscriptions poll concurrently up to the worker pool size. Every fetch
//! additionally waits on the shared [`RateLimiter`].
//!
//! A poll cycle is: worker permit, rate-limit permit, fetch since the
//! dedup boundary, advance the boundary, notify, persist. The record is
//! persisted whether or not the fetch succeeded.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{Config, SchedulerConfig};
use crate::feed::{FeedFetcher, HttpFeedSource};
use crate::notify::NotificationSink;
use crate::rate_limit::RateLimiter;
use crate::subscription::{NewSubscription, Subscription, SubscriptionStore};
use crate::{FeedwatchError, Result};

/// Why a poll cycle runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollKind {
    /// One-off run right after a subscription is created.
    Enrollment,
    /// Regular run on the subscription's timer.
    Scheduled,
}

/// Signal sent to a subscription task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Run,
    Stop,
}

/// A scheduled subscription.
struct Entry {
    state: Arc<Mutex<Subscription>>,
    signal: watch::Sender<Signal>,
    task: JoinHandle<()>,
}

/// Services shared by all subscription tasks.
struct Poller {
    store: SubscriptionStore,
    fetcher: FeedFetcher,
    limiter: Arc<RateLimiter>,
    notifier: Arc<dyn NotificationSink>,
    workers: Semaphore,
    initial_batch_size: usize,
}

/// Owns the timers of all active subscriptions.
///
/// The only way for surrounding code to change scheduling state is through
/// [`add_subscription`](Self::add_subscription) and
/// [`remove_subscription`](Self::remove_subscription).
pub struct Scheduler {
    poller: Arc<Poller>,
    subscriptions: RwLock<HashMap<String, Entry>>,
}

impl Scheduler {
    /// Create a scheduler from its collaborators.
    pub fn new(
        store: SubscriptionStore,
        fetcher: FeedFetcher,
        limiter: Arc<RateLimiter>,
        notifier: Arc<dyn NotificationSink>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            poller: Arc::new(Poller {
                store,
                fetcher,
                limiter,
                notifier,
                workers: Semaphore::new(config.worker_pool_size.max(1)),
                initial_batch_size: config.initial_batch_size.max(1),
            }),
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    /// Build a scheduler with the HTTP feed source and file store described
    /// by `config`.
    pub fn from_config(config: &Config, notifier: Arc<dyn NotificationSink>) -> Result<Self> {
        let store = SubscriptionStore::new(&config.store.directory)?;
        let source = Arc::new(HttpFeedSource::new(&config.feed)?);
        let fetcher = FeedFetcher::new(source, &config.feed);
        let limiter = Arc::new(RateLimiter::per_minute(
            config.scheduler.max_fetches_per_minute,
        ));

        Ok(Self::new(
            store,
            fetcher,
            limiter,
            notifier,
            &config.scheduler,
        ))
    }

    /// Load every persisted subscription and schedule it.
    ///
    /// Resumed subscriptions skip the enrollment poll; their first periodic
    /// poll is due one period after their last persisted poll, or right away
    /// if that moment has already passed. Subscriptions that are already
    /// scheduled are left alone. Returns the number newly scheduled.
    pub async fn start(&self) -> Result<usize> {
        let loaded = self.poller.store.load_all()?;
        let mut count = 0;

        let mut subscriptions = self.subscriptions.write().await;
        for subscription in loaded {
            if subscriptions.contains_key(&subscription.id) {
                debug!("Subscription {} already scheduled", subscription.id);
                continue;
            }
            debug!(
                "Resuming '{}' ({}), next poll in {:?}",
                subscription.display_name,
                subscription.id,
                subscription.next_poll_delay(Utc::now())
            );
            let id = subscription.id.clone();
            subscriptions.insert(id, self.spawn(subscription, false));
            count += 1;
        }

        info!("Scheduled {} persisted subscription(s)", count);
        Ok(count)
    }

    /// Create, persist, and schedule a new subscription.
    ///
    /// The enrollment poll runs in the background on the subscription's own
    /// task, before its first periodic poll.
    pub async fn add_subscription(&self, new: NewSubscription) -> Result<Subscription> {
        new.validate()?;

        let subscription = Subscription::create(new, Utc::now());
        if let Err(e) = self.poller.store.save(&subscription) {
            warn!("Failed to persist new subscription {}: {}", subscription.id, e);
        }

        info!(
            "Added subscription '{}' ({}) every {}",
            subscription.display_name,
            subscription.id,
            subscription.frequency.description()
        );

        let entry = self.spawn(subscription.clone(), true);
        self.subscriptions
            .write()
            .await
            .insert(subscription.id.clone(), entry);

        Ok(subscription)
    }

    /// Cancel a subscription's future polls and delete its record.
    ///
    /// A poll that is already running is allowed to finish (and persist)
    /// first, so this returns only after that poll is done and the record
    /// is gone. Returns the final state of the subscription.
    pub async fn remove_subscription(&self, id: &str) -> Result<Subscription> {
        let entry = self
            .subscriptions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| FeedwatchError::NotFound(format!("subscription {id}")))?;

        let subscription = stop_entry(entry).await;

        if let Err(e) = self.poller.store.delete(id) {
            warn!("Failed to delete record for subscription {}: {}", id, e);
        }

        info!(
            "Removed subscription '{}' ({})",
            subscription.display_name, id
        );
        Ok(subscription)
    }

    /// Current state of a subscription.
    pub async fn get_subscription(&self, id: &str) -> Result<Subscription> {
        let state = self
            .subscriptions
            .read()
            .await
            .get(id)
            .map(|entry| Arc::clone(&entry.state))
            .ok_or_else(|| FeedwatchError::NotFound(format!("subscription {id}")))?;

        let subscription = state.lock().await.clone();
        Ok(subscription)
    }

    /// Current state of every scheduled subscription.
    pub async fn list_subscriptions(&self) -> Vec<Subscription> {
        let states: Vec<_> = self
            .subscriptions
            .read()
            .await
            .values()
            .map(|entry| Arc::clone(&entry.state))
            .collect();

        let mut subscriptions = Vec::with_capacity(states.len());
        for state in states {
            subscriptions.push(state.lock().await.clone());
        }
        subscriptions
    }

    /// Number of scheduled subscriptions.
    pub async fn len(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Whether no subscription is scheduled.
    pub async fn is_empty(&self) -> bool {
        self.subscriptions.read().await.is_empty()
    }

    /// Stop every timer without deleting any record.
    ///
    /// Every subscription is signalled before any is awaited, so no new poll
    /// starts once shutdown begins. Running polls finish first. A restarted
    /// scheduler resumes from the persisted state.
    pub async fn shutdown(&self) {
        let entries: Vec<Entry> = self
            .subscriptions
            .write()
            .await
            .drain()
            .map(|(_, entry)| entry)
            .collect();

        for entry in &entries {
            entry.signal.send_replace(Signal::Stop);
        }

        let count = entries.len();
        for entry in entries {
            stop_entry(entry).await;
        }
        info!("Scheduler stopped ({} subscription(s))", count);
    }

    fn spawn(&self, subscription: Subscription, enroll: bool) -> Entry {
        let state = Arc::new(Mutex::new(subscription));
        let (signal, signal_rx) = watch::channel(Signal::Run);

        let task = tokio::spawn(run_subscription(
            Arc::clone(&self.poller),
            Arc::clone(&state),
            signal_rx,
            enroll,
        ));

        Entry {
            state,
            signal,
            task,
        }
    }
}

/// Signal an entry's task to stop and wait for it.
async fn stop_entry(entry: Entry) -> Subscription {
    // The task may already be gone, so there may be no receiver left
    entry.signal.send_replace(Signal::Stop);

    if let Err(e) = entry.task.await {
        error!("Subscription task failed: {}", e);
    }

    let subscription = entry.state.lock().await.clone();
    subscription
}

/// Body of a subscription's task.
async fn run_subscription(
    poller: Arc<Poller>,
    state: Arc<Mutex<Subscription>>,
    mut signal: watch::Receiver<Signal>,
    enroll: bool,
) {
    if enroll {
        poller.poll(&state, PollKind::Enrollment).await;
    }

    let (period, delay) = {
        let subscription = state.lock().await;
        (
            subscription.frequency.period(),
            subscription.next_poll_delay(Utc::now()),
        )
    };

    // Fixed rate: a late tick fires at once, missed ticks are not replayed
    let mut ticker = interval_at(Instant::now() + delay, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            changed = signal.changed() => {
                if changed.is_err() || *signal.borrow() == Signal::Stop {
                    break;
                }
            }
            _ = ticker.tick() => {
                poller.poll(&state, PollKind::Scheduled).await;
            }
        }
    }
}

impl Poller {
    /// Run one poll cycle for a subscription.
    ///
    /// Never fails: fetch, notification, and persistence errors are logged
    /// and the subscription stays scheduled.
    async fn poll(&self, state: &Mutex<Subscription>, kind: PollKind) {
        let Ok(_permit) = self.workers.acquire().await else {
            return;
        };
        self.limiter.acquire().await;
        let started = Utc::now();

        let (id, feed_query, last_seen) = {
            let subscription = state.lock().await;
            (
                subscription.id.clone(),
                subscription.feed_query.clone(),
                subscription.last_seen_item_at,
            )
        };

        let (cutoff, limit) = match kind {
            PollKind::Enrollment => (DateTime::UNIX_EPOCH, Some(self.initial_batch_size)),
            PollKind::Scheduled => (last_seen, None),
        };

        let result = self.fetcher.fetch_since(&feed_query, cutoff, limit).await;

        let snapshot = {
            let mut subscription = state.lock().await;
            subscription.record_poll(started);
            if let Ok(items) = &result {
                subscription.advance_last_seen(items, Utc::now());
            }
            subscription.clone()
        };

        let notified = match (kind, &result) {
            (PollKind::Enrollment, Ok(items)) => {
                let batch = (!items.is_empty()).then_some(items.as_slice());
                self.notifier.notify_enrollment(&snapshot, batch).await
            }
            (PollKind::Enrollment, Err(e)) => {
                warn!("Initial fetch failed for subscription {}: {}", id, e);
                self.notifier.notify_enrollment(&snapshot, None).await
            }
            (PollKind::Scheduled, Ok(items)) if !items.is_empty() => {
                info!("Subscription {}: {} new item(s)", id, items.len());
                self.notifier.notify_new_results(&snapshot, items).await
            }
            (PollKind::Scheduled, Ok(_)) => {
                debug!("Subscription {}: no new items", id);
                Ok(())
            }
            (PollKind::Scheduled, Err(e)) => {
                warn!("Fetch failed for subscription {}: {}", id, e);
                Ok(())
            }
        };
        if let Err(e) = notified {
            warn!("Notification failed for subscription {}: {}", id, e);
        }

        if let Err(e) = self.store.save(&snapshot) {
            warn!("Failed to persist subscription {}: {}", id, e);
        }
    }
}
