//! Notification sink.
//!
//! Delivery is someone else's job: the scheduler hands results to a
//! [`NotificationSink`] and logs any failure without retrying.

use async_trait::async_trait;
use tracing::info;

use crate::feed::FeedItem;
use crate::subscription::Subscription;
use crate::Result;

/// Receives poll results for delivery to a subscription's recipient.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// New items were found by a scheduled poll. `items` is never empty.
    async fn notify_new_results(
        &self,
        subscription: &Subscription,
        items: &[FeedItem],
    ) -> Result<()>;

    /// A subscription was created. `items` holds the initial batch, or
    /// `None` when the first fetch failed or found nothing.
    async fn notify_enrollment(
        &self,
        subscription: &Subscription,
        items: Option<&[FeedItem]>,
    ) -> Result<()>;
}

/// Sink that only writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify_new_results(
        &self,
        subscription: &Subscription,
        items: &[FeedItem],
    ) -> Result<()> {
        info!(
            "{} new result(s) for '{}' -> {}",
            items.len(),
            subscription.display_name,
            subscription.recipient
        );
        for item in items {
            info!("  {} <{}> ({})", item.title, item.link, item.published_at);
        }
        Ok(())
    }

    async fn notify_enrollment(
        &self,
        subscription: &Subscription,
        items: Option<&[FeedItem]>,
    ) -> Result<()> {
        info!(
            "Enrolled '{}' for {} (every {}, {} initial result(s))",
            subscription.display_name,
            subscription.recipient,
            subscription.frequency.description(),
            items.map_or(0, <[FeedItem]>::len)
        );
        Ok(())
    }
}
