//! Subscriptions and their durable storage.

pub mod store;
pub mod types;

pub use store::SubscriptionStore;
pub use types::{Frequency, NewSubscription, Subscription};
