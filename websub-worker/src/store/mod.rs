//! Subscription store: topic-keyed cache of live subscriptions.
//!
//! Every saved subscription owns a lease timer. When the lease elapses the
//! store hands the subscription's [`Renewal`] back to whoever drains the
//! renewal channel (normally [`HubClient::run_renewals`](crate::hub::HubClient::run_renewals)),
//! which redoes the subscribe handshake.
//!
//! ```text
//! Subscribe → hub 202 → save(topic) → lease elapses → Renewal → Subscribe
//! ```

pub mod memory;
pub mod types;

use std::time::Duration;

use crate::error::StoreError;

pub use memory::{InMemoryStore, RenewalReceiver};
pub use types::{DenialCallback, Renewal, Secret, Subscription, SECRET_BYTES};

/// Storage contract for live subscriptions.
///
/// Implementations serialize all operations for a given topic and must keep
/// at most one armed lease timer per topic.
pub trait SubscriptionStore: Send + Sync {
    /// Look up the subscription for `topic`.
    fn get(&self, topic: &str) -> Result<Option<Subscription>, StoreError>;

    /// Install `subscription` and arm its lease timer, cancelling the timer
    /// of any subscription it replaces.
    fn save(&self, topic: &str, subscription: Subscription) -> Result<(), StoreError>;

    /// Record the lease confirmed by the hub.
    ///
    /// The timer is rearmed with the lease already on record, then `lease`
    /// replaces it on the stored record. The stored value is informational:
    /// renewals resubscribe with the originally requested lease. Returns
    /// `false` without creating an entry when `topic` is unknown.
    fn set_lease(&self, topic: &str, lease: Duration) -> Result<bool, StoreError>;

    /// Cancel the lease timer and remove the subscription, returning it.
    ///
    /// Lookup and removal happen as one step, so of two concurrent deletes
    /// only one sees the record. Unknown topics return `None`.
    fn delete(&self, topic: &str) -> Result<Option<Subscription>, StoreError>;
}
