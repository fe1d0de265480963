//! In-memory subscription store with per-topic lease timers.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::types::{Renewal, Subscription};
use super::SubscriptionStore;
use crate::error::StoreError;

/// Receiving side of the renewal channel; yields one [`Renewal`] per elapsed lease.
pub type RenewalReceiver = mpsc::UnboundedReceiver<Renewal>;

/// Deadline used when `now + lease` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Cancellable lease timer. Dropping it aborts the pending renewal.
struct LeaseTimer {
    handle: JoinHandle<()>,
}

impl LeaseTimer {
    fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for LeaseTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Entry {
    subscription: Subscription,
    timer: LeaseTimer,
}

/// Subscription store backed by a `HashMap` behind a reader/writer lock.
///
/// Timers never touch the map: when a lease elapses the timer task only
/// sends the subscription's [`Renewal`] down the channel returned by
/// [`InMemoryStore::new`]. A renewal that is already in flight when the
/// topic is deleted still reaches the channel; the resulting subscribe
/// saves a fresh entry.
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    renewals: mpsc::UnboundedSender<Renewal>,
}

impl InMemoryStore {
    /// Create an empty store and the channel its lease timers fire into.
    pub fn new() -> (Self, RenewalReceiver) {
        let (renewals, receiver) = mpsc::unbounded_channel();
        let store = Self {
            entries: RwLock::new(HashMap::new()),
            renewals,
        };
        (store, receiver)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn arm(&self, topic: &str, lease: Duration, renewal: Renewal) -> Result<LeaseTimer, StoreError> {
        let runtime = Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
        let renewals = self.renewals.clone();
        let deadline = lease_deadline(lease);
        let topic = topic.to_string();

        let handle = runtime.spawn(async move {
            sleep_until(deadline).await;
            info!(topic = %topic, "lease_expired");
            if renewals.send(renewal).is_err() {
                warn!(topic = %topic, "lease_renewal_dropped");
            }
        });

        Ok(LeaseTimer { handle })
    }
}

fn lease_deadline(lease: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(lease).unwrap_or(now + FAR_FUTURE)
}

impl SubscriptionStore for InMemoryStore {
    fn get(&self, topic: &str) -> Result<Option<Subscription>, StoreError> {
        Ok(self
            .entries
            .read()
            .get(topic)
            .map(|entry| entry.subscription.clone()))
    }

    fn save(&self, topic: &str, subscription: Subscription) -> Result<(), StoreError> {
        let lease = subscription.lease;
        let mut entries = self.entries.write();

        let timer = self.arm(topic, lease, subscription.renewal.clone())?;
        let previous = entries.insert(topic.to_string(), Entry { subscription, timer });

        if let Some(previous) = previous {
            previous.timer.cancel();
            debug!(topic = %topic, "lease_timer_replaced");
        }

        info!(topic = %topic, lease_seconds = lease.as_secs(), "subscription_saved");
        Ok(())
    }

    fn set_lease(&self, topic: &str, lease: Duration) -> Result<bool, StoreError> {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(topic) else {
            return Ok(false);
        };

        // Rearm with the lease on record. The confirmed lease is bookkeeping only:
        // renewals resubscribe with the originally requested lease.
        let timer = self.arm(
            topic,
            entry.subscription.lease,
            entry.subscription.renewal.clone(),
        )?;
        let previous = std::mem::replace(&mut entry.timer, timer);
        previous.cancel();

        info!(
            topic = %topic,
            armed_lease_seconds = entry.subscription.lease.as_secs(),
            confirmed_lease_seconds = lease.as_secs(),
            "subscription_lease_updated"
        );

        entry.subscription.lease = lease;
        Ok(true)
    }

    fn delete(&self, topic: &str) -> Result<Option<Subscription>, StoreError> {
        let mut entries = self.entries.write();

        let Some(entry) = entries.remove(topic) else {
            return Ok(None);
        };

        entry.timer.cancel();
        info!(topic = %topic, "subscription_deleted");
        Ok(Some(entry.subscription))
    }
}
