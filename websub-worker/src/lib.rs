//! WebSub subscription management.
//!
//! This library manages webhook subscriptions against a WebSub hub:
//! - `hub`: subscribe/unsubscribe requests and automatic lease renewal
//! - `store`: the topic-keyed subscription cache and its lease timers
//! - `web`: the callback endpoints for the handshake and signed notifications
//!
//! ## Architecture
//!
//! ```text
//! subscribe → Hub → GET callback (confirm) → store.set_lease
//!                 → POST callback (notify) → signature check → delivery
//! lease timer → Renewal → subscribe
//! ```

pub mod config;
pub mod error;
pub mod hub;
pub mod store;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::{StoreError, WebhookError};
pub use hub::{HubClient, ProviderError, SubscriptionId, SubscriptionRequest};
pub use store::{DenialCallback, InMemoryStore, Subscription, SubscriptionStore};
pub use web::{AppState, Notification, SignatureValidator};
