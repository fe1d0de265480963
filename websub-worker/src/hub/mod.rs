//! Hub protocol: subscription ids, request types and the outbound client.
//!
//! ## Flow
//!
//! ```text
//! subscribe() → POST hub.mode=subscribe → 202 → store.save()
//!                                          ↓
//!              hub GET callback?hub.mode=subscribe&hub.challenge=… → echo
//! ```

pub mod client;
pub mod credentials;
pub mod id;
pub mod types;

pub use client::HubClient;
pub use credentials::TokenSource;
pub use id::{id_to_topic, SubscriptionId};
pub use types::{ProviderError, SubscriptionRequest, MAX_LEASE};
