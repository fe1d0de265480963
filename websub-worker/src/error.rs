//! Error types shared by the store, the hub client and the web handlers.

use thiserror::Error;

use crate::hub::ProviderError;

/// Failures raised by a [`SubscriptionStore`](crate::store::SubscriptionStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Lease timers are tokio tasks; saving outside a runtime cannot arm one.
    #[error("no async runtime available to arm lease timer")]
    NoRuntime,
}

/// Errors returned by subscription management operations.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The request was malformed; the caller must fix it before retrying.
    #[error("invalid subscription request: {0}")]
    Validation(String),

    #[error("no subscription for topic {0:?}")]
    NotFound(String),

    /// The hub rejected the request with a structured error body.
    #[error("hub rejected request: {0}")]
    Provider(#[from] ProviderError),

    /// The hub answered with something other than a provider error body.
    #[error("hub returned status {status} with unparsable error body")]
    MalformedProviderResponse {
        status: u16,
        #[source]
        source: serde_json::Error,
    },

    #[error("hub transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("random source unavailable: {0}")]
    CryptoSource(#[from] rand::Error),

    /// A callback path segment that is not one of our subscription ids.
    #[error("malformed subscription id: {0}")]
    MalformedId(String),

    #[error("signature header is not valid hex: {0}")]
    InvalidSignatureEncoding(#[from] hex::FromHexError),

    #[error("failed to obtain hub credentials: {0}")]
    Credentials(String),

    #[error("failed to read request body: {0}")]
    Body(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, WebhookError>;
