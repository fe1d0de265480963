//! Subscription records held by the store.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::hub::SubscriptionRequest;

/// Number of random bytes behind every subscription secret.
pub const SECRET_BYTES: usize = 64;

/// Handler invoked with the hub's reason when it denies a subscription.
pub type DenialCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Shared HMAC key for a single subscription, hex-encoded.
///
/// `Debug` output is redacted so the key cannot leak through logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Draw [`SECRET_BYTES`] bytes from the OS random source.
    pub fn generate() -> Result<Self, rand::Error> {
        let mut key = [0u8; SECRET_BYTES];
        OsRng.try_fill_bytes(&mut key)?;
        Ok(Self(hex::encode(key)))
    }

    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Key bytes as sent to the hub in `hub.secret`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Everything needed to redo the subscribe handshake for a topic.
#[derive(Clone)]
pub struct Renewal {
    pub request: SubscriptionRequest,
    pub on_denied: DenialCallback,
}

impl Renewal {
    pub fn new(request: SubscriptionRequest, on_denied: DenialCallback) -> Self {
        Self { request, on_denied }
    }

    pub fn topic(&self) -> &str {
        &self.request.topic
    }
}

impl fmt::Debug for Renewal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renewal")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

/// A subscription the hub has accepted (or is about to confirm).
#[derive(Clone)]
pub struct Subscription {
    pub topic: String,
    /// Full callback URL registered with the hub, ending in the subscription id.
    pub callback_url: String,
    pub lease: Duration,
    pub secret: Secret,
    pub renewal: Renewal,
}

impl Subscription {
    /// Notify the owner that the hub denied this subscription.
    pub fn deny(&self, reason: &str) {
        (self.renewal.on_denied)(reason)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("callback_url", &self.callback_url)
            .field("lease", &self.lease)
            .field("secret", &self.secret)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_secret_is_hex_of_64_bytes() {
        let secret = Secret::generate().unwrap();
        assert_eq!(secret.as_str().len(), SECRET_BYTES * 2);
        assert!(hex::decode(secret.as_str()).is_ok());
    }

    #[test]
    fn test_generated_secrets_differ() {
        assert_ne!(Secret::generate().unwrap(), Secret::generate().unwrap());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let request = SubscriptionRequest::new(
            "video.change",
            "https://example.com/callbacks",
            Duration::from_secs(60),
        );
        let sub = Subscription {
            topic: "video.change".to_string(),
            callback_url: "https://example.com/callbacks/abc".to_string(),
            lease: Duration::from_secs(60),
            secret: Secret::new("super-secret-key"),
            renewal: Renewal::new(request, Arc::new(|_: &str| {})),
        };

        let rendered = format!("{:?}", sub);
        assert!(rendered.contains("video.change"));
        assert!(!rendered.contains("super-secret-key"));
    }
}
