//! Request and response types for the hub protocol.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::error::{Result, WebhookError};
use crate::store::Subscription;

/// Longest lease a request may ask for.
pub const MAX_LEASE: Duration = Duration::from_secs(86_400 * 365);

/// Parameters for a single subscribe call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub topic: String,
    /// Absolute URL the subscription id is appended to.
    pub callback_base_url: String,
    /// Requested lease; the hub may confirm a different one.
    pub lease: Duration,
}

impl SubscriptionRequest {
    pub fn new(
        topic: impl Into<String>,
        callback_base_url: impl Into<String>,
        lease: Duration,
    ) -> Self {
        Self {
            topic: topic.into(),
            callback_base_url: callback_base_url.into(),
            lease,
        }
    }

    /// Check the request and return the parsed callback base URL.
    pub fn validate(&self) -> Result<Url> {
        if self.topic.is_empty() {
            return Err(WebhookError::Validation(
                "subscription topic is required".to_string(),
            ));
        }

        if self.callback_base_url.is_empty() {
            return Err(WebhookError::Validation(
                "callback base URL is required".to_string(),
            ));
        }

        // The hub only understands whole seconds.
        if self.lease.as_secs() == 0 {
            return Err(WebhookError::Validation(
                "lease must be at least one second".to_string(),
            ));
        }

        if self.lease > MAX_LEASE {
            return Err(WebhookError::Validation(format!(
                "lease of {}s exceeds the maximum of {}s",
                self.lease.as_secs(),
                MAX_LEASE.as_secs()
            )));
        }

        let base = Url::parse(&self.callback_base_url).map_err(|e| {
            WebhookError::Validation(format!("callback base URL is not absolute: {}", e))
        })?;

        if base.cannot_be_a_base() {
            return Err(WebhookError::Validation(format!(
                "callback base URL cannot carry a path: {}",
                self.callback_base_url
            )));
        }

        Ok(base)
    }
}

/// Structured error body the hub returns when it rejects a request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Error)]
#[error("{message} ({status} {error})")]
pub struct ProviderError {
    pub error: String,
    pub status: u16,
    pub message: String,
}

/// Form fields for a subscribe request.
pub(crate) fn subscribe_form(subscription: &Subscription) -> Vec<(&'static str, String)> {
    vec![
        ("hub.callback", subscription.callback_url.clone()),
        ("hub.topic", subscription.topic.clone()),
        ("hub.lease_seconds", subscription.lease.as_secs().to_string()),
        ("hub.secret", subscription.secret.as_str().to_string()),
        ("hub.mode", "subscribe".to_string()),
    ]
}

/// Form fields for an unsubscribe request.
pub(crate) fn unsubscribe_form(subscription: &Subscription) -> Vec<(&'static str, String)> {
    vec![
        ("hub.mode", "unsubscribe".to_string()),
        ("hub.topic", subscription.topic.clone()),
        ("hub.callback", subscription.callback_url.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::{Renewal, Secret};

    fn request(topic: &str, base: &str, lease: Duration) -> SubscriptionRequest {
        SubscriptionRequest::new(topic, base, lease)
    }

    #[test]
    fn test_validate_accepts_complete_request() {
        let base = request("video.change", "https://example.com/callbacks", Duration::from_secs(60))
            .validate()
            .unwrap();
        assert_eq!(base.path(), "/callbacks");
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let cases = [
            request("", "https://example.com", Duration::from_secs(60)),
            request("video.change", "", Duration::from_secs(60)),
            request("video.change", "https://example.com", Duration::ZERO),
            request("video.change", "https://example.com", Duration::from_millis(500)),
            request("video.change", "https://example.com", MAX_LEASE + Duration::from_secs(1)),
            request("video.change", "https://example.com", Duration::from_secs(u64::MAX)),
            request("video.change", "/relative/path", Duration::from_secs(60)),
            request("video.change", "mailto:someone@example.com", Duration::from_secs(60)),
        ];

        for case in cases {
            assert!(
                matches!(case.validate(), Err(WebhookError::Validation(_))),
                "expected validation error for {:?}",
                case
            );
        }
    }

    #[test]
    fn test_validate_accepts_maximum_lease() {
        assert!(request("video.change", "https://example.com", MAX_LEASE)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_provider_error_parses() {
        let body = r#"{"error":"Bad Request","status":400,"message":"invalid hub.topic"}"#;
        let err: ProviderError = serde_json::from_str(body).unwrap();
        assert_eq!(err.status, 400);
        assert_eq!(err.message, "invalid hub.topic");
        assert!(err.to_string().starts_with("invalid hub.topic"));
    }

    #[test]
    fn test_subscribe_form_fields() {
        let req = request("video.change", "https://example.com", Duration::from_secs(3600));
        let sub = Subscription {
            topic: "video.change".to_string(),
            callback_url: "https://example.com/abc".to_string(),
            lease: Duration::from_secs(3600),
            secret: Secret::new("deadbeef"),
            renewal: Renewal::new(req, Arc::new(|_: &str| {})),
        };

        let form = subscribe_form(&sub);
        assert!(form.contains(&("hub.mode", "subscribe".to_string())));
        assert!(form.contains(&("hub.lease_seconds", "3600".to_string())));
        assert!(form.contains(&("hub.secret", "deadbeef".to_string())));
        assert!(form.contains(&("hub.callback", "https://example.com/abc".to_string())));

        let form = unsubscribe_form(&sub);
        assert_eq!(form.len(), 3);
        assert!(form.contains(&("hub.mode", "unsubscribe".to_string())));
        assert!(!form.iter().any(|(k, _)| *k == "hub.secret"));
    }
}
