//! Notification signature verification.
//!
//! The hub signs every notification with HMAC-SHA256 keyed by the secret we
//! registered for that subscription, and sends the hex digest in
//! `X-Hub-Signature` (optionally tagged `sha256=`). The subscription is
//! found through the id in the last segment of the request path.

use std::sync::Arc;

use axum::body::{to_bytes, Body, Bytes};
use axum::http::Request;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use crate::error::{Result, WebhookError};
use crate::hub::id_to_topic;
use crate::store::SubscriptionStore;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";

/// Largest notification body we are willing to buffer.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Outcome of checking a notification's signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStatus {
    Valid,
    /// A signature was present and did not match.
    Invalid,
    /// No signature header; the caller decides whether to accept it.
    Missing,
}

/// A buffered notification together with its signature status.
#[derive(Debug, Clone)]
pub struct SignatureCheck {
    pub topic: String,
    pub status: SignatureStatus,
    /// The complete raw body; cheap to clone and re-read.
    pub body: Bytes,
}

impl SignatureCheck {
    pub fn is_valid(&self) -> bool {
        self.status == SignatureStatus::Valid
    }
}

/// Verify `signature` (hex, optionally `sha256=`-prefixed) over `body`.
///
/// The digest comparison is constant-time. Returns an error only when the
/// header is present but not hex.
pub fn verify_signature(
    secret: &[u8],
    body: &[u8],
    signature: Option<&[u8]>,
) -> Result<SignatureStatus> {
    let signature = match signature {
        Some(s) if !s.is_empty() => s,
        _ => return Ok(SignatureStatus::Missing),
    };

    let signature = signature.strip_prefix(b"sha256=").unwrap_or(signature);
    let provided = hex::decode(signature)?;

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        warn!("notification_signature_invalid_key");
        return Ok(SignatureStatus::Invalid);
    };
    mac.update(body);

    match mac.verify_slice(&provided) {
        Ok(()) => Ok(SignatureStatus::Valid),
        Err(_) => Ok(SignatureStatus::Invalid),
    }
}

/// Checks inbound notifications against the secret of their subscription.
#[derive(Clone)]
pub struct SignatureValidator {
    store: Arc<dyn SubscriptionStore>,
}

impl SignatureValidator {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Buffer the request body and verify its signature.
    ///
    /// Fails when the path does not end in a subscription id, when the topic
    /// has no subscription, or when the signature header is not hex.
    pub async fn validate(&self, request: Request<Body>) -> Result<SignatureCheck> {
        let (parts, body) = request.into_parts();

        let id = parts.uri.path().rsplit('/').next().unwrap_or_default();
        let topic = id_to_topic(id)?;

        let subscription = self
            .store
            .get(&topic)?
            .ok_or_else(|| WebhookError::NotFound(topic.clone()))?;

        let body = to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| WebhookError::Body(e.to_string()))?;

        let signature = parts.headers.get(SIGNATURE_HEADER).map(|v| v.as_bytes());
        let status = verify_signature(subscription.secret.as_bytes(), &body, signature)?;

        if status == SignatureStatus::Invalid {
            warn!(topic = %topic, body_length = body.len(), "notification_signature_mismatch");
        }

        Ok(SignatureCheck { topic, status, body })
    }
}
