//! Callback endpoint handlers.
//!
//! The hub talks to one URL per subscription:
//! - `GET` with `hub.*` query parameters drives the subscribe/unsubscribe/denied handshake
//! - `POST` delivers a signed notification for the subscription's topic

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::WebhookError;
use crate::store::SubscriptionStore;
use crate::web::signature::{SignatureStatus, SignatureValidator};
use crate::Config;

/// A notification whose signature has been checked.
#[derive(Debug, Clone)]
pub struct Notification {
    pub topic: String,
    pub body: Bytes,
}

/// Receives every accepted notification.
pub type DeliveryCallback = Arc<dyn Fn(Notification) + Send + Sync>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn SubscriptionStore>,
    pub validator: SignatureValidator,
    pub delivery: DeliveryCallback,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn SubscriptionStore>,
        delivery: DeliveryCallback,
    ) -> Self {
        Self {
            config,
            validator: SignatureValidator::new(Arc::clone(&store)),
            store,
            delivery,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Handshake Confirmation
// =============================================================================

/// Hub handshake endpoint.
///
/// Dispatches on `hub.mode`:
/// 1. `subscribe` - record the confirmed lease and echo `hub.challenge`
/// 2. `unsubscribe` - drop the subscription and echo `hub.challenge`
/// 3. `denied` - hand `hub.reason` to the denial callback and drop the subscription
pub async fn confirmation(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(mode) = params.get("hub.mode").filter(|m| !m.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            "missing required hub.mode query parameter",
        )
            .into_response();
    };

    let Some(topic) = params.get("hub.topic").filter(|t| !t.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            "missing required hub.topic query parameter",
        )
            .into_response();
    };

    let challenge = params.get("hub.challenge").map(String::as_str).unwrap_or_default();
    let store = state.store.as_ref();

    info!(mode = %mode, topic = %topic, "hub_confirmation_received");

    match mode.as_str() {
        "denied" => {
            let reason = params.get("hub.reason").map(String::as_str).unwrap_or_default();
            denied(store, topic, reason)
        }
        "subscribe" => {
            let lease = params.get("hub.lease").map(String::as_str).unwrap_or_default();
            subscribe_confirmed(store, topic, challenge, lease)
        }
        "unsubscribe" => unsubscribe_confirmed(store, topic, challenge),
        _ => (
            StatusCode::BAD_REQUEST,
            "hub.mode must be subscribe, unsubscribe or denied",
        )
            .into_response(),
    }
}

fn denied(store: &dyn SubscriptionStore, topic: &str, reason: &str) -> Response {
    let subscription = match store.get(topic) {
        Ok(Some(subscription)) => subscription,
        Ok(None) => return (StatusCode::NOT_FOUND, "subscription not found").into_response(),
        Err(e) => {
            error!(topic = %topic, error = %e, "subscription_lookup_failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "error retrieving subscription",
            )
                .into_response();
        }
    };

    warn!(topic = %topic, reason = %reason, "hub_subscription_denied");
    subscription.deny(reason);

    if let Err(e) = store.delete(topic) {
        error!(topic = %topic, error = %e, "subscription_delete_failed");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "error deleting subscription",
        )
            .into_response();
    }

    StatusCode::OK.into_response()
}

fn subscribe_confirmed(
    store: &dyn SubscriptionStore,
    topic: &str,
    challenge: &str,
    lease: &str,
) -> Response {
    if challenge.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "missing required hub.challenge query parameter",
        )
            .into_response();
    }

    let seconds = match lease.parse::<i64>() {
        Ok(seconds) if seconds > 0 => seconds as u64,
        _ => {
            info!(topic = %topic, lease = %lease, "hub_confirmation_invalid_lease");
            return (StatusCode::BAD_REQUEST, "invalid lease").into_response();
        }
    };

    match store.set_lease(topic, Duration::from_secs(seconds)) {
        Ok(true) => {}
        Ok(false) => {
            return (StatusCode::NOT_FOUND, "subscription does not exist").into_response()
        }
        Err(e) => {
            error!(topic = %topic, error = %e, "subscription_lease_update_failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "error updating subscription",
            )
                .into_response();
        }
    }

    info!(topic = %topic, lease_seconds = seconds, "hub_subscribe_confirmed");
    (StatusCode::OK, challenge.to_string()).into_response()
}

fn unsubscribe_confirmed(store: &dyn SubscriptionStore, topic: &str, challenge: &str) -> Response {
    if let Err(e) = store.delete(topic) {
        error!(topic = %topic, error = %e, "subscription_delete_failed");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "error deleting subscription",
        )
            .into_response();
    }

    // The deletion stands even when the challenge is missing.
    if challenge.is_empty() {
        info!(topic = %topic, "hub_unsubscribe_missing_challenge");
        return (
            StatusCode::BAD_REQUEST,
            "missing required hub.challenge query parameter",
        )
            .into_response();
    }

    info!(topic = %topic, "hub_unsubscribe_confirmed");
    (StatusCode::OK, challenge.to_string()).into_response()
}

// =============================================================================
// Notifications
// =============================================================================

/// Signed notification endpoint.
///
/// This endpoint:
/// 1. Verifies the body against the subscription's secret
/// 2. Hands the body to the delivery callback
/// 3. Returns 204
pub async fn notification(State(state): State<AppState>, request: Request) -> Response {
    let check = match state.validator.validate(request).await {
        Ok(check) => check,
        Err(e) => return rejection(e),
    };

    match check.status {
        SignatureStatus::Valid => {}
        SignatureStatus::Missing if !state.config.require_signature => {
            warn!(topic = %check.topic, "notification_unsigned_accepted");
        }
        SignatureStatus::Missing => {
            warn!(topic = %check.topic, "notification_signature_missing");
            return (StatusCode::UNAUTHORIZED, "missing signature").into_response();
        }
        SignatureStatus::Invalid => {
            return (StatusCode::UNAUTHORIZED, "invalid signature").into_response();
        }
    }

    info!(
        topic = %check.topic,
        body_length = check.body.len(),
        signed = check.is_valid(),
        "notification_accepted"
    );

    (state.delivery)(Notification {
        topic: check.topic,
        body: check.body,
    });

    StatusCode::NO_CONTENT.into_response()
}

fn rejection(err: WebhookError) -> Response {
    match err {
        WebhookError::MalformedId(reason) => {
            warn!(reason = %reason, "notification_malformed_id");
            (StatusCode::BAD_REQUEST, "unknown callback").into_response()
        }
        WebhookError::NotFound(topic) => {
            warn!(topic = %topic, "notification_unknown_topic");
            (StatusCode::NOT_FOUND, "subscription not found").into_response()
        }
        WebhookError::InvalidSignatureEncoding(e) => {
            warn!(error = %e, "notification_signature_malformed");
            (StatusCode::BAD_REQUEST, "malformed signature").into_response()
        }
        WebhookError::Body(reason) => {
            warn!(reason = %reason, "notification_body_unreadable");
            (StatusCode::BAD_REQUEST, "unreadable body").into_response()
        }
        e => {
            error!(error = %e, "notification_validation_failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "error validating notification").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use axum::body::to_bytes;

    use super::*;
    use crate::hub::SubscriptionRequest;
    use crate::store::{InMemoryStore, Renewal, Secret, Subscription};

    fn state_with(store: Arc<InMemoryStore>) -> AppState {
        AppState::new(Arc::new(Config::default()), store, Arc::new(|_: Notification| {}))
    }

    fn subscription(topic: &str, on_denied: crate::store::DenialCallback) -> Subscription {
        let request =
            SubscriptionRequest::new(topic, "https://example.com/callbacks", Duration::from_secs(600));
        Subscription {
            topic: topic.to_string(),
            callback_url: "https://example.com/callbacks/id".to_string(),
            lease: Duration::from_secs(600),
            secret: Secret::new("secret"),
            renewal: Renewal::new(request, on_denied),
        }
    }

    fn params(pairs: &[(&str, &str)]) -> Query<HashMap<String, String>> {
        Query(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    async fn call(state: &AppState, pairs: &[(&str, &str)]) -> (StatusCode, String) {
        let response = confirmation(State(state.clone()), params(pairs)).await;
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_missing_mode_or_topic() {
        let (store, _rx) = InMemoryStore::new();
        let state = state_with(Arc::new(store));

        let (status, _) = call(&state, &[("hub.topic", "video.change")]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        for mode in ["subscribe", "unsubscribe", "denied"] {
            let (status, _) = call(&state, &[("hub.mode", mode)]).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_unknown_mode() {
        let (store, _rx) = InMemoryStore::new();
        let state = state_with(Arc::new(store));

        let (status, _) = call(
            &state,
            &[("hub.mode", "resubscribe"), ("hub.topic", "video.change")],
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_subscribe_echoes_challenge_and_updates_lease() {
        let (store, _rx) = InMemoryStore::new();
        let store = Arc::new(store);
        store
            .save("video.change", subscription("video.change", Arc::new(|_: &str| {})))
            .unwrap();
        let state = state_with(Arc::clone(&store));

        let (status, body) = call(
            &state,
            &[
                ("hub.mode", "subscribe"),
                ("hub.topic", "video.change"),
                ("hub.challenge", "abc123"),
                ("hub.lease", "3600"),
            ],
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "abc123");
        assert_eq!(
            store.get("video.change").unwrap().unwrap().lease,
            Duration::from_secs(3600)
        );
    }

    #[tokio::test]
    async fn test_subscribe_without_challenge_leaves_store_untouched() {
        let (store, _rx) = InMemoryStore::new();
        let store = Arc::new(store);
        store
            .save("video.change", subscription("video.change", Arc::new(|_: &str| {})))
            .unwrap();
        let state = state_with(Arc::clone(&store));

        let (status, _) = call(
            &state,
            &[
                ("hub.mode", "subscribe"),
                ("hub.topic", "video.change"),
                ("hub.lease", "3600"),
            ],
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            store.get("video.change").unwrap().unwrap().lease,
            Duration::from_secs(600)
        );
    }

    #[tokio::test]
    async fn test_subscribe_invalid_lease() {
        let (store, _rx) = InMemoryStore::new();
        let store = Arc::new(store);
        store
            .save("video.change", subscription("video.change", Arc::new(|_: &str| {})))
            .unwrap();
        let state = state_with(Arc::clone(&store));

        for lease in ["", "0", "-5", "ten", "1.5"] {
            let (status, _) = call(
                &state,
                &[
                    ("hub.mode", "subscribe"),
                    ("hub.topic", "video.change"),
                    ("hub.challenge", "abc123"),
                    ("hub.lease", lease),
                ],
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "lease {:?}", lease);
        }
    }

    #[tokio::test]
    async fn test_subscribe_unknown_topic() {
        let (store, _rx) = InMemoryStore::new();
        let store = Arc::new(store);
        let state = state_with(Arc::clone(&store));

        let (status, _) = call(
            &state,
            &[
                ("hub.mode", "subscribe"),
                ("hub.topic", "video.change"),
                ("hub.challenge", "abc123"),
                ("hub.lease", "3600"),
            ],
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_deletes_even_without_challenge() {
        let (store, _rx) = InMemoryStore::new();
        let store = Arc::new(store);
        store
            .save("video.change", subscription("video.change", Arc::new(|_: &str| {})))
            .unwrap();
        let state = state_with(Arc::clone(&store));

        let (status, _) = call(
            &state,
            &[("hub.mode", "unsubscribe"), ("hub.topic", "video.change")],
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(store.get("video.change").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_topic_echoes_challenge() {
        let (store, _rx) = InMemoryStore::new();
        let state = state_with(Arc::new(store));

        let (status, body) = call(
            &state,
            &[
                ("hub.mode", "unsubscribe"),
                ("hub.topic", "video.change"),
                ("hub.challenge", "bye"),
            ],
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "bye");
    }

    #[tokio::test]
    async fn test_denied_invokes_callback_once_and_deletes() {
        let (store, _rx) = InMemoryStore::new();
        let store = Arc::new(store);
        let calls = Arc::new(AtomicUsize::new(0));
        let reasons = Arc::new(Mutex::new(Vec::new()));

        let on_denied = {
            let calls = Arc::clone(&calls);
            let reasons = Arc::clone(&reasons);
            Arc::new(move |reason: &str| {
                calls.fetch_add(1, Ordering::SeqCst);
                reasons.lock().unwrap().push(reason.to_string());
            })
        };
        store
            .save("video.change", subscription("video.change", on_denied))
            .unwrap();
        let state = state_with(Arc::clone(&store));

        let (status, _) = call(
            &state,
            &[
                ("hub.mode", "denied"),
                ("hub.topic", "video.change"),
                ("hub.reason", "unauthorized topic"),
            ],
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*reasons.lock().unwrap(), vec!["unauthorized topic".to_string()]);
        assert!(store.get("video.change").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_denied_unknown_topic() {
        let (store, _rx) = InMemoryStore::new();
        let state = state_with(Arc::new(store));

        let (status, _) = call(
            &state,
            &[("hub.mode", "denied"), ("hub.topic", "video.change")],
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
