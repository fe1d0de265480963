//! Web server module for the hub's callbacks.
//!
//! This module provides:
//! - The handshake endpoint the hub calls to confirm or deny subscriptions
//! - The notification endpoint that verifies signatures before delivery
//! - A health check
//!
//! Both callback endpoints live on the same per-subscription URL:
//! `<callback base path>/<subscription id>`.

pub mod handlers;
pub mod signature;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use url::Url;

pub use handlers::{
    confirmation, health, notification, AppState, DeliveryCallback, HealthResponse,
    Notification,
};
pub use signature::{
    verify_signature, SignatureCheck, SignatureStatus, SignatureValidator, SIGNATURE_HEADER,
};

/// Path prefix used when no callback base URL is configured.
pub const DEFAULT_CALLBACK_PATH: &str = "/callbacks";

/// Build the router serving the health check and the callback endpoints.
pub fn router(state: AppState) -> Router {
    let route = callback_route(state.config.callback_base_url.as_deref());

    Router::new()
        .route("/health", get(health))
        .route(&route, get(confirmation).post(notification))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Route pattern matching `<base path>/<id>` for the configured callback base URL.
fn callback_route(base_url: Option<&str>) -> String {
    let path = base_url
        .and_then(|base| Url::parse(base).ok())
        .map(|url| url.path().trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_CALLBACK_PATH.to_string());

    format!("{}/:id", path)
}
