//! WebSub Server - subscribes to hub topics and receives their notifications.
//!
//! This binary:
//! - Subscribes to every configured topic on startup
//! - Answers the hub's handshake on the callback URL
//! - Verifies and logs signed notifications
//! - Renews subscriptions when their lease elapses
//! - Unsubscribes everything on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use websub::web::{self, AppState, Notification};
use websub::{Config, HubClient, InMemoryStore, SubscriptionRequest, SubscriptionStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("websub_server_starting");

    // Load configuration
    let config = Arc::new(Config::from_env());
    info!(
        port = config.port,
        hub_url = %config.hub_url,
        credentials_configured = config.has_credentials(),
        callback_base_url = ?config.callback_base_url,
        topic_count = config.topics.as_ref().map(|t| t.len()).unwrap_or(0),
        lease_seconds = config.lease_seconds,
        require_signature = config.require_signature,
        "config_loaded"
    );

    // Store and hub client; the renewal worker drains expired leases
    let (store, renewals) = InMemoryStore::new();
    let store: Arc<dyn SubscriptionStore> = Arc::new(store);
    let hub = Arc::new(HubClient::new(Arc::clone(&config), Arc::clone(&store)));
    tokio::spawn(Arc::clone(&hub).run_renewals(renewals));

    // Create application state
    let delivery = Arc::new(|notification: Notification| {
        info!(
            topic = %notification.topic,
            body_length = notification.body.len(),
            "notification_delivered"
        );
    });
    let state = AppState::new(Arc::clone(&config), Arc::clone(&store), delivery);
    let app = web::router(state);

    // Bind before subscribing so the hub's confirmation can reach us
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "websub_server_listening");

    let topics = configured_topics(&config);
    subscribe_all(&hub, &config, &topics);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    unsubscribe_all(&hub, &topics).await;

    info!("websub_server_shutdown_complete");

    Ok(())
}

fn configured_topics(config: &Config) -> Vec<String> {
    match (&config.callback_base_url, &config.topics) {
        (Some(_), Some(topics)) => topics.clone(),
        (None, Some(topics)) if !topics.is_empty() => {
            warn!("callback_base_url_missing_topics_ignored");
            Vec::new()
        }
        _ => Vec::new(),
    }
}

/// Kick off a subscribe for every topic without waiting on the hub.
fn subscribe_all(hub: &Arc<HubClient>, config: &Config, topics: &[String]) {
    let Some(base_url) = config.callback_base_url.clone() else {
        return;
    };

    for topic in topics {
        let hub = Arc::clone(hub);
        let request = SubscriptionRequest::new(
            topic.clone(),
            base_url.clone(),
            Duration::from_secs(config.lease_seconds),
        );
        let denied_topic = topic.clone();

        tokio::spawn(async move {
            let on_denied = Arc::new(move |reason: &str| {
                error!(topic = %denied_topic, reason = %reason, "subscription_denied");
            });

            match hub.subscribe(request.clone(), on_denied).await {
                Ok(()) => info!(topic = %request.topic, "subscription_requested"),
                Err(e) => error!(topic = %request.topic, error = %e, "subscription_request_failed"),
            }
        });
    }
}

async fn unsubscribe_all(hub: &HubClient, topics: &[String]) {
    let results = futures::future::join_all(topics.iter().map(|topic| hub.unsubscribe(topic))).await;

    for (topic, result) in topics.iter().zip(results) {
        match result {
            Ok(()) => info!(topic = %topic, "unsubscribed"),
            Err(e) => warn!(topic = %topic, error = %e, "unsubscribe_failed"),
        }
    }
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("websub_server_shutting_down");
}
