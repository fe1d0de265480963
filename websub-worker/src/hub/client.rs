//! Outbound hub client: subscribe, unsubscribe and lease renewal.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use tokio::sync::OnceCell;
use tracing::{error, info, warn};
use url::Url;

use super::credentials::TokenSource;
use super::id::SubscriptionId;
use super::types::{subscribe_form, unsubscribe_form, ProviderError, SubscriptionRequest};
use crate::error::{Result, WebhookError};
use crate::store::{DenialCallback, Renewal, RenewalReceiver, Secret, Subscription, SubscriptionStore};
use crate::Config;

/// HTTP plumbing built on first use.
struct HubSession {
    http: Client,
    credentials: Option<TokenSource>,
}

/// Client for the hub's subscribe/unsubscribe endpoint.
///
/// The HTTP client and token source are created lazily by the first call
/// and shared by every call after it.
pub struct HubClient {
    config: Arc<Config>,
    store: Arc<dyn SubscriptionStore>,
    session: OnceCell<HubSession>,
}

impl HubClient {
    pub fn new(config: Arc<Config>, store: Arc<dyn SubscriptionStore>) -> Self {
        Self {
            config,
            store,
            session: OnceCell::new(),
        }
    }

    async fn session(&self) -> Result<&HubSession> {
        self.session
            .get_or_try_init(|| async {
                let http = Client::builder()
                    .timeout(Duration::from_millis(self.config.request_timeout_ms))
                    .build()?;

                let credentials = match (&self.config.client_id, &self.config.client_secret) {
                    (Some(id), Some(secret)) => Some(TokenSource::new(
                        http.clone(),
                        self.config.token_url.clone(),
                        id.clone(),
                        secret.clone(),
                    )),
                    _ => None,
                };

                info!(
                    hub_url = %self.config.hub_url,
                    credentials_configured = credentials.is_some(),
                    "hub_session_initialized"
                );

                Ok::<_, WebhookError>(HubSession { http, credentials })
            })
            .await
    }

    async fn post_form(&self, form: &[(&'static str, String)]) -> Result<Response> {
        let session = self.session().await?;
        let mut request = session.http.post(&self.config.hub_url).form(form);

        if let Some(credentials) = &session.credentials {
            let token = credentials.bearer().await?;
            request = request
                .bearer_auth(token)
                .header("Client-ID", credentials.client_id());
        }

        Ok(request.send().await?)
    }

    /// Ask the hub to subscribe to `request.topic`.
    ///
    /// On `202 Accepted` the subscription is saved with the requested lease
    /// and its lease timer is armed; the hub confirms asynchronously through
    /// the callback endpoint.
    pub async fn subscribe(
        &self,
        request: SubscriptionRequest,
        on_denied: DenialCallback,
    ) -> Result<()> {
        let base = request.validate()?;
        let id = SubscriptionId::new(&request.topic)?;
        let secret = Secret::generate()?;
        let callback_url = callback_url(&base, &id)?;

        let subscription = Subscription {
            topic: request.topic.clone(),
            callback_url: callback_url.to_string(),
            lease: request.lease,
            secret,
            renewal: Renewal::new(request, on_denied),
        };

        info!(
            topic = %subscription.topic,
            callback_url = %subscription.callback_url,
            lease_seconds = subscription.lease.as_secs(),
            "hub_subscribe_sending"
        );

        let response = self.post_form(&subscribe_form(&subscription)).await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status != StatusCode::ACCEPTED {
            return Err(provider_error(status, &body));
        }

        let topic = subscription.topic.clone();
        self.store.save(&topic, subscription)?;

        info!(topic = %topic, "hub_subscribe_accepted");
        Ok(())
    }

    /// Drop the local subscription for `topic` and ask the hub to unsubscribe.
    ///
    /// The local record is removed before the hub is contacted, so it is gone
    /// even when the hub call fails.
    pub async fn unsubscribe(&self, topic: &str) -> Result<()> {
        let subscription = self
            .store
            .delete(topic)?
            .ok_or_else(|| WebhookError::NotFound(topic.to_string()))?;

        info!(topic = %topic, "hub_unsubscribe_sending");

        let response = self.post_form(&unsubscribe_form(&subscription)).await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.bytes().await?;
            return Err(provider_error(status, &body));
        }

        info!(topic = %topic, status_code = status.as_u16(), "hub_unsubscribe_accepted");
        Ok(())
    }

    /// Redo the subscribe handshake for every renewal the store emits.
    ///
    /// Runs until the store (the channel's sender) is dropped. Each renewal
    /// runs on its own task; failures are logged and not retried.
    pub async fn run_renewals(self: Arc<Self>, mut renewals: RenewalReceiver) {
        info!("renewal_worker_started");

        while let Some(renewal) = renewals.recv().await {
            let client = Arc::clone(&self);

            tokio::spawn(async move {
                let topic = renewal.topic().to_string();
                info!(topic = %topic, "subscription_renewing");

                if let Err(e) = client.subscribe(renewal.request, renewal.on_denied).await {
                    error!(topic = %topic, error = %e, "subscription_renewal_failed");
                }
            });
        }

        info!("renewal_worker_stopped");
    }
}

/// Append `id` as the final path segment of `base`.
fn callback_url(base: &Url, id: &SubscriptionId) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| {
            WebhookError::Validation(format!("callback base URL cannot carry a path: {}", base))
        })?
        .pop_if_empty()
        .push(id.as_str());
    Ok(url)
}

fn provider_error(status: StatusCode, body: &[u8]) -> WebhookError {
    match serde_json::from_slice::<ProviderError>(body) {
        Ok(err) => {
            warn!(
                status_code = status.as_u16(),
                error = %err.error,
                message = %err.message,
                "hub_request_rejected"
            );
            WebhookError::Provider(err)
        }
        Err(source) => {
            warn!(
                status_code = status.as_u16(),
                body_length = body.len(),
                "hub_error_body_unparsable"
            );
            WebhookError::MalformedProviderResponse {
                status: status.as_u16(),
                source,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_url_appends_id() {
        let id = SubscriptionId::from("AQIDBHRvcGlj".to_string());

        let base = Url::parse("https://example.com/callbacks").unwrap();
        assert_eq!(
            callback_url(&base, &id).unwrap().as_str(),
            "https://example.com/callbacks/AQIDBHRvcGlj"
        );

        let base = Url::parse("https://example.com/callbacks/").unwrap();
        assert_eq!(
            callback_url(&base, &id).unwrap().as_str(),
            "https://example.com/callbacks/AQIDBHRvcGlj"
        );

        let base = Url::parse("https://example.com").unwrap();
        assert_eq!(
            callback_url(&base, &id).unwrap().as_str(),
            "https://example.com/AQIDBHRvcGlj"
        );
    }

    #[test]
    fn test_provider_error_kinds() {
        let body = br#"{"error":"Bad Request","status":400,"message":"invalid hub.topic"}"#;
        match provider_error(StatusCode::BAD_REQUEST, body) {
            WebhookError::Provider(err) => assert_eq!(err.message, "invalid hub.topic"),
            other => panic!("expected provider error, got {:?}", other),
        }

        match provider_error(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>") {
            WebhookError::MalformedProviderResponse { status, .. } => assert_eq!(status, 502),
            other => panic!("expected malformed response, got {:?}", other),
        }
    }
}
