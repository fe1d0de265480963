//! OAuth2 client-credentials token source for authenticated hub calls.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

use crate::error::{Result, WebhookError};

/// Refresh tokens this long before the endpoint says they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Longer lifetimes are clamped to this.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(86_400 * 365);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Fetches and caches app access tokens.
///
/// Credentials are sent in the form body rather than a basic-auth header,
/// which is what the hub's token endpoint expects.
pub struct TokenSource {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenSource {
    pub fn new(http: Client, token_url: String, client_id: String, client_secret: String) -> Self {
        Self {
            http,
            token_url,
            client_id,
            client_secret,
            cached: Mutex::new(None),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Return a valid access token, fetching a new one if needed.
    pub async fn bearer(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + REFRESH_MARGIN {
                return Ok(token.value.clone());
            }
        }

        let token = self.fetch().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn fetch(&self) -> Result<AccessToken> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(WebhookError::Credentials(format!(
                "token endpoint returned {}",
                status
            )));
        }

        let token: TokenResponse = serde_json::from_slice(&body).map_err(|e| {
            WebhookError::Credentials(format!("unparsable token response: {}", e))
        })?;

        let lifetime = token
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME)
            .min(MAX_TOKEN_LIFETIME);

        info!(
            expires_in_seconds = lifetime.as_secs(),
            "hub_access_token_fetched"
        );

        Ok(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + lifetime,
        })
    }
}
