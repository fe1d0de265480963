//! Configuration module for environment variable parsing.
//!
//! Reads all configuration from environment variables. Every field has a
//! default so the server starts with nothing set, though it will not
//! subscribe to anything without `CALLBACK_BASE_URL` and `SUBSCRIBE_TOPICS`.

use std::env;
use std::str::FromStr;
use tracing::warn;

/// Default hub endpoint for subscribe/unsubscribe requests.
pub const DEFAULT_HUB_URL: &str = "https://api.twitch.tv/helix/webhooks/hub";

/// Default OAuth2 token endpoint for the client-credentials grant.
pub const DEFAULT_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Hub endpoint that accepts form-encoded subscribe/unsubscribe requests
    pub hub_url: String,

    /// OAuth2 token endpoint used when client credentials are configured
    pub token_url: String,

    /// OAuth2 client id, also sent to the hub as `Client-ID`
    pub client_id: Option<String>,

    /// OAuth2 client secret
    pub client_secret: Option<String>,

    /// Public base URL the hub calls back on; subscription ids are appended to it
    pub callback_base_url: Option<String>,

    /// Topics to subscribe to at startup
    pub topics: Option<Vec<String>>,

    /// Requested lease in seconds
    pub lease_seconds: u64,

    /// HTTP request timeout in milliseconds for hub and token calls
    pub request_timeout_ms: u64,

    /// Reject notifications that carry no signature header
    pub require_signature: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            hub_url: DEFAULT_HUB_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            client_id: None,
            client_secret: None,
            callback_base_url: None,
            topics: None,
            lease_seconds: 864_000, // 10 days, the hub's maximum
            request_timeout_ms: 8000,
            require_signature: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            port: parse_var("PORT", defaults.port),

            hub_url: env::var("HUB_URL").unwrap_or(defaults.hub_url),

            token_url: env::var("OAUTH_TOKEN_URL").unwrap_or(defaults.token_url),

            client_id: non_empty_var("OAUTH_CLIENT_ID"),

            client_secret: non_empty_var("OAUTH_CLIENT_SECRET"),

            callback_base_url: non_empty_var("CALLBACK_BASE_URL"),

            topics: parse_csv("SUBSCRIBE_TOPICS"),

            lease_seconds: parse_var("LEASE_SECONDS", defaults.lease_seconds),

            request_timeout_ms: parse_var("REQUEST_TIMEOUT_MS", defaults.request_timeout_ms),

            require_signature: parse_var("REQUIRE_SIGNATURE", defaults.require_signature),
        }
    }

    /// Whether outbound hub calls should carry OAuth2 credentials.
    pub fn has_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }
}

/// Parse a variable, warning and falling back to `default` on bad input.
fn parse_var<T: FromStr + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a comma-separated list of strings.
fn parse_csv(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}
