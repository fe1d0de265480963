//! Subscription ids: the topic behind a short random prefix, base64url-encoded.
//!
//! The id is what the hub sees as the last segment of the callback URL. The
//! prefix only makes the path unguessable; the topic is recoverable from the
//! id, so nothing has to be indexed by id.

use std::fmt;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{Result, WebhookError};

const PREFIX_BYTES: usize = 4;

/// URL-safe alphabet, unpadded on encode, padding accepted on decode.
const ID_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Opaque, URL-safe token identifying a subscription's callback path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Mint a fresh id for `topic`.
    pub fn new(topic: &str) -> std::result::Result<Self, rand::Error> {
        let mut buf = Vec::with_capacity(PREFIX_BYTES + topic.len());
        buf.resize(PREFIX_BYTES, 0);
        OsRng.try_fill_bytes(&mut buf)?;
        buf.extend_from_slice(topic.as_bytes());
        Ok(Self(ID_ENGINE.encode(buf)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the topic this id was minted for.
    pub fn topic(&self) -> Result<String> {
        id_to_topic(&self.0)
    }
}

impl From<String> for SubscriptionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decode a callback path segment back into its topic.
pub fn id_to_topic(id: &str) -> Result<String> {
    let bytes = ID_ENGINE
        .decode(id)
        .map_err(|e| WebhookError::MalformedId(e.to_string()))?;

    if bytes.len() < PREFIX_BYTES {
        return Err(WebhookError::MalformedId(format!(
            "decoded id is {} bytes, shorter than its {} byte prefix",
            bytes.len(),
            PREFIX_BYTES
        )));
    }

    String::from_utf8(bytes[PREFIX_BYTES..].to_vec())
        .map_err(|_| WebhookError::MalformedId("topic is not valid UTF-8".to_string()))
}
