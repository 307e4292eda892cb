//! Request signing for authenticated exchange endpoints.
//!
//! Each request is signed with HMAC-SHA256 over `timestamp ‖ method ‖ path`
//! using the account's private signing secret. The signature, key id, and
//! timestamp travel in headers. Credentials never appear in logs: the
//! Debug impl redacts them.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use sha2::Sha256;

use tempest_common::CoreError;

type HmacSha256 = Hmac<Sha256>;

const HEADER_KEY: &str = "ex-access-key";
const HEADER_SIGNATURE: &str = "ex-access-signature";
const HEADER_TIMESTAMP: &str = "ex-access-timestamp";

/// Exchange API credentials.
#[derive(Clone)]
pub struct Credentials {
    pub api_key_id: String,
    /// Base64-encoded signing secret.
    pub signing_secret: String,
}

impl Credentials {
    pub fn new(api_key_id: String, signing_secret: String) -> Self {
        Self {
            api_key_id,
            signing_secret,
        }
    }

    /// Load from environment variables (`EXCHANGE_API_KEY_ID`,
    /// `EXCHANGE_SIGNING_SECRET`).
    pub fn from_env() -> Result<Self, CoreError> {
        let api_key_id = std::env::var("EXCHANGE_API_KEY_ID")
            .map_err(|_| CoreError::Config("EXCHANGE_API_KEY_ID not set".into()))?;
        let signing_secret = std::env::var("EXCHANGE_SIGNING_SECRET")
            .map_err(|_| CoreError::Config("EXCHANGE_SIGNING_SECRET not set".into()))?;
        Ok(Self::new(api_key_id, signing_secret))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key_id", &self.api_key_id)
            .field("signing_secret", &"<redacted>")
            .finish()
    }
}

/// Signs requests for the exchange API.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: Credentials,
}

impl RequestSigner {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Produce auth headers for a request at `timestamp_ms`.
    pub fn headers(
        &self,
        method: &str,
        path: &str,
        timestamp_ms: i64,
    ) -> Result<HeaderMap, CoreError> {
        let message = format!("{}{}{}", timestamp_ms, method.to_uppercase(), path);
        let signature = self.sign(&message)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HEADER_KEY,
            HeaderValue::from_str(&self.credentials.api_key_id)
                .map_err(|e| CoreError::Auth(format!("invalid key id: {}", e)))?,
        );
        headers.insert(
            HEADER_SIGNATURE,
            HeaderValue::from_str(&signature)
                .map_err(|e| CoreError::Auth(format!("invalid signature: {}", e)))?,
        );
        headers.insert(
            HEADER_TIMESTAMP,
            HeaderValue::from_str(&timestamp_ms.to_string())
                .map_err(|e| CoreError::Auth(format!("invalid timestamp: {}", e)))?,
        );
        Ok(headers)
    }

    fn sign(&self, message: &str) -> Result<String, CoreError> {
        let secret_bytes = BASE64
            .decode(&self.credentials.signing_secret)
            .map_err(|e| CoreError::Auth(format!("invalid secret encoding: {}", e)))?;

        let mut mac = HmacSha256::new_from_slice(&secret_bytes)
            .map_err(|e| CoreError::Auth(format!("HMAC init failed: {}", e)))?;
        mac.update(message.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}
