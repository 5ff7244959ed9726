//! Standard Webhooks signature verification.
//!
//! The payment provider and the identity provider both sign deliveries
//! with the Standard Webhooks scheme:
//!
//! - secret: `whsec_` prefix (optional) followed by base64 key bytes
//! - signed content: `{msg_id}.{timestamp}.{raw body}`
//! - signature header: space-separated `v1,<base64 HMAC-SHA256>` entries
//!
//! Only the header prefix differs (`webhook-*` vs `svix-*`).

use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretVec};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::errors::WebhookError;

/// Maximum allowed age of a signed timestamp (5 minutes).
const MAX_EVENT_AGE_SECS: i64 = 300;

/// Maximum allowed clock skew for timestamps in the future (5 minutes).
const MAX_CLOCK_SKEW_SECS: i64 = 300;

const SECRET_PREFIX: &str = "whsec_";
const SIGNATURE_VERSION: &str = "v1";

/// Which family of header names carries the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderScheme {
    /// `webhook-id`, `webhook-timestamp`, `webhook-signature`
    Standard,
    /// `svix-id`, `svix-timestamp`, `svix-signature`
    Svix,
}

impl HeaderScheme {
    fn names(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            HeaderScheme::Standard => ("webhook-id", "webhook-timestamp", "webhook-signature"),
            HeaderScheme::Svix => ("svix-id", "svix-timestamp", "svix-signature"),
        }
    }
}

/// The three signature headers of a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookHeaders {
    pub id: String,
    pub timestamp: String,
    pub signature: String,
}

impl WebhookHeaders {
    /// Extracts the headers; absent or blank values yield `MissingHeaders`.
    pub fn from_header_map(headers: &HeaderMap, scheme: HeaderScheme) -> Result<Self, WebhookError> {
        let (id, timestamp, signature) = scheme.names();
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or(WebhookError::MissingHeaders)
        };

        Ok(Self {
            id: read(id)?,
            timestamp: read(timestamp)?,
            signature: read(signature)?,
        })
    }
}

/// Verifier holding the decoded signing key.
///
/// Built once at startup from configuration and shared behind an `Arc`.
pub struct StandardWebhookVerifier {
    key: SecretVec<u8>,
}

impl std::fmt::Debug for StandardWebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardWebhookVerifier").finish_non_exhaustive()
    }
}

impl StandardWebhookVerifier {
    /// Decodes a `whsec_`-prefixed (or bare) base64 secret.
    ///
    /// # Errors
    ///
    /// `InvalidSecret` if the secret is blank or not base64.
    pub fn from_secret(secret: &str) -> Result<Self, WebhookError> {
        let encoded = secret.trim();
        let encoded = encoded.strip_prefix(SECRET_PREFIX).unwrap_or(encoded);
        if encoded.is_empty() {
            return Err(WebhookError::InvalidSecret("secret is empty".to_string()));
        }

        let key = BASE64
            .decode(encoded)
            .map_err(|e| WebhookError::InvalidSecret(e.to_string()))?;

        Ok(Self {
            key: SecretVec::new(key),
        })
    }

    /// Verifies a delivery against the current clock.
    pub fn verify(&self, headers: &WebhookHeaders, payload: &[u8]) -> Result<(), WebhookError> {
        self.verify_at(headers, payload, chrono::Utc::now().timestamp())
    }

    /// Verifies a delivery against an explicit clock reading.
    ///
    /// # Verification Steps
    ///
    /// 1. Parse and bound-check the signed timestamp
    /// 2. Compute the expected HMAC over `id.timestamp.body`
    /// 3. Accept if any `v1` entry matches in constant time
    pub fn verify_at(
        &self,
        headers: &WebhookHeaders,
        payload: &[u8],
        now_secs: i64,
    ) -> Result<(), WebhookError> {
        let timestamp: i64 = headers
            .timestamp
            .parse()
            .map_err(|_| WebhookError::InvalidTimestamp)?;
        validate_timestamp(timestamp, now_secs)?;

        let expected = self.compute_signature(&headers.id, timestamp, payload)?;

        let matched = headers
            .signature
            .split_whitespace()
            .filter_map(|entry| entry.split_once(','))
            .filter(|(version, _)| *version == SIGNATURE_VERSION)
            .filter_map(|(_, sig)| BASE64.decode(sig).ok())
            .any(|candidate| constant_time_compare(&expected, &candidate));

        if matched {
            Ok(())
        } else {
            Err(WebhookError::InvalidSignature)
        }
    }

    /// Produces a `v1,<base64>` signature header value.
    ///
    /// Used by test fixtures and local replay tooling.
    pub fn sign(&self, msg_id: &str, timestamp: i64, payload: &[u8]) -> Result<String, WebhookError> {
        let mac = self.compute_signature(msg_id, timestamp, payload)?;
        Ok(format!("{},{}", SIGNATURE_VERSION, BASE64.encode(mac)))
    }

    fn compute_signature(
        &self,
        msg_id: &str,
        timestamp: i64,
        payload: &[u8],
    ) -> Result<Vec<u8>, WebhookError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.key.expose_secret())
            .map_err(|e| WebhookError::InvalidSecret(e.to_string()))?;
        mac.update(msg_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn validate_timestamp(timestamp: i64, now_secs: i64) -> Result<(), WebhookError> {
    let age = now_secs
        .checked_sub(timestamp)
        .ok_or(WebhookError::InvalidTimestamp)?;

    if age > MAX_EVENT_AGE_SECS {
        return Err(WebhookError::TimestampOutOfRange);
    }
    if age < -MAX_CLOCK_SKEW_SECS {
        return Err(WebhookError::InvalidTimestamp);
    }
    Ok(())
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
