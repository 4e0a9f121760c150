//! Authenticity check for inbound Alphabot webhooks.
//!
//! # Development-mode bypass
//!
//! When no webhook secret is configured, **every structurally valid payload is accepted**. This
//! lets the relay run locally against hand-crafted requests, but it also means anyone who can
//! reach the endpoint can trigger a fan-out. Production deployments must set `webhook.secret`
//! (or `ALPHABOT_WEBHOOK_SECRET`). A warning is logged on every bypassed request.

use tracing::{debug, warn};

use super::events::RaffleWebhookPayload;
use super::signing;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VerificationError {
    /// The body is not a JSON object of the expected shape
    #[error("Invalid JSON: {0}")]
    Malformed(String),

    #[error("Webhook payload has no digest")]
    MissingDigest,

    #[error("Webhook digest does not match")]
    DigestMismatch,
}

#[derive(Debug, Clone, Default)]
pub struct WebhookVerifier {
    secret: Option<String>,
}

impl WebhookVerifier {
    /// Build a verifier. An empty secret counts as no secret.
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    /// Whether requests are being accepted without a digest check.
    pub fn is_bypassed(&self) -> bool {
        self.secret.is_none()
    }

    /// Parse the raw body and check its digest.
    ///
    /// Parsing comes first so that garbage is reported as malformed even when no secret is set.
    pub fn verify(&self, body: &[u8]) -> Result<RaffleWebhookPayload, VerificationError> {
        let payload: RaffleWebhookPayload =
            serde_json::from_slice(body).map_err(|e| VerificationError::Malformed(e.to_string()))?;

        let Some(secret) = &self.secret else {
            warn!(event = %payload.event, "No webhook secret configured, skipping verification");
            return Ok(payload);
        };

        let digest = payload.hash.as_deref().ok_or(VerificationError::MissingDigest)?;
        let timestamp = payload.canonical_timestamp();

        if !signing::verify_digest(secret, &payload.event, &timestamp, digest) {
            return Err(VerificationError::DigestMismatch);
        }

        debug!(event = %payload.event, "Webhook digest verified");
        Ok(payload)
    }
}
