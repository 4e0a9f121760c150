//! Inbound Alphabot webhooks.
//!
//! - [`events`]: payload shape and the event types this service acts on
//! - [`signing`]: HMAC-SHA256 digest over `{event}\n{timestamp}`
//! - [`verifier`]: parse + authenticate a raw request body

pub mod events;
pub mod signing;
pub mod verifier;

pub use events::{RaffleEventType, RaffleWebhookPayload};
pub use verifier::{VerificationError, WebhookVerifier};
