//! Inbound Alphabot webhook payloads and event types.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::types::RaffleSlug;

/// Webhook event types this service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaffleEventType {
    /// Raffle opened for entries
    RaffleActive,
}

impl std::fmt::Display for RaffleEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RaffleActive => write!(f, "raffle:active"),
        }
    }
}

impl std::str::FromStr for RaffleEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raffle:active" => Ok(Self::RaffleActive),
            _ => Err(format!("Unknown event type: {}", s)),
        }
    }
}

/// Raffle details carried in `data.raffle`.
#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
pub struct Raffle {
    #[serde(default)]
    pub slug: Option<RaffleSlug>,
    #[serde(default)]
    pub name: Option<String>,
    /// Other descriptive fields, kept only for logging
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, ToSchema)]
pub struct RaffleEventData {
    #[serde(default)]
    pub raffle: Option<Raffle>,
}

/// Complete inbound webhook payload.
///
/// Every field is optional at the parsing stage: a missing digest is a verification failure
/// (401), not a malformed payload (400).
#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
pub struct RaffleWebhookPayload {
    /// Event name, e.g. `raffle:active`
    #[serde(default)]
    pub event: String,
    /// Epoch milliseconds. Signed exactly as sent.
    #[serde(default)]
    #[schema(value_type = Option<i64>)]
    pub timestamp: Option<Value>,
    /// Lowercase hex HMAC-SHA256 over `{event}\n{timestamp}`
    #[serde(default, alias = "digest")]
    pub hash: Option<String>,
    #[serde(default)]
    pub data: Option<RaffleEventData>,
}

impl RaffleWebhookPayload {
    /// Parsed event type, or `None` for events this service ignores.
    pub fn event_type(&self) -> Option<RaffleEventType> {
        self.event.parse().ok()
    }

    /// Timestamp rendered the way it appears in the signed string.
    pub fn canonical_timestamp(&self) -> String {
        match &self.timestamp {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    pub fn raffle(&self) -> Option<&Raffle> {
        self.data.as_ref()?.raffle.as_ref()
    }

    /// The raffle slug, if present and non-empty.
    pub fn raffle_slug(&self) -> Option<&str> {
        self.raffle()?.slug.as_deref().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_from_str() {
        assert_eq!(
            "raffle:active".parse::<RaffleEventType>().unwrap(),
            RaffleEventType::RaffleActive
        );
        assert!("raffle:ended".parse::<RaffleEventType>().is_err());
        assert_eq!(RaffleEventType::RaffleActive.to_string(), "raffle:active");
    }

    #[test]
    fn test_payload_deserialization() {
        let payload: RaffleWebhookPayload = serde_json::from_value(json!({
            "event": "raffle:active",
            "timestamp": 1000,
            "hash": "abc123",
            "data": {"raffle": {"slug": "abc", "name": "Test Raffle", "winners": 5}}
        }))
        .unwrap();

        assert_eq!(payload.event_type(), Some(RaffleEventType::RaffleActive));
        assert_eq!(payload.canonical_timestamp(), "1000");
        assert_eq!(payload.hash.as_deref(), Some("abc123"));
        assert_eq!(payload.raffle_slug(), Some("abc"));

        let raffle = payload.raffle().unwrap();
        assert_eq!(raffle.name.as_deref(), Some("Test Raffle"));
        assert_eq!(raffle.extra.get("winners"), Some(&json!(5)));
    }

    #[test]
    fn test_digest_alias() {
        let payload: RaffleWebhookPayload =
            serde_json::from_value(json!({"event": "raffle:active", "digest": "d1"})).unwrap();
        assert_eq!(payload.hash.as_deref(), Some("d1"));
    }

    #[test]
    fn test_canonical_timestamp_forms() {
        let parse = |v: Value| serde_json::from_value::<RaffleWebhookPayload>(v).unwrap();

        assert_eq!(parse(json!({"event": "e", "timestamp": 1704067200000u64})).canonical_timestamp(), "1704067200000");
        assert_eq!(parse(json!({"event": "e", "timestamp": "1000"})).canonical_timestamp(), "1000");
        assert_eq!(parse(json!({"event": "e"})).canonical_timestamp(), "");
        assert_eq!(parse(json!({"event": "e", "timestamp": null})).canonical_timestamp(), "");
    }

    #[test]
    fn test_missing_slug() {
        let parse = |v: Value| serde_json::from_value::<RaffleWebhookPayload>(v).unwrap();

        assert_eq!(parse(json!({"event": "raffle:active"})).raffle_slug(), None);
        assert_eq!(parse(json!({"event": "raffle:active", "data": {}})).raffle_slug(), None);
        assert_eq!(
            parse(json!({"event": "raffle:active", "data": {"raffle": {"name": "x"}}})).raffle_slug(),
            None
        );
        assert_eq!(
            parse(json!({"event": "raffle:active", "data": {"raffle": {"slug": ""}}})).raffle_slug(),
            None
        );
    }

    #[test]
    fn test_unknown_event_type() {
        let payload: RaffleWebhookPayload = serde_json::from_value(json!({"event": "raffle:ended"})).unwrap();
        assert_eq!(payload.event_type(), None);
    }
}
