//! Participant-facing commands, independent of any chat platform.
//!
//! A chat bot parses `!setapikey`, `!removekey`, `!status`, `!joinraffle` and friends, calls the
//! matching method here with the caller's identity, and posts the returned text back. Nothing in
//! this module knows how messages arrive or leave.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::alphabot::{RaffleApi, RegistrationOutcome, RegistrationRequest};
use crate::notifications::format_outcome_message;
use crate::storage::CredentialStore;

/// Keys shorter than this are rejected as obviously mistyped.
pub const MIN_API_KEY_LEN: usize = 10;

const SET_KEY_HINT: &str = "Use `!setapikey YOUR_API_KEY` to get started.";

#[derive(Clone)]
pub struct CommandService {
    store: Arc<dyn CredentialStore>,
    api: Arc<dyn RaffleApi>,
}

impl CommandService {
    pub fn new(store: Arc<dyn CredentialStore>, api: Arc<dyn RaffleApi>) -> Self {
        Self { store, api }
    }

    /// Enrol a participant, or replace their key.
    #[instrument(skip(self, api_key))]
    pub async fn set_api_key(&self, participant_id: &str, api_key: Option<&str>) -> String {
        let Some(api_key) = api_key.map(str::trim).filter(|k| !k.is_empty()) else {
            return "❌ Please provide your Alphabot API key: `!setapikey YOUR_API_KEY`".to_string();
        };

        if api_key.chars().count() < MIN_API_KEY_LEN {
            return "❌ API key seems too short. Please check and try again.".to_string();
        }

        match self.store.set(participant_id, api_key).await {
            Ok(()) => "✅ Your Alphabot API key has been saved successfully!".to_string(),
            Err(e) => {
                error!(participant_id, error = %e, "Failed to save API key");
                "❌ Failed to save your API key. Please try again.".to_string()
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn remove_api_key(&self, participant_id: &str) -> String {
        match self.store.remove(participant_id).await {
            Ok(true) => "✅ Your Alphabot API key has been removed.".to_string(),
            Ok(false) => "❌ No API key found for your account.".to_string(),
            Err(e) => {
                error!(participant_id, error = %e, "Failed to remove API key");
                "❌ Failed to remove your API key. Please try again.".to_string()
            }
        }
    }

    pub async fn status(&self, participant_id: &str) -> String {
        if self.store.get(participant_id).await.is_none() {
            return format!("❌ You are not registered. {SET_KEY_HINT}");
        }

        let total = self.store.count().await;
        format!("✅ You are registered for automatic raffle entries!\n📊 Total registered users: {total}")
    }

    /// Manually enter one raffle with the participant's stored key.
    ///
    /// Returns the outcome alongside the reply so callers can log or count it.
    #[instrument(skip(self))]
    pub async fn join_raffle(&self, participant_id: &str, raffle_slug: Option<&str>) -> (String, Option<RegistrationOutcome>) {
        let Some(raffle_slug) = raffle_slug.map(str::trim).filter(|s| !s.is_empty()) else {
            return ("❌ Please provide a raffle slug: `!joinraffle RAFFLE_SLUG`".to_string(), None);
        };

        let Some(token) = self.store.get(participant_id).await else {
            return ("❌ You need to set your API key first: `!setapikey YOUR_API_KEY`".to_string(), None);
        };

        let request = RegistrationRequest::builder()
            .slug(raffle_slug)
            .discord_id(participant_id)
            .build();
        let outcome = self.api.register(&token, &request).await;

        if outcome.succeeded() {
            info!(participant_id, raffle_slug, "Participant manually joined raffle");
        } else {
            warn!(participant_id, raffle_slug, error = ?outcome.error_detail(), "Manual raffle join failed");
        }

        (format_outcome_message(&outcome), Some(outcome))
    }

    /// Look up a raffle with the participant's stored key.
    #[instrument(skip(self))]
    pub async fn raffle_info(&self, participant_id: &str, raffle_slug: Option<&str>) -> String {
        let Some(raffle_slug) = raffle_slug.map(str::trim).filter(|s| !s.is_empty()) else {
            return "❌ Please provide a raffle slug: `!raffleinfo RAFFLE_SLUG`".to_string();
        };

        let Some(token) = self.store.get(participant_id).await else {
            return "❌ You need to set your API key first: `!setapikey YOUR_API_KEY`".to_string();
        };

        match self.api.get_raffle_info(&token, raffle_slug).await {
            Ok(response) => describe_raffle(raffle_slug, &response.body),
            Err(e) => format!("❌ Could not fetch raffle `{raffle_slug}`: {}", e.detail()),
        }
    }
}

/// One-line summary of a raffle lookup. Alphabot wraps the raffle in `data` on most endpoints.
fn describe_raffle(raffle_slug: &str, body: &Value) -> String {
    let raffle = body.get("data").unwrap_or(body);
    let name = raffle.get("name").and_then(Value::as_str).unwrap_or(raffle_slug);

    match raffle.get("status").and_then(Value::as_str) {
        Some(status) => format!("🎟️ {name} (`{raffle_slug}`): {status}"),
        None => format!("🎟️ {name} (`{raffle_slug}`)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockRaffleApi, temp_store};
    use serde_json::json;

    async fn service(entries: &[(&str, &str)], api: MockRaffleApi) -> (tempfile::TempDir, CommandService, Arc<MockRaffleApi>) {
        let (dir, store) = temp_store(entries).await;
        let api = Arc::new(api);
        (dir, CommandService::new(store, api.clone()), api)
    }

    #[tokio::test]
    async fn test_set_api_key() {
        let (_dir, commands, _) = service(&[], MockRaffleApi::default()).await;

        let reply = commands.set_api_key("1001", Some("abcdefghij")).await;
        assert_eq!(reply, "✅ Your Alphabot API key has been saved successfully!");
        assert!(commands.status("1001").await.starts_with("✅"));
    }

    #[tokio::test]
    async fn test_set_api_key_rejects_missing_and_short_keys() {
        let (_dir, commands, _) = service(&[], MockRaffleApi::default()).await;

        assert!(commands.set_api_key("1001", None).await.contains("Please provide"));
        assert!(commands.set_api_key("1001", Some("   ")).await.contains("Please provide"));
        assert!(commands.set_api_key("1001", Some("short")).await.contains("too short"));
        assert!(commands.status("1001").await.starts_with("❌"));
    }

    #[tokio::test]
    async fn test_remove_api_key() {
        let (_dir, commands, _) = service(&[("1001", "key-1234567890")], MockRaffleApi::default()).await;

        assert_eq!(commands.remove_api_key("1001").await, "✅ Your Alphabot API key has been removed.");
        assert_eq!(commands.remove_api_key("1001").await, "❌ No API key found for your account.");
    }

    #[tokio::test]
    async fn test_status_reports_total() {
        let (_dir, commands, _) = service(&[("1001", "key-a"), ("1002", "key-b")], MockRaffleApi::default()).await;

        let reply = commands.status("1001").await;
        assert!(reply.contains("Total registered users: 2"), "{reply}");

        let reply = commands.status("9999").await;
        assert_eq!(reply, "❌ You are not registered. Use `!setapikey YOUR_API_KEY` to get started.");
    }

    #[tokio::test]
    async fn test_join_raffle_uses_stored_key() {
        let (_dir, commands, api) = service(&[("1001", "key-1234567890")], MockRaffleApi::default()).await;

        let (reply, outcome) = commands.join_raffle("1001", Some("abc")).await;

        assert_eq!(reply, "✅ Successfully joined raffle: `abc`!");
        assert!(outcome.unwrap().succeeded());
        let calls = api.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "key-1234567890");
        assert_eq!(calls[0].1.slug, "abc");
        assert_eq!(calls[0].1.discord_id, "1001");
    }

    #[tokio::test]
    async fn test_join_raffle_reports_failure() {
        let (_dir, commands, _) = service(&[("1001", "key-1234567890")], MockRaffleApi::failing_for(["1001"])).await;

        let (reply, outcome) = commands.join_raffle("1001", Some("abc")).await;

        assert_eq!(reply, "❌ Failed to join raffle `abc`: Raffle closed");
        assert!(!outcome.unwrap().succeeded());
    }

    #[tokio::test]
    async fn test_join_raffle_requires_key_and_slug() {
        let (_dir, commands, api) = service(&[], MockRaffleApi::default()).await;

        let (reply, outcome) = commands.join_raffle("1001", Some("abc")).await;
        assert!(reply.contains("set your API key first"));
        assert!(outcome.is_none());

        let (reply, _) = commands.join_raffle("1001", None).await;
        assert!(reply.contains("provide a raffle slug"));

        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_raffle_info() {
        let (_dir, commands, _) = service(&[("1001", "key-1234567890")], MockRaffleApi::failing_for(["gone"])).await;

        assert_eq!(commands.raffle_info("1001", Some("abc")).await, "🎟️ Mock Raffle (`abc`): active");
        assert_eq!(
            commands.raffle_info("1001", Some("gone")).await,
            "❌ Could not fetch raffle `gone`: Raffle not found"
        );
        assert!(commands.raffle_info("2002", Some("abc")).await.contains("set your API key first"));
    }

    #[test]
    fn test_describe_raffle_shapes() {
        assert_eq!(describe_raffle("abc", &json!({"name": "Top Level"})), "🎟️ Top Level (`abc`)");
        assert_eq!(describe_raffle("abc", &json!({})), "🎟️ abc (`abc`)");
    }
}
