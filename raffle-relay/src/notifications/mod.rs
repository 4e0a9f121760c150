//! Per-participant result delivery.
//!
//! The fan-out orchestrator hands every [`RegistrationOutcome`] to a [`NotificationSink`] once
//! the run is over. Delivery is best effort: a sink error is logged by the caller and never
//! affects the webhook response or sibling notifications.

use std::sync::Arc;

use async_trait::async_trait;

use crate::alphabot::RegistrationOutcome;
use crate::config::NotificationsConfig;

pub mod discord;
pub mod log;

pub use discord::DiscordSink;
pub use log::LogSink;

/// Something that can put a message in front of a participant.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, participant_id: &str, message: &str) -> anyhow::Result<()>;
}

/// Create the sink selected by configuration.
///
/// Falls back to [`LogSink`] when no chat platform is configured.
pub fn create_sink(config: &NotificationsConfig) -> anyhow::Result<Arc<dyn NotificationSink>> {
    match &config.discord {
        Some(discord) => Ok(Arc::new(DiscordSink::new(discord)?)),
        None => Ok(Arc::new(LogSink)),
    }
}

/// Text shown to a participant for one registration attempt.
pub fn format_outcome_message(outcome: &RegistrationOutcome) -> String {
    match &outcome.result {
        Ok(_) => format!("✅ Successfully joined raffle: `{}`!", outcome.raffle_slug),
        Err(e) => format!("❌ Failed to join raffle `{}`: {}", outcome.raffle_slug, e.detail()),
    }
}
