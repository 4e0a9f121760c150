use async_trait::async_trait;
use tracing::info;

use super::NotificationSink;

/// Writes notifications to the log. Used when no chat platform is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, participant_id: &str, message: &str) -> anyhow::Result<()> {
        info!(participant_id, message, "Participant notification");
        Ok(())
    }
}
