//! Discord direct-message sink.
//!
//! Uses the REST API directly: open (or reuse) the DM channel with the participant, then post
//! the message into it. Participant ids are Discord user snowflakes.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use super::NotificationSink;
use crate::config::DiscordConfig;

#[derive(Serialize)]
struct CreateDmRequest<'a> {
    recipient_id: &'a str,
}

#[derive(Deserialize)]
struct DmChannel {
    id: String,
}

#[derive(Serialize)]
struct CreateMessageRequest<'a> {
    content: &'a str,
}

pub struct DiscordSink {
    client: Client,
    api_base_url: Url,
}

impl DiscordSink {
    pub fn new(config: &DiscordConfig) -> anyhow::Result<Self> {
        if config.api_base_url.cannot_be_a_base() {
            anyhow::bail!("Discord API URL {} cannot be used as a base", config.api_base_url);
        }

        let mut auth = HeaderValue::from_str(&format!("Bot {}", config.bot_token)).context("Discord bot token is not a valid header value")?;
        auth.set_sensitive(true);
        let mut default_headers = HeaderMap::new();
        default_headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(config.request_timeout)
            .default_headers(default_headers)
            .build()?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn open_dm_channel(&self, participant_id: &str) -> anyhow::Result<String> {
        let channel: DmChannel = self
            .client
            .post(self.endpoint(&["users", "@me", "channels"]))
            .json(&CreateDmRequest {
                recipient_id: participant_id,
            })
            .send()
            .await?
            .error_for_status()
            .context("Failed to open DM channel")?
            .json()
            .await?;
        Ok(channel.id)
    }
}

#[async_trait]
impl NotificationSink for DiscordSink {
    #[instrument(skip(self, message))]
    async fn send(&self, participant_id: &str, message: &str) -> anyhow::Result<()> {
        let channel_id = self.open_dm_channel(participant_id).await?;

        self.client
            .post(self.endpoint(&["channels", &channel_id, "messages"]))
            .json(&CreateMessageRequest { content: message })
            .send()
            .await?
            .error_for_status()
            .context("Failed to post DM")?;

        debug!(channel_id, "Sent Discord notification");
        Ok(())
    }
}
