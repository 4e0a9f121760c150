//! HTTP client for the Alphabot raffle API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::models::{ApiError, ApiResult, RegistrationOutcome, RegistrationRequest, classify_response};
use crate::config::AlphabotConfig;

/// The operations the rest of the crate needs from Alphabot.
///
/// [`AlphabotClient`] is the real implementation; the seam exists so the fan-out and command
/// paths can be exercised without a live upstream.
#[async_trait]
pub trait RaffleApi: Send + Sync {
    /// Enter one participant into a raffle using their own API key.
    ///
    /// Never fails outright: transport problems, rate limiting and upstream rejections all come
    /// back as a failed [`RegistrationOutcome`].
    async fn register(&self, token: &str, request: &RegistrationRequest) -> RegistrationOutcome;

    /// Fetch raffle details (`GET /raffles/{slug}`).
    async fn get_raffle_info(&self, token: &str, raffle_slug: &str) -> ApiResult;
}

pub struct AlphabotClient {
    client: Client,
    base_url: Url,
    default_retry_after: Duration,
    max_retry_after: Duration,
}

impl AlphabotClient {
    pub fn new(config: &AlphabotConfig) -> anyhow::Result<Self> {
        if config.base_url.cannot_be_a_base() {
            anyhow::bail!("Alphabot base URL {} cannot be used as a base", config.base_url);
        }

        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(default_headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            default_retry_after: config.default_retry_after,
            max_retry_after: config.max_retry_after,
        })
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // `new` rejects cannot-be-a-base URLs, so this always succeeds
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send a request, and if Alphabot answers 429, wait as instructed and send it exactly once
    /// more. Whatever the second attempt returns is final.
    async fn send_with_rate_limit<F>(&self, build: F) -> ApiResult
    where
        F: Fn() -> RequestBuilder,
    {
        let mut response = send(build()).await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let wait = self.retry_delay(response.headers());
            warn!(wait = ?wait, "Rate limited by Alphabot, retrying once");
            tokio::time::sleep(wait).await;
            response = send(build()).await?;
        }

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        classify_response(status, &body)
    }

    fn retry_delay(&self, headers: &HeaderMap) -> Duration {
        let header = headers.get(RETRY_AFTER).and_then(|v| v.to_str().ok());
        parse_retry_after(header)
            .unwrap_or(self.default_retry_after)
            .min(self.max_retry_after)
    }
}

async fn send(request: RequestBuilder) -> Result<Response, ApiError> {
    request.send().await.map_err(map_transport_error)
}

fn map_transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Transport(e.to_string())
    }
}

/// Parse a `Retry-After` value given in (possibly fractional) seconds.
///
/// Returns `None` for missing, negative or unparseable values (including the HTTP-date form).
/// Values too large for a `Duration` saturate to `Duration::MAX`; `retry_delay` caps them.
pub(crate) fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    let seconds = value?.trim().parse::<f64>().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX))
    } else {
        None
    }
}

#[async_trait]
impl RaffleApi for AlphabotClient {
    #[instrument(skip_all, fields(raffle_slug = %request.slug, participant_id = %request.discord_id))]
    async fn register(&self, token: &str, request: &RegistrationRequest) -> RegistrationOutcome {
        let url = self.endpoint(&["register"]);
        debug!(url = %url, "Registering for raffle");

        let result = self
            .send_with_rate_limit(|| self.client.post(url.clone()).bearer_auth(token).json(request))
            .await;

        match &result {
            Ok(response) => info!(status_code = response.status_code, "Successfully registered for raffle"),
            Err(e) => warn!(status_code = ?e.status_code(), error = %e, "Failed to register for raffle"),
        }

        RegistrationOutcome {
            participant_id: request.discord_id.clone(),
            raffle_slug: request.slug.clone(),
            result,
        }
    }

    #[instrument(skip(self, token))]
    async fn get_raffle_info(&self, token: &str, raffle_slug: &str) -> ApiResult {
        let url = self.endpoint(&["raffles", raffle_slug]);

        let result = self.send_with_rate_limit(|| self.client.get(url.clone()).bearer_auth(token)).await;

        if let Err(e) = &result {
            warn!(status_code = ?e.status_code(), error = %e, "Failed to get raffle info");
        }
        result
    }
}
