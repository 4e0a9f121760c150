use axum::{Json, body::Bytes, extract::State};
use tracing::{debug, info, instrument, warn};

use crate::{
    AppState,
    api::models::webhooks::{ErrorResponse, WebhookAck},
    errors::Error,
    fanout::{EventDisposition, FanoutState},
    webhooks::RaffleWebhookPayload,
};

/// Receive an Alphabot webhook.
///
/// The body is read raw so verification sees exactly what was sent.
#[utoipa::path(
    post,
    path = "/webhook/alphabot",
    tag = "webhooks",
    summary = "Alphabot webhook",
    description = "Receives Alphabot raffle webhooks. `raffle:active` events are verified against the shared secret \
and every enrolled participant is registered for the raffle. Other events are acknowledged and ignored.

The response waits for the fan-out up to the configured deadline; slower runs finish in the background.",
    request_body = RaffleWebhookPayload,
    responses(
        (status = 200, description = "Event accepted", body = WebhookAck),
        (status = 400, description = "Body is not a valid webhook payload", body = ErrorResponse),
        (status = 401, description = "Digest missing or wrong", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
)]
#[instrument(skip_all)]
pub async fn alphabot_webhook(State(state): State<AppState>, body: Bytes) -> Result<Json<WebhookAck>, Error> {
    debug!(state = %FanoutState::Received, bytes = body.len(), "Webhook received");

    let payload = state.verifier.verify(&body).map_err(|e| {
        warn!(state = %FanoutState::Rejected, error = %e, "Webhook rejected");
        Error::from(e)
    })?;

    info!(
        state = %FanoutState::Verified,
        event = %payload.event,
        raffle_slug = ?payload.raffle_slug(),
        "Webhook verified"
    );

    match state.orchestrator.process(&payload).await? {
        EventDisposition::Completed(report) => {
            info!(
                raffle_slug = %report.raffle_slug,
                participants = report.outcomes.len(),
                succeeded = report.succeeded(),
                "Raffle activation processed"
            );
        }
        EventDisposition::StillDispatching { raffle_slug } => {
            info!(raffle_slug = %raffle_slug, "Raffle activation accepted, fan-out still running");
        }
        EventDisposition::Ignored { .. } | EventDisposition::MissingSlug => {}
    }

    Ok(Json(WebhookAck::success()))
}
