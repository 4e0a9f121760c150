//! OpenAPI document for the HTTP surface, served with Scalar at `/docs`.

use utoipa::OpenApi;

use crate::api;
use crate::webhooks::events::{Raffle, RaffleEventData, RaffleWebhookPayload};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "raffle-relay",
        description = "Relays Alphabot raffle activation webhooks into raffle registrations for every enrolled participant.

Webhooks are authenticated with an HMAC-SHA256 digest of `{event}\\n{timestamp}` keyed with the shared secret, \
sent as lowercase hex in the `hash` field."
    ),
    paths(api::handlers::webhooks::alphabot_webhook),
    components(schemas(
        RaffleWebhookPayload,
        RaffleEventData,
        Raffle,
        api::models::webhooks::WebhookAck,
        api::models::webhooks::ErrorResponse,
    )),
    tags((name = "webhooks", description = "Inbound webhooks from Alphabot"))
)]
pub struct ApiDoc;
