//! Request and response types for the Alphabot API.

use bon::Builder;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::types::{ParticipantId, RaffleSlug};

/// Body of `POST /register`.
///
/// Optional identities are only sent when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    #[builder(into)]
    pub slug: RaffleSlug,
    #[builder(into)]
    pub discord_id: ParticipantId,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub mint_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub twitter_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub telegram_id: Option<String>,
}

/// A successful Alphabot response: the upstream JSON plus the transport status code.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status_code: u16,
    pub body: Value,
}

/// Every way an Alphabot call can fail, normalised so callers never see a raw transport error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("Request timeout")]
    Timeout,

    /// Connection refused, DNS failure, TLS failure, body read failure...
    #[error("Request error: {0}")]
    Transport(String),

    /// Still rate limited after the single retry
    #[error("Rate limited by Alphabot (HTTP 429)")]
    RateLimited,

    #[error("Invalid JSON response (HTTP {status_code})")]
    InvalidBody { status_code: u16 },

    /// Non-2xx status, or a 2xx whose body says `"success": false`
    #[error("{detail} (HTTP {status_code})")]
    Upstream { status_code: u16, detail: String, body: Value },
}

impl ApiError {
    /// HTTP status of the final upstream response, if one was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Timeout | ApiError::Transport(_) => None,
            ApiError::RateLimited => Some(StatusCode::TOO_MANY_REQUESTS.as_u16()),
            ApiError::InvalidBody { status_code } | ApiError::Upstream { status_code, .. } => Some(*status_code),
        }
    }

    /// Human readable reason, without the status suffix.
    pub fn detail(&self) -> String {
        match self {
            ApiError::Upstream { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }
}

pub type ApiResult = Result<ApiResponse, ApiError>;

/// Result of one registration attempt for one participant.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationOutcome {
    pub participant_id: ParticipantId,
    pub raffle_slug: RaffleSlug,
    pub result: ApiResult,
}

impl RegistrationOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn http_status(&self) -> Option<u16> {
        match &self.result {
            Ok(response) => Some(response.status_code),
            Err(e) => e.status_code(),
        }
    }

    pub fn error_detail(&self) -> Option<String> {
        self.result.as_ref().err().map(ApiError::detail)
    }
}

/// Turn a final status + raw body into a typed result.
pub(crate) fn classify_response(status: StatusCode, body: &[u8]) -> ApiResult {
    let status_code = status.as_u16();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ApiError::RateLimited);
    }

    let Ok(body) = serde_json::from_slice::<Value>(body) else {
        return Err(ApiError::InvalidBody { status_code });
    };

    let reported_failure = body.get("success").and_then(Value::as_bool) == Some(false);
    if !status.is_success() || reported_failure {
        let detail = error_detail(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {status_code}"))
        });
        return Err(ApiError::Upstream { status_code, detail, body });
    }

    Ok(ApiResponse { status_code, body })
}

/// Pull a message out of the shapes Alphabot uses for errors:
/// `{"error": "..."}`, `{"error": {"message": "..."}}` or `{"message": "..."}`.
fn error_detail(body: &Value) -> Option<String> {
    match body.get("error") {
        Some(Value::String(s)) => return Some(s.clone()),
        Some(Value::Object(obj)) => {
            if let Some(Value::String(s)) = obj.get("message") {
                return Some(s.clone());
            }
        }
        _ => {}
    }
    body.get("message").and_then(Value::as_str).map(str::to_string)
}
