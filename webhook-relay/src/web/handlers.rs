//! WhatsApp webhook endpoint handlers.
//!
//! Handlers stay thin: they capture the raw request, hand it to the
//! [`Relay`], and translate the result into the provider-facing response.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::RelayError;
use crate::forward::RequestId;
use crate::process::{ForwardStatus, Receipt, Relay};
use crate::web::signature::{constant_time_compare, SIGNATURE_HEADER};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub relay: Relay,
}

impl AppState {
    pub fn new(config: Config, relay: Relay) -> Self {
        Self {
            config: Arc::new(config),
            relay,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Verification Handshake
// =============================================================================

/// Subscription verification query.
#[derive(Debug, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Answer a subscription challenge.
///
/// Returns the challenge verbatim iff the mode is `subscribe` and the token
/// equals the configured verify token.
pub fn verify_subscription(
    query: &VerifyQuery,
    expected_token: Option<&str>,
) -> Result<String, RelayError> {
    let mode = present(&query.mode).ok_or(RelayError::MissingParameter("hub.mode"))?;
    let token =
        present(&query.verify_token).ok_or(RelayError::MissingParameter("hub.verify_token"))?;
    let challenge =
        present(&query.challenge).ok_or(RelayError::MissingParameter("hub.challenge"))?;

    let token_matches = expected_token.is_some_and(|expected| constant_time_compare(token, expected));

    if mode == "subscribe" && token_matches {
        Ok(challenge.to_string())
    } else {
        Err(RelayError::TokenMismatch)
    }
}

/// GET endpoint for the provider's subscription handshake.
pub async fn verify_webhook(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    match verify_subscription(&query, state.config.verify_token.as_deref()) {
        Ok(challenge) => {
            info!("whatsapp_webhook_verified");
            (StatusCode::OK, challenge).into_response()
        }
        Err(e) => {
            warn!(
                error = %e,
                mode = ?query.mode,
                verify_token_configured = state.config.verify_token.is_some(),
                "whatsapp_webhook_verification_failed"
            );
            (e.status(), e.public_message()).into_response()
        }
    }
}

// =============================================================================
// Event Delivery
// =============================================================================

/// Webhook response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forwarded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub request_id: String,
}

impl WebhookResponse {
    fn accepted(receipt: Receipt) -> Self {
        let backend_status = match &receipt.forward {
            ForwardStatus::Completed(outcome) => Some(outcome.status),
            ForwardStatus::Dispatched => None,
        };

        Self {
            ok: true,
            received: Some(true),
            forwarded: None,
            tenant: Some(receipt.tenant_id),
            phone_number_id: receipt.channel_id,
            backend_status,
            error: None,
            request_id: receipt.request_id.to_string(),
        }
    }

    fn failed(error: &RelayError, request_id: &RequestId) -> Self {
        Self {
            ok: false,
            received: None,
            forwarded: None,
            tenant: None,
            phone_number_id: None,
            backend_status: None,
            error: Some(error.public_message()),
            request_id: request_id.to_string(),
        }
    }
}

fn error_response(error: RelayError, request_id: &RequestId) -> Response {
    (
        error.status(),
        Json(WebhookResponse::failed(&error, request_id)),
    )
        .into_response()
}

/// POST endpoint for event delivery.
///
/// The body is taken raw so the signature is checked over the exact bytes
/// the provider signed.
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = RequestId::generate();
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state
        .relay
        .handle_delivery(&request_id, &body, signature)
        .await
    {
        Ok(receipt) => {
            info!(
                request_id = %request_id,
                tenant_id = %receipt.tenant_id,
                forward = ?receipt.forward,
                "whatsapp_webhook_responded"
            );
            (StatusCode::OK, Json(WebhookResponse::accepted(receipt))).into_response()
        }
        Err(e) => {
            warn!(
                request_id = %request_id,
                error = %e,
                status_code = e.status().as_u16(),
                "whatsapp_webhook_rejected"
            );
            error_response(e, &request_id)
        }
    }
}

// =============================================================================
// Simulation
// =============================================================================

/// POST endpoint that relays unsigned, hand-written events.
///
/// Answers 404 unless `SIMULATE_ENABLED` is set.
pub async fn simulate_webhook(State(state): State<AppState>, body: Bytes) -> Response {
    if !state.config.simulate_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    let request_id = RequestId::generate();

    match state.relay.handle_simulation(&request_id, &body).await {
        Ok(receipt) => {
            let mut response = WebhookResponse::accepted(receipt);
            response.received = None;
            response.forwarded = Some(true);
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            warn!(request_id = %request_id, error = %e, "simulation_rejected");
            error_response(e, &request_id)
        }
    }
}

/// Fallback for methods other than GET and POST.
pub async fn method_not_allowed(method: Method) -> Response {
    let error = RelayError::UnsupportedMethod(method);
    warn!(error = %error, "whatsapp_webhook_method_not_allowed");
    (error.status(), error.public_message()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(mode: Option<&str>, token: Option<&str>, challenge: Option<&str>) -> VerifyQuery {
        VerifyQuery {
            mode: mode.map(str::to_string),
            verify_token: token.map(str::to_string),
            challenge: challenge.map(str::to_string),
        }
    }

    #[test]
    fn test_verify_subscription_echoes_challenge() {
        let q = query(Some("subscribe"), Some("verify-me"), Some("xyz123"));
        assert_eq!(verify_subscription(&q, Some("verify-me")).unwrap(), "xyz123");
    }

    #[test]
    fn test_verify_subscription_wrong_token() {
        let q = query(Some("subscribe"), Some("wrong"), Some("xyz123"));
        assert!(matches!(
            verify_subscription(&q, Some("verify-me")),
            Err(RelayError::TokenMismatch)
        ));
    }

    #[test]
    fn test_verify_subscription_wrong_mode() {
        let q = query(Some("unsubscribe"), Some("verify-me"), Some("xyz123"));
        assert!(matches!(
            verify_subscription(&q, Some("verify-me")),
            Err(RelayError::TokenMismatch)
        ));
    }

    #[test]
    fn test_verify_subscription_unconfigured_token() {
        let q = query(Some("subscribe"), Some("anything"), Some("xyz123"));
        assert!(matches!(
            verify_subscription(&q, None),
            Err(RelayError::TokenMismatch)
        ));
    }

    #[test]
    fn test_verify_subscription_missing_parameters() {
        let cases = [
            query(None, Some("t"), Some("c")),
            query(Some("subscribe"), None, Some("c")),
            query(Some("subscribe"), Some("t"), None),
            query(Some(""), Some("t"), Some("c")),
        ];
        for q in cases {
            assert!(matches!(
                verify_subscription(&q, Some("t")),
                Err(RelayError::MissingParameter(_))
            ));
        }
    }

    #[test]
    fn test_failed_response_shape() {
        let request_id = RequestId::generate();
        let response = WebhookResponse::failed(&RelayError::TokenMismatch, &request_id);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["ok"], false);
        assert_eq!(json["error"], "Verification token mismatch");
        assert_eq!(json["request_id"], request_id.as_str());
        assert!(json.get("tenant").is_none());
    }
}
