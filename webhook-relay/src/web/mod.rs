//! Web server module for the WhatsApp webhook.
//!
//! This module provides a thin web server that:
//! - Answers the provider's subscription handshake
//! - Verifies delivery signatures over the raw body
//! - Hands deliveries to the relay and answers the provider
//! - Optionally accepts unsigned simulated events

pub mod handlers;
pub mod signature;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    health, method_not_allowed, receive_webhook, simulate_webhook, verify_subscription,
    verify_webhook, AppState, HealthResponse, VerifyQuery, WebhookResponse,
};
pub use signature::{sign, verify_signature, SignatureError, SignaturePolicy, SIGNATURE_HEADER};

/// Path of the provider-facing webhook.
pub const WEBHOOK_PATH: &str = "/webhooks/whatsapp";
/// Path of the simulation endpoint.
pub const SIMULATE_PATH: &str = "/simulate/whatsapp";

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            WEBHOOK_PATH,
            get(verify_webhook)
                .post(receive_webhook)
                .fallback(method_not_allowed),
        )
        .route(SIMULATE_PATH, post(simulate_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
