//! Inbound delivery processing.
//!
//! [`Relay`] drives a delivery through its stages, logging one event per
//! stage under the request id:
//!
//! ```text
//! RECEIVED → SIGNATURE_CHECKED → PARSED → EXTRACTED → TENANT_RESOLVED → FORWARD_ATTEMPTED
//! ```
//!
//! Nothing here is persisted and nothing is retried; the provider's own
//! redelivery is the only retry in the system.

pub mod envelope;
pub mod tenant;

use std::time::Duration;

use serde_json::Value;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::config::{Config, ForwardMode};
use crate::error::RelayError;
use crate::forward::{ForwardOutcome, ForwardPayload, Forwarder, RequestId};
use crate::web::signature::SignaturePolicy;

pub use envelope::{extract, extract_value, ExtractedEvent, MessageSummary, WebhookEnvelope};
pub use tenant::{TenantResolver, DEFAULT_TENANT};

/// What happened to the forward of an accepted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardStatus {
    /// Handed to a background task; outcome only logged.
    Dispatched,
    /// Backend answered before we responded.
    Completed(ForwardOutcome),
}

/// Summary of an accepted event, used to build the response.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub request_id: RequestId,
    pub tenant_id: String,
    pub channel_id: Option<String>,
    pub sender_id: Option<String>,
    pub message_count: usize,
    pub forward: ForwardStatus,
}

/// The webhook relay pipeline. Read-only after construction.
#[derive(Clone)]
pub struct Relay {
    signatures: SignaturePolicy,
    tenants: TenantResolver,
    forwarder: Forwarder,
    mode: ForwardMode,
    background: TaskTracker,
}

impl Relay {
    pub fn new(
        signatures: SignaturePolicy,
        tenants: TenantResolver,
        forwarder: Forwarder,
        mode: ForwardMode,
    ) -> Self {
        Self {
            signatures,
            tenants,
            forwarder,
            mode,
            background: TaskTracker::new(),
        }
    }

    /// Build the pipeline from configuration.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Ok(Self::new(
            SignaturePolicy::new(config.app_secret.clone(), config.signature_fail_open),
            TenantResolver::from_json(&config.tenant_routing_json),
            Forwarder::from_config(config)?,
            config.forward_mode,
        ))
    }

    pub fn tenants(&self) -> &TenantResolver {
        &self.tenants
    }

    /// Number of background forwards still running.
    pub fn pending_forwards(&self) -> usize {
        self.background.len()
    }

    /// Stop accepting background forwards and wait up to `limit` for the
    /// running ones. Returns `false` if some were still running at the deadline.
    pub async fn drain(&self, limit: Duration) -> bool {
        self.background.close();
        let pending = self.background.len();
        info!(pending_forwards = pending, "forward_drain_started");

        match tokio::time::timeout(limit, self.background.wait()).await {
            Ok(()) => {
                info!("forward_drain_complete");
                true
            }
            Err(_) => {
                warn!(
                    pending_forwards = self.background.len(),
                    limit_ms = limit.as_millis() as u64,
                    "forward_drain_timed_out"
                );
                false
            }
        }
    }

    /// Process a signed provider delivery.
    pub async fn handle_delivery(
        &self,
        request_id: &RequestId,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<Receipt, RelayError> {
        info!(
            request_id = %request_id,
            body_length = body.len(),
            has_signature = signature.is_some(),
            "whatsapp_webhook_received"
        );

        self.signatures.check(body, signature)?;
        info!(request_id = %request_id, "whatsapp_signature_checked");

        let raw = parse_body(request_id, body)?;

        let event = extract_value(&raw);
        log_extracted(request_id, &event);

        let tenant_id = self.tenants.resolve(event.channel_id.as_deref());
        info!(
            request_id = %request_id,
            tenant_id = %tenant_id,
            channel_id = ?event.channel_id,
            sender_id = ?event.sender_id,
            message_count = event.message_count,
            "whatsapp_tenant_resolved"
        );

        let payload = ForwardPayload::new(
            tenant_id,
            event.channel_id.clone(),
            event.sender_id.clone(),
            raw,
            request_id.clone(),
        );

        let forward = self.dispatch(payload.clone(), self.mode).await?;

        Ok(Receipt {
            request_id: request_id.clone(),
            tenant_id: payload.tenant_id,
            channel_id: payload.channel_id,
            sender_id: payload.sender_id,
            message_count: event.message_count,
            forward,
        })
    }

    /// Process an unsigned simulated event.
    ///
    /// The body may carry `tenant_id` and `phone_number_id` overrides and an
    /// inner `payload`; without one the whole body is the envelope. Always
    /// forwards synchronously.
    pub async fn handle_simulation(
        &self,
        request_id: &RequestId,
        body: &[u8],
    ) -> Result<Receipt, RelayError> {
        info!(request_id = %request_id, body_length = body.len(), "simulation_received");

        let mut body = parse_body(request_id, body)?;

        let tenant_override = string_field(&body, "tenant_id");
        let channel_override = string_field(&body, "phone_number_id");
        let raw = if body.get("payload").is_some_and(Value::is_object) {
            body["payload"].take()
        } else {
            body
        };

        let event = extract_value(&raw);
        log_extracted(request_id, &event);

        let channel_id = channel_override.or(event.channel_id);
        let tenant_id = tenant_override.unwrap_or_else(|| self.tenants.resolve(channel_id.as_deref()));
        info!(
            request_id = %request_id,
            tenant_id = %tenant_id,
            channel_id = ?channel_id,
            "simulation_tenant_resolved"
        );

        let payload = ForwardPayload::new(
            tenant_id,
            channel_id,
            event.sender_id,
            raw,
            request_id.clone(),
        );

        let forward = self.dispatch(payload.clone(), ForwardMode::Sync).await?;

        Ok(Receipt {
            request_id: request_id.clone(),
            tenant_id: payload.tenant_id,
            channel_id: payload.channel_id,
            sender_id: payload.sender_id,
            message_count: event.message_count,
            forward,
        })
    }

    /// Forward according to `mode`. Misconfiguration fails before any call.
    async fn dispatch(
        &self,
        payload: ForwardPayload,
        mode: ForwardMode,
    ) -> Result<ForwardStatus, RelayError> {
        if let Err(e) = self.forwarder.ensure_configured() {
            error!(request_id = %payload.request_id, error = %e, "forward_misconfigured");
            return Err(e);
        }

        match mode {
            ForwardMode::Sync => {
                let outcome = self.forwarder.forward(&payload).await?;
                Ok(ForwardStatus::Completed(outcome))
            }
            ForwardMode::Async => {
                let forwarder = self.forwarder.clone();
                let request_id = payload.request_id.clone();
                // The provider already has its answer; failures are only logged.
                self.background.spawn(async move {
                    if let Err(e) = forwarder.forward(&payload).await {
                        warn!(
                            request_id = %payload.request_id,
                            error = %e,
                            "forward_background_failed"
                        );
                    }
                });
                info!(request_id = %request_id, "forward_dispatched");
                Ok(ForwardStatus::Dispatched)
            }
        }
    }
}

/// Parse the body as JSON. An empty body reads as `{}`.
fn parse_body(request_id: &RequestId, body: &[u8]) -> Result<Value, RelayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        info!(request_id = %request_id, "whatsapp_body_empty");
        return Ok(Value::Object(Default::default()));
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(value) => {
            info!(request_id = %request_id, "whatsapp_body_parsed");
            Ok(value)
        }
        Err(e) => {
            warn!(request_id = %request_id, error = %e, "whatsapp_body_invalid_json");
            Err(RelayError::MalformedJson(e.to_string()))
        }
    }
}

fn log_extracted(request_id: &RequestId, event: &ExtractedEvent) {
    info!(
        request_id = %request_id,
        object = ?event.object,
        field = ?event.field,
        channel_id = ?event.channel_id,
        sender_id = ?event.sender_id,
        message_count = event.message_count,
        "whatsapp_event_extracted"
    );

    for (index, message) in event.messages.iter().enumerate() {
        info!(
            request_id = %request_id,
            index = index,
            from = ?message.from,
            kind = ?message.kind,
            text = ?message.text,
            timestamp = ?message.timestamp,
            message_id = ?message.id,
            "whatsapp_message"
        );
    }
}

/// Non-empty string (or number) field of a JSON object.
fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
