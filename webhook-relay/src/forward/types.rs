//! Payload types sent to the backend ingestion endpoint.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-request trace identifier, `req-<unix-millis>-<9 base36 chars>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh id.
    pub fn generate() -> Self {
        let millis = Utc::now().timestamp_millis();
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            .take(9)
            .map(char::from)
            .collect();
        RequestId(format!("req-{}-{}", millis, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized event relayed to the backend.
///
/// `raw_payload` is the provider envelope exactly as received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardPayload {
    /// Resolved tenant, never empty
    pub tenant_id: String,
    /// Receiving channel (phone number id), if the envelope carried one
    pub channel_id: Option<String>,
    /// `from` of the first message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    /// Untransformed provider envelope
    pub raw_payload: Value,
    /// When the relay received the event
    pub received_at: DateTime<Utc>,
    /// Trace id shared with the inbound request
    pub request_id: RequestId,
}

impl ForwardPayload {
    /// Create a payload stamped with the current time.
    pub fn new(
        tenant_id: String,
        channel_id: Option<String>,
        sender_id: Option<String>,
        raw_payload: Value,
        request_id: RequestId,
    ) -> Self {
        Self {
            tenant_id,
            channel_id,
            sender_id,
            raw_payload,
            received_at: Utc::now(),
            request_id,
        }
    }
}
