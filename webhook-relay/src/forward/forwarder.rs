//! HTTP forwarder to the backend ingestion endpoint.
//!
//! One POST per event, no retries. The outcome is decided by the downstream
//! status alone; transport errors come back as
//! [`RelayError::ForwardTransportFailure`] for the caller to log or surface.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client};
use tracing::{error, info, warn};
use url::Url;

use super::types::ForwardPayload;
use crate::error::RelayError;
use crate::Config;

/// Max characters of the backend response kept for logging.
const BODY_PREVIEW_CHARS: usize = 200;

/// Header carrying the resolved tenant.
pub const TENANT_HEADER: &str = "X-Tenant-ID";
/// Header carrying the channel (phone number) id.
pub const CHANNEL_HEADER: &str = "X-Phone-Number-ID";
/// Header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// What the backend answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardOutcome {
    pub status: u16,
    pub body_preview: String,
}

impl ForwardOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Shared, cheaply cloneable forwarder.
#[derive(Clone)]
pub struct Forwarder {
    inner: Arc<ForwarderInner>,
}

struct ForwarderInner {
    client: Client,
    url: Option<Url>,
    shared_secret: Option<String>,
    timeout: Duration,
}

impl Forwarder {
    /// Create a forwarder. Destination and secret may be unset; forwarding then
    /// fails fast with [`RelayError::MisconfiguredBackend`].
    pub fn new(
        url: Option<Url>,
        shared_secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(16)
            .build()?;

        Ok(Self {
            inner: Arc::new(ForwarderInner {
                client,
                url,
                shared_secret: shared_secret.filter(|s| !s.trim().is_empty()),
                timeout,
            }),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Self::new(
            config.backend_ingest_url.clone(),
            config.backend_shared_secret.clone(),
            config.forward_timeout,
        )
    }

    /// Check that both destination and secret are configured.
    pub fn ensure_configured(&self) -> Result<(&Url, &str), RelayError> {
        let url = self
            .inner
            .url
            .as_ref()
            .ok_or(RelayError::MisconfiguredBackend("BACKEND_INGEST_URL"))?;
        let secret = self
            .inner
            .shared_secret
            .as_deref()
            .ok_or(RelayError::MisconfiguredBackend("BACKEND_SHARED_SECRET"))?;
        Ok((url, secret))
    }

    /// POST the payload to the backend.
    ///
    /// A non-2xx answer is logged and returned as an `Ok` outcome; only
    /// configuration and transport problems are errors.
    pub async fn forward(&self, payload: &ForwardPayload) -> Result<ForwardOutcome, RelayError> {
        let (url, secret) = self.ensure_configured()?;
        let request_id = payload.request_id.as_str();

        info!(
            request_id = %request_id,
            tenant_id = %payload.tenant_id,
            channel_id = ?payload.channel_id,
            "forward_starting"
        );

        let response = self
            .inner
            .client
            .post(url.clone())
            .bearer_auth(secret)
            .header(header::CONTENT_TYPE, "application/json")
            .header(TENANT_HEADER, payload.tenant_id.as_str())
            .header(CHANNEL_HEADER, payload.channel_id.as_deref().unwrap_or(""))
            .header(REQUEST_ID_HEADER, request_id)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!(
                        request_id = %request_id,
                        timeout_seconds = self.inner.timeout.as_secs_f64(),
                        error = %e,
                        "forward_timeout"
                    );
                } else if e.is_connect() {
                    error!(request_id = %request_id, error = %e, "forward_connect_error");
                } else {
                    error!(request_id = %request_id, error = %e, "forward_request_error");
                }
                RelayError::ForwardTransportFailure(e.to_string())
            })?;

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "forward_response_body_unreadable");
                String::new()
            }
        };
        let outcome = ForwardOutcome {
            status,
            body_preview: body.chars().take(BODY_PREVIEW_CHARS).collect(),
        };

        if outcome.is_success() {
            info!(
                request_id = %request_id,
                status_code = status,
                body = %outcome.body_preview,
                "forward_complete"
            );
        } else {
            warn!(
                request_id = %request_id,
                status_code = status,
                body = %outcome.body_preview,
                "forward_backend_error"
            );
        }

        Ok(outcome)
    }
}
