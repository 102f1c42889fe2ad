//! Forwarding module for relaying events to the backend.
//!
//! This module provides:
//! - The normalized payload and request id types
//! - The HTTP forwarder that POSTs them to the ingestion endpoint
//!
//! ## Flow
//!
//! ```text
//! Relay → ForwardPayload → Forwarder → BACKEND_INGEST_URL
//! ```

pub mod forwarder;
pub mod types;

pub use forwarder::{
    ForwardOutcome, Forwarder, CHANNEL_HEADER, REQUEST_ID_HEADER, TENANT_HEADER,
};
pub use types::{ForwardPayload, RequestId};
