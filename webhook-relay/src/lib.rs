//! Ledger webhook relay - WhatsApp Cloud API receiver.
//!
//! This library backs two binaries:
//! - `ledger-webhook`: the webhook server
//! - `ledger-sign`: signs sample payloads for local testing
//!
//! ## Architecture
//!
//! ```text
//! Meta Cloud API → Web Server → Relay (verify, extract, route) → Backend ingest
//! ```

pub mod config;
pub mod error;
pub mod forward;
pub mod process;
pub mod web;

// Re-export commonly used types
pub use config::{Config, ForwardMode};
pub use error::RelayError;
pub use forward::{ForwardPayload, Forwarder, RequestId};
pub use process::{Relay, TenantResolver, DEFAULT_TENANT};
pub use web::AppState;
