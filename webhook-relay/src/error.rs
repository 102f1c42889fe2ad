//! Error kinds surfaced by the webhook relay.

use axum::http::{Method, StatusCode};
use thiserror::Error;

use crate::web::signature::SignatureError;

/// Everything that can end an inbound request early.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("verification token mismatch")]
    TokenMismatch,

    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("invalid JSON body: {0}")]
    MalformedJson(String),

    #[error("{0} not configured")]
    MisconfiguredBackend(&'static str),

    #[error("forward failed: {0}")]
    ForwardTransportFailure(String),

    #[error("method {0} not allowed")]
    UnsupportedMethod(Method),
}

impl RelayError {
    /// HTTP status reported to the caller.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MissingParameter(_) => StatusCode::BAD_REQUEST,
            RelayError::TokenMismatch => StatusCode::FORBIDDEN,
            RelayError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            RelayError::MalformedJson(_) => StatusCode::BAD_REQUEST,
            RelayError::MisconfiguredBackend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::ForwardTransportFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::UnsupportedMethod(_) => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    /// Short, stable description safe to return to the caller.
    pub fn public_message(&self) -> String {
        match self {
            RelayError::MissingParameter(_) => "Missing parameters".to_string(),
            RelayError::TokenMismatch => "Verification token mismatch".to_string(),
            RelayError::InvalidSignature(_) => "Invalid signature".to_string(),
            RelayError::MalformedJson(_) => "Invalid JSON".to_string(),
            RelayError::MisconfiguredBackend(var) => format!("{} not configured", var),
            RelayError::ForwardTransportFailure(_) => "Forward failed".to_string(),
            RelayError::UnsupportedMethod(_) => "Method Not Allowed".to_string(),
        }
    }
}
