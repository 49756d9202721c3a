//! Errors

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::account::BorrowRequestStatus;

/// Backend error code reported when a payment execution is replayed for a
/// payment the backend has already settled
pub const CODE_PAYMENT_ALREADY_EXECUTED: &str = "payment_already_executed";

/// Backend error code reported when a borrow request already exists for the
/// same kit and user
pub const CODE_DUPLICATE_BORROW_REQUEST: &str = "duplicate_borrow_request";

/// KitLoan Error
#[derive(Debug, Error)]
pub enum Error {
    /// The user backed out of the gateway flow
    #[error("Payment was cancelled at the gateway")]
    GatewayCancelled,
    /// The pending payment intent was lost before completion
    #[error("No pending payment intent for this return, start a new top-up")]
    MissingIntent,
    /// The backend rejected the payment execution
    #[error("Payment execution failed: {0}")]
    ExecutionFailed(String),
    /// The reconciling pull after a completion failed
    #[error("Could not reconcile wallet state after payment")]
    ReconciliationFailed,
    /// A borrow request for the same kit is still open
    #[error("An earlier request for this kit is still `{0}`")]
    DuplicateBorrowRequest(BorrowRequestStatus),
    /// A backend payload matched none of the known shapes
    #[error("Unexpected `{resource}` payload: {detail}")]
    UnexpectedPayload {
        /// Resource the payload was fetched for
        resource: &'static str,
        /// What was found instead
        detail: String,
    },
    /// Amount overflow
    #[error("Amount overflow")]
    AmountOverflow,
    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
    /// Session store namespace or key is not valid
    #[error("Invalid session store key: {0}")]
    SessionKey(String),
    /// Live topic could not be parsed
    #[error("Unknown live topic: `{0}`")]
    UnknownTopic(String),
    /// HTTP transport error
    #[error("Http error: {0}")]
    Http(String),
    /// Structured error response from the backend
    #[error(transparent)]
    Response(#[from] ErrorResponse),
    /// Url path segments could not be joined
    #[error("Url path segments could not be joined")]
    UrlPathSegments,
    /// Subscription channel error
    #[error(transparent)]
    Subscription(#[from] crate::pub_sub::Error),
    /// Json error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Url parse error
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Structured error payload returned by the backend
///
/// Backends in the wild wrap the human readable message in different
/// envelopes; [`ErrorResponse::from_value`] always produces a message, using
/// the raw body as a last resort so a transport error is never shown when the
/// backend provided context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine readable error code, when the backend provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human readable description
    #[serde(default)]
    pub message: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ErrorResponse {}

impl ErrorResponse {
    /// Create new [`ErrorResponse`]
    pub fn new(code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Error response from a raw body
    pub fn from_body(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => Self::from_value(value),
            Err(_) => Self::new(None, body.trim()),
        }
    }

    /// Error response from a json value, trying the known envelopes before
    /// falling back to the raw text
    pub fn from_value(value: Value) -> Self {
        if let Ok(response) = serde_json::from_value::<ErrorResponse>(value.clone()) {
            if !response.message.is_empty() {
                return response;
            }
        }

        for key in ["error", "detail", "data"] {
            match value.get(key) {
                Some(Value::String(message)) => return Self::new(None, message.clone()),
                Some(inner @ Value::Object(_)) => return Self::from_value(inner.clone()),
                _ => {}
            }
        }

        Self::new(None, value.to_string())
    }

    /// Whether this response reports a payment that was already settled
    ///
    /// The structured code is authoritative; the message match mirrors the
    /// gateway's observed wording and is kept as a fallback only.
    pub fn is_already_executed(&self) -> bool {
        if self.code.as_deref() == Some(CODE_PAYMENT_ALREADY_EXECUTED) {
            return true;
        }

        let message = self.message.to_lowercase();
        message.contains("already been done")
            || message.contains("already done")
            || message.contains("already been executed")
            || message.contains("already executed")
            || message.contains("already completed")
    }

    /// Whether this response reports a conflicting open borrow request
    pub fn is_duplicate_request(&self) -> bool {
        if self.code.as_deref() == Some(CODE_DUPLICATE_BORROW_REQUEST) {
            return true;
        }

        let message = self.message.to_lowercase();
        message.contains("already") && message.contains("request")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_error_response_known_shapes() {
        let structured = ErrorResponse::from_value(json!({
            "code": "payment_already_executed",
            "message": "Payment has already been done"
        }));
        assert_eq!(
            structured.code.as_deref(),
            Some(CODE_PAYMENT_ALREADY_EXECUTED)
        );
        assert!(structured.is_already_executed());

        let wrapped = ErrorResponse::from_value(json!({ "error": "Insufficient funds" }));
        assert_eq!(wrapped.message, "Insufficient funds");
        assert!(wrapped.code.is_none());

        let nested = ErrorResponse::from_value(json!({
            "data": { "message": "Kit not found" }
        }));
        assert_eq!(nested.message, "Kit not found");
    }

    #[test]
    fn test_error_response_raw_fallback() {
        let raw = ErrorResponse::from_body("upstream exploded");
        assert_eq!(raw.message, "upstream exploded");
    }

    #[test]
    fn test_already_executed_message_fallback() {
        let response = ErrorResponse::new(None, "Payment has already been done");
        assert!(response.is_already_executed());

        let response = ErrorResponse::new(None, "Payment declined");
        assert!(!response.is_already_executed());
    }
}
