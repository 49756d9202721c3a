//! Payment intents and gateway records

use serde::{Deserialize, Serialize};

use crate::util::unix_time;
use crate::Amount;

/// An in-flight top-up owned by the client
///
/// Created when the user initiates a top-up and destroyed once the outcome
/// (success, cancel or duplicate) is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    /// Gateway payment id
    pub payment_id: String,
    /// Correlation id handed out by the backend when the payment was created
    pub correlation_id: String,
    /// Amount quoted at creation, in minor units
    pub quoted_amount: Amount,
    /// Unix timestamp of creation
    pub created_at: u64,
}

impl PaymentIntent {
    /// Create a new [`PaymentIntent`]
    pub fn new(payment_id: String, correlation_id: String, quoted_amount: Amount) -> Self {
        Self {
            payment_id,
            correlation_id,
            quoted_amount,
            created_at: unix_time(),
        }
    }
}

/// Marker recording that a payment return is being, or was, processed
///
/// Written the instant execution begins, before the network call returns, to
/// close the race window against a duplicate return. Never mutated; released
/// only after the cooldown clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionMarker {
    /// Gateway payment id the marker guards
    pub payment_id: String,
    /// Unix timestamp processing began
    pub completed_at: u64,
}

impl CompletionMarker {
    /// Create a new [`CompletionMarker`] stamped now
    pub fn new(payment_id: impl Into<String>) -> Self {
        Self {
            payment_id: payment_id.into(),
            completed_at: unix_time(),
        }
    }
}

/// A user action deferred until funds are available
///
/// Consumed at most once after a successful or already-completed payment;
/// discarded on cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeferredIntent {
    /// Resume a rental request that was interrupted by the top-up
    #[serde(rename_all = "camelCase")]
    ResumeRental {
        /// Kit the interrupted rental was for
        kit_id: String,
    },
}

/// Request body for creating a gateway payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    /// Amount to top up, in minor units
    pub amount: Amount,
    /// Description shown at the gateway
    pub description: String,
    /// Url the gateway redirects to on approval
    pub return_url: String,
    /// Url the gateway redirects to on cancellation
    pub cancel_url: String,
}

/// Response to a payment creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    /// Gateway url the user must be sent to for approval
    pub approval_url: String,
    /// Gateway payment id
    pub payment_id: String,
    /// Correlation id to be echoed back on execution
    pub correlation_id: String,
}

/// Request body for executing a returned payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePaymentRequest {
    /// Gateway payment id
    pub payment_id: String,
    /// Payer id carried by the gateway return
    pub payer_id: String,
    /// Correlation id from the matching [`PaymentIntent`]
    pub correlation_id: String,
}

/// Request body for creating a borrow request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBorrowRequest {
    /// Kit to borrow
    pub kit_id: String,
}
