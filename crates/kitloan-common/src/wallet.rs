//! Wallet state and transaction records

use serde::{Deserialize, Serialize};

use crate::account::LiveRecord;
use crate::Amount;

/// Snapshot of the wallet returned by the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSnapshot {
    /// Current balance in minor units
    pub balance: Amount,
    /// Unix timestamp of the snapshot, when the backend provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
}

/// In-memory wallet state
///
/// The balance is authoritative only after a reconciling pull; pushes may set
/// it early for responsiveness. Transactions are kept newest-first and unique
/// by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletState {
    /// Current balance in minor units
    pub balance: Amount,
    /// Transaction history, newest first
    pub transactions: Vec<TransactionRecord>,
}

/// Transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// Wallet top-up through the payment gateway
    TopUp,
    /// Fee charged for a kit rental
    RentalFee,
    /// Penalty charge
    Penalty,
    /// Refund credited back to the wallet
    Refund,
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Settled by the backend
    Completed,
    /// Still in flight
    Pending,
    /// Rejected or rolled back
    Failed,
}

/// A single wallet transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Transaction id
    pub id: String,
    /// Transaction kind
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Amount in minor units
    pub amount: Amount,
    /// Balance before this transaction, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_balance: Option<Amount>,
    /// Transaction status
    pub status: TransactionStatus,
    /// Human readable description
    pub description: String,
    /// Unix timestamp of creation
    pub created_at: u64,
}

impl LiveRecord for TransactionRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> u64 {
        self.created_at
    }
}
