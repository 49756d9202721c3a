//! Account records and the merged in-memory view

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::wallet::WalletState;
use crate::Amount;

/// A record that can be merged from both pull and push sources
///
/// Collections of live records are kept unique by id and sorted newest-first
/// by creation time.
pub trait LiveRecord {
    /// Stable identity of the record
    fn id(&self) -> &str;

    /// Unix timestamp of creation
    fn created_at(&self) -> u64;
}

/// Notification kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// Payment and wallet related
    Payment,
    /// Rental lifecycle updates
    Rental,
    /// Penalty notices
    Penalty,
    /// Group membership updates
    Group,
    /// Anything the backend adds later
    #[serde(other)]
    System,
}

/// A user notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    /// Notification id
    pub id: String,
    /// Notification kind
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Finer grained subtype, when the backend provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    /// Short title
    pub title: String,
    /// Message body
    pub message: String,
    /// Whether the user acknowledged the notification; transitions
    /// false to true only
    #[serde(default)]
    pub is_read: bool,
    /// Unix timestamp of creation
    pub created_at: u64,
}

impl LiveRecord for NotificationRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> u64 {
        self.created_at
    }
}

/// Borrow request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BorrowRequestStatus {
    /// Waiting for approval
    Pending,
    /// Approved, kit not yet handed over
    Approved,
    /// Kit is with the borrower
    InProgress,
    /// Request was rejected
    Rejected,
    /// Kit was returned
    Returned,
}

impl BorrowRequestStatus {
    /// Whether the request still occupies the kit
    ///
    /// Active requests block a second concurrent request for the same kit by
    /// the same user.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved | Self::InProgress)
    }
}

impl fmt::Display for BorrowRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::InProgress => "IN_PROGRESS",
            Self::Rejected => "REJECTED",
            Self::Returned => "RETURNED",
        };
        write!(f, "{label}")
    }
}

/// A kit borrow request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRequestRecord {
    /// Request id
    pub id: String,
    /// Kit the request is for
    pub kit_id: String,
    /// Display name of the kit, when the backend provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kit_name: Option<String>,
    /// Request status
    pub status: BorrowRequestStatus,
    /// Unix timestamp of creation
    pub created_at: u64,
}

impl LiveRecord for BorrowRequestRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> u64 {
        self.created_at
    }
}

/// A penalty charged against the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyRecord {
    /// Penalty id
    pub id: String,
    /// Amount charged in minor units
    pub amount: Amount,
    /// Why the penalty was applied
    pub reason: String,
    /// Whether the penalty has been settled
    #[serde(default)]
    pub settled: bool,
    /// Unix timestamp of creation
    pub created_at: u64,
}

impl LiveRecord for PenaltyRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> u64 {
        self.created_at
    }
}

/// A member of the user's group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMemberRecord {
    /// Member id
    pub id: String,
    /// Display name
    pub name: String,
    /// Role within the group
    pub role: String,
    /// Unix timestamp the member joined
    pub joined_at: u64,
}

impl LiveRecord for GroupMemberRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> u64 {
        self.joined_at
    }
}

/// Balance carried by a wallet push event
///
/// Pushes may deliver only the new balance; composite server-side updates are
/// corrected by the background pull the merge reports as needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceUpdate {
    /// New balance in minor units
    pub balance: Amount,
}

/// The merged per-session view of the user's account
///
/// Both the reconciling pulls and the push channel feed this single
/// structure; screens never mutate the collections directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    /// Wallet balance and transaction history
    pub wallet: WalletState,
    /// Notifications, newest first
    pub notifications: Vec<NotificationRecord>,
    /// Borrow requests, newest first
    pub borrow_requests: Vec<BorrowRequestRecord>,
    /// Penalties, newest first
    pub penalties: Vec<PenaltyRecord>,
    /// Group members, newest first; only populated for group-scoped roles
    pub group_members: Vec<GroupMemberRecord>,
}

impl AccountView {
    /// Total of unsettled penalties
    pub fn outstanding_penalties(&self) -> Result<Amount, crate::Error> {
        Amount::try_sum(
            self.penalties
                .iter()
                .filter(|penalty| !penalty.settled)
                .map(|penalty| penalty.amount),
        )
    }
}
