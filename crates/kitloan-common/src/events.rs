//! Typed events delivered by the push channel

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::account::{
    BalanceUpdate, BorrowRequestRecord, GroupMemberRecord, NotificationRecord, PenaltyRecord,
};
use crate::error::Error;
use crate::normalize;
use crate::pub_sub;
use crate::wallet::TransactionRecord;
use crate::Amount;

/// A topic of the push channel
///
/// One topic exists per resource kind, scoped to the user (or to the group
/// for group membership changes).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LiveTopic {
    /// User notifications
    Notifications(String),
    /// Wallet balance updates
    WalletBalance(String),
    /// Wallet transaction updates
    WalletTransactions(String),
    /// Penalty updates
    Penalties(String),
    /// Borrow request status updates
    BorrowRequests(String),
    /// Group membership changes, scoped to the group
    Group(String),
}

impl fmt::Display for LiveTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notifications(scope) => write!(f, "notifications:{scope}"),
            Self::WalletBalance(scope) => write!(f, "wallet-balance:{scope}"),
            Self::WalletTransactions(scope) => write!(f, "wallet-transactions:{scope}"),
            Self::Penalties(scope) => write!(f, "penalties:{scope}"),
            Self::BorrowRequests(scope) => write!(f, "borrow-requests:{scope}"),
            Self::Group(scope) => write!(f, "group:{scope}"),
        }
    }
}

impl FromStr for LiveTopic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, scope) = s
            .split_once(':')
            .ok_or_else(|| Error::UnknownTopic(s.to_string()))?;

        if scope.is_empty() {
            return Err(Error::UnknownTopic(s.to_string()));
        }

        let scope = scope.to_string();
        match kind {
            "notifications" => Ok(Self::Notifications(scope)),
            "wallet-balance" => Ok(Self::WalletBalance(scope)),
            "wallet-transactions" => Ok(Self::WalletTransactions(scope)),
            "penalties" => Ok(Self::Penalties(scope)),
            "borrow-requests" => Ok(Self::BorrowRequests(scope)),
            "group" => Ok(Self::Group(scope)),
            _ => Err(Error::UnknownTopic(s.to_string())),
        }
    }
}

/// Payload of a push event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LivePayload {
    /// A new notification
    Notification(NotificationRecord),
    /// A new wallet transaction
    Transaction(TransactionRecord),
    /// A balance-only wallet update
    Balance(BalanceUpdate),
    /// A created or updated borrow request
    BorrowRequest(BorrowRequestRecord),
    /// A created or updated penalty
    Penalty(PenaltyRecord),
    /// A group membership change
    GroupMember(GroupMemberRecord),
}

/// One typed event delivered on a [`LiveTopic`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveEvent {
    /// Topic the event was delivered on
    #[serde(with = "topic_string")]
    pub topic: LiveTopic,
    /// Event payload
    pub payload: LivePayload,
}

mod topic_string {
    use std::str::FromStr;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::LiveTopic;

    pub fn serialize<S: Serializer>(topic: &LiveTopic, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(topic)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LiveTopic, D::Error> {
        let raw = String::deserialize(deserializer)?;
        LiveTopic::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

impl LiveEvent {
    /// Decode a raw wire payload for the given topic
    ///
    /// Balance topics accept either a bare number or a `{ balance }` object,
    /// since some backends push only the new figure. Every other topic goes
    /// through the per-resource normalization.
    pub fn from_wire(topic: LiveTopic, value: Value) -> Result<Self, Error> {
        let payload = match &topic {
            LiveTopic::Notifications(_) => {
                LivePayload::Notification(normalize::item("notification", value)?)
            }
            LiveTopic::WalletBalance(_) => match value.as_u64() {
                Some(minor) => LivePayload::Balance(BalanceUpdate {
                    balance: Amount::new(minor),
                }),
                None => LivePayload::Balance(normalize::item("wallet-balance", value)?),
            },
            LiveTopic::WalletTransactions(_) => {
                LivePayload::Transaction(normalize::item("transaction", value)?)
            }
            LiveTopic::Penalties(_) => LivePayload::Penalty(normalize::item("penalty", value)?),
            LiveTopic::BorrowRequests(_) => {
                LivePayload::BorrowRequest(normalize::item("borrow-request", value)?)
            }
            LiveTopic::Group(_) => LivePayload::GroupMember(normalize::item("group-member", value)?),
        };

        Ok(Self { topic, payload })
    }
}

impl pub_sub::Event for LiveEvent {
    type Topic = LiveTopic;

    fn get_topics(&self) -> Vec<Self::Topic> {
        vec![self.topic.clone()]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_topic_roundtrip() {
        let topics = vec![
            LiveTopic::Notifications("u-1".to_string()),
            LiveTopic::WalletBalance("u-1".to_string()),
            LiveTopic::Group("g-9".to_string()),
        ];

        for topic in topics {
            let parsed: LiveTopic = topic.to_string().parse().unwrap();
            assert_eq!(parsed, topic);
        }

        assert!("wallet-balance:".parse::<LiveTopic>().is_err());
        assert!("balances:u-1".parse::<LiveTopic>().is_err());
    }

    #[test]
    fn test_balance_from_bare_number() {
        let topic = LiveTopic::WalletBalance("u-1".to_string());
        let event = LiveEvent::from_wire(topic, json!(150_000)).unwrap();

        assert_eq!(
            event.payload,
            LivePayload::Balance(BalanceUpdate {
                balance: Amount::new(150_000)
            })
        );
    }

    #[test]
    fn test_balance_from_object() {
        let topic = LiveTopic::WalletBalance("u-1".to_string());
        let event = LiveEvent::from_wire(topic, json!({ "balance": 25 })).unwrap();

        assert_eq!(
            event.payload,
            LivePayload::Balance(BalanceUpdate {
                balance: Amount::new(25)
            })
        );
    }
}
