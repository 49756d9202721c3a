//! Wire types for the push channel
//!
//! The channel speaks line-delimited JSON over a WebSocket: the client sends
//! subscribe/unsubscribe requests carrying a client-chosen subscription id
//! and a topic string; the server delivers one envelope per change plus
//! acknowledgments and error bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters of a subscribe request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsSubscribeParams {
    /// Client-chosen subscription id
    pub sub_id: String,
    /// Topic to subscribe to, in `kind:scope` form
    pub topic: String,
}

/// Parameters of an unsubscribe request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsUnsubscribeParams {
    /// Subscription id to drop
    pub sub_id: String,
}

/// A request sent from the client to the channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum WsRequest {
    /// Open a subscription
    Subscribe(WsSubscribeParams),
    /// Close a subscription
    Unsubscribe(WsUnsubscribeParams),
}

/// One pushed change delivered on a subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsEnvelope {
    /// Subscription the event belongs to, when the server echoes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_id: Option<String>,
    /// Topic the event was published on, in `kind:scope` form
    pub topic: String,
    /// Raw event payload, decoded per topic kind
    pub event: Value,
}

/// Acknowledgment of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsAck {
    /// Whether the request was accepted
    pub ok: bool,
    /// Subscription id the acknowledgment refers to
    pub sub_id: String,
}

/// Error body sent by the channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsErrorBody {
    /// Error message
    pub error: String,
}

/// Any message the server can deliver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WsIncoming {
    /// A pushed change
    Event(WsEnvelope),
    /// An acknowledgment
    Ack(WsAck),
    /// An error body
    Error(WsErrorBody),
}
