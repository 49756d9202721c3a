//! Client for live subscriptions
//!
//! The backend pushes one JSON event per change over a WebSocket, per topic.
//! This module provides the subscription manager the wallet uses to open one
//! subscription per resource kind scoped to the user, dispatching typed
//! events to local subscribers. The channel neither buffers nor replays: a
//! dropped connection loses events until the next pull-based reconciliation,
//! which is why every consumer of a resource also pulls on mount.

use std::fmt::Debug;
use std::sync::Arc;

use kitloan_common::events::{LiveEvent, LiveTopic};
use kitloan_common::pub_sub::remote_consumer::{
    Consumer, InternalRelay, RemoteActiveConsumer, StreamCtrl, SubscribeMessage, Transport,
};
use kitloan_common::pub_sub::{Error as PubsubError, Spec, SubscriptionRequest};
use kitloan_common::ws::{WsRequest, WsSubscribeParams, WsUnsubscribeParams};
use tokio::sync::mpsc;
use url::Url;
use uuid::Uuid;

mod ws;

/// One owned live subscription; dropping it unsubscribes
pub type ActiveSubscription = RemoteActiveConsumer<LiveClient>;

/// Topic/event types of the account channel
#[derive(Debug, Clone, Default)]
pub struct AccountChannel;

impl Spec for AccountChannel {
    type Topic = LiveTopic;
    type Event = LiveEvent;
    type SubscriptionId = String;
}

/// Subscription request over a set of account topics
#[derive(Debug, Clone)]
pub struct AccountParams {
    topics: Vec<LiveTopic>,
    id: Arc<String>,
}

impl AccountParams {
    /// Create a request with a fresh subscription name
    pub fn new(topics: Vec<LiveTopic>) -> Self {
        Self {
            topics,
            id: Arc::new(Uuid::new_v4().to_string()),
        }
    }
}

impl SubscriptionRequest for AccountParams {
    type Topic = LiveTopic;
    type SubscriptionId = String;

    fn try_get_topics(&self) -> Result<Vec<Self::Topic>, PubsubError> {
        Ok(self.topics.clone())
    }

    fn subscription_name(&self) -> Arc<Self::SubscriptionId> {
        self.id.clone()
    }
}

/// The per-user topic set opened on connect
///
/// Group membership is only watched for group-scoped roles.
pub fn user_topics(user_id: &str, group_id: Option<&str>) -> Vec<LiveTopic> {
    let user = user_id.to_string();
    let mut topics = vec![
        LiveTopic::Notifications(user.clone()),
        LiveTopic::WalletBalance(user.clone()),
        LiveTopic::WalletTransactions(user.clone()),
        LiveTopic::Penalties(user.clone()),
        LiveTopic::BorrowRequests(user),
    ];

    if let Some(group_id) = group_id {
        topics.push(LiveTopic::Group(group_id.to_string()));
    }

    topics
}

/// Subscription manager
///
/// One instance per wallet at most; cloneable since its members are Arcs.
/// Subscribers receive an [`ActiveSubscription`] which yields typed events
/// and unsubscribes automatically on drop. The underlying connection is
/// process-wide for the session and is torn down on logout.
#[derive(Clone)]
pub struct SubscriptionManager {
    consumer: Arc<Consumer<LiveClient>>,
}

impl Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Subscription manager")
    }
}

impl SubscriptionManager {
    /// Create a new subscription manager connecting to the given channel url
    pub fn new(channel_url: Url) -> Self {
        Self {
            consumer: Consumer::new(LiveClient { channel_url }),
        }
    }

    /// Subscribe to a set of topics
    pub fn subscribe(&self, topics: Vec<LiveTopic>) -> Result<ActiveSubscription, PubsubError> {
        self.consumer.subscribe(AccountParams::new(topics))
    }
}

/// WebSocket transport of the account channel
#[derive(Debug)]
pub struct LiveClient {
    channel_url: Url,
}

impl LiveClient {
    fn subscribe_request(&self, sub_id: String, topic: &LiveTopic) -> Option<String> {
        let request = WsRequest::Subscribe(WsSubscribeParams {
            sub_id,
            topic: topic.to_string(),
        });

        serde_json::to_string(&request)
            .inspect_err(|err| {
                tracing::error!("Could not serialize subscribe message: {:?}", err);
            })
            .ok()
    }

    fn unsubscribe_request(&self, sub_id: String) -> Option<String> {
        let request = WsRequest::Unsubscribe(WsUnsubscribeParams { sub_id });

        serde_json::to_string(&request)
            .inspect_err(|err| {
                tracing::error!("Could not serialize unsubscribe message: {:?}", err);
            })
            .ok()
    }
}

#[async_trait::async_trait]
impl Transport for LiveClient {
    type Spec = AccountChannel;

    fn new_name(&self) -> <Self::Spec as Spec>::SubscriptionId {
        Uuid::new_v4().to_string()
    }

    async fn stream(
        &self,
        ctrls: mpsc::Receiver<StreamCtrl<Self::Spec>>,
        topics: Vec<SubscribeMessage<Self::Spec>>,
        reply_to: InternalRelay<Self::Spec>,
    ) -> Result<(), PubsubError> {
        ws::stream_client(self, ctrls, topics, reply_to).await
    }
}
