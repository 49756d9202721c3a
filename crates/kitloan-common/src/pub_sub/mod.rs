//! Publish–subscribe plumbing for the live event channel.
//!
//! A type-agnostic consumer-side pub-sub: subscribers register interest in
//! topics and receive typed events through an in-process fan-out, while a
//! [`remote_consumer::Transport`] keeps a single connection to the remote
//! producer alive and relays its events inward. The channel never buffers or
//! replays; a dropped connection loses events until the next pull-based
//! reconciliation, which every consumer of a resource performs on mount.

mod error;
pub mod remote_consumer;
mod subscriber;
mod types;

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

pub use self::error::Error;
pub use self::subscriber::{ActiveSubscription, Subscriber, SubscriptionRequest};
pub use self::types::{Event, Spec};

/// Default channel size for subscription buffering
pub const DEFAULT_CHANNEL_SIZE: usize = 10_000;

/// Subscriber Receiver
pub type SubReceiver<S> = mpsc::Receiver<(Arc<<S as Spec>::SubscriptionId>, <S as Spec>::Event)>;

/// Internal Index Tree
pub type TopicTree<T> = Arc<
    RwLock<
        BTreeMap<
            // Index with a subscription unique ID
            (<T as Spec>::Topic, usize),
            Subscriber<T>,
        >,
    >,
>;

/// In-process pub-sub fan-out
pub struct Pubsub<S>
where
    S: Spec + 'static,
{
    listeners_topics: TopicTree<S>,
    unique_subscription_counter: AtomicUsize,
    active_subscribers: Arc<AtomicUsize>,
}

impl<S> Default for Pubsub<S>
where
    S: Spec + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Pubsub<S>
where
    S: Spec + 'static,
{
    /// Create a new instance
    pub fn new() -> Self {
        Self {
            listeners_topics: Default::default(),
            unique_subscription_counter: 0.into(),
            active_subscribers: Arc::new(0.into()),
        }
    }

    /// Total number of active subscribers, it is not the number of active
    /// topics being subscribed
    pub fn active_subscribers(&self) -> usize {
        self.active_subscribers
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Broadcast an event to all listeners subscribed to any of its topics
    ///
    /// Each subscriber receives the event at most once even when several of
    /// its topics match.
    pub fn publish<E>(&self, event: E)
    where
        E: Into<S::Event>,
    {
        let event = event.into();
        let index_storage = self.listeners_topics.read();

        let mut sent = HashSet::new();
        for topic in event.get_topics() {
            for ((subscription_index, unique_id), sender) in
                index_storage.range((topic.clone(), 0)..)
            {
                if subscription_index.cmp(&topic) != Ordering::Equal {
                    break;
                }
                if sent.contains(&unique_id) {
                    continue;
                }
                sent.insert(unique_id);
                sender.send(event.clone());
            }
        }
    }

    /// Subscribe to a set of topics
    pub fn subscribe<I>(&self, request: I) -> Result<ActiveSubscription<S>, Error>
    where
        I: SubscriptionRequest<
            Topic = <S::Event as Event>::Topic,
            SubscriptionId = S::SubscriptionId,
        >,
    {
        let (sender, receiver) = mpsc::channel(DEFAULT_CHANNEL_SIZE);

        let subscription_name = request.subscription_name();
        let sender = Subscriber::new(subscription_name.clone(), &sender);
        let mut index_storage = self.listeners_topics.write();
        let subscription_internal_id = self
            .unique_subscription_counter
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        self.active_subscribers
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let subscribed_to = request.try_get_topics()?;

        for index in subscribed_to.iter() {
            index_storage.insert((index.clone(), subscription_internal_id), sender.clone());
        }
        drop(index_storage);

        Ok(ActiveSubscription::new(
            subscription_internal_id,
            subscription_name,
            self.active_subscribers.clone(),
            self.listeners_topics.clone(),
            subscribed_to,
            Some(receiver),
        ))
    }
}
