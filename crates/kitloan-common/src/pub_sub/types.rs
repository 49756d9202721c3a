//! Pubsub Event definition
//!
//! The Pubsub Event defines the Topic type and how an event can be converted
//! to Topics.

use std::fmt::Debug;
use std::hash::Hash;

/// Pubsub settings
pub trait Spec: Send + Sync + 'static {
    /// Topic
    type Topic: Send + Sync + Clone + Debug + Eq + PartialEq + Ord + PartialOrd + Hash;

    /// Event
    type Event: Event<Topic = Self::Topic> + Send + Sync + Debug + Eq + PartialEq;

    /// Subscription Id
    type SubscriptionId: Clone + Debug + Eq + PartialEq + Ord + PartialOrd + Hash + Send + Sync;
}

/// Event trait
pub trait Event: Clone + Send + Sync + Eq + PartialEq {
    /// Generic Topic
    ///
    /// It should be sortable in a BTree for in-memory matching
    type Topic;

    /// To topics
    fn get_topics(&self) -> Vec<Self::Topic>;
}
