//! Pending intent store
//!
//! Remembers the in-flight payment's correlation id and any deferred user
//! action across the gateway redirect, behind the swappable session store.
//! An absent intent on completion is a hard failure for that attempt; the
//! completion service never guesses a correlation id.

use std::sync::Arc;

use kitloan_common::payment::{DeferredIntent, PaymentIntent};
use kitloan_common::session::SessionStore;

use crate::Error;

/// Session namespace for intents
const NS_INTENT: &str = "payment-intent";

/// Key holding the pending payment intent
const KEY_PENDING: &str = "pending-payment";

/// Key holding the deferred intent blob
const KEY_DEFERRED: &str = "deferred-intent";

/// Store for the in-flight [`PaymentIntent`] and [`DeferredIntent`]
#[derive(Debug, Clone)]
pub struct PendingIntentStore {
    session: Arc<dyn SessionStore>,
}

impl PendingIntentStore {
    /// Create a new store over the given session store
    pub fn new(session: Arc<dyn SessionStore>) -> Self {
        Self { session }
    }

    /// Remember the in-flight payment
    pub async fn store_pending(&self, intent: &PaymentIntent) -> Result<(), Error> {
        let bytes = serde_json::to_vec(intent)?;
        self.session.write(NS_INTENT, KEY_PENDING, &bytes).await
    }

    /// Load the in-flight payment, if any
    pub async fn load_pending(&self) -> Result<Option<PaymentIntent>, Error> {
        match self.session.read(NS_INTENT, KEY_PENDING).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Forget the in-flight payment
    pub async fn clear_pending(&self) -> Result<(), Error> {
        self.session.remove(NS_INTENT, KEY_PENDING).await
    }

    /// Remember a deferred user action
    pub async fn store_deferred(&self, intent: &DeferredIntent) -> Result<(), Error> {
        let bytes = serde_json::to_vec(intent)?;
        self.session.write(NS_INTENT, KEY_DEFERRED, &bytes).await
    }

    /// Consume the deferred user action
    ///
    /// Loads and clears in one step so the action resumes at most once.
    pub async fn take_deferred(&self) -> Result<Option<DeferredIntent>, Error> {
        match self.session.read(NS_INTENT, KEY_DEFERRED).await? {
            Some(bytes) => {
                self.session.remove(NS_INTENT, KEY_DEFERRED).await?;
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            None => Ok(None),
        }
    }

    /// Forget the deferred user action
    pub async fn clear_deferred(&self) -> Result<(), Error> {
        self.session.remove(NS_INTENT, KEY_DEFERRED).await
    }

    /// Forget everything, as a cancelled gateway flow requires
    pub async fn clear_all(&self) -> Result<(), Error> {
        self.clear_pending().await?;
        self.clear_deferred().await
    }
}

#[cfg(test)]
mod tests {
    use kitloan_common::session::InMemorySessionStore;
    use kitloan_common::Amount;

    use super::*;

    fn store() -> PendingIntentStore {
        PendingIntentStore::new(Arc::new(InMemorySessionStore::new()))
    }

    #[tokio::test]
    async fn test_pending_roundtrip() {
        let intents = store();
        let intent = PaymentIntent::new("PAY-1".to_string(), "corr-1".to_string(), Amount::new(5));

        intents.store_pending(&intent).await.unwrap();
        assert_eq!(intents.load_pending().await.unwrap(), Some(intent));

        intents.clear_pending().await.unwrap();
        assert_eq!(intents.load_pending().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_deferred_consumed_at_most_once() {
        let intents = store();
        let deferred = DeferredIntent::ResumeRental {
            kit_id: "kit-7".to_string(),
        };

        intents.store_deferred(&deferred).await.unwrap();
        assert_eq!(intents.take_deferred().await.unwrap(), Some(deferred));
        assert_eq!(intents.take_deferred().await.unwrap(), None);
    }
}
