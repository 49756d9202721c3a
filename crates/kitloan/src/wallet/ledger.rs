//! Idempotency ledger
//!
//! A duplicate gateway return must never produce a second user-visible
//! effect: the ledger gates each payment id to a single execution per
//! session, including a second mount of the same screen or a duplicate push
//! of the same return url. The in-process set is the linearization point;
//! the session store copy extends the guard across a hard reload within the
//! same browsing context. Both are best-effort duplicates of the backend's
//! own idempotency.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use kitloan_common::payment::CompletionMarker;
use kitloan_common::session::SessionStore;
use kitloan_common::util::unix_time;
use parking_lot::Mutex;

/// Session namespace for processing markers
const NS_PROCESSING: &str = "payment-processing";

/// Session namespace for already-announced markers
const NS_ANNOUNCED: &str = "payment-announced";

/// Session-scoped record of which payments are being, or were, processed
#[derive(Debug, Clone)]
pub struct IdempotencyLedger {
    session: Arc<dyn SessionStore>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl IdempotencyLedger {
    /// Create a new ledger over the given session store
    pub fn new(session: Arc<dyn SessionStore>) -> Self {
        Self {
            session,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Claim a payment id for processing
    ///
    /// Returns `true` exactly once per payment id within the session; every
    /// later call returns `false` until [`IdempotencyLedger::clear_after`]
    /// releases the marker. A [`CompletionMarker`] is persisted before the
    /// caller performs any network call.
    pub async fn try_begin_processing(&self, payment_id: &str) -> bool {
        match self.session.read(NS_PROCESSING, payment_id).await {
            Ok(Some(_)) => return false,
            Ok(None) => {}
            Err(err) => {
                tracing::warn!("Could not read processing marker for {payment_id}: {err}");
            }
        }

        {
            let mut in_flight = self.in_flight.lock();
            if !in_flight.insert(payment_id.to_string()) {
                return false;
            }
        }

        let marker = CompletionMarker::new(payment_id);
        match serde_json::to_vec(&marker) {
            Ok(bytes) => {
                if let Err(err) = self.session.write(NS_PROCESSING, payment_id, &bytes).await {
                    tracing::warn!("Could not persist processing marker for {payment_id}: {err}");
                }
            }
            Err(err) => {
                tracing::warn!("Could not encode processing marker for {payment_id}: {err}");
            }
        }

        true
    }

    /// Release the processing marker once the outcome is durably reflected
    /// server-side
    ///
    /// The delay bounds how long duplicate-return protection is honored
    /// without reopening the race window.
    pub fn clear_after(&self, payment_id: &str, delay: Duration) {
        let session = self.session.clone();
        let in_flight = self.in_flight.clone();
        let payment_id = payment_id.to_string();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if let Err(err) = session.remove(NS_PROCESSING, &payment_id).await {
                tracing::warn!("Could not release processing marker for {payment_id}: {err}");
            }
            in_flight.lock().remove(&payment_id);
        });
    }

    /// Claim the one success notice for a payment id
    ///
    /// Guards the user-visible notice separately from processing, so an
    /// already-settled replay in another context never toasts twice.
    pub async fn try_announce(&self, payment_id: &str) -> bool {
        match self.session.read(NS_ANNOUNCED, payment_id).await {
            Ok(Some(_)) => return false,
            Ok(None) => {}
            Err(err) => {
                tracing::warn!("Could not read announce marker for {payment_id}: {err}");
            }
        }

        let stamp = unix_time().to_string();
        if let Err(err) = self
            .session
            .write(NS_ANNOUNCED, payment_id, stamp.as_bytes())
            .await
        {
            tracing::warn!("Could not persist announce marker for {payment_id}: {err}");
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use kitloan_common::session::InMemorySessionStore;

    use super::*;

    fn ledger() -> (IdempotencyLedger, Arc<dyn SessionStore>) {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        (IdempotencyLedger::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_second_begin_is_denied() {
        let (ledger, _) = ledger();

        assert!(ledger.try_begin_processing("PAY-1").await);
        assert!(!ledger.try_begin_processing("PAY-1").await);

        // an unrelated payment id is independent
        assert!(ledger.try_begin_processing("PAY-2").await);
    }

    #[tokio::test]
    async fn test_marker_survives_reload() {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let first = IdempotencyLedger::new(store.clone());
        assert!(first.try_begin_processing("PAY-1").await);

        // a reload creates a fresh ledger over the same session store
        let reloaded = IdempotencyLedger::new(store);
        assert!(!reloaded.try_begin_processing("PAY-1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_after_releases_the_marker() {
        let (ledger, _) = ledger();

        assert!(ledger.try_begin_processing("PAY-1").await);
        ledger.clear_after("PAY-1", Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(ledger.try_begin_processing("PAY-1").await);
    }

    #[tokio::test]
    async fn test_announce_once() {
        let (ledger, _) = ledger();

        assert!(ledger.try_announce("PAY-1").await);
        assert!(!ledger.try_announce("PAY-1").await);
    }
}
