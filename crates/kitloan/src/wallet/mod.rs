//! KitLoan Wallet
//!
//! The [`Wallet`] is the single owner of the per-session account view. Two
//! producers feed that view and may interleave freely: authoritative
//! pull-based reconciliation after payment completions, and the push channel
//! whose events go through the [`merge::MergeEngine`]. Screens read the view;
//! they never mutate the collections directly.

use std::sync::Arc;

use kitloan_common::account::AccountView;
use kitloan_common::payment::{CreatePaymentRequest, CreatePaymentResponse, DeferredIntent, PaymentIntent};
use kitloan_common::session::SessionStore;
use kitloan_common::Amount;
use tokio::sync::RwLock;
use tracing::instrument;
use url::Url;

use crate::client::ApiConnector;
use crate::Error;

mod borrow;
mod completion;
mod gateway;
mod intent;
mod ledger;
pub mod merge;
mod notifications;
mod reconcile;
pub mod subscription;

pub use completion::{CompletionReport, CompletionStatus};
pub use gateway::GatewayReturn;
pub use intent::PendingIntentStore;
pub use ledger::IdempotencyLedger;
pub use merge::{MergeEngine, MergeOutcome};

use subscription::{user_topics, SubscriptionManager};

/// The KitLoan wallet client
///
/// One instance per authenticated session. Cloning is not supported; share it
/// behind an `Arc` where needed.
#[derive(Debug)]
pub struct Wallet {
    user_id: String,
    group_id: Option<String>,
    api: Arc<dyn ApiConnector + Send + Sync>,
    view: Arc<RwLock<AccountView>>,
    ledger: IdempotencyLedger,
    intents: PendingIntentStore,
    channel_url: Option<Url>,
    live: parking_lot::Mutex<Option<LiveSession>>,
}

#[derive(Debug)]
struct LiveSession {
    // kept alive so the consumer's connection stays up; dropping it tears the
    // transport down
    _manager: SubscriptionManager,
    pump: tokio::task::JoinHandle<()>,
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

impl Wallet {
    /// Create a [`WalletBuilder`]
    pub fn builder() -> WalletBuilder {
        WalletBuilder::default()
    }

    /// User this wallet belongs to
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Snapshot of the merged account view
    pub async fn view(&self) -> AccountView {
        self.view.read().await.clone()
    }

    /// Current wallet balance
    ///
    /// Authoritative only after a reconciling pull; a push may have set it
    /// early.
    pub async fn balance(&self) -> Amount {
        self.view.read().await.wallet.balance
    }

    /// Start a wallet top-up through the payment gateway
    ///
    /// Creates the gateway payment, remembers the [`PaymentIntent`] (and the
    /// deferred user action, when the top-up interrupts another flow) in the
    /// session store, and returns the approval url the user must be sent to.
    #[instrument(skip(self, description, return_url, cancel_url, resume))]
    pub async fn begin_top_up(
        &self,
        amount: Amount,
        description: &str,
        return_url: &str,
        cancel_url: &str,
        resume: Option<DeferredIntent>,
    ) -> Result<CreatePaymentResponse, Error> {
        let response = self
            .api
            .create_payment(CreatePaymentRequest {
                amount,
                description: description.to_string(),
                return_url: return_url.to_string(),
                cancel_url: cancel_url.to_string(),
            })
            .await?;

        let intent = PaymentIntent::new(
            response.payment_id.clone(),
            response.correlation_id.clone(),
            amount,
        );
        self.intents.store_pending(&intent).await?;

        if let Some(resume) = resume {
            self.intents.store_deferred(&resume).await?;
        }

        tracing::debug!("Created gateway payment {}", response.payment_id);
        Ok(response)
    }

    /// Connect the push channel and start merging its events into the view
    ///
    /// One subscription per resource kind is opened, scoped to this user (and
    /// group, for group-scoped roles). Events are applied through the
    /// [`MergeEngine`]; balance-only pushes trigger a correcting pull.
    pub fn connect_live(&self) -> Result<(), Error> {
        let channel_url = self
            .channel_url
            .clone()
            .ok_or_else(|| Error::Config("no live channel url configured".to_string()))?;

        let mut live = self.live.lock();
        if live.is_some() {
            return Ok(());
        }

        let manager = SubscriptionManager::new(channel_url);
        let mut subscription =
            manager.subscribe(user_topics(&self.user_id, self.group_id.as_deref()))?;

        let api = self.api.clone();
        let view = self.view.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                let outcome = MergeEngine::apply(&mut *view.write().await, &event);
                if matches!(outcome, MergeOutcome::NeedsReconcile) {
                    match reconcile::pull_wallet_state(api.as_ref()).await {
                        Ok(wallet) => view.write().await.wallet = wallet,
                        Err(err) => {
                            tracing::warn!("Balance pull after push failed: {err}");
                        }
                    }
                }
            }
        });

        *live = Some(LiveSession {
            _manager: manager,
            pump,
        });
        Ok(())
    }

    /// Tear down the push channel
    ///
    /// Subscriptions are released and the connection is closed. Safe to call
    /// when no channel is connected.
    pub fn logout(&self) {
        if self.live.lock().take().is_some() {
            tracing::debug!("Live channel torn down");
        }
    }

    /// Apply one push event to the account view
    ///
    /// This is the merge path the live pump uses; it is public so embedders
    /// driving their own transport can feed events in. A balance-only push
    /// sets the balance immediately and is then corrected by a reconciling
    /// pull, since the push payload may not include composite updates.
    pub async fn apply_live_event(
        &self,
        event: &kitloan_common::events::LiveEvent,
    ) -> MergeOutcome {
        let outcome = MergeEngine::apply(&mut *self.view.write().await, event);
        if matches!(outcome, MergeOutcome::NeedsReconcile) {
            if let Err(err) = self.reconcile_wallet().await {
                tracing::warn!("Balance pull after push failed: {err}");
            }
        }
        outcome
    }
}

/// Builder for [`Wallet`]
#[derive(Debug, Default)]
pub struct WalletBuilder {
    user_id: Option<String>,
    group_id: Option<String>,
    api: Option<Arc<dyn ApiConnector + Send + Sync>>,
    session: Option<Arc<dyn SessionStore>>,
    channel_url: Option<Url>,
}

impl WalletBuilder {
    /// Set the user id
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the group id, for group-scoped roles
    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Set the backend connector
    pub fn api(mut self, api: Arc<dyn ApiConnector + Send + Sync>) -> Self {
        self.api = Some(api);
        self
    }

    /// Set the session store backing the ephemeral markers
    pub fn session(mut self, session: Arc<dyn SessionStore>) -> Self {
        self.session = Some(session);
        self
    }

    /// Set the push channel url
    pub fn channel_url(mut self, channel_url: Url) -> Self {
        self.channel_url = Some(channel_url);
        self
    }

    /// Build the [`Wallet`]
    pub fn build(self) -> Result<Wallet, Error> {
        let user_id = self
            .user_id
            .ok_or_else(|| Error::Config("user id is required".to_string()))?;
        let api = self
            .api
            .ok_or_else(|| Error::Config("backend connector is required".to_string()))?;
        let session = self
            .session
            .ok_or_else(|| Error::Config("session store is required".to_string()))?;

        Ok(Wallet {
            user_id,
            group_id: self.group_id,
            ledger: IdempotencyLedger::new(session.clone()),
            intents: PendingIntentStore::new(session),
            api,
            view: Arc::new(RwLock::new(AccountView::default())),
            channel_url: self.channel_url,
            live: parking_lot::Mutex::new(None),
        })
    }
}
