//! State reconciliation
//!
//! Pulls are authoritative: after any completion the wallet state is
//! replaced, never merged, with what the backend reports. When the
//! reconciling pull itself fails the client falls back to one full-view
//! refresh, and if that fails too the view is reset to empty so nothing
//! stale survives.

use kitloan_common::account::AccountView;
use kitloan_common::wallet::WalletState;
use tracing::instrument;

use super::{merge, Wallet};
use crate::client::ApiConnector;
use crate::Error;

/// Pull balance and full history into a fresh [`WalletState`]
pub(crate) async fn pull_wallet_state(
    api: &(dyn ApiConnector + Send + Sync),
) -> Result<WalletState, Error> {
    let snapshot = api.get_wallet().await?;
    let mut transactions = api.get_transaction_history().await?;
    merge::sort_newest_first(&mut transactions);

    Ok(WalletState {
        balance: snapshot.balance,
        transactions,
    })
}

impl Wallet {
    /// Replace the local wallet state with the backend's current truth
    #[instrument(skip(self))]
    pub async fn reconcile_wallet(&self) -> Result<(), Error> {
        let wallet = pull_wallet_state(self.api.as_ref()).await?;
        self.view.write().await.wallet = wallet;
        Ok(())
    }

    /// Reconcile after a completion, falling back to a full refresh
    pub(crate) async fn reconcile_after_completion(&self) -> Result<(), Error> {
        if let Err(err) = self.reconcile_wallet().await {
            tracing::warn!("Reconciling pull failed after completion: {err}");

            if let Err(err) = self.full_refresh().await {
                tracing::error!("Full refresh failed as well: {err}");
                *self.view.write().await = AccountView::default();
                return Err(Error::ReconciliationFailed);
            }
        }

        Ok(())
    }

    /// Re-pull every resource and replace the whole account view
    ///
    /// Group members are push-maintained and left untouched.
    #[instrument(skip(self))]
    pub async fn full_refresh(&self) -> Result<(), Error> {
        let wallet = pull_wallet_state(self.api.as_ref()).await?;

        let mut notifications = self.api.get_notifications().await?;
        merge::sort_newest_first(&mut notifications);

        let mut penalties = self.api.get_penalties().await?;
        merge::sort_newest_first(&mut penalties);

        let mut borrow_requests = self.api.get_borrow_requests(&self.user_id).await?;
        merge::sort_newest_first(&mut borrow_requests);

        let mut view = self.view.write().await;
        view.wallet = wallet;
        view.notifications = notifications;
        view.penalties = penalties;
        view.borrow_requests = borrow_requests;

        Ok(())
    }

    /// Re-pull the user's penalties, replacing the local collection
    #[instrument(skip(self))]
    pub async fn refresh_penalties(&self) -> Result<(), Error> {
        let mut penalties = self.api.get_penalties().await?;
        merge::sort_newest_first(&mut penalties);
        self.view.write().await.penalties = penalties;
        Ok(())
    }
}
