//! Payment completion
//!
//! Drives the exactly-once execution of a gateway return against the
//! backend. Per payment id the flow is a small state machine: the ledger
//! either grants a single execution or the return is skipped outright; an
//! execution ends succeeded, already-done (a legitimate outcome when the
//! in-memory marker was lost, e.g. a new tab) or failed. Failures are
//! terminal for the attempt; a new top-up must be user-initiated.

use std::time::Duration;

use kitloan_common::payment::{DeferredIntent, ExecutePaymentRequest};
use tracing::instrument;
use url::Url;

use super::gateway::GatewayReturn;
use super::Wallet;
use crate::Error;

/// Buffer absorbing backend eventual consistency between "payment executed"
/// and "wallet balance updated"
const SETTLE_DELAY: Duration = Duration::from_millis(1_200);

/// Cooldown before a completed payment's processing marker is released
const MARKER_RELEASE_DELAY: Duration = Duration::from_secs(30);

/// Terminal state of a processed gateway return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// The backend executed the payment now
    Succeeded,
    /// The backend had already settled the payment; treated as success
    AlreadyDone,
    /// The ledger denied a second processing of the same return
    Skipped,
}

/// Outcome of processing one gateway return
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    /// Gateway payment id the return was for
    pub payment_id: String,
    /// Terminal state of the completion
    pub status: CompletionStatus,
    /// Whether the success notice should be shown; `false` when it was
    /// already announced for this payment id
    pub announce: bool,
    /// Deferred user action to resume, consumed at most once
    pub resume: Option<DeferredIntent>,
}

impl CompletionReport {
    fn skipped(payment_id: &str) -> Self {
        Self {
            payment_id: payment_id.to_string(),
            status: CompletionStatus::Skipped,
            announce: false,
            resume: None,
        }
    }
}

impl Wallet {
    /// Process the current navigation as a potential gateway return
    ///
    /// Returns `Ok(None)` when the navigation is not a gateway return at
    /// all. A user-cancelled return clears the pending and deferred intents
    /// and surfaces [`Error::GatewayCancelled`], a non-fatal warning. A
    /// successful return is executed exactly once per session no matter how
    /// often the same url is parsed; duplicates yield a
    /// [`CompletionStatus::Skipped`] report without any network call.
    #[instrument(skip(self, url))]
    pub async fn handle_gateway_return(
        &self,
        url: &Url,
    ) -> Result<Option<CompletionReport>, Error> {
        match GatewayReturn::from_url(url) {
            GatewayReturn::None => Ok(None),
            GatewayReturn::Cancelled => {
                tracing::warn!("Gateway flow cancelled by the user");
                self.intents.clear_all().await?;
                Err(Error::GatewayCancelled)
            }
            GatewayReturn::Success {
                payment_id,
                payer_id,
            } => Ok(Some(self.complete_payment(&payment_id, &payer_id).await?)),
        }
    }

    /// Execute a returned payment exactly once
    #[instrument(skip(self, payer_id))]
    pub(crate) async fn complete_payment(
        &self,
        payment_id: &str,
        payer_id: &str,
    ) -> Result<CompletionReport, Error> {
        if !self.ledger.try_begin_processing(payment_id).await {
            tracing::debug!("Return for {payment_id} already handled, skipping");
            return Ok(CompletionReport::skipped(payment_id));
        }

        let intent = match self.intents.load_pending().await? {
            Some(intent) if intent.payment_id == payment_id => intent,
            Some(other) => {
                tracing::error!(
                    "Pending intent is for {} but the return names {payment_id}",
                    other.payment_id
                );
                return Err(Error::MissingIntent);
            }
            None => return Err(Error::MissingIntent),
        };

        let request = ExecutePaymentRequest {
            payment_id: payment_id.to_string(),
            payer_id: payer_id.to_string(),
            correlation_id: intent.correlation_id,
        };

        match self.api.execute_payment(request).await {
            Ok(snapshot) => {
                tracing::debug!(
                    "Executed payment {payment_id}, reported balance {}",
                    snapshot.balance
                );
                self.finish_completion(payment_id, CompletionStatus::Succeeded)
                    .await
            }
            Err(Error::Response(response)) if response.is_already_executed() => {
                tracing::debug!("Payment {payment_id} was already settled upstream");
                self.finish_completion(payment_id, CompletionStatus::AlreadyDone)
                    .await
            }
            Err(Error::Response(response)) => {
                // the marker stays in place so a likely non-transient failure
                // is not retried in a tight loop
                self.intents.clear_pending().await?;
                Err(Error::ExecutionFailed(response.message))
            }
            Err(err) => {
                self.intents.clear_pending().await?;
                Err(Error::ExecutionFailed(err.to_string()))
            }
        }
    }

    async fn finish_completion(
        &self,
        payment_id: &str,
        status: CompletionStatus,
    ) -> Result<CompletionReport, Error> {
        self.intents.clear_pending().await?;
        self.ledger.clear_after(payment_id, MARKER_RELEASE_DELAY);
        let announce = self.ledger.try_announce(payment_id).await;

        tokio::time::sleep(SETTLE_DELAY).await;
        self.reconcile_after_completion().await?;

        let resume = self.intents.take_deferred().await?;

        Ok(CompletionReport {
            payment_id: payment_id.to_string(),
            status,
            announce,
            resume,
        })
    }
}
