//! Borrow requests
//!
//! One actor may not hold two concurrent requests for the same kit. The
//! check re-pulls the user's requests right before the write and rejects
//! client-side when any request for the kit is still active; the backend
//! remains the final authority and its duplicate rejections are translated
//! the same way.

use kitloan_common::account::{BorrowRequestRecord, BorrowRequestStatus};
use kitloan_common::payment::CreateBorrowRequest;
use tracing::instrument;

use super::{merge, Wallet};
use crate::Error;

impl Wallet {
    /// Re-pull the user's borrow requests, replacing the local collection
    #[instrument(skip(self))]
    pub async fn refresh_borrow_requests(&self) -> Result<(), Error> {
        let mut requests = self.api.get_borrow_requests(&self.user_id).await?;
        merge::sort_newest_first(&mut requests);
        self.view.write().await.borrow_requests = requests;
        Ok(())
    }

    /// Create a borrow request for a kit
    ///
    /// Rejected client-side with [`Error::DuplicateBorrowRequest`], naming
    /// the conflicting request's status, when an earlier request for the
    /// same kit is still active. No network write happens in that case.
    #[instrument(skip(self))]
    pub async fn request_borrow(&self, kit_id: &str) -> Result<BorrowRequestRecord, Error> {
        let mut requests = self.api.get_borrow_requests(&self.user_id).await?;

        if let Some(conflict) = requests
            .iter()
            .find(|request| request.kit_id == kit_id && request.status.is_active())
        {
            tracing::warn!(
                "Borrow request for {kit_id} rejected, existing request {} is {}",
                conflict.id,
                conflict.status
            );
            return Err(Error::DuplicateBorrowRequest(conflict.status));
        }

        // the pre-flight pull doubles as a refresh of the local collection
        merge::sort_newest_first(&mut requests);
        self.view.write().await.borrow_requests = requests;

        let created = match self
            .api
            .create_borrow_request(CreateBorrowRequest {
                kit_id: kit_id.to_string(),
            })
            .await
        {
            Ok(created) => created,
            Err(Error::Response(response)) if response.is_duplicate_request() => {
                let status = self.conflicting_status(kit_id).await;
                return Err(Error::DuplicateBorrowRequest(status));
            }
            Err(err) => return Err(err),
        };

        merge::upsert(&mut self.view.write().await.borrow_requests, &created);
        Ok(created)
    }

    /// Name the status of the request the backend considers conflicting
    async fn conflicting_status(&self, kit_id: &str) -> BorrowRequestStatus {
        self.api
            .get_borrow_requests(&self.user_id)
            .await
            .ok()
            .and_then(|requests| {
                requests
                    .into_iter()
                    .find(|request| request.kit_id == kit_id && request.status.is_active())
            })
            .map(|request| request.status)
            .unwrap_or(BorrowRequestStatus::Pending)
    }
}
