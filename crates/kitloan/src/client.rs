//! Backend client

use std::fmt::Debug;

use async_trait::async_trait;
use kitloan_common::account::{BorrowRequestRecord, NotificationRecord, PenaltyRecord};
use kitloan_common::error::ErrorResponse;
use kitloan_common::normalize;
use kitloan_common::payment::{
    CreateBorrowRequest, CreatePaymentRequest, CreatePaymentResponse, ExecutePaymentRequest,
};
use kitloan_common::wallet::{TransactionRecord, WalletSnapshot};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;
use url::Url;

use crate::Error;

/// Http Client
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    base_url: Url,
}

impl HttpClient {
    /// Create new [`HttpClient`]
    pub fn new(base_url: Url) -> Self {
        Self {
            inner: Client::new(),
            base_url,
        }
    }

    fn join_paths(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::UrlPathSegments)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn decode_body(body: &str) -> Result<Value, Error> {
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(body)?)
    }

    #[inline]
    async fn http_get(&self, url: Url) -> Result<Value, Error> {
        let response = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(ErrorResponse::from_body(&body).into());
        }

        Self::decode_body(&body)
    }

    #[inline]
    async fn http_post<P: Serialize + ?Sized>(&self, url: Url, payload: &P) -> Result<Value, Error> {
        let response = self
            .inner
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(ErrorResponse::from_body(&body).into());
        }

        Self::decode_body(&body)
    }
}

#[async_trait]
impl ApiConnector for HttpClient {
    /// Create a gateway payment
    #[instrument(skip(self, request), fields(base_url = %self.base_url))]
    async fn create_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<CreatePaymentResponse, Error> {
        let url = self.join_paths(&["api", "v1", "payments"])?;
        let value = self.http_post(url, &request).await?;
        normalize::item("payment", value)
    }

    /// Execute a returned payment
    #[instrument(skip(self, request), fields(base_url = %self.base_url, payment_id = %request.payment_id))]
    async fn execute_payment(
        &self,
        request: ExecutePaymentRequest,
    ) -> Result<WalletSnapshot, Error> {
        let url = self.join_paths(&["api", "v1", "payments", "execute"])?;
        let value = self.http_post(url, &request).await?;
        normalize::item("wallet", value)
    }

    /// Get the wallet snapshot
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn get_wallet(&self) -> Result<WalletSnapshot, Error> {
        let url = self.join_paths(&["api", "v1", "wallet"])?;
        let value = self.http_get(url).await?;
        normalize::item("wallet", value)
    }

    /// Get the full transaction history
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn get_transaction_history(&self) -> Result<Vec<TransactionRecord>, Error> {
        let url = self.join_paths(&["api", "v1", "wallet", "transactions"])?;
        let value = self.http_get(url).await?;
        normalize::list("transactions", value)
    }

    /// Get the user's notifications
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn get_notifications(&self) -> Result<Vec<NotificationRecord>, Error> {
        let url = self.join_paths(&["api", "v1", "notifications"])?;
        let value = self.http_get(url).await?;
        normalize::list("notifications", value)
    }

    /// Get the user's penalties
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn get_penalties(&self) -> Result<Vec<PenaltyRecord>, Error> {
        let url = self.join_paths(&["api", "v1", "penalties"])?;
        let value = self.http_get(url).await?;
        normalize::list("penalties", value)
    }

    /// Get the borrow requests of a user
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn get_borrow_requests(&self, user_id: &str) -> Result<Vec<BorrowRequestRecord>, Error> {
        let mut url = self.join_paths(&["api", "v1", "borrow-requests"])?;
        url.query_pairs_mut().append_pair("userId", user_id);
        let value = self.http_get(url).await?;
        normalize::list("borrow-requests", value)
    }

    /// Create a borrow request
    #[instrument(skip(self, request), fields(base_url = %self.base_url, kit_id = %request.kit_id))]
    async fn create_borrow_request(
        &self,
        request: CreateBorrowRequest,
    ) -> Result<BorrowRequestRecord, Error> {
        let url = self.join_paths(&["api", "v1", "borrow-requests"])?;
        let value = self.http_post(url, &request).await?;
        normalize::item("borrow-request", value)
    }

    /// Acknowledge a notification
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn mark_notification_read(&self, notification_id: &str) -> Result<(), Error> {
        let url = self.join_paths(&["api", "v1", "notifications", notification_id, "read"])?;
        self.http_post(url, &Value::Null).await?;
        Ok(())
    }
}

/// Interface that connects the client to the KitLoan backend. Typically
/// represents an [`HttpClient`].
#[async_trait]
pub trait ApiConnector: Debug {
    /// Create a gateway payment
    async fn create_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<CreatePaymentResponse, Error>;
    /// Execute a returned payment
    ///
    /// A replay for an already settled payment surfaces as an
    /// [`ErrorResponse`] for which
    /// [`ErrorResponse::is_already_executed`] holds.
    async fn execute_payment(&self, request: ExecutePaymentRequest)
        -> Result<WalletSnapshot, Error>;
    /// Get the wallet snapshot
    async fn get_wallet(&self) -> Result<WalletSnapshot, Error>;
    /// Get the full transaction history
    async fn get_transaction_history(&self) -> Result<Vec<TransactionRecord>, Error>;
    /// Get the user's notifications
    async fn get_notifications(&self) -> Result<Vec<NotificationRecord>, Error>;
    /// Get the user's penalties
    async fn get_penalties(&self) -> Result<Vec<PenaltyRecord>, Error>;
    /// Get the borrow requests of a user
    async fn get_borrow_requests(&self, user_id: &str) -> Result<Vec<BorrowRequestRecord>, Error>;
    /// Create a borrow request
    async fn create_borrow_request(
        &self,
        request: CreateBorrowRequest,
    ) -> Result<BorrowRequestRecord, Error>;
    /// Acknowledge a notification
    async fn mark_notification_read(&self, notification_id: &str) -> Result<(), Error>;
}
