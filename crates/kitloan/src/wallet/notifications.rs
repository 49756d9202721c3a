//! Notifications

use tracing::instrument;

use super::{merge, Wallet};
use crate::Error;

impl Wallet {
    /// Re-pull the user's notifications, replacing the local collection
    #[instrument(skip(self))]
    pub async fn refresh_notifications(&self) -> Result<(), Error> {
        let mut notifications = self.api.get_notifications().await?;
        merge::sort_newest_first(&mut notifications);
        self.view.write().await.notifications = notifications;
        Ok(())
    }

    /// Acknowledge a notification
    ///
    /// `is_read` transitions false to true only; there is no way back.
    #[instrument(skip(self))]
    pub async fn mark_notification_read(&self, notification_id: &str) -> Result<(), Error> {
        self.api.mark_notification_read(notification_id).await?;

        let mut view = self.view.write().await;
        if let Some(notification) = view
            .notifications
            .iter_mut()
            .find(|notification| notification.id == notification_id)
        {
            notification.is_read = true;
        }

        Ok(())
    }
}
