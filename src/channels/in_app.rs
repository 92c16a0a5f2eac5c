use anyhow::Result;
use async_trait::async_trait;

use crate::channels::ChannelSender;
use crate::domain::notification::{Channel, Notification};

/// In-app delivery is the stored notification row itself; by the time the
/// fan-out runs the record is already persisted, so this sender only
/// confirms the attempt.
pub struct InAppSender;

#[async_trait]
impl ChannelSender for InAppSender {
    fn channel(&self) -> Channel {
        Channel::InApp
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        tracing::debug!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            "in-app notification available"
        );
        Ok(())
    }
}
