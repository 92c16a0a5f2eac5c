use anyhow::Result;
use async_trait::async_trait;

use crate::channels::ChannelSender;
use crate::domain::notification::{Channel, Notification};

/// SMS hand-off. No preference surface enables SMS today, but the channel
/// stays wired so a future preference rollout only has to flip the flag.
pub struct SmsSender;

#[async_trait]
impl ChannelSender for SmsSender {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            "sms notification queued"
        );
        Ok(())
    }
}
