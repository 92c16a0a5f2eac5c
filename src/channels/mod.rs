pub mod email;
pub mod in_app;
pub mod push;
pub mod sms;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::notification::{Channel, Notification};
use crate::store::NotificationStore;

pub use email::EmailSender;
pub use in_app::InAppSender;
pub use push::PushSender;
pub use sms::SmsSender;

/// One pluggable delivery transport.
///
/// A sender receives the rendered notification and reports whether this one
/// attempt succeeded. Failures stay local to the channel: the orchestrator
/// records them in the notification's delivery status and never lets them
/// touch another channel or the create call itself.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// The set of senders the orchestrator fans out to, keyed by channel.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(sender.channel(), sender);
        self
    }

    pub fn get(&self, channel: Channel) -> Option<Arc<dyn ChannelSender>> {
        self.senders.get(&channel).cloned()
    }

    /// Production wiring: all four channels with the built-in transports.
    pub fn standard(store: Arc<dyn NotificationStore>, email_from: String) -> Self {
        Self::new()
            .with(Arc::new(InAppSender))
            .with(Arc::new(EmailSender::new(email_from)))
            .with(Arc::new(PushSender::new(store)))
            .with(Arc::new(SmsSender))
    }
}
