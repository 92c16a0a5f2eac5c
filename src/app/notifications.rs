use anyhow::{anyhow, Result};
use serde_json::json;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::preferences::SettingsService;
use crate::channels::ChannelRegistry;
use crate::domain::notification::{
    Category, Channel, ChannelSet, DeliveryStatus, Notification, NotificationKind,
    PreferenceSnapshot, Priority, RelatedEntity, Status, Tracking,
};
use crate::domain::templates::TemplateRegistry;
use crate::store::{Counters, ListFilter, NotificationStats, NotificationStore};

/// How many due scheduled notifications one sweep iteration picks up.
const DISPATCH_BATCH: i64 = 100;

/// Everything a platform subsystem can say about the notification it wants
/// created. Only `user_id` and `kind` are required; the template registry
/// fills the rest.
#[derive(Debug, Clone)]
pub struct CreateNotification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: Option<String>,
    pub message: Option<String>,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    /// Explicit channel request; intersected with the user's resolved
    /// channel preferences.
    pub channels: Option<ChannelSet>,
    pub related_entity: Option<RelatedEntity>,
    pub action_url: Option<String>,
    pub image_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub batch_id: Option<Uuid>,
    pub scheduled_at: Option<OffsetDateTime>,
    pub expires_at: Option<OffsetDateTime>,
}

impl CreateNotification {
    pub fn new(user_id: Uuid, kind: NotificationKind) -> Self {
        Self {
            user_id,
            kind,
            title: None,
            message: None,
            category: None,
            priority: None,
            channels: None,
            related_entity: None,
            action_url: None,
            image_url: None,
            metadata: None,
            batch_id: None,
            scheduled_at: None,
            expires_at: None,
        }
    }
}

/// Why a create call produced no notification. None of these are errors;
/// callers get a successful no-op and cannot tell a preference opt-out from
/// any other suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Global switch off, quiet hours, or the kind/category is disabled.
    Muted,
    /// Preference resolution left no channel enabled.
    NoChannels,
    /// Same (user, kind) was already notified inside the lookback window.
    Duplicate,
}

impl SuppressReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Muted => "muted",
            Self::NoChannels => "no_channels",
            Self::Duplicate => "duplicate",
        }
    }
}

#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(Notification),
    Suppressed(SuppressReason),
}

impl CreateOutcome {
    pub fn into_notification(self) -> Option<Notification> {
        match self {
            Self::Created(notification) => Some(notification),
            Self::Suppressed(_) => None,
        }
    }
}

/// The dispatch orchestrator: decides whether a notification should exist,
/// persists it, and fans it out across channel senders.
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    channels: ChannelRegistry,
    templates: Arc<TemplateRegistry>,
    dedup_lookback: Duration,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        channels: ChannelRegistry,
        templates: Arc<TemplateRegistry>,
        dedup_lookback: Duration,
    ) -> Self {
        Self {
            store,
            channels,
            templates,
            dedup_lookback,
        }
    }

    /// Create and dispatch one notification.
    ///
    /// Suppression (preferences, quiet hours, dedup, empty channel set) is a
    /// successful no-op. An unknown user or a failed persist is a hard
    /// error. Channel failures are recorded per channel and never propagate.
    pub async fn create(&self, request: CreateNotification) -> Result<CreateOutcome> {
        let now = OffsetDateTime::now_utc();

        if !self.store.user_exists(request.user_id).await? {
            return Err(anyhow!("user not found: {}", request.user_id));
        }

        let settings = SettingsService::new(self.store.clone())
            .get_or_create(request.user_id)
            .await?;

        let template = self.templates.resolve(request.kind);
        let category = request.category.unwrap_or(template.category);
        let priority = request.priority.unwrap_or(template.priority);

        if !settings.can_receive(request.kind, category, now) {
            debug!(
                user_id = %request.user_id,
                kind = request.kind.as_str(),
                "notification suppressed by preferences"
            );
            return Ok(CreateOutcome::Suppressed(SuppressReason::Muted));
        }

        let resolved = settings.resolve(request.kind, category);
        let mut channels = resolved.channels;
        if let Some(requested) = request.channels {
            channels = channels.intersect(&requested);
        }
        if !channels.any() {
            return Ok(CreateOutcome::Suppressed(SuppressReason::NoChannels));
        }

        if !self.should_send(request.user_id, request.kind, now).await? {
            debug!(
                user_id = %request.user_id,
                kind = request.kind.as_str(),
                "duplicate notification suppressed"
            );
            return Ok(CreateOutcome::Suppressed(SuppressReason::Duplicate));
        }

        let mut notification = Notification {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            kind: request.kind,
            category,
            priority,
            title: request
                .title
                .unwrap_or_else(|| template.title.to_string()),
            message: request
                .message
                .unwrap_or_else(|| template.message.to_string()),
            channels,
            delivery_status: DeliveryStatus::default(),
            status: Status::Pending,
            is_read: false,
            read_at: None,
            tracking: Tracking::default(),
            related_entity: request.related_entity,
            action_url: request.action_url,
            image_url: request.image_url,
            metadata: request.metadata.unwrap_or_else(|| json!({})),
            batch_id: request.batch_id,
            scheduled_at: request.scheduled_at,
            expires_at: request.expires_at,
            preferences: Some(PreferenceSnapshot {
                category,
                frequency: resolved.frequency,
            }),
            created_at: now,
        };
        notification.normalize(now);

        self.store.insert(&notification).await?;
        self.refresh_counters(request.user_id, now).await;

        let due_now = notification
            .scheduled_at
            .map_or(true, |scheduled_at| scheduled_at <= now);
        if due_now {
            self.fan_out(&mut notification).await;
        }

        info!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            kind = notification.kind.as_str(),
            status = notification.status.as_str(),
            "notification created"
        );
        Ok(CreateOutcome::Created(notification))
    }

    /// Anti-spam lookback: false when a non-failed notification of the same
    /// kind was created for this user inside the window. Best effort only;
    /// the check and the insert are not atomic, so two concurrent creates
    /// can both pass.
    async fn should_send(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        now: OffsetDateTime,
    ) -> Result<bool> {
        let since = now - self.dedup_lookback;
        Ok(!self.store.recent_exists(user_id, kind, since).await?)
    }

    /// Fan out to every enabled channel, one spawned task per channel.
    ///
    /// The join waits for every branch to settle; a failing (or panicking)
    /// sender only marks its own channel. Outcomes are applied to `status`
    /// one channel at a time, so a failure applied after an in-app success
    /// leaves `failed` in place; `delivery_status` keeps the per-channel
    /// truth.
    pub(crate) async fn fan_out(&self, notification: &mut Notification) {
        let rendered = Arc::new(notification.clone());
        let mut tasks = Vec::new();

        for channel in notification.channels.enabled() {
            let Some(sender) = self.channels.get(channel) else {
                warn!(channel = channel.as_str(), "no sender registered for channel");
                continue;
            };
            let rendered = rendered.clone();
            tasks.push((
                channel,
                tokio::spawn(async move { sender.send(&rendered).await }),
            ));
        }

        for (channel, handle) in tasks {
            match handle.await {
                Ok(Ok(())) => {
                    notification.delivery_status.set(channel, true);
                    if channel == Channel::InApp {
                        notification.status = Status::Sent;
                    }
                }
                Ok(Err(err)) => {
                    warn!(
                        error = ?err,
                        notification_id = %notification.id,
                        channel = channel.as_str(),
                        "channel delivery failed"
                    );
                    notification.delivery_status.set(channel, false);
                    notification.status = Status::Failed;
                }
                Err(err) => {
                    warn!(
                        error = ?err,
                        notification_id = %notification.id,
                        channel = channel.as_str(),
                        "channel task aborted"
                    );
                    notification.delivery_status.set(channel, false);
                    notification.status = Status::Failed;
                }
            }
        }

        if let Err(err) = self
            .store
            .update_delivery(
                notification.id,
                &notification.delivery_status,
                notification.status,
            )
            .await
        {
            warn!(
                error = ?err,
                notification_id = %notification.id,
                "failed to record delivery status"
            );
        }
    }

    pub async fn list(&self, user_id: Uuid, filter: &ListFilter) -> Result<Vec<Notification>> {
        self.store
            .list(user_id, filter, OffsetDateTime::now_utc())
            .await
    }

    /// Fetch one notification, recording the open (and therefore read) as a
    /// side effect.
    pub async fn open(&self, user_id: Uuid, id: Uuid) -> Result<Option<Notification>> {
        let now = OffsetDateTime::now_utc();
        let Some(existing) = self.store.get(user_id, id, now).await? else {
            return Ok(None);
        };

        if !existing.tracking.opened {
            self.store.mark_opened(user_id, id, now).await?;
        }
        if !existing.is_read {
            self.store.mark_read(user_id, id, now).await?;
            self.refresh_counters(user_id, now).await;
        }
        self.store.get(user_id, id, now).await
    }

    /// Idempotent: a second call finds the row already read and changes
    /// nothing, including the counters.
    pub async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<Option<Notification>> {
        let now = OffsetDateTime::now_utc();
        let Some(existing) = self.store.get(user_id, id, now).await? else {
            return Ok(None);
        };
        if !existing.is_read {
            self.store.mark_read(user_id, id, now).await?;
            self.refresh_counters(user_id, now).await;
        }
        self.store.get(user_id, id, now).await
    }

    pub async fn mark_unread(&self, user_id: Uuid, id: Uuid) -> Result<Option<Notification>> {
        let now = OffsetDateTime::now_utc();
        let Some(existing) = self.store.get(user_id, id, now).await? else {
            return Ok(None);
        };
        if existing.is_read {
            self.store.mark_unread(user_id, id).await?;
            self.refresh_counters(user_id, now).await;
        }
        self.store.get(user_id, id, now).await
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let now = OffsetDateTime::now_utc();
        let changed = self.store.mark_all_read(user_id, now).await?;
        self.refresh_counters(user_id, now).await;
        Ok(changed)
    }

    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let deleted = self.store.delete(user_id, id).await?;
        if deleted {
            self.refresh_counters(user_id, OffsetDateTime::now_utc())
                .await;
        }
        Ok(deleted)
    }

    pub async fn delete_many(&self, user_id: Uuid, ids: &[Uuid]) -> Result<u64> {
        let deleted = self.store.delete_many(user_id, ids).await?;
        self.refresh_counters(user_id, OffsetDateTime::now_utc())
            .await;
        Ok(deleted)
    }

    pub async fn delete_all(&self, user_id: Uuid) -> Result<u64> {
        let deleted = self.store.delete_all(user_id).await?;
        self.refresh_counters(user_id, OffsetDateTime::now_utc())
            .await;
        Ok(deleted)
    }

    /// Live unread count; also reconciles the stored counters, since this is
    /// the read path clients poll.
    pub async fn unread_count(&self, user_id: Uuid) -> Result<i64> {
        let now = OffsetDateTime::now_utc();
        let unread = self.store.unread_count(user_id, now).await?;
        self.refresh_counters(user_id, now).await;
        Ok(unread)
    }

    pub async fn stats(&self, user_id: Uuid) -> Result<NotificationStats> {
        self.store.stats(user_id, OffsetDateTime::now_utc()).await
    }

    /// Recompute {unread, total} from the store. Failures are logged and
    /// swallowed: counters are eventually consistent and must not undo an
    /// already-persisted notification write.
    pub async fn refresh_counters(&self, user_id: Uuid, now: OffsetDateTime) {
        let result = async {
            let unread = self.store.unread_count(user_id, now).await?;
            let total = self.store.total_count(user_id, now).await?;
            self.store
                .set_counters(user_id, Counters { unread, total })
                .await
        }
        .await;

        if let Err(err) = result {
            warn!(
                error = ?err,
                user_id = %user_id,
                "failed to refresh notification counters"
            );
        }
    }

    /// Fan out every pending notification whose schedule has arrived. Safe
    /// to re-run: a dispatched row either leaves `pending` or records its
    /// deliveries, and the due query skips both.
    pub async fn dispatch_due(&self, now: OffsetDateTime) -> Result<usize> {
        let due = self.store.due_scheduled(now, DISPATCH_BATCH).await?;
        let count = due.len();
        for mut notification in due {
            self.fan_out(&mut notification).await;
            info!(
                notification_id = %notification.id,
                user_id = %notification.user_id,
                status = notification.status.as_str(),
                "scheduled notification dispatched"
            );
        }
        Ok(count)
    }

    /// Delete rows past their expiry and recompute counters for every owner
    /// that lost one. Visibility does not depend on this: active queries
    /// filter expiry themselves.
    pub async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64> {
        let owners = self.store.purge_expired(now).await?;
        let purged = owners.len() as u64;

        let mut unique = owners;
        unique.sort_unstable();
        unique.dedup();
        for user_id in unique {
            self.refresh_counters(user_id, now).await;
        }
        Ok(purged)
    }
}
