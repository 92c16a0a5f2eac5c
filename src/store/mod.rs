pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::notification::{
    Category, DeliveryStatus, Notification, NotificationKind, Status,
};
use crate::domain::settings::NotificationSettings;

pub use postgres::PgStore;

/// Sort key for notification listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Filter + pagination for the list query. Only active (non-expired) rows
/// are ever returned; the store enforces that, not the caller.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub category: Option<Category>,
    pub kind: Option<NotificationKind>,
    pub is_read: Option<bool>,
    pub sort: SortField,
    pub order: SortOrder,
    pub page: u32,
    pub limit: u32,
}

impl ListFilter {
    pub const MAX_LIMIT: u32 = 100;

    pub fn limit(&self) -> i64 {
        i64::from(self.limit.clamp(1, Self::MAX_LIMIT))
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * self.limit()
    }
}

/// Derived per-user {unread, total} counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub unread: i64,
    pub total: i64,
}

/// Aggregates for the stats endpoint, over active rows only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NotificationStats {
    pub total: i64,
    pub unread: i64,
    pub by_category: BTreeMap<Category, i64>,
    pub by_kind: BTreeMap<NotificationKind, i64>,
    /// Rows created within the last seven days.
    pub recent: i64,
}

/// Persistence contract for the notification engine.
///
/// Every query that takes a `user_id` is scoped to it; a notification owned
/// by someone else behaves exactly like a missing one. Methods that take
/// `now` use it for the active (`expires_at` in the future or absent)
/// filter so callers and tests control the clock.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    /// Users live in the platform's user table; the engine only checks
    /// existence and keeps their counters.
    async fn user_exists(&self, user_id: Uuid) -> Result<bool>;

    // --- notifications -----------------------------------------------------

    async fn insert(&self, notification: &Notification) -> Result<()>;

    async fn get(
        &self,
        user_id: Uuid,
        id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<Notification>>;

    async fn list(
        &self,
        user_id: Uuid,
        filter: &ListFilter,
        now: OffsetDateTime,
    ) -> Result<Vec<Notification>>;

    /// Set the read flag; no-op (returns false) when already read.
    async fn mark_read(&self, user_id: Uuid, id: Uuid, now: OffsetDateTime) -> Result<bool>;

    /// Clear the read flag and drop status back to `sent`.
    async fn mark_unread(&self, user_id: Uuid, id: Uuid) -> Result<bool>;

    /// Record the open event; no-op when already opened.
    async fn mark_opened(&self, user_id: Uuid, id: Uuid, now: OffsetDateTime) -> Result<bool>;

    /// Read every currently-unread active notification; returns how many
    /// rows changed.
    async fn mark_all_read(&self, user_id: Uuid, now: OffsetDateTime) -> Result<u64>;

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool>;

    async fn delete_many(&self, user_id: Uuid, ids: &[Uuid]) -> Result<u64>;

    async fn delete_all(&self, user_id: Uuid) -> Result<u64>;

    /// Persist per-channel outcomes and the (last-writer-wins) status after
    /// a fan-out.
    async fn update_delivery(
        &self,
        id: Uuid,
        delivery: &DeliveryStatus,
        status: Status,
    ) -> Result<()>;

    /// Dedup lookback: does a non-failed notification of this kind exist for
    /// the user since `since`?
    async fn recent_exists(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        since: OffsetDateTime,
    ) -> Result<bool>;

    /// Pending notifications whose `scheduled_at` has arrived and whose
    /// fan-out has not recorded any delivery yet. The second condition keeps
    /// the sweep from re-sending rows that stay `pending` because their
    /// channel set has no in-app branch.
    async fn due_scheduled(&self, now: OffsetDateTime, limit: i64) -> Result<Vec<Notification>>;

    /// Delete expired rows; returns the owner of each deleted row so
    /// counters can be recomputed.
    async fn purge_expired(&self, now: OffsetDateTime) -> Result<Vec<Uuid>>;

    // --- counters ----------------------------------------------------------

    async fn unread_count(&self, user_id: Uuid, now: OffsetDateTime) -> Result<i64>;

    async fn total_count(&self, user_id: Uuid, now: OffsetDateTime) -> Result<i64>;

    async fn set_counters(&self, user_id: Uuid, counters: Counters) -> Result<()>;

    async fn counters(&self, user_id: Uuid) -> Result<Counters>;

    async fn stats(&self, user_id: Uuid, now: OffsetDateTime) -> Result<NotificationStats>;

    // --- settings ----------------------------------------------------------

    async fn settings(&self, user_id: Uuid) -> Result<Option<NotificationSettings>>;

    /// Insert unless a record already exists (lazy creation may race).
    async fn insert_settings(&self, settings: &NotificationSettings) -> Result<()>;

    async fn update_settings(&self, settings: &NotificationSettings) -> Result<()>;

    // --- push tokens -------------------------------------------------------

    async fn add_push_token(&self, user_id: Uuid, token: &str, platform: &str) -> Result<()>;

    async fn remove_push_token(&self, user_id: Uuid, token: &str) -> Result<bool>;

    async fn push_token_count(&self, user_id: Uuid) -> Result<i64>;
}
