use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::notification::{
    Category, DeliveryStatus, Notification, NotificationKind, Status,
};
use crate::domain::settings::NotificationSettings;
use crate::infra::db::Db;
use crate::store::{
    Counters, ListFilter, NotificationStats, NotificationStore, SortField, SortOrder,
};

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, category, priority, title, message, \
     channels, delivery_status, status, is_read, read_at, tracking, related_entity, \
     action_url, image_url, metadata, batch_id, scheduled_at, expires_at, preferences, \
     created_at";

#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn notification_from_row(row: &PgRow) -> Result<Notification> {
    let kind: String = row.get("kind");
    let category: String = row.get("category");
    let priority: String = row.get("priority");
    let status: String = row.get("status");

    Ok(Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind: kind.parse()?,
        category: category.parse()?,
        priority: priority.parse()?,
        title: row.get("title"),
        message: row.get("message"),
        channels: serde_json::from_value(row.get::<Value, _>("channels"))?,
        delivery_status: serde_json::from_value(row.get::<Value, _>("delivery_status"))?,
        status: status.parse()?,
        is_read: row.get("is_read"),
        read_at: row.get("read_at"),
        tracking: serde_json::from_value(row.get::<Value, _>("tracking"))?,
        related_entity: row
            .get::<Option<Value>, _>("related_entity")
            .map(serde_json::from_value)
            .transpose()?,
        action_url: row.get("action_url"),
        image_url: row.get("image_url"),
        metadata: row.get("metadata"),
        batch_id: row.get("batch_id"),
        scheduled_at: row.get("scheduled_at"),
        expires_at: row.get("expires_at"),
        preferences: row
            .get::<Option<Value>, _>("preferences")
            .map(serde_json::from_value)
            .transpose()?,
        created_at: row.get("created_at"),
    })
}

fn order_clause(filter: &ListFilter) -> &'static str {
    // Whitelisted sort expressions only; nothing user-supplied is
    // interpolated into SQL.
    match (filter.sort, filter.order) {
        (SortField::CreatedAt, SortOrder::Desc) => "created_at DESC, id DESC",
        (SortField::CreatedAt, SortOrder::Asc) => "created_at ASC, id ASC",
        (SortField::Priority, SortOrder::Desc) => {
            "CASE priority WHEN 'urgent' THEN 3 WHEN 'high' THEN 2 WHEN 'medium' THEN 1 ELSE 0 END DESC, created_at DESC"
        }
        (SortField::Priority, SortOrder::Asc) => {
            "CASE priority WHEN 'urgent' THEN 3 WHEN 'high' THEN 2 WHEN 'medium' THEN 1 ELSE 0 END ASC, created_at DESC"
        }
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(self.db.pool()).await?;
        Ok(())
    }

    async fn user_exists(&self, user_id: Uuid) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.is_some())
    }

    async fn insert(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            "INSERT INTO notifications \
             (id, user_id, kind, category, priority, title, message, channels, \
              delivery_status, status, is_read, read_at, tracking, related_entity, \
              action_url, image_url, metadata, batch_id, scheduled_at, expires_at, \
              preferences, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
                     $15, $16, $17, $18, $19, $20, $21, $22)",
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(notification.kind.as_str())
        .bind(notification.category.as_str())
        .bind(notification.priority.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(serde_json::to_value(notification.channels)?)
        .bind(serde_json::to_value(notification.delivery_status)?)
        .bind(notification.status.as_str())
        .bind(notification.is_read)
        .bind(notification.read_at)
        .bind(serde_json::to_value(&notification.tracking)?)
        .bind(
            notification
                .related_entity
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(&notification.action_url)
        .bind(&notification.image_url)
        .bind(&notification.metadata)
        .bind(notification.batch_id)
        .bind(notification.scheduled_at)
        .bind(notification.expires_at)
        .bind(
            notification
                .preferences
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(notification.created_at)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn get(
        &self,
        user_id: Uuid,
        id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<Notification>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM notifications \
             WHERE id = $1 AND user_id = $2 \
               AND (expires_at IS NULL OR expires_at > $3)",
            NOTIFICATION_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .bind(now)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(notification_from_row).transpose()
    }

    async fn list(
        &self,
        user_id: Uuid,
        filter: &ListFilter,
        now: OffsetDateTime,
    ) -> Result<Vec<Notification>> {
        let query = format!(
            "SELECT {} FROM notifications \
             WHERE user_id = $1 \
               AND (expires_at IS NULL OR expires_at > $2) \
               AND ($3::text IS NULL OR category = $3) \
               AND ($4::text IS NULL OR kind = $4) \
               AND ($5::boolean IS NULL OR is_read = $5) \
             ORDER BY {} \
             LIMIT $6 OFFSET $7",
            NOTIFICATION_COLUMNS,
            order_clause(filter)
        );

        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(now)
            .bind(filter.category.map(|category| category.as_str()))
            .bind(filter.kind.map(|kind| kind.as_str()))
            .bind(filter.is_read)
            .bind(filter.limit())
            .bind(filter.offset())
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn mark_read(&self, user_id: Uuid, id: Uuid, now: OffsetDateTime) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications \
             SET is_read = TRUE, read_at = $3, status = 'read' \
             WHERE id = $1 AND user_id = $2 AND is_read = FALSE \
               AND (expires_at IS NULL OR expires_at > $3)",
        )
        .bind(id)
        .bind(user_id)
        .bind(now)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_unread(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications \
             SET is_read = FALSE, read_at = NULL, status = 'sent' \
             WHERE id = $1 AND user_id = $2 AND is_read = TRUE",
        )
        .bind(id)
        .bind(user_id)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_opened(&self, user_id: Uuid, id: Uuid, now: OffsetDateTime) -> Result<bool> {
        let opened_at = now.format(&Rfc3339)?;
        let result = sqlx::query(
            "UPDATE notifications \
             SET tracking = jsonb_set(jsonb_set(tracking, '{opened}', 'true'), \
                                      '{opened_at}', to_jsonb($3::text)) \
             WHERE id = $1 AND user_id = $2 \
               AND COALESCE((tracking->>'opened')::boolean, FALSE) = FALSE",
        )
        .bind(id)
        .bind(user_id)
        .bind(opened_at)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_read(&self, user_id: Uuid, now: OffsetDateTime) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications \
             SET is_read = TRUE, read_at = $2, status = 'read' \
             WHERE user_id = $1 AND is_read = FALSE \
               AND (expires_at IS NULL OR expires_at > $2)",
        )
        .bind(user_id)
        .bind(now)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, user_id: Uuid, ids: &[Uuid]) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM notifications WHERE user_id = $1 AND id = ANY($2)")
                .bind(user_id)
                .bind(ids)
                .execute(self.db.pool())
                .await?;
        Ok(result.rows_affected())
    }

    async fn delete_all(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE user_id = $1")
            .bind(user_id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }

    async fn update_delivery(
        &self,
        id: Uuid,
        delivery: &DeliveryStatus,
        status: Status,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE notifications SET delivery_status = $2, status = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(serde_json::to_value(delivery)?)
        .bind(status.as_str())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn recent_exists(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        since: OffsetDateTime,
    ) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM notifications \
             WHERE user_id = $1 AND kind = $2 AND status <> 'failed' \
               AND created_at >= $3 \
             LIMIT 1",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(since)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.is_some())
    }

    async fn due_scheduled(&self, now: OffsetDateTime, limit: i64) -> Result<Vec<Notification>> {
        // A row without an in-app channel stays `pending` after a successful
        // fan-out, so `status` alone cannot tell "not yet sent" from "sent
        // by mail only". An untouched delivery_status is what marks a row as
        // not yet fanned out.
        let rows = sqlx::query(&format!(
            "SELECT {} FROM notifications \
             WHERE status = 'pending' AND scheduled_at IS NOT NULL AND scheduled_at <= $1 \
               AND delivery_status = $2 \
               AND (expires_at IS NULL OR expires_at > $1) \
             ORDER BY scheduled_at ASC \
             LIMIT $3",
            NOTIFICATION_COLUMNS
        ))
        .bind(now)
        .bind(serde_json::to_value(DeliveryStatus::default())?)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            "DELETE FROM notifications \
             WHERE expires_at IS NOT NULL AND expires_at <= $1 \
             RETURNING user_id",
        )
        .bind(now)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(|row| row.get("user_id")).collect())
    }

    async fn unread_count(&self, user_id: Uuid, now: OffsetDateTime) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM notifications \
             WHERE user_id = $1 AND is_read = FALSE \
               AND (expires_at IS NULL OR expires_at > $2)",
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(self.db.pool())
        .await?;
        Ok(row.get("count"))
    }

    async fn total_count(&self, user_id: Uuid, now: OffsetDateTime) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM notifications \
             WHERE user_id = $1 \
               AND (expires_at IS NULL OR expires_at > $2)",
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(self.db.pool())
        .await?;
        Ok(row.get("count"))
    }

    async fn set_counters(&self, user_id: Uuid, counters: Counters) -> Result<()> {
        sqlx::query(
            "UPDATE users \
             SET unread_notifications = $2, total_notifications = $3 \
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(counters.unread)
        .bind(counters.total)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn counters(&self, user_id: Uuid) -> Result<Counters> {
        let row = sqlx::query(
            "SELECT unread_notifications, total_notifications FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(match row {
            Some(row) => Counters {
                unread: row.get("unread_notifications"),
                total: row.get("total_notifications"),
            },
            None => Counters::default(),
        })
    }

    async fn stats(&self, user_id: Uuid, now: OffsetDateTime) -> Result<NotificationStats> {
        let totals = sqlx::query(
            "SELECT COUNT(*) AS total, \
                    COUNT(*) FILTER (WHERE is_read = FALSE) AS unread, \
                    COUNT(*) FILTER (WHERE created_at >= $2 - INTERVAL '7 days') AS recent \
             FROM notifications \
             WHERE user_id = $1 AND (expires_at IS NULL OR expires_at > $2)",
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(self.db.pool())
        .await?;

        let mut stats = NotificationStats {
            total: totals.get("total"),
            unread: totals.get("unread"),
            recent: totals.get("recent"),
            ..NotificationStats::default()
        };

        let by_category = sqlx::query(
            "SELECT category, COUNT(*) AS count FROM notifications \
             WHERE user_id = $1 AND (expires_at IS NULL OR expires_at > $2) \
             GROUP BY category",
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(self.db.pool())
        .await?;

        for row in by_category {
            let category: Category = row.get::<String, _>("category").parse()?;
            stats.by_category.insert(category, row.get("count"));
        }

        let by_kind = sqlx::query(
            "SELECT kind, COUNT(*) AS count FROM notifications \
             WHERE user_id = $1 AND (expires_at IS NULL OR expires_at > $2) \
             GROUP BY kind",
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(self.db.pool())
        .await?;

        for row in by_kind {
            let kind: NotificationKind = row.get::<String, _>("kind").parse()?;
            stats.by_kind.insert(kind, row.get("count"));
        }

        Ok(stats)
    }

    async fn settings(&self, user_id: Uuid) -> Result<Option<NotificationSettings>> {
        let row = sqlx::query(
            "SELECT user_id, enabled, categories, kinds, do_not_disturb, \
                    frequency_override, updated_at \
             FROM notification_settings WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let frequency_override: Option<String> = row.get("frequency_override");
        Ok(Some(NotificationSettings {
            user_id: row.get("user_id"),
            enabled: row.get("enabled"),
            categories: serde_json::from_value(row.get::<Value, _>("categories"))?,
            kinds: serde_json::from_value(row.get::<Value, _>("kinds"))?,
            do_not_disturb: serde_json::from_value(row.get::<Value, _>("do_not_disturb"))?,
            frequency_override: frequency_override
                .map(|value| serde_json::from_value(Value::String(value)))
                .transpose()?,
            updated_at: row.get("updated_at"),
        }))
    }

    async fn insert_settings(&self, settings: &NotificationSettings) -> Result<()> {
        sqlx::query(
            "INSERT INTO notification_settings \
             (user_id, enabled, categories, kinds, do_not_disturb, frequency_override, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(settings.user_id)
        .bind(settings.enabled)
        .bind(serde_json::to_value(&settings.categories)?)
        .bind(serde_json::to_value(&settings.kinds)?)
        .bind(serde_json::to_value(&settings.do_not_disturb)?)
        .bind(settings.frequency_override.map(|value| value.as_str()))
        .bind(settings.updated_at)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn update_settings(&self, settings: &NotificationSettings) -> Result<()> {
        sqlx::query(
            "UPDATE notification_settings \
             SET enabled = $2, categories = $3, kinds = $4, do_not_disturb = $5, \
                 frequency_override = $6, updated_at = $7 \
             WHERE user_id = $1",
        )
        .bind(settings.user_id)
        .bind(settings.enabled)
        .bind(serde_json::to_value(&settings.categories)?)
        .bind(serde_json::to_value(&settings.kinds)?)
        .bind(serde_json::to_value(&settings.do_not_disturb)?)
        .bind(settings.frequency_override.map(|value| value.as_str()))
        .bind(settings.updated_at)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn add_push_token(&self, user_id: Uuid, token: &str, platform: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO push_tokens (user_id, token, platform) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, token) DO UPDATE SET platform = EXCLUDED.platform",
        )
        .bind(user_id)
        .bind(token)
        .bind(platform)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn remove_push_token(&self, user_id: Uuid, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM push_tokens WHERE user_id = $1 AND token = $2")
            .bind(user_id)
            .bind(token)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn push_token_count(&self, user_id: Uuid) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM push_tokens WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(self.db.pool())
            .await?;
        Ok(row.get("count"))
    }
}
