use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use time::Duration;
use uuid::Uuid;

use crate::app::notifications::NotificationService;
use crate::app::preferences::{CategoryPatch, CategorySummary, SettingsService, UpdateSettings};
use crate::domain::notification::Notification;
use crate::domain::settings::NotificationSettings;
use crate::http::{AppError, AuthUser};
use crate::store::{ListFilter, NotificationStats, SortField, SortOrder};
use crate::AppState;

const PUSH_PLATFORMS: [&str; 3] = ["ios", "android", "web"];

// The quiet-hours window is a pair of HH:MM wall-clock times, so it cannot
// represent a span of a day or more.
const DND_MAX_DURATION_MINUTES: i64 = 24 * 60;

fn notification_service(state: &AppState) -> NotificationService {
    NotificationService::new(
        state.store.clone(),
        state.channels.clone(),
        state.templates.clone(),
        Duration::minutes(state.dedup_lookback_minutes),
    )
}

fn settings_service(state: &AppState) -> SettingsService {
    SettingsService::new(state.store.clone())
}

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.store.ping().await.is_ok() {
        "ok"
    } else {
        "degraded"
    };
    Json(HealthResponse { status })
}

// ---------------------------------------------------------------------------
// Listing / stats
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub is_read: Option<bool>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

fn build_filter(query: ListQuery) -> Result<ListFilter, AppError> {
    let category = query
        .category
        .map(|value| value.parse())
        .transpose()
        .map_err(|_| AppError::bad_request("unknown category"))?;
    let kind = query
        .kind
        .map(|value| value.parse())
        .transpose()
        .map_err(|_| AppError::bad_request("unknown notification type"))?;
    let sort = match query.sort.as_deref() {
        None | Some("created_at") => SortField::CreatedAt,
        Some("priority") => SortField::Priority,
        Some(_) => return Err(AppError::bad_request("invalid sort field")),
    };
    let order = match query.order.as_deref() {
        None | Some("desc") => SortOrder::Desc,
        Some("asc") => SortOrder::Asc,
        Some(_) => return Err(AppError::bad_request("invalid sort order")),
    };

    Ok(ListFilter {
        category,
        kind,
        is_read: query.is_read,
        sort,
        order,
        page: query.page.unwrap_or(1).max(1),
        limit: query.limit.unwrap_or(20),
    })
}

#[derive(Serialize)]
pub struct ListResponse {
    pub items: Vec<Notification>,
    pub page: u32,
    pub limit: u32,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    let filter = build_filter(query)?;
    let items = notification_service(&state)
        .list(auth.user_id, &filter)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list notifications");
            AppError::internal("failed to list notifications")
        })?;

    Ok(Json(ListResponse {
        items,
        page: filter.page,
        limit: filter.limit.clamp(1, ListFilter::MAX_LIMIT),
    }))
}

#[derive(Serialize)]
pub struct UnreadCountResponse {
    pub unread: i64,
}

pub async fn unread_count(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UnreadCountResponse>, AppError> {
    let unread = notification_service(&state)
        .unread_count(auth.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to count unread notifications");
            AppError::internal("failed to count unread notifications")
        })?;
    Ok(Json(UnreadCountResponse { unread }))
}

pub async fn notification_stats(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<NotificationStats>, AppError> {
    let stats = notification_service(&state)
        .stats(auth.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to compute notification stats");
            AppError::internal("failed to compute notification stats")
        })?;
    Ok(Json(stats))
}

// ---------------------------------------------------------------------------
// Single-notification operations
// ---------------------------------------------------------------------------

pub async fn get_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    let notification = notification_service(&state)
        .open(auth.user_id, id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to fetch notification");
            AppError::internal("failed to fetch notification")
        })?
        .ok_or_else(|| AppError::not_found("notification not found"))?;
    Ok(Json(notification))
}

pub async fn mark_notification_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    let notification = notification_service(&state)
        .mark_read(auth.user_id, id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to mark notification read");
            AppError::internal("failed to mark notification read")
        })?
        .ok_or_else(|| AppError::not_found("notification not found"))?;
    Ok(Json(notification))
}

pub async fn mark_notification_unread(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    let notification = notification_service(&state)
        .mark_unread(auth.user_id, id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to mark notification unread");
            AppError::internal("failed to mark notification unread")
        })?
        .ok_or_else(|| AppError::not_found("notification not found"))?;
    Ok(Json(notification))
}

#[derive(Serialize)]
pub struct UpdatedResponse {
    pub updated: u64,
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UpdatedResponse>, AppError> {
    let updated = notification_service(&state)
        .mark_all_read(auth.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to mark all notifications read");
            AppError::internal("failed to mark all notifications read")
        })?;
    Ok(Json(UpdatedResponse { updated }))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = notification_service(&state)
        .delete(auth.user_id, id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to delete notification");
            AppError::internal("failed to delete notification")
        })?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("notification not found"))
    }
}

#[derive(Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Option<Vec<Uuid>>,
    pub all: Option<bool>,
}

#[derive(Serialize)]
pub struct DeletedResponse {
    pub deleted: u64,
}

pub async fn bulk_delete_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<BulkDeleteRequest>,
) -> Result<Json<DeletedResponse>, AppError> {
    let service = notification_service(&state);

    let deleted = if payload.all.unwrap_or(false) {
        service.delete_all(auth.user_id).await
    } else {
        match payload.ids.as_deref() {
            Some(ids) if !ids.is_empty() => service.delete_many(auth.user_id, ids).await,
            _ => return Err(AppError::bad_request("provide ids or all=true")),
        }
    }
    .map_err(|err| {
        tracing::error!(error = ?err, "failed to delete notifications");
        AppError::internal("failed to delete notifications")
    })?;

    Ok(Json(DeletedResponse { deleted }))
}

// ---------------------------------------------------------------------------
// Settings / preferences
// ---------------------------------------------------------------------------

pub async fn get_settings(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<NotificationSettings>, AppError> {
    let settings = settings_service(&state)
        .get_or_create(auth.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to load notification settings");
            AppError::internal("failed to load notification settings")
        })?;
    Ok(Json(settings))
}

pub async fn update_settings(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UpdateSettings>,
) -> Result<Json<NotificationSettings>, AppError> {
    let settings = settings_service(&state)
        .update(auth.user_id, payload)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to update notification settings");
            AppError::internal("failed to update notification settings")
        })?;
    Ok(Json(settings))
}

#[derive(Serialize)]
pub struct PreferencesResponse {
    pub categories: Vec<CategorySummary>,
}

pub async fn get_preferences(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<PreferencesResponse>, AppError> {
    let categories = settings_service(&state)
        .summary(auth.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to load notification preferences");
            AppError::internal("failed to load notification preferences")
        })?;
    Ok(Json(PreferencesResponse { categories }))
}

#[derive(Deserialize)]
pub struct UpdatePreferencesRequest {
    pub categories: Vec<CategoryPatch>,
}

pub async fn update_preferences(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UpdatePreferencesRequest>,
) -> Result<Json<PreferencesResponse>, AppError> {
    let categories = settings_service(&state)
        .update_summary(auth.user_id, payload.categories)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to update notification preferences");
            AppError::internal("failed to update notification preferences")
        })?;
    Ok(Json(PreferencesResponse { categories }))
}

// ---------------------------------------------------------------------------
// Push tokens / do-not-disturb
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RegisterPushTokenRequest {
    pub token: Option<String>,
    pub platform: Option<String>,
}

pub async fn register_push_token(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<RegisterPushTokenRequest>,
) -> Result<StatusCode, AppError> {
    let token = payload
        .token
        .as_deref()
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("token is required"))?;
    let platform = payload
        .platform
        .as_deref()
        .ok_or_else(|| AppError::bad_request("platform is required"))?;
    if !PUSH_PLATFORMS.contains(&platform) {
        return Err(AppError::bad_request("platform must be ios, android or web"));
    }

    settings_service(&state)
        .register_push_token(auth.user_id, token, platform)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to register push token");
            AppError::internal("failed to register push token")
        })?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct RemovePushTokenRequest {
    pub token: String,
}

pub async fn remove_push_token(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<RemovePushTokenRequest>,
) -> Result<StatusCode, AppError> {
    let removed = settings_service(&state)
        .remove_push_token(auth.user_id, &payload.token)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to remove push token");
            AppError::internal("failed to remove push token")
        })?;

    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("push token not found"))
    }
}

#[derive(Deserialize)]
pub struct EnableDndRequest {
    pub duration_minutes: Option<i64>,
}

pub async fn enable_dnd(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<EnableDndRequest>,
) -> Result<Json<NotificationSettings>, AppError> {
    if let Some(minutes) = payload.duration_minutes {
        if minutes <= 0 || minutes >= DND_MAX_DURATION_MINUTES {
            return Err(AppError::bad_request(
                "duration_minutes must be between 1 and 1439",
            ));
        }
    }

    let settings = settings_service(&state)
        .enable_dnd(auth.user_id, payload.duration_minutes)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to enable do-not-disturb");
            AppError::internal("failed to enable do-not-disturb")
        })?;
    Ok(Json(settings))
}

pub async fn disable_dnd(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<NotificationSettings>, AppError> {
    let settings = settings_service(&state)
        .disable_dnd(auth.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to disable do-not-disturb");
            AppError::internal("failed to disable do-not-disturb")
        })?;
    Ok(Json(settings))
}
