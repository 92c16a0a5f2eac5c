use axum::{routing::delete, routing::get, routing::patch, routing::post, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn notifications() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(handlers::list_notifications))
        .route("/notifications", delete(handlers::bulk_delete_notifications))
        .route("/notifications/unread-count", get(handlers::unread_count))
        .route("/notifications/stats", get(handlers::notification_stats))
        .route("/notifications/settings", get(handlers::get_settings))
        .route("/notifications/settings", patch(handlers::update_settings))
        .route("/notifications/preferences", get(handlers::get_preferences))
        .route(
            "/notifications/preferences",
            patch(handlers::update_preferences),
        )
        .route(
            "/notifications/push-token",
            post(handlers::register_push_token),
        )
        .route(
            "/notifications/push-token",
            delete(handlers::remove_push_token),
        )
        .route("/notifications/dnd", post(handlers::enable_dnd))
        .route("/notifications/dnd", delete(handlers::disable_dnd))
        .route("/notifications/read-all", post(handlers::mark_all_read))
        .route("/notifications/:id", get(handlers::get_notification))
        .route("/notifications/:id", delete(handlers::delete_notification))
        .route(
            "/notifications/:id/read",
            post(handlers::mark_notification_read),
        )
        .route(
            "/notifications/:id/unread",
            post(handlers::mark_notification_unread),
        )
}
