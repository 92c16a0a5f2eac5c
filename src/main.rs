use anyhow::anyhow;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod channels;
mod config;
mod domain;
mod http;
mod infra;
mod jobs;
mod store;

use crate::app::notifications::NotificationService;
use crate::channels::ChannelRegistry;
use crate::config::AppConfig;
use crate::domain::templates::TemplateRegistry;
use crate::infra::db::Db;
use crate::store::{NotificationStore, PgStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn NotificationStore>,
    pub channels: ChannelRegistry,
    pub templates: Arc<TemplateRegistry>,
    pub dedup_lookback_minutes: i64,
    pub paseto_access_key: [u8; 32],
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let db = Db::connect(&config).await?;
    let store: Arc<dyn NotificationStore> = Arc::new(PgStore::new(db));
    let channels = ChannelRegistry::standard(store.clone(), config.email_from.clone());
    let templates = Arc::new(TemplateRegistry::builtin());

    let state = AppState {
        store,
        channels,
        templates,
        dedup_lookback_minutes: config.dedup_lookback_minutes,
        paseto_access_key: config.paseto_access_key,
    };

    match config.app_mode.as_str() {
        "api" => {
            let app: Router = http::router(state).layer(TraceLayer::new_for_http());
            let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
            tracing::info!("listening on {}", config.http_addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        "worker" => {
            tracing::info!("starting worker mode");
            let service = NotificationService::new(
                state.store.clone(),
                state.channels.clone(),
                state.templates.clone(),
                time::Duration::minutes(state.dedup_lookback_minutes),
            );
            let interval = Duration::from_secs(config.sweep_interval_seconds);
            tokio::select! {
                result = jobs::sweeper::run(service, interval) => {
                    result?;
                }
                _ = shutdown_signal() => {}
            }
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
