pub mod app;
pub mod channels;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod jobs;
pub mod store;

use std::sync::Arc;

use crate::channels::ChannelRegistry;
use crate::domain::templates::TemplateRegistry;
use crate::store::NotificationStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn NotificationStore>,
    pub channels: ChannelRegistry,
    pub templates: Arc<TemplateRegistry>,
    pub dedup_lookback_minutes: i64,
    pub paseto_access_key: [u8; 32],
}
