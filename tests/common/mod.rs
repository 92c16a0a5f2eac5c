#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use pasetors::claims::Claims;
use pasetors::keys::SymmetricKey;
use pasetors::{local, version4::V4};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;
use uuid::Uuid;

use domus::app::notifications::{CreateNotification, NotificationService};
use domus::app::preferences::SettingsService;
use domus::channels::{ChannelRegistry, ChannelSender};
use domus::domain::notification::{
    Category, Channel, ChannelSet, DeliveryStatus, Notification, NotificationKind, Priority,
    Status, Tracking,
};
use domus::domain::settings::NotificationSettings;
use domus::domain::templates::TemplateRegistry;
use domus::http::TOKEN_ISSUER;
use domus::store::{
    Counters, ListFilter, NotificationStats, NotificationStore, SortField, SortOrder,
};
use domus::AppState;

// ---------------------------------------------------------------------------
// MemoryStore — full NotificationStore implementation over in-memory maps
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Inner {
    users: HashSet<Uuid>,
    notifications: HashMap<Uuid, Notification>,
    settings: HashMap<Uuid, NotificationSettings>,
    counters: HashMap<Uuid, Counters>,
    push_tokens: HashMap<Uuid, Vec<(String, String)>>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self) -> Uuid {
        let user_id = Uuid::new_v4();
        self.inner.lock().unwrap().users.insert(user_id);
        user_id
    }

    /// Seed a notification directly, bypassing the orchestrator.
    pub fn seed(&self, notification: Notification) {
        self.inner
            .lock()
            .unwrap()
            .notifications
            .insert(notification.id, notification);
    }

    pub fn raw(&self, id: Uuid) -> Option<Notification> {
        self.inner.lock().unwrap().notifications.get(&id).cloned()
    }

    pub fn notification_count(&self) -> usize {
        self.inner.lock().unwrap().notifications.len()
    }
}

fn active(notification: &Notification, now: OffsetDateTime) -> bool {
    !notification.is_expired(now)
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn user_exists(&self, user_id: Uuid) -> Result<bool> {
        Ok(self.inner.lock().unwrap().users.contains(&user_id))
    }

    async fn insert(&self, notification: &Notification) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .notifications
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn get(
        &self,
        user_id: Uuid,
        id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<Notification>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .notifications
            .get(&id)
            .filter(|n| n.user_id == user_id && active(n, now))
            .cloned())
    }

    async fn list(
        &self,
        user_id: Uuid,
        filter: &ListFilter,
        now: OffsetDateTime,
    ) -> Result<Vec<Notification>> {
        let inner = self.inner.lock().unwrap();
        let mut items: Vec<Notification> = inner
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && active(n, now))
            .filter(|n| filter.category.map_or(true, |category| n.category == category))
            .filter(|n| filter.kind.map_or(true, |kind| n.kind == kind))
            .filter(|n| filter.is_read.map_or(true, |is_read| n.is_read == is_read))
            .cloned()
            .collect();

        match (filter.sort, filter.order) {
            (SortField::CreatedAt, SortOrder::Desc) => {
                items.sort_by(|a, b| b.created_at.cmp(&a.created_at))
            }
            (SortField::CreatedAt, SortOrder::Asc) => {
                items.sort_by(|a, b| a.created_at.cmp(&b.created_at))
            }
            (SortField::Priority, SortOrder::Desc) => {
                items.sort_by(|a, b| b.priority.rank().cmp(&a.priority.rank()))
            }
            (SortField::Priority, SortOrder::Asc) => {
                items.sort_by(|a, b| a.priority.rank().cmp(&b.priority.rank()))
            }
        }

        let offset = filter.offset() as usize;
        let limit = filter.limit() as usize;
        Ok(items.into_iter().skip(offset).take(limit).collect())
    }

    async fn mark_read(&self, user_id: Uuid, id: Uuid, now: OffsetDateTime) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.notifications.get_mut(&id) {
            Some(n) if n.user_id == user_id && !n.is_read && active(n, now) => {
                n.is_read = true;
                n.read_at = Some(now);
                n.status = Status::Read;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_unread(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.notifications.get_mut(&id) {
            Some(n) if n.user_id == user_id && n.is_read => {
                n.is_read = false;
                n.read_at = None;
                n.status = Status::Sent;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_opened(&self, user_id: Uuid, id: Uuid, now: OffsetDateTime) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.notifications.get_mut(&id) {
            Some(n) if n.user_id == user_id && !n.tracking.opened => {
                n.tracking.opened = true;
                n.tracking.opened_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_all_read(&self, user_id: Uuid, now: OffsetDateTime) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut changed = 0;
        for n in inner.notifications.values_mut() {
            if n.user_id == user_id && !n.is_read && active(n, now) {
                n.is_read = true;
                n.read_at = Some(now);
                n.status = Status::Read;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let owned = inner
            .notifications
            .get(&id)
            .map_or(false, |n| n.user_id == user_id);
        if owned {
            inner.notifications.remove(&id);
        }
        Ok(owned)
    }

    async fn delete_many(&self, user_id: Uuid, ids: &[Uuid]) -> Result<u64> {
        let mut deleted = 0;
        for id in ids {
            if self.delete(user_id, *id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn delete_all(&self, user_id: Uuid) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.notifications.len();
        inner.notifications.retain(|_, n| n.user_id != user_id);
        Ok((before - inner.notifications.len()) as u64)
    }

    async fn update_delivery(
        &self,
        id: Uuid,
        delivery: &DeliveryStatus,
        status: Status,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(n) = inner.notifications.get_mut(&id) {
            n.delivery_status = *delivery;
            n.status = status;
        }
        Ok(())
    }

    async fn recent_exists(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        since: OffsetDateTime,
    ) -> Result<bool> {
        Ok(self.inner.lock().unwrap().notifications.values().any(|n| {
            n.user_id == user_id
                && n.kind == kind
                && n.status != Status::Failed
                && n.created_at >= since
        }))
    }

    async fn due_scheduled(&self, now: OffsetDateTime, limit: i64) -> Result<Vec<Notification>> {
        let inner = self.inner.lock().unwrap();
        let mut due: Vec<Notification> = inner
            .notifications
            .values()
            .filter(|n| {
                n.status == Status::Pending
                    && !n.delivery_status.any()
                    && n.scheduled_at.map_or(false, |at| at <= now)
                    && active(n, now)
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> Result<Vec<Uuid>> {
        let mut inner = self.inner.lock().unwrap();
        let expired: Vec<Uuid> = inner
            .notifications
            .values()
            .filter(|n| n.is_expired(now))
            .map(|n| n.id)
            .collect();
        let mut owners = Vec::with_capacity(expired.len());
        for id in expired {
            if let Some(n) = inner.notifications.remove(&id) {
                owners.push(n.user_id);
            }
        }
        Ok(owners)
    }

    async fn unread_count(&self, user_id: Uuid, now: OffsetDateTime) -> Result<i64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.is_read && active(n, now))
            .count() as i64)
    }

    async fn total_count(&self, user_id: Uuid, now: OffsetDateTime) -> Result<i64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && active(n, now))
            .count() as i64)
    }

    async fn set_counters(&self, user_id: Uuid, counters: Counters) -> Result<()> {
        self.inner.lock().unwrap().counters.insert(user_id, counters);
        Ok(())
    }

    async fn counters(&self, user_id: Uuid) -> Result<Counters> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .counters
            .get(&user_id)
            .copied()
            .unwrap_or_default())
    }

    async fn stats(&self, user_id: Uuid, now: OffsetDateTime) -> Result<NotificationStats> {
        let inner = self.inner.lock().unwrap();
        let mut stats = NotificationStats::default();
        for n in inner.notifications.values() {
            if n.user_id != user_id || !active(n, now) {
                continue;
            }
            stats.total += 1;
            if !n.is_read {
                stats.unread += 1;
            }
            if n.created_at >= now - Duration::days(7) {
                stats.recent += 1;
            }
            *stats.by_category.entry(n.category).or_insert(0) += 1;
            *stats.by_kind.entry(n.kind).or_insert(0) += 1;
        }
        Ok(stats)
    }

    async fn settings(&self, user_id: Uuid) -> Result<Option<NotificationSettings>> {
        Ok(self.inner.lock().unwrap().settings.get(&user_id).cloned())
    }

    async fn insert_settings(&self, settings: &NotificationSettings) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .settings
            .entry(settings.user_id)
            .or_insert_with(|| settings.clone());
        Ok(())
    }

    async fn update_settings(&self, settings: &NotificationSettings) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .settings
            .insert(settings.user_id, settings.clone());
        Ok(())
    }

    async fn add_push_token(&self, user_id: Uuid, token: &str, platform: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let tokens = inner.push_tokens.entry(user_id).or_default();
        if let Some(existing) = tokens.iter_mut().find(|(existing, _)| existing == token) {
            existing.1 = platform.to_string();
        } else {
            tokens.push((token.to_string(), platform.to_string()));
        }
        Ok(())
    }

    async fn remove_push_token(&self, user_id: Uuid, token: &str) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(tokens) = inner.push_tokens.get_mut(&user_id) else {
            return Ok(false);
        };
        let before = tokens.len();
        tokens.retain(|(existing, _)| existing != token);
        Ok(tokens.len() < before)
    }

    async fn push_token_count(&self, user_id: Uuid) -> Result<i64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .push_tokens
            .get(&user_id)
            .map_or(0, |tokens| tokens.len() as i64))
    }
}

// ---------------------------------------------------------------------------
// ScriptedSender — per-channel sender with a toggleable failure mode
// ---------------------------------------------------------------------------

pub struct ScriptedSender {
    channel: Channel,
    fail: AtomicBool,
    attempts: AtomicUsize,
}

impl ScriptedSender {
    pub fn ok(channel: Channel) -> Arc<Self> {
        Arc::new(Self {
            channel,
            fail: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn failing(channel: Channel) -> Arc<Self> {
        let sender = Self::ok(channel);
        sender.set_fail(true);
        sender
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelSender for ScriptedSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, _notification: &Notification) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("scripted {} failure", self.channel.as_str()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub store: MemoryStore,
    pub service: NotificationService,
    pub in_app: Arc<ScriptedSender>,
    pub email: Arc<ScriptedSender>,
    pub push: Arc<ScriptedSender>,
    pub sms: Arc<ScriptedSender>,
}

impl TestApp {
    pub fn settings(&self) -> SettingsService {
        SettingsService::new(Arc::new(self.store.clone()))
    }
}

pub fn app() -> TestApp {
    let store = MemoryStore::new();
    let in_app = ScriptedSender::ok(Channel::InApp);
    let email = ScriptedSender::ok(Channel::Email);
    let push = ScriptedSender::ok(Channel::Push);
    let sms = ScriptedSender::ok(Channel::Sms);

    let registry = ChannelRegistry::new()
        .with(in_app.clone())
        .with(email.clone())
        .with(push.clone())
        .with(sms.clone());

    let service = NotificationService::new(
        Arc::new(store.clone()),
        registry,
        Arc::new(TemplateRegistry::builtin()),
        Duration::hours(1),
    );

    TestApp {
        store,
        service,
        in_app,
        email,
        push,
        sms,
    }
}

/// A minimal persisted-shape notification for seeding the store directly.
pub fn seed_notification(user_id: Uuid, kind: NotificationKind) -> Notification {
    let now = OffsetDateTime::now_utc();
    let mut notification = Notification {
        id: Uuid::new_v4(),
        user_id,
        kind,
        category: Category::Property,
        priority: Priority::Medium,
        title: "seeded".to_string(),
        message: "seeded".to_string(),
        channels: ChannelSet {
            in_app: true,
            email: false,
            push: false,
            sms: false,
        },
        delivery_status: DeliveryStatus::default(),
        status: Status::Pending,
        is_read: false,
        read_at: None,
        tracking: Tracking::default(),
        related_entity: None,
        action_url: None,
        image_url: None,
        metadata: serde_json::json!({}),
        batch_id: None,
        scheduled_at: None,
        expires_at: None,
        preferences: None,
        created_at: now,
    };
    notification.normalize(now);
    notification
}

pub fn request(user_id: Uuid, kind: NotificationKind) -> CreateNotification {
    CreateNotification::new(user_id, kind)
}

// ---------------------------------------------------------------------------
// HTTP harness
// ---------------------------------------------------------------------------

// Test-only key, never used in production.
pub const TEST_PASETO_ACCESS_KEY: [u8; 32] = *b"0123456789abcdef0123456789abcdef";

/// Mint an access token the way the platform's auth service does.
pub fn access_token(user_id: Uuid) -> String {
    let mut claims = Claims::new_expires_in(&std::time::Duration::from_secs(600)).unwrap();
    claims.issuer(TOKEN_ISSUER).unwrap();
    claims.audience(TOKEN_ISSUER).unwrap();
    claims.subject(&user_id.to_string()).unwrap();
    claims.add_additional("typ", "access").unwrap();

    let key = SymmetricKey::<V4>::from(&TEST_PASETO_ACCESS_KEY).unwrap();
    local::encrypt(&key, &claims, None, None).unwrap()
}

pub struct TestResponse {
    pub status: StatusCode,
    body_bytes: axum::body::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }
}

pub struct HttpApp {
    router: Router,
    pub store: MemoryStore,
    pub email: Arc<ScriptedSender>,
}

pub fn http_app() -> HttpApp {
    let store = MemoryStore::new();
    let email = ScriptedSender::ok(Channel::Email);
    let channels = ChannelRegistry::new()
        .with(ScriptedSender::ok(Channel::InApp))
        .with(email.clone())
        .with(ScriptedSender::ok(Channel::Push))
        .with(ScriptedSender::ok(Channel::Sms));

    let state = AppState {
        store: Arc::new(store.clone()),
        channels,
        templates: Arc::new(TemplateRegistry::builtin()),
        dedup_lookback_minutes: 60,
        paseto_access_key: TEST_PASETO_ACCESS_KEY,
    };

    HttpApp {
        router: domus::http::router(state),
        store,
        email,
    }
}

impl HttpApp {
    pub fn service(&self) -> NotificationService {
        NotificationService::new(
            Arc::new(self.store.clone()),
            ChannelRegistry::new()
                .with(ScriptedSender::ok(Channel::InApp))
                .with(self.email.clone()),
            Arc::new(TemplateRegistry::builtin()),
            Duration::hours(1),
        )
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }

        let request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse { status, body_bytes }
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, path, None, token).await
    }

    pub async fn post_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.request(Method::POST, path, Some(body), token).await
    }

    pub async fn patch_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.request(Method::PATCH, path, Some(body), token).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::DELETE, path, None, token).await
    }

    pub async fn delete_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.request(Method::DELETE, path, Some(body), token).await
    }
}
