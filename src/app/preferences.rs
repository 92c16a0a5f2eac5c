use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::domain::notification::{Category, ChannelSet, Frequency, NotificationKind};
use crate::domain::settings::{ChannelPrefs, DoNotDisturb, NotificationSettings, PreferenceEntry};
use crate::store::NotificationStore;

/// Patch applied to a user's settings record. Absent fields are untouched;
/// category/kind entries are merged per key, not replaced wholesale.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSettings {
    pub enabled: Option<bool>,
    pub categories: Option<BTreeMap<Category, PreferenceEntry>>,
    pub kinds: Option<BTreeMap<NotificationKind, PreferenceEntry>>,
    pub do_not_disturb: Option<DoNotDisturb>,
    pub frequency_override: Option<Frequency>,
    #[serde(default)]
    pub clear_frequency_override: bool,
}

/// Flat per-category view used by the preferences endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct CategorySummary {
    pub category: Category,
    pub enabled: bool,
    pub frequency: Frequency,
    pub channels: ChannelSet,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryPatch {
    pub category: Category,
    pub enabled: Option<bool>,
    pub frequency: Option<Frequency>,
    pub channels: Option<ChannelPrefs>,
}

/// Per-user settings management: lazy creation with defaults, patch-style
/// updates, quiet-hours toggles and push device registration.
#[derive(Clone)]
pub struct SettingsService {
    store: Arc<dyn NotificationStore>,
}

impl SettingsService {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// Settings are created with defaults the first time they are asked for;
    /// afterwards the same record comes back. Concurrent first accesses are
    /// resolved by the store's insert-if-absent plus the re-read.
    pub async fn get_or_create(&self, user_id: Uuid) -> Result<NotificationSettings> {
        if let Some(settings) = self.store.settings(user_id).await? {
            return Ok(settings);
        }

        let defaults = NotificationSettings::defaults(user_id, OffsetDateTime::now_utc());
        self.store.insert_settings(&defaults).await?;
        Ok(self.store.settings(user_id).await?.unwrap_or(defaults))
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        patch: UpdateSettings,
    ) -> Result<NotificationSettings> {
        let mut settings = self.get_or_create(user_id).await?;

        if let Some(enabled) = patch.enabled {
            settings.enabled = enabled;
        }
        if let Some(categories) = patch.categories {
            for (category, entry) in categories {
                settings.categories.insert(category, entry);
            }
        }
        if let Some(kinds) = patch.kinds {
            for (kind, entry) in kinds {
                settings.kinds.insert(kind, entry);
            }
        }
        if let Some(do_not_disturb) = patch.do_not_disturb {
            settings.do_not_disturb = do_not_disturb;
        }
        if patch.clear_frequency_override {
            settings.frequency_override = None;
        } else if let Some(frequency) = patch.frequency_override {
            settings.frequency_override = Some(frequency);
        }

        settings.updated_at = OffsetDateTime::now_utc();
        self.store.update_settings(&settings).await?;
        Ok(settings)
    }

    /// Effective per-category view: each category's entry (or the hard
    /// defaults) with the global frequency override applied.
    pub async fn summary(&self, user_id: Uuid) -> Result<Vec<CategorySummary>> {
        let settings = self.get_or_create(user_id).await?;

        Ok(Category::ALL
            .into_iter()
            .map(|category| {
                let entry = settings.categories.get(&category);
                let channels = ChannelSet {
                    in_app: entry.and_then(|e| e.channels.in_app).unwrap_or(true),
                    email: entry.and_then(|e| e.channels.email).unwrap_or(false),
                    push: entry.and_then(|e| e.channels.push).unwrap_or(false),
                    sms: false,
                };
                CategorySummary {
                    category,
                    enabled: entry.map_or(true, |e| e.enabled),
                    frequency: settings
                        .frequency_override
                        .or_else(|| entry.map(|e| e.frequency))
                        .unwrap_or(Frequency::Immediate),
                    channels,
                }
            })
            .collect())
    }

    pub async fn update_summary(
        &self,
        user_id: Uuid,
        patches: Vec<CategoryPatch>,
    ) -> Result<Vec<CategorySummary>> {
        let mut settings = self.get_or_create(user_id).await?;

        for patch in patches {
            let entry = settings
                .categories
                .entry(patch.category)
                .or_insert_with(|| PreferenceEntry {
                    enabled: true,
                    frequency: Frequency::Immediate,
                    channels: ChannelPrefs::default(),
                });
            if let Some(enabled) = patch.enabled {
                entry.enabled = enabled;
            }
            if let Some(frequency) = patch.frequency {
                entry.frequency = frequency;
            }
            if let Some(channels) = patch.channels {
                if channels.in_app.is_some() {
                    entry.channels.in_app = channels.in_app;
                }
                if channels.email.is_some() {
                    entry.channels.email = channels.email;
                }
                if channels.push.is_some() {
                    entry.channels.push = channels.push;
                }
            }
        }

        settings.updated_at = OffsetDateTime::now_utc();
        self.store.update_settings(&settings).await?;
        self.summary(user_id).await
    }

    /// Turn quiet hours on. With a duration, the window becomes "now until
    /// now + duration" in the configured timezone; without one the stored
    /// window is kept as-is. Callers bound the duration to under a day; the
    /// HH:MM window cannot hold a longer span.
    pub async fn enable_dnd(
        &self,
        user_id: Uuid,
        duration_minutes: Option<i64>,
    ) -> Result<NotificationSettings> {
        let mut settings = self.get_or_create(user_id).await?;
        settings.do_not_disturb.enabled = true;

        if let Some(minutes) = duration_minutes {
            let offset = settings.do_not_disturb.offset();
            let local_now = OffsetDateTime::now_utc().to_offset(offset);
            let local_end = local_now + Duration::minutes(minutes);
            settings.do_not_disturb.start_time =
                format!("{:02}:{:02}", local_now.hour(), local_now.minute());
            settings.do_not_disturb.end_time =
                format!("{:02}:{:02}", local_end.hour(), local_end.minute());
        }

        settings.updated_at = OffsetDateTime::now_utc();
        self.store.update_settings(&settings).await?;
        Ok(settings)
    }

    pub async fn disable_dnd(&self, user_id: Uuid) -> Result<NotificationSettings> {
        let mut settings = self.get_or_create(user_id).await?;
        settings.do_not_disturb.enabled = false;
        settings.updated_at = OffsetDateTime::now_utc();
        self.store.update_settings(&settings).await?;
        Ok(settings)
    }

    pub async fn register_push_token(
        &self,
        user_id: Uuid,
        token: &str,
        platform: &str,
    ) -> Result<()> {
        self.store.add_push_token(user_id, token, platform).await
    }

    pub async fn remove_push_token(&self, user_id: Uuid, token: &str) -> Result<bool> {
        self.store.remove_push_token(user_id, token).await
    }
}
