use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::{OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::domain::notification::{Category, ChannelSet, Frequency, NotificationKind};

/// Partial channel selection inside a preference entry. `None` means "no
/// opinion at this level", letting a coarser level (or the hard default)
/// decide that channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPrefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_app: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<bool>,
}

impl ChannelPrefs {
    pub fn all(in_app: bool, email: bool, push: bool) -> Self {
        Self {
            in_app: Some(in_app),
            email: Some(email),
            push: Some(push),
        }
    }
}

/// One preference record, used both per category and per kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceEntry {
    pub enabled: bool,
    pub frequency: Frequency,
    #[serde(default)]
    pub channels: ChannelPrefs,
}

/// Quiet-hours window. Times are "HH:MM" in the configured timezone, which
/// is a fixed UTC offset string such as "+02:00" (unparseable values fall
/// back to UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoNotDisturb {
    pub enabled: bool,
    pub start_time: String,
    pub end_time: String,
    pub timezone: String,
}

impl Default for DoNotDisturb {
    fn default() -> Self {
        Self {
            enabled: false,
            start_time: "22:00".to_string(),
            end_time: "07:00".to_string(),
            timezone: "+00:00".to_string(),
        }
    }
}

impl DoNotDisturb {
    pub fn offset(&self) -> UtcOffset {
        parse_offset(&self.timezone).unwrap_or(UtcOffset::UTC)
    }

    /// Whether `now` falls inside the quiet window.
    ///
    /// Times compare as HHMM integers. A window whose start is later than its
    /// end crosses midnight and suppresses on both sides of it.
    pub fn suppresses(&self, now: OffsetDateTime) -> bool {
        if !self.enabled {
            return false;
        }
        let (start, end) = match (parse_hhmm(&self.start_time), parse_hhmm(&self.end_time)) {
            (Some(start), Some(end)) => (start, end),
            _ => return false,
        };
        let local = now.to_offset(self.offset());
        let current = i32::from(local.hour()) * 100 + i32::from(local.minute());
        if start > end {
            current >= start || current <= end
        } else {
            current >= start && current <= end
        }
    }
}

fn parse_hhmm(value: &str) -> Option<i32> {
    let (hours, minutes) = value.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    Some(hours * 100 + minutes)
}

fn parse_offset(value: &str) -> Option<UtcOffset> {
    let (sign, rest) = if let Some(rest) = value.strip_prefix('+') {
        (1i8, rest)
    } else if let Some(rest) = value.strip_prefix('-') {
        (-1i8, rest)
    } else {
        return None;
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i8 = hours.parse().ok()?;
    let minutes: i8 = minutes.parse().ok()?;
    UtcOffset::from_hms(sign * hours, sign * minutes, 0).ok()
}

/// What the preference stack resolved to for one (kind, category) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPreference {
    pub enabled: bool,
    pub frequency: Frequency,
    pub channels: ChannelSet,
}

/// Per-user notification settings, created lazily with [`defaults`] on first
/// access and kept for the lifetime of the account.
///
/// [`defaults`]: NotificationSettings::defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub user_id: Uuid,
    /// Global kill switch.
    pub enabled: bool,
    #[serde(default)]
    pub categories: BTreeMap<Category, PreferenceEntry>,
    /// Per-kind overrides; beat category entries field by field.
    #[serde(default)]
    pub kinds: BTreeMap<NotificationKind, PreferenceEntry>,
    #[serde(default)]
    pub do_not_disturb: DoNotDisturb,
    /// Beats both kind and category frequency when set.
    pub frequency_override: Option<Frequency>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl NotificationSettings {
    /// Settings a user starts with: everything but marketing on, immediate
    /// delivery, quiet hours configured (22:00–07:00) but disabled.
    pub fn defaults(user_id: Uuid, now: OffsetDateTime) -> Self {
        let mut categories = BTreeMap::new();
        categories.insert(
            Category::Property,
            PreferenceEntry {
                enabled: true,
                frequency: Frequency::Immediate,
                channels: ChannelPrefs::all(true, true, true),
            },
        );
        categories.insert(
            Category::Account,
            PreferenceEntry {
                enabled: true,
                frequency: Frequency::Immediate,
                channels: ChannelPrefs::all(true, true, true),
            },
        );
        categories.insert(
            Category::Premium,
            PreferenceEntry {
                enabled: true,
                frequency: Frequency::Immediate,
                channels: ChannelPrefs::all(true, true, false),
            },
        );
        categories.insert(
            Category::Security,
            PreferenceEntry {
                enabled: true,
                frequency: Frequency::Immediate,
                channels: ChannelPrefs::all(true, true, true),
            },
        );
        categories.insert(
            Category::Marketing,
            PreferenceEntry {
                enabled: false,
                frequency: Frequency::Weekly,
                channels: ChannelPrefs::all(false, false, false),
            },
        );

        Self {
            user_id,
            enabled: true,
            categories,
            kinds: BTreeMap::new(),
            do_not_disturb: DoNotDisturb::default(),
            frequency_override: None,
            updated_at: now,
        }
    }

    /// Resolve effective enablement, frequency and channels for one kind.
    ///
    /// Precedence, most specific wins: kind entry > category entry > the
    /// hard default (in-app only, immediate). Channels merge field by field
    /// rather than whole-object.
    pub fn resolve(&self, kind: NotificationKind, category: Category) -> ResolvedPreference {
        let category_entry = self.categories.get(&category);
        let kind_entry = self.kinds.get(&kind);

        let enabled = kind_entry
            .map(|entry| entry.enabled)
            .or_else(|| category_entry.map(|entry| entry.enabled))
            .unwrap_or(true);

        let frequency = self
            .frequency_override
            .or_else(|| kind_entry.map(|entry| entry.frequency))
            .or_else(|| category_entry.map(|entry| entry.frequency))
            .unwrap_or(Frequency::Immediate);

        let pick = |field: fn(&ChannelPrefs) -> Option<bool>, default: bool| {
            kind_entry
                .and_then(|entry| field(&entry.channels))
                .or_else(|| category_entry.and_then(|entry| field(&entry.channels)))
                .unwrap_or(default)
        };

        let channels = ChannelSet {
            in_app: pick(|prefs| prefs.in_app, true),
            email: pick(|prefs| prefs.email, false),
            push: pick(|prefs| prefs.push, false),
            // SMS has no preference surface; only an explicit request
            // override could carry it, and the intersection drops it.
            sms: false,
        };

        ResolvedPreference {
            enabled,
            frequency,
            channels,
        }
    }

    /// Whether the user should get a notification of this kind at `now`.
    ///
    /// Order matters: the global switch, then quiet hours, then the most
    /// specific enablement flag. Unknown kinds and categories default to
    /// allowed.
    pub fn can_receive(
        &self,
        kind: NotificationKind,
        category: Category,
        now: OffsetDateTime,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        if self.do_not_disturb.suppresses(now) {
            return false;
        }
        if let Some(entry) = self.kinds.get(&kind) {
            return entry.enabled;
        }
        if let Some(entry) = self.categories.get(&category) {
            return entry.enabled;
        }
        true
    }
}
