use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Default lifetime of a notification when the caller does not set one.
pub const DEFAULT_TTL_DAYS: i64 = 30;

/// Closed set of platform event kinds that can produce a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PriceChange,
    NewListing,
    ListingSold,
    ListingUpdated,
    SavedSearchMatch,
    FavoriteUpdate,
    ViewingReminder,
    AccountSecurity,
    LoginAlert,
    PaymentFailed,
    SubscriptionRenewal,
    PremiumExpiring,
    SystemAnnouncement,
    MarketingOffer,
    WeeklyDigest,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriceChange => "price_change",
            Self::NewListing => "new_listing",
            Self::ListingSold => "listing_sold",
            Self::ListingUpdated => "listing_updated",
            Self::SavedSearchMatch => "saved_search_match",
            Self::FavoriteUpdate => "favorite_update",
            Self::ViewingReminder => "viewing_reminder",
            Self::AccountSecurity => "account_security",
            Self::LoginAlert => "login_alert",
            Self::PaymentFailed => "payment_failed",
            Self::SubscriptionRenewal => "subscription_renewal",
            Self::PremiumExpiring => "premium_expiring",
            Self::SystemAnnouncement => "system_announcement",
            Self::MarketingOffer => "marketing_offer",
            Self::WeeklyDigest => "weekly_digest",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let kind = match value {
            "price_change" => Self::PriceChange,
            "new_listing" => Self::NewListing,
            "listing_sold" => Self::ListingSold,
            "listing_updated" => Self::ListingUpdated,
            "saved_search_match" => Self::SavedSearchMatch,
            "favorite_update" => Self::FavoriteUpdate,
            "viewing_reminder" => Self::ViewingReminder,
            "account_security" => Self::AccountSecurity,
            "login_alert" => Self::LoginAlert,
            "payment_failed" => Self::PaymentFailed,
            "subscription_renewal" => Self::SubscriptionRenewal,
            "premium_expiring" => Self::PremiumExpiring,
            "system_announcement" => Self::SystemAnnouncement,
            "marketing_offer" => Self::MarketingOffer,
            "weekly_digest" => Self::WeeklyDigest,
            other => return Err(anyhow::anyhow!("unknown notification kind: {}", other)),
        };
        Ok(kind)
    }
}

/// Coarse grouping of notification kinds, the unit at which users
/// usually manage their preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Property,
    Account,
    System,
    Premium,
    Marketing,
    Security,
    General,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Property,
        Category::Account,
        Category::System,
        Category::Premium,
        Category::Marketing,
        Category::Security,
        Category::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Property => "property",
            Self::Account => "account",
            Self::System => "system",
            Self::Premium => "premium",
            Self::Marketing => "marketing",
            Self::Security => "security",
            Self::General => "general",
        }
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let category = match value {
            "property" => Self::Property,
            "account" => Self::Account,
            "system" => Self::System,
            "premium" => Self::Premium,
            "marketing" => Self::Marketing,
            "security" => Self::Security,
            "general" => Self::General,
            other => return Err(anyhow::anyhow!("unknown category: {}", other)),
        };
        Ok(category)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    /// Numeric rank used for priority sorting (higher is more urgent).
    pub fn rank(&self) -> i16 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Urgent => 3,
        }
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let priority = match value {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            "urgent" => Self::Urgent,
            other => return Err(anyhow::anyhow!("unknown priority: {}", other)),
        };
        Ok(priority)
    }
}

/// Lifecycle state of a notification.
///
/// `pending` → `sent` once the in-app delivery lands, `delivered` only via an
/// explicit external acknowledgement, `read` via the read mutation, and
/// `failed` whenever any channel attempt fails. The field is last-writer-wins
/// across channel outcomes; `DeliveryStatus` is the authoritative per-channel
/// record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let status = match value {
            "pending" => Self::Pending,
            "sent" => Self::Sent,
            "delivered" => Self::Delivered,
            "read" => Self::Read,
            "failed" => Self::Failed,
            other => return Err(anyhow::anyhow!("unknown status: {}", other)),
        };
        Ok(status)
    }
}

/// How often a user wants to hear about a given kind or category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Immediate,
    Daily,
    Weekly,
    Never,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Never => "never",
        }
    }
}

/// One delivery medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    InApp,
    Email,
    Push,
    Sms,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::InApp, Channel::Email, Channel::Push, Channel::Sms];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InApp => "in_app",
            Self::Email => "email",
            Self::Push => "push",
            Self::Sms => "sms",
        }
    }
}

/// Which channels a notification is (or was requested to be) sent through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSet {
    #[serde(default)]
    pub in_app: bool,
    #[serde(default)]
    pub email: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub sms: bool,
}

impl ChannelSet {
    pub fn any(&self) -> bool {
        self.in_app || self.email || self.push || self.sms
    }

    pub fn contains(&self, channel: Channel) -> bool {
        match channel {
            Channel::InApp => self.in_app,
            Channel::Email => self.email,
            Channel::Push => self.push,
            Channel::Sms => self.sms,
        }
    }

    /// Channels enabled in both sets.
    pub fn intersect(&self, other: &ChannelSet) -> ChannelSet {
        ChannelSet {
            in_app: self.in_app && other.in_app,
            email: self.email && other.email,
            push: self.push && other.push,
            sms: self.sms && other.sms,
        }
    }

    pub fn enabled(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|channel| self.contains(*channel))
            .collect()
    }
}

/// Per-channel delivery outcome. `true` means the attempt succeeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStatus {
    #[serde(default)]
    pub in_app: bool,
    #[serde(default)]
    pub email: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub sms: bool,
}

impl DeliveryStatus {
    /// True once any channel has recorded a successful delivery.
    pub fn any(&self) -> bool {
        self.in_app || self.email || self.push || self.sms
    }

    pub fn set(&mut self, channel: Channel, delivered: bool) {
        match channel {
            Channel::InApp => self.in_app = delivered,
            Channel::Email => self.email = delivered,
            Channel::Push => self.push = delivered,
            Channel::Sms => self.sms = delivered,
        }
    }
}

/// Client-side engagement record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracking {
    #[serde(default)]
    pub opened: bool,
    #[serde(default)]
    pub clicked: bool,
    #[serde(default)]
    pub action_taken: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub opened_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub clicked_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub action_at: Option<OffsetDateTime>,
}

/// Link back to the platform object this notification is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub entity_type: String,
    pub id: Uuid,
}

/// Preference state captured when the notification was created, so later
/// preference edits do not rewrite history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceSnapshot {
    pub category: Category,
    pub frequency: Frequency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub category: Category,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    pub channels: ChannelSet,
    pub delivery_status: DeliveryStatus,
    pub status: Status,
    pub is_read: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub tracking: Tracking,
    pub related_entity: Option<RelatedEntity>,
    pub action_url: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    pub batch_id: Option<Uuid>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub scheduled_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    pub preferences: Option<PreferenceSnapshot>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Notification {
    /// Fill derived defaults before the record is persisted.
    ///
    /// Kept as an explicit step (rather than a storage hook) so the behavior
    /// is visible and testable without a database: a missing `expires_at`
    /// becomes now + 30 days, and `is_read` forces `status = read` with a
    /// stamped `read_at`.
    pub fn normalize(&mut self, now: OffsetDateTime) {
        if self.expires_at.is_none() {
            self.expires_at = Some(now + Duration::days(DEFAULT_TTL_DAYS));
        }
        if self.is_read {
            self.status = Status::Read;
            if self.read_at.is_none() {
                self.read_at = Some(now);
            }
        }
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now)
    }
}
