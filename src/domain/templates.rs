use std::collections::HashMap;

use crate::domain::notification::{Category, NotificationKind, Priority};

/// Default content for one notification kind.
#[derive(Debug, Clone, Copy)]
pub struct Template {
    pub title: &'static str,
    pub message: &'static str,
    pub category: Category,
    pub priority: Priority,
}

const FALLBACK: Template = Template {
    title: "Notification",
    message: "You have a new notification",
    category: Category::General,
    priority: Priority::Medium,
};

/// Immutable kind → default-content lookup, built once at startup and
/// injected wherever notifications are rendered. Tests can construct their
/// own registry instead of patching a global.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    entries: HashMap<NotificationKind, Template>,
}

impl TemplateRegistry {
    pub fn builtin() -> Self {
        use NotificationKind::*;

        let mut entries = HashMap::new();
        let mut add = |kind, title, message, category, priority| {
            entries.insert(
                kind,
                Template {
                    title,
                    message,
                    category,
                    priority,
                },
            );
        };

        add(
            PriceChange,
            "Price updated",
            "A property you follow has a new price",
            Category::Property,
            Priority::High,
        );
        add(
            NewListing,
            "New listing",
            "A new property matching your interests was listed",
            Category::Property,
            Priority::Medium,
        );
        add(
            ListingSold,
            "Property sold",
            "A property you follow has been sold",
            Category::Property,
            Priority::Medium,
        );
        add(
            ListingUpdated,
            "Listing updated",
            "A property you follow was updated",
            Category::Property,
            Priority::Low,
        );
        add(
            SavedSearchMatch,
            "New match for your search",
            "A listing matches one of your saved searches",
            Category::Property,
            Priority::Medium,
        );
        add(
            FavoriteUpdate,
            "Favorite updated",
            "One of your favorite properties changed",
            Category::Property,
            Priority::Medium,
        );
        add(
            ViewingReminder,
            "Viewing reminder",
            "You have a property viewing coming up",
            Category::Property,
            Priority::High,
        );
        add(
            AccountSecurity,
            "Security alert",
            "There was a security event on your account",
            Category::Security,
            Priority::Urgent,
        );
        add(
            LoginAlert,
            "New sign-in",
            "Your account was signed in from a new device",
            Category::Security,
            Priority::High,
        );
        add(
            PaymentFailed,
            "Payment failed",
            "We could not process your latest payment",
            Category::Premium,
            Priority::Urgent,
        );
        add(
            SubscriptionRenewal,
            "Subscription renewed",
            "Your subscription has been renewed",
            Category::Premium,
            Priority::Low,
        );
        add(
            PremiumExpiring,
            "Premium expiring soon",
            "Your premium plan is about to expire",
            Category::Premium,
            Priority::High,
        );
        add(
            SystemAnnouncement,
            "Announcement",
            "There is news from the platform",
            Category::System,
            Priority::Medium,
        );
        add(
            MarketingOffer,
            "Special offer",
            "We have an offer you might like",
            Category::Marketing,
            Priority::Low,
        );
        add(
            WeeklyDigest,
            "Your weekly digest",
            "Here is what happened this week",
            Category::General,
            Priority::Low,
        );

        Self { entries }
    }

    pub fn get(&self, kind: NotificationKind) -> Option<&Template> {
        self.entries.get(&kind)
    }

    /// Template for `kind`, or the generic fallback for kinds without one.
    pub fn resolve(&self, kind: NotificationKind) -> Template {
        self.entries.get(&kind).copied().unwrap_or(FALLBACK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_template() {
        let registry = TemplateRegistry::builtin();
        for kind in [
            NotificationKind::PriceChange,
            NotificationKind::NewListing,
            NotificationKind::ListingSold,
            NotificationKind::ListingUpdated,
            NotificationKind::SavedSearchMatch,
            NotificationKind::FavoriteUpdate,
            NotificationKind::ViewingReminder,
            NotificationKind::AccountSecurity,
            NotificationKind::LoginAlert,
            NotificationKind::PaymentFailed,
            NotificationKind::SubscriptionRenewal,
            NotificationKind::PremiumExpiring,
            NotificationKind::SystemAnnouncement,
            NotificationKind::MarketingOffer,
            NotificationKind::WeeklyDigest,
        ] {
            assert!(registry.get(kind).is_some(), "missing {:?}", kind);
        }
    }

    #[test]
    fn resolve_maps_kinds_to_expected_categories() {
        let registry = TemplateRegistry::builtin();
        assert_eq!(
            registry.resolve(NotificationKind::PriceChange).category,
            Category::Property
        );
        assert_eq!(
            registry.resolve(NotificationKind::AccountSecurity).priority,
            Priority::Urgent
        );
        assert_eq!(
            registry.resolve(NotificationKind::MarketingOffer).category,
            Category::Marketing
        );
    }
}
