//! Append-only merchant notifications.
//!
//! Each applied confirmation produces exactly one notification for the
//! owning merchant. Entries are immutable after the append except for the
//! `read` flag, which the dashboard collaborator flips.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::time;

/// Category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// A payment settled for one of the merchant's products.
    Payment,
    /// Operational notices from the platform.
    System,
}

/// A single notification entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Identifier, unique within the merchant's log.
    pub id: String,
    /// Category.
    pub kind: NotificationKind,
    /// Short headline.
    pub title: String,
    /// Human-readable body.
    pub message: String,
    /// Signature of the related on-chain transaction, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Creation time, seconds since the Unix epoch.
    pub timestamp: u64,
    /// Whether the merchant has seen the entry.
    pub read: bool,
}

/// Per-merchant notification logs, keyed by storefront slug.
#[derive(Debug, Default)]
pub struct NotificationLog {
    entries: DashMap<String, Vec<Notification>>,
}

impl NotificationLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a notification for a storefront and returns it.
    pub fn append(
        &self,
        storefront: &str,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        signature: Option<String>,
    ) -> Notification {
        let mut log = self.entries.entry(storefront.to_owned()).or_default();
        let notification = Notification {
            id: format!("ntf_{}", log.len() + 1),
            kind,
            title: title.into(),
            message: message.into(),
            signature,
            timestamp: time::epoch_secs(),
            read: false,
        };
        log.push(notification.clone());
        notification
    }

    /// All notifications for a storefront, oldest first.
    #[must_use]
    pub fn for_storefront(&self, storefront: &str) -> Vec<Notification> {
        self.entries
            .get(storefront)
            .map(|log| log.value().clone())
            .unwrap_or_default()
    }

    /// Marks one entry as read. Returns `false` when the entry is unknown.
    pub fn mark_read(&self, storefront: &str, id: &str) -> bool {
        let Some(mut log) = self.entries.get_mut(storefront) else {
            return false;
        };
        log.value_mut()
            .iter_mut()
            .find(|n| n.id == id)
            .map(|n| n.read = true)
            .is_some()
    }

    /// Total entries for a storefront.
    #[must_use]
    pub fn count(&self, storefront: &str) -> usize {
        self.entries.get(storefront).map_or(0, |log| log.len())
    }
}
