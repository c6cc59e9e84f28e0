use chrono::{DateTime, Duration, Utc};

use stockpulse_inventory::TrackedItem;

/// Minimum spacing between two instant alerts for the same item.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DedupWindow {
    window: Duration,
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self {
            window: Duration::hours(1),
        }
    }
}

impl DedupWindow {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// True when no alert was sent for the item, or the last one is at least
    /// `window` old.
    pub fn allows(&self, last_alert_sent_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_alert_sent_at {
            None => true,
            Some(sent) => now - sent >= self.window,
        }
    }

    pub fn allows_item(&self, item: &TrackedItem, now: DateTime<Utc>) -> bool {
        self.allows(item.last_alert_sent_at(), now)
    }
}
