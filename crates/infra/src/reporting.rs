use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use stockpulse_alerts::Cadence;
use stockpulse_core::ShopId;

use crate::store::{AuditLog, InventoryStore, SettingsStore, StoreError};

/// Days of audit history counted in the overview.
const RECENT_ALERT_DAYS: i64 = 7;

/// Dashboard summary for one shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShopOverview {
    pub shop_id: ShopId,
    pub total_tracked: usize,
    pub alerts_enabled: usize,
    /// Items currently below threshold with alerts enabled.
    pub alerting: usize,
    pub alerts_last_7_days: usize,
    /// Last delivered attempt; failed attempts never move this.
    pub last_successful_send: Option<DateTime<Utc>>,
    pub notifications_enabled: bool,
    pub cadence: Cadence,
}

pub fn shop_overview(
    items: &dyn InventoryStore,
    settings: &dyn SettingsStore,
    audit: &dyn AuditLog,
    shop_id: &ShopId,
    now: DateTime<Utc>,
) -> Result<ShopOverview, StoreError> {
    let tracked = items.list_for_shop(shop_id)?;
    let shop_settings = settings.get_or_create(shop_id, now)?;

    Ok(ShopOverview {
        shop_id: shop_id.clone(),
        total_tracked: tracked.len(),
        alerts_enabled: tracked.iter().filter(|i| i.alerts_enabled()).count(),
        alerting: tracked.iter().filter(|i| i.should_alert()).count(),
        alerts_last_7_days: audit.count_since(shop_id, now - Duration::days(RECENT_ALERT_DAYS))?,
        last_successful_send: audit.last_delivered(shop_id)?,
        notifications_enabled: shop_settings.notifications_enabled(),
        cadence: shop_settings.cadence(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockpulse_alerts::{AlertPayload, AuditEntry, FailureCategory};
    use stockpulse_core::ProductRef;
    use stockpulse_inventory::{ItemKey, TrackItem};

    use crate::store::{InMemoryAuditLog, InMemoryInventoryStore, InMemorySettingsStore};

    fn shop() -> ShopId {
        ShopId::new("acme.myshopify.com")
    }

    fn track(store: &InMemoryInventoryStore, product: &str, current: i64) {
        store
            .track(TrackItem {
                key: ItemKey::new(shop(), ProductRef::new(product), None),
                product_title: format!("Product {product}"),
                variant_title: None,
                threshold_quantity: 5,
                current_inventory: current,
                occurred_at: Utc::now(),
            })
            .unwrap();
    }

    #[test]
    fn overview_counts_and_last_successful_send() {
        let items = InMemoryInventoryStore::new();
        let settings = InMemorySettingsStore::new();
        let audit = InMemoryAuditLog::new();
        let now = Utc::now();

        track(&items, "1", 2);
        track(&items, "2", 3);
        track(&items, "3", 30);
        items
            .set_alerts_enabled(&ItemKey::new(shop(), ProductRef::new("2"), None), false)
            .unwrap();

        let item = items
            .get(&ItemKey::new(shop(), ProductRef::new("1"), None))
            .unwrap()
            .unwrap();
        let payload = AlertPayload::single(&item);
        let line = &payload.lines()[0];
        let sent_at = now - Duration::days(2);
        audit
            .append(vec![
                AuditEntry::delivered(line, &payload, "ops@acme.test", sent_at),
                AuditEntry::failed(
                    line,
                    &payload,
                    Some("ops@acme.test"),
                    FailureCategory::RateLimited,
                    "429",
                    now - Duration::hours(1),
                ),
                AuditEntry::delivered(line, &payload, "ops@acme.test", now - Duration::days(20)),
            ])
            .unwrap();

        let overview = shop_overview(&items, &settings, &audit, &shop(), now).unwrap();
        assert_eq!(overview.total_tracked, 3);
        assert_eq!(overview.alerts_enabled, 2);
        assert_eq!(overview.alerting, 1);
        assert_eq!(overview.alerts_last_7_days, 2);
        assert_eq!(overview.last_successful_send, Some(sent_at));
        assert_eq!(overview.cadence, Cadence::Daily);
        assert!(overview.notifications_enabled);
    }
}
