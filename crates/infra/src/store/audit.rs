use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use stockpulse_alerts::AuditEntry;
use stockpulse_core::ShopId;

use super::StoreError;

/// Append-only log of notification attempts, scanned per shop by time.
pub trait AuditLog: Send + Sync {
    fn append(&self, entries: Vec<AuditEntry>) -> Result<(), StoreError>;

    /// Newest first.
    fn recent(&self, shop_id: &ShopId, limit: usize) -> Result<Vec<AuditEntry>, StoreError>;

    fn count_since(&self, shop_id: &ShopId, since: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Time of the last attempt that was actually delivered.
    fn last_delivered(&self, shop_id: &ShopId) -> Result<Option<DateTime<Utc>>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<HashMap<ShopId, Vec<AuditEntry>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl AuditLog for InMemoryAuditLog {
    fn append(&self, entries: Vec<AuditEntry>) -> Result<(), StoreError> {
        let mut log = self.entries.write().map_err(|_| StoreError::poisoned("audit log"))?;
        for entry in entries {
            let shop_log = log.entry(entry.shop_id.clone()).or_default();
            // Kept ordered by created_at; appends are almost always at the end.
            let at = shop_log.partition_point(|e| e.created_at <= entry.created_at);
            shop_log.insert(at, entry);
        }
        Ok(())
    }

    fn recent(&self, shop_id: &ShopId, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        let log = self.entries.read().map_err(|_| StoreError::poisoned("audit log"))?;
        Ok(log
            .get(shop_id)
            .map(|entries| entries.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn count_since(&self, shop_id: &ShopId, since: DateTime<Utc>) -> Result<usize, StoreError> {
        let log = self.entries.read().map_err(|_| StoreError::poisoned("audit log"))?;
        Ok(log
            .get(shop_id)
            .map(|entries| entries.iter().filter(|e| e.created_at >= since).count())
            .unwrap_or(0))
    }

    fn last_delivered(&self, shop_id: &ShopId) -> Result<Option<DateTime<Utc>>, StoreError> {
        let log = self.entries.read().map_err(|_| StoreError::poisoned("audit log"))?;
        Ok(log.get(shop_id).and_then(|entries| {
            entries
                .iter()
                .rev()
                .find(|e| e.delivered)
                .map(|e| e.created_at)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stockpulse_alerts::{AlertPayload, FailureCategory};
    use stockpulse_core::ProductRef;
    use stockpulse_inventory::{ItemKey, TrackItem, TrackedItem};

    fn shop() -> ShopId {
        ShopId::new("acme.myshopify.com")
    }

    fn entry(delivered: bool, at: DateTime<Utc>) -> AuditEntry {
        let item = TrackedItem::track(TrackItem {
            key: ItemKey::new(shop(), ProductRef::new("1"), None),
            product_title: "Wool Socks".to_string(),
            variant_title: None,
            threshold_quantity: 5,
            current_inventory: 2,
            occurred_at: at,
        })
        .unwrap();
        let payload = AlertPayload::single(&item);
        let line = &payload.lines()[0];
        if delivered {
            AuditEntry::delivered(line, &payload, "ops@acme.test", at)
        } else {
            AuditEntry::failed(
                line,
                &payload,
                Some("ops@acme.test"),
                FailureCategory::TransportError,
                "connection reset",
                at,
            )
        }
    }

    #[test]
    fn last_delivered_ignores_failures() {
        let log = InMemoryAuditLog::new();
        let t0 = Utc::now() - Duration::hours(3);
        log.append(vec![entry(true, t0), entry(false, t0 + Duration::hours(1))])
            .unwrap();
        assert_eq!(log.last_delivered(&shop()).unwrap(), Some(t0));
    }

    #[test]
    fn recent_is_newest_first_and_counts_by_time() {
        let log = InMemoryAuditLog::new();
        let t0 = Utc::now() - Duration::days(10);
        log.append(vec![entry(true, t0 + Duration::days(9))]).unwrap();
        log.append(vec![entry(true, t0)]).unwrap();

        let recent = log.recent(&shop(), 10).unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].created_at > recent[1].created_at);
        assert_eq!(log.count_since(&shop(), t0 + Duration::days(3)).unwrap(), 1);
    }

    #[test]
    fn unknown_shop_is_empty() {
        let log = InMemoryAuditLog::new();
        assert!(log.recent(&shop(), 5).unwrap().is_empty());
        assert_eq!(log.last_delivered(&shop()).unwrap(), None);
    }
}
