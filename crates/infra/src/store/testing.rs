//! Store doubles for failure-path tests.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use stockpulse_core::{ShopId, VariantRef};
use stockpulse_inventory::{Evaluation, InventoryFact, ItemKey, TrackItem, TrackedItem};

use super::{InMemoryInventoryStore, InventoryStore, StoreError};

/// In-memory item store whose `mark_alerted` can be made to fail per key.
#[derive(Default)]
pub(crate) struct FlakyInventoryStore {
    inner: InMemoryInventoryStore,
    failing_marks: Mutex<HashSet<ItemKey>>,
}

impl FlakyInventoryStore {
    pub(crate) fn fail_marks_for(&self, key: ItemKey) {
        self.failing_marks.lock().unwrap().insert(key);
    }
}

impl InventoryStore for FlakyInventoryStore {
    fn get(&self, key: &ItemKey) -> Result<Option<TrackedItem>, StoreError> {
        self.inner.get(key)
    }

    fn track(&self, cmd: TrackItem) -> Result<TrackedItem, StoreError> {
        self.inner.track(cmd)
    }

    fn set_alerts_enabled(&self, key: &ItemKey, enabled: bool) -> Result<TrackedItem, StoreError> {
        self.inner.set_alerts_enabled(key, enabled)
    }

    fn untrack(&self, key: &ItemKey) -> Result<Option<TrackedItem>, StoreError> {
        self.inner.untrack(key)
    }

    fn find_by_variant(
        &self,
        shop_id: &ShopId,
        variant_ref: &VariantRef,
    ) -> Result<Option<TrackedItem>, StoreError> {
        self.inner.find_by_variant(shop_id, variant_ref)
    }

    fn list_for_shop(&self, shop_id: &ShopId) -> Result<Vec<TrackedItem>, StoreError> {
        self.inner.list_for_shop(shop_id)
    }

    fn list_shops(&self) -> Result<Vec<ShopId>, StoreError> {
        self.inner.list_shops()
    }

    fn apply_fact(&self, fact: &InventoryFact) -> Result<Option<Evaluation>, StoreError> {
        self.inner.apply_fact(fact)
    }

    fn apply_delta(
        &self,
        key: &ItemKey,
        decrement: i64,
        received_at: DateTime<Utc>,
    ) -> Result<Option<Evaluation>, StoreError> {
        self.inner.apply_delta(key, decrement, received_at)
    }

    fn mark_alerted(&self, key: &ItemKey, sent_at: DateTime<Utc>) -> Result<(), StoreError> {
        if self.failing_marks.lock().unwrap().contains(key) {
            return Err(StoreError::Unavailable(format!("write rejected for {key}")));
        }
        self.inner.mark_alerted(key, sent_at)
    }
}
