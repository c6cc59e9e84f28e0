use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};

use stockpulse_core::{ShopId, VariantRef};
use stockpulse_inventory::{
    Evaluation, InventoryFact, ItemKey, TrackItem, TrackedItem, apply_decrement, evaluate,
};

use super::StoreError;

/// Authoritative per-key inventory state.
///
/// Writes to one key are linearizable; writes to different keys never wait
/// on each other. Facts for keys that are not tracked return `Ok(None)` and
/// never create a record.
pub trait InventoryStore: Send + Sync {
    fn get(&self, key: &ItemKey) -> Result<Option<TrackedItem>, StoreError>;

    /// Create or update a registration. Alert flag and alert bookkeeping of
    /// an existing item are preserved.
    fn track(&self, cmd: TrackItem) -> Result<TrackedItem, StoreError>;

    fn set_alerts_enabled(&self, key: &ItemKey, enabled: bool) -> Result<TrackedItem, StoreError>;

    /// Operator-initiated removal. Returns the removed item, if any.
    fn untrack(&self, key: &ItemKey) -> Result<Option<TrackedItem>, StoreError>;

    fn find_by_variant(
        &self,
        shop_id: &ShopId,
        variant_ref: &VariantRef,
    ) -> Result<Option<TrackedItem>, StoreError>;

    /// All items of a shop, ordered by key.
    fn list_for_shop(&self, shop_id: &ShopId) -> Result<Vec<TrackedItem>, StoreError>;

    fn list_shops(&self) -> Result<Vec<ShopId>, StoreError>;

    /// Apply an absolute fact (newest observation wins).
    fn apply_fact(&self, fact: &InventoryFact) -> Result<Option<Evaluation>, StoreError>;

    /// Apply a relative decrement, floored at zero.
    fn apply_delta(
        &self,
        key: &ItemKey,
        decrement: i64,
        received_at: DateTime<Utc>,
    ) -> Result<Option<Evaluation>, StoreError>;

    /// Record a confirmed delivery for the item.
    fn mark_alerted(&self, key: &ItemKey, sent_at: DateTime<Utc>) -> Result<(), StoreError>;
}

type Slot = Arc<Mutex<TrackedItem>>;

/// In-memory store with one mutex per tracked key.
///
/// The outer map lock is only held to look up, insert or remove a slot, never
/// while an item is being mutated.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    items: RwLock<HashMap<ItemKey, Slot>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn slot(&self, key: &ItemKey) -> Result<Option<Slot>, StoreError> {
        let map = self.items.read().map_err(|_| StoreError::poisoned("inventory map"))?;
        Ok(map.get(key).cloned())
    }

    fn slots_for_shop(&self, shop_id: &ShopId) -> Result<Vec<(ItemKey, Slot)>, StoreError> {
        let map = self.items.read().map_err(|_| StoreError::poisoned("inventory map"))?;
        let mut slots: Vec<_> = map
            .iter()
            .filter(|(k, _)| &k.shop_id == shop_id)
            .map(|(k, s)| (k.clone(), s.clone()))
            .collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(slots)
    }

    /// Run `f` against the item under its key lock.
    ///
    /// If the slot was removed or replaced between lookup and lock, the
    /// update is rejected with `Conflict` so the caller can retry against the
    /// current record.
    fn update<T>(
        &self,
        key: &ItemKey,
        f: impl FnOnce(&mut TrackedItem) -> Result<T, StoreError>,
    ) -> Result<Option<T>, StoreError> {
        let Some(slot) = self.slot(key)? else {
            return Ok(None);
        };
        let mut item = slot.lock().map_err(|_| StoreError::poisoned("item"))?;

        let current = self
            .slot(key)?
            .is_some_and(|latest| Arc::ptr_eq(&latest, &slot));
        if !current {
            return Err(StoreError::Conflict(key.clone()));
        }

        f(&mut *item).map(Some)
    }
}

fn read_slot(slot: &Slot) -> Result<TrackedItem, StoreError> {
    slot.lock()
        .map(|item| item.clone())
        .map_err(|_| StoreError::poisoned("item"))
}

impl InventoryStore for InMemoryInventoryStore {
    fn get(&self, key: &ItemKey) -> Result<Option<TrackedItem>, StoreError> {
        self.slot(key)?.as_ref().map(read_slot).transpose()
    }

    fn track(&self, cmd: TrackItem) -> Result<TrackedItem, StoreError> {
        let key = cmd.key.clone();
        let retracked = self.update(&key, |item| {
            item.retrack(cmd.clone())?;
            Ok(item.clone())
        })?;
        if let Some(item) = retracked {
            return Ok(item);
        }

        let item = TrackedItem::track(cmd)?;
        let mut map = self.items.write().map_err(|_| StoreError::poisoned("inventory map"))?;
        match map.entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(Mutex::new(item.clone())));
                Ok(item)
            }
            // Registered concurrently; the caller retries as an update.
            Entry::Occupied(occupied) => Err(StoreError::Conflict(occupied.key().clone())),
        }
    }

    fn set_alerts_enabled(&self, key: &ItemKey, enabled: bool) -> Result<TrackedItem, StoreError> {
        self.update(key, |item| {
            item.set_alerts_enabled(enabled);
            Ok(item.clone())
        })?
        .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    fn untrack(&self, key: &ItemKey) -> Result<Option<TrackedItem>, StoreError> {
        let removed = {
            let mut map = self.items.write().map_err(|_| StoreError::poisoned("inventory map"))?;
            map.remove(key)
        };
        removed.as_ref().map(read_slot).transpose()
    }

    fn find_by_variant(
        &self,
        shop_id: &ShopId,
        variant_ref: &VariantRef,
    ) -> Result<Option<TrackedItem>, StoreError> {
        let found = self
            .slots_for_shop(shop_id)?
            .into_iter()
            .find(|(k, _)| k.variant_ref.as_ref() == Some(variant_ref));
        found.map(|(_, slot)| read_slot(&slot)).transpose()
    }

    fn list_for_shop(&self, shop_id: &ShopId) -> Result<Vec<TrackedItem>, StoreError> {
        self.slots_for_shop(shop_id)?
            .iter()
            .map(|(_, slot)| read_slot(slot))
            .collect()
    }

    fn list_shops(&self) -> Result<Vec<ShopId>, StoreError> {
        let map = self.items.read().map_err(|_| StoreError::poisoned("inventory map"))?;
        let shops: BTreeSet<ShopId> = map.keys().map(|k| k.shop_id.clone()).collect();
        Ok(shops.into_iter().collect())
    }

    fn apply_fact(&self, fact: &InventoryFact) -> Result<Option<Evaluation>, StoreError> {
        self.update(&fact.key, |item| {
            let eval = evaluate(item, fact)?;
            *item = eval.item.clone();
            Ok(eval)
        })
    }

    fn apply_delta(
        &self,
        key: &ItemKey,
        decrement: i64,
        received_at: DateTime<Utc>,
    ) -> Result<Option<Evaluation>, StoreError> {
        self.update(key, |item| {
            let eval = apply_decrement(item, decrement, received_at)?;
            *item = eval.item.clone();
            Ok(eval)
        })
    }

    fn mark_alerted(&self, key: &ItemKey, sent_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.update(key, |item| {
            item.mark_alerted(sent_at);
            Ok(())
        })?
        .ok_or_else(|| StoreError::NotFound(key.clone()))
    }
}
