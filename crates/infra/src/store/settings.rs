use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};

use stockpulse_alerts::{AlertSettings, BatchCycle, SettingsUpdate};
use stockpulse_core::ShopId;

use super::StoreError;

/// One settings row per shop, created with defaults on first access.
pub trait SettingsStore: Send + Sync {
    fn get_or_create(
        &self,
        shop_id: &ShopId,
        now: DateTime<Utc>,
    ) -> Result<AlertSettings, StoreError>;

    /// Apply an operator update. Validation failures leave the row untouched.
    fn update(
        &self,
        shop_id: &ShopId,
        update: SettingsUpdate,
        now: DateTime<Utc>,
    ) -> Result<AlertSettings, StoreError>;

    /// Advance batch bookkeeping after a completed cycle.
    fn record_cycle_sent(
        &self,
        shop_id: &ShopId,
        cycle: BatchCycle,
        at: DateTime<Utc>,
    ) -> Result<AlertSettings, StoreError>;

    fn list_shops(&self) -> Result<Vec<ShopId>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    rows: RwLock<HashMap<ShopId, Arc<Mutex<AlertSettings>>>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn row(
        &self,
        shop_id: &ShopId,
        now: DateTime<Utc>,
    ) -> Result<Arc<Mutex<AlertSettings>>, StoreError> {
        {
            let rows = self.rows.read().map_err(|_| StoreError::poisoned("settings map"))?;
            if let Some(row) = rows.get(shop_id) {
                return Ok(row.clone());
            }
        }
        let mut rows = self.rows.write().map_err(|_| StoreError::poisoned("settings map"))?;
        let row = rows.entry(shop_id.clone()).or_insert_with(|| {
            tracing::info!(shop = %shop_id, "alert settings created with defaults");
            Arc::new(Mutex::new(AlertSettings::defaults_for(shop_id.clone(), now)))
        });
        Ok(row.clone())
    }

    fn with_row<T>(
        &self,
        shop_id: &ShopId,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut AlertSettings) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let row = self.row(shop_id, now)?;
        let mut settings = row.lock().map_err(|_| StoreError::poisoned("settings row"))?;
        f(&mut *settings)
    }
}

impl SettingsStore for InMemorySettingsStore {
    fn get_or_create(
        &self,
        shop_id: &ShopId,
        now: DateTime<Utc>,
    ) -> Result<AlertSettings, StoreError> {
        self.with_row(shop_id, now, |s| Ok(s.clone()))
    }

    fn update(
        &self,
        shop_id: &ShopId,
        update: SettingsUpdate,
        now: DateTime<Utc>,
    ) -> Result<AlertSettings, StoreError> {
        self.with_row(shop_id, now, |s| {
            s.apply_update(update, now)?;
            Ok(s.clone())
        })
    }

    fn record_cycle_sent(
        &self,
        shop_id: &ShopId,
        cycle: BatchCycle,
        at: DateTime<Utc>,
    ) -> Result<AlertSettings, StoreError> {
        self.with_row(shop_id, at, |s| {
            s.record_sent(cycle, at);
            Ok(s.clone())
        })
    }

    fn list_shops(&self) -> Result<Vec<ShopId>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::poisoned("settings map"))?;
        let shops: BTreeSet<ShopId> = rows.keys().cloned().collect();
        Ok(shops.into_iter().collect())
    }
}
