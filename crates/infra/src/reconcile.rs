//! Reconciliation source adapter.
//!
//! Normalizes inbound webhook events and poll sweeps into store writes:
//!
//! - inventory-level webhooks carry an inventory-item id that cannot be mapped
//!   to a variant locally, so they only request a full sweep of the shop
//! - order line items are relative decrements, applied through the delta path
//! - product updates and poll reads are absolute facts, newest observation wins

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use stockpulse_core::{ProductRef, ShopId, VariantRef};
use stockpulse_inventory::{Evaluation, InventoryFact, ItemKey, TrackedItem};

use crate::external::{CapabilityError, InventorySource, bounded};
use crate::store::{InventoryStore, StoreError};

/// Normalized inbound event, as produced by the webhook receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub shop_id: ShopId,
    pub kind: InboundKind,
    /// Upstream observation time, when the source provides one.
    pub observed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundKind {
    InventoryLevel {
        inventory_item_id: String,
    },
    OrderDecrement {
        variant_ref: VariantRef,
        decrement: i64,
    },
    ProductAbsolute {
        product_ref: ProductRef,
        variant_ref: Option<VariantRef>,
        quantity: i64,
    },
}

impl InboundEvent {
    pub fn new(shop_id: ShopId, kind: InboundKind) -> Self {
        Self {
            shop_id,
            kind,
            observed_at: None,
        }
    }

    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = Some(at);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No tracked item for the referenced key.
    Untracked,
    /// Older than the observation already held.
    Stale,
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Applied(Evaluation),
    Ignored(IgnoreReason),
    /// The event cannot be applied directly; the shop needs a full sweep.
    SweepRequired,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("gave up on {key} after {attempts} conflicting writes")]
    ConflictExhausted { key: ItemKey, attempts: u32 },
    #[error("catalog fetch failed for {shop}: {source}")]
    Catalog {
        shop: ShopId,
        #[source]
        source: CapabilityError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A key the sweep could not refresh this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepFailure {
    pub key: ItemKey,
    pub reason: String,
}

/// Result of a full poll sweep of one shop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Tracked keys whose quantity changed.
    pub refreshed: usize,
    pub unchanged: usize,
    pub stale: usize,
    /// Catalog keys with no local registration.
    pub untracked: usize,
    pub failures: Vec<SweepFailure>,
    /// Items that crossed into below-threshold during the sweep.
    pub crossed: Vec<TrackedItem>,
}

pub struct Reconciler {
    items: Arc<dyn InventoryStore>,
    inventory: Arc<dyn InventorySource>,
    capability_timeout: Duration,
    conflict_retries: u32,
}

impl Reconciler {
    pub fn new(
        items: Arc<dyn InventoryStore>,
        inventory: Arc<dyn InventorySource>,
        capability_timeout: Duration,
        conflict_retries: u32,
    ) -> Self {
        Self {
            items,
            inventory,
            capability_timeout,
            conflict_retries,
        }
    }

    /// Apply one inbound event to the store.
    pub fn ingest(
        &self,
        event: &InboundEvent,
        received_at: DateTime<Utc>,
    ) -> Result<IngestOutcome, ReconcileError> {
        let shop = &event.shop_id;
        match &event.kind {
            InboundKind::InventoryLevel { inventory_item_id } => {
                info!(
                    shop = %shop,
                    inventory_item = %inventory_item_id,
                    "inventory level event, sweep required"
                );
                Ok(IngestOutcome::SweepRequired)
            }
            InboundKind::OrderDecrement {
                variant_ref,
                decrement,
            } => {
                if *decrement <= 0 {
                    warn!(
                        shop = %shop,
                        variant = %variant_ref,
                        decrement,
                        "dropping malformed order decrement"
                    );
                    return Ok(IngestOutcome::Ignored(IgnoreReason::Malformed(format!(
                        "non-positive decrement {decrement}"
                    ))));
                }
                let Some(item) = self.items.find_by_variant(shop, variant_ref)? else {
                    debug!(
                        shop = %shop,
                        variant = %variant_ref,
                        "order for untracked variant dropped"
                    );
                    return Ok(IngestOutcome::Ignored(IgnoreReason::Untracked));
                };
                let key = item.key().clone();
                let applied = self.with_retries(&key, || {
                    self.items.apply_delta(&key, *decrement, received_at)
                })?;
                Ok(match applied {
                    Some(eval) => {
                        debug!(
                            item = %key,
                            from = eval.previous_quantity,
                            to = eval.item.current_inventory(),
                            "order decrement applied"
                        );
                        IngestOutcome::Applied(eval)
                    }
                    None => IngestOutcome::Ignored(IgnoreReason::Untracked),
                })
            }
            InboundKind::ProductAbsolute {
                product_ref,
                variant_ref,
                quantity,
            } => {
                let key = ItemKey::new(shop.clone(), product_ref.clone(), variant_ref.clone());
                let mut fact = InventoryFact::new(key, *quantity, received_at);
                if let Some(at) = event.observed_at {
                    fact = fact.observed_at(at);
                }
                self.apply_absolute(&fact)
            }
        }
    }

    fn apply_absolute(&self, fact: &InventoryFact) -> Result<IngestOutcome, ReconcileError> {
        let applied = self.with_retries(&fact.key, || self.items.apply_fact(fact))?;
        Ok(match applied {
            None => {
                debug!(item = %fact.key, "fact for untracked item dropped");
                IngestOutcome::Ignored(IgnoreReason::Untracked)
            }
            Some(eval) if eval.is_stale() => {
                debug!(item = %fact.key, "stale fact ignored");
                IngestOutcome::Ignored(IgnoreReason::Stale)
            }
            Some(eval) => IngestOutcome::Applied(eval),
        })
    }

    /// Re-fetch every catalog key of the shop and apply the reads as
    /// absolute facts. Per-key fetch failures are recorded and skipped.
    pub async fn sweep_shop(
        &self,
        shop: &ShopId,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, ReconcileError> {
        let catalog = bounded(self.capability_timeout, self.inventory.fetch_tracked_catalog(shop))
            .await
            .map_err(|source| ReconcileError::Catalog {
                shop: shop.clone(),
                source,
            })?;

        let mut report = SweepReport::default();
        for key in catalog {
            if key.shop_id != *shop || self.items.get(&key)?.is_none() {
                report.untracked += 1;
                continue;
            }

            let read = bounded(self.capability_timeout, self.inventory.fetch_inventory(&key)).await;
            let observed = match read {
                Ok(observed) => observed,
                Err(err) => {
                    warn!(shop = %shop, item = %key, error = %err, "inventory fetch failed");
                    report.failures.push(SweepFailure {
                        key,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let fact = InventoryFact::new(key.clone(), observed.quantity, now)
                .observed_at(observed.observed_at);
            match self.apply_absolute(&fact) {
                Ok(IngestOutcome::Applied(eval)) => {
                    if eval.changed() {
                        report.refreshed += 1;
                    } else {
                        report.unchanged += 1;
                    }
                    if eval.crossed_out_of_below {
                        info!(
                            shop = %shop,
                            item = %key,
                            quantity = eval.item.current_inventory(),
                            "item restocked above threshold"
                        );
                    }
                    if eval.crossed_into_below {
                        report.crossed.push(eval.item);
                    }
                }
                Ok(IngestOutcome::Ignored(IgnoreReason::Stale)) => report.stale += 1,
                Ok(_) => report.untracked += 1,
                Err(err @ ReconcileError::ConflictExhausted { .. }) => {
                    warn!(shop = %shop, item = %key, error = %err, "skipping item for this cycle");
                    report.failures.push(SweepFailure {
                        key,
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        info!(
            shop = %shop,
            refreshed = report.refreshed,
            unchanged = report.unchanged,
            stale = report.stale,
            untracked = report.untracked,
            failed = report.failures.len(),
            crossed = report.crossed.len(),
            "sweep finished"
        );
        Ok(report)
    }

    fn with_retries<T>(
        &self,
        key: &ItemKey,
        mut op: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, ReconcileError> {
        let attempts = self.conflict_retries + 1;
        for attempt in 1..=attempts {
            match op() {
                Err(StoreError::Conflict(_)) => {
                    debug!(item = %key, attempt, "write conflict, retrying");
                }
                other => return other.map_err(ReconcileError::from),
            }
        }
        Err(ReconcileError::ConflictExhausted {
            key: key.clone(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Duration as ChronoDuration;
    use stockpulse_inventory::TrackItem;

    use crate::external::ObservedQuantity;
    use crate::store::InMemoryInventoryStore;

    fn shop() -> ShopId {
        ShopId::new("acme.myshopify.com")
    }

    fn key(variant: &str) -> ItemKey {
        ItemKey::new(shop(), ProductRef::new("100"), Some(VariantRef::new(variant)))
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[derive(Default)]
    struct ScriptedSource {
        catalog: Vec<ItemKey>,
        reads: Mutex<HashMap<ItemKey, Result<ObservedQuantity, CapabilityError>>>,
    }

    #[async_trait::async_trait]
    impl InventorySource for ScriptedSource {
        async fn fetch_inventory(
            &self,
            key: &ItemKey,
        ) -> Result<ObservedQuantity, CapabilityError> {
            self.reads
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .unwrap_or_else(|| Err(CapabilityError::NotFound(key.to_string())))
        }

        async fn fetch_tracked_catalog(
            &self,
            _shop: &ShopId,
        ) -> Result<Vec<ItemKey>, CapabilityError> {
            Ok(self.catalog.clone())
        }
    }

    fn setup(source: ScriptedSource) -> (Arc<InMemoryInventoryStore>, Reconciler) {
        let store = InMemoryInventoryStore::arc();
        for (variant, threshold, current) in [("1", 10, 12), ("2", 5, 3)] {
            store
                .track(TrackItem {
                    key: key(variant),
                    product_title: "Wool Socks".to_string(),
                    variant_title: Some(format!("Size {variant}")),
                    threshold_quantity: threshold,
                    current_inventory: current,
                    occurred_at: t0(),
                })
                .unwrap();
        }
        let reconciler = Reconciler::new(
            store.clone(),
            Arc::new(source),
            std::time::Duration::from_secs(1),
            2,
        );
        (store, reconciler)
    }

    fn order(variant: &str, decrement: i64) -> InboundEvent {
        InboundEvent::new(
            shop(),
            InboundKind::OrderDecrement {
                variant_ref: VariantRef::new(variant),
                decrement,
            },
        )
    }

    fn absolute(variant: &str, quantity: i64, observed_secs: i64) -> InboundEvent {
        InboundEvent::new(
            shop(),
            InboundKind::ProductAbsolute {
                product_ref: ProductRef::new("100"),
                variant_ref: Some(VariantRef::new(variant)),
                quantity,
            },
        )
        .observed_at(t0() + ChronoDuration::seconds(observed_secs))
    }

    #[test]
    fn inventory_level_requests_sweep() {
        let (store, reconciler) = setup(ScriptedSource::default());
        let event = InboundEvent::new(
            shop(),
            InboundKind::InventoryLevel {
                inventory_item_id: "4455".into(),
            },
        );
        let before = store.list_for_shop(&shop()).unwrap();
        assert_eq!(reconciler.ingest(&event, t0()).unwrap(), IngestOutcome::SweepRequired);
        assert_eq!(store.list_for_shop(&shop()).unwrap(), before);
    }

    #[test]
    fn order_decrement_applies_delta() {
        let (store, reconciler) = setup(ScriptedSource::default());
        let outcome = reconciler.ingest(&order("1", 4), t0()).unwrap();
        let IngestOutcome::Applied(eval) = outcome else {
            panic!("expected the decrement to apply");
        };
        assert!(eval.crossed_into_below);
        assert_eq!(store.get(&key("1")).unwrap().unwrap().current_inventory(), 8);
    }

    #[test]
    fn malformed_and_untracked_orders_are_dropped() {
        let (_, reconciler) = setup(ScriptedSource::default());
        assert!(matches!(
            reconciler.ingest(&order("1", 0), t0()).unwrap(),
            IngestOutcome::Ignored(IgnoreReason::Malformed(_))
        ));
        assert_eq!(
            reconciler.ingest(&order("999", 1), t0()).unwrap(),
            IngestOutcome::Ignored(IgnoreReason::Untracked)
        );
    }

    #[test]
    fn older_product_update_is_stale() {
        let (store, reconciler) = setup(ScriptedSource::default());
        reconciler.ingest(&absolute("1", 9, 200), t0()).unwrap();
        let outcome = reconciler.ingest(&absolute("1", 5, 100), t0()).unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored(IgnoreReason::Stale));
        assert_eq!(store.get(&key("1")).unwrap().unwrap().current_inventory(), 9);
    }

    #[test]
    fn untracked_product_update_leaves_store_unchanged() {
        let (store, reconciler) = setup(ScriptedSource::default());
        let before = store.list_for_shop(&shop()).unwrap();
        let outcome = reconciler.ingest(&absolute("77", 1, 10), t0()).unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored(IgnoreReason::Untracked));
        assert_eq!(store.list_for_shop(&shop()).unwrap(), before);
    }

    #[tokio::test]
    async fn sweep_refreshes_tracked_keys_and_reports() {
        let source = ScriptedSource {
            catalog: vec![key("1"), key("2"), key("3")],
            ..ScriptedSource::default()
        };
        source.reads.lock().unwrap().insert(
            key("1"),
            Ok(ObservedQuantity {
                quantity: 4,
                observed_at: t0() + ChronoDuration::minutes(5),
            }),
        );
        source
            .reads
            .lock()
            .unwrap()
            .insert(key("2"), Err(CapabilityError::RateLimited));

        let (store, reconciler) = setup(source);
        let report = reconciler.sweep_shop(&shop(), t0()).await.unwrap();

        assert_eq!(report.refreshed, 1);
        assert_eq!(report.untracked, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, key("2"));
        assert_eq!(report.crossed.len(), 1);
        assert_eq!(store.get(&key("1")).unwrap().unwrap().current_inventory(), 4);
        assert_eq!(store.get(&key("2")).unwrap().unwrap().current_inventory(), 3);
    }

    struct AlwaysConflicting {
        calls: AtomicU32,
    }

    impl InventoryStore for AlwaysConflicting {
        fn get(&self, _: &ItemKey) -> Result<Option<TrackedItem>, StoreError> {
            Ok(None)
        }
        fn track(&self, cmd: TrackItem) -> Result<TrackedItem, StoreError> {
            Err(StoreError::Conflict(cmd.key))
        }
        fn set_alerts_enabled(&self, key: &ItemKey, _: bool) -> Result<TrackedItem, StoreError> {
            Err(StoreError::NotFound(key.clone()))
        }
        fn untrack(&self, _: &ItemKey) -> Result<Option<TrackedItem>, StoreError> {
            Ok(None)
        }
        fn find_by_variant(
            &self,
            _: &ShopId,
            _: &VariantRef,
        ) -> Result<Option<TrackedItem>, StoreError> {
            Ok(None)
        }
        fn list_for_shop(&self, _: &ShopId) -> Result<Vec<TrackedItem>, StoreError> {
            Ok(vec![])
        }
        fn list_shops(&self) -> Result<Vec<ShopId>, StoreError> {
            Ok(vec![])
        }
        fn apply_fact(&self, fact: &InventoryFact) -> Result<Option<Evaluation>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Conflict(fact.key.clone()))
        }
        fn apply_delta(
            &self,
            key: &ItemKey,
            _: i64,
            _: DateTime<Utc>,
        ) -> Result<Option<Evaluation>, StoreError> {
            Err(StoreError::Conflict(key.clone()))
        }
        fn mark_alerted(&self, _: &ItemKey, _: DateTime<Utc>) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn conflicts_are_retried_then_reported() {
        let store = Arc::new(AlwaysConflicting {
            calls: AtomicU32::new(0),
        });
        let reconciler = Reconciler::new(
            store.clone(),
            Arc::new(ScriptedSource::default()),
            std::time::Duration::from_secs(1),
            3,
        );
        let err = reconciler.ingest(&absolute("1", 5, 10), t0()).unwrap_err();
        assert_eq!(
            err,
            ReconcileError::ConflictExhausted {
                key: key("1"),
                attempts: 4
            }
        );
        assert_eq!(store.calls.load(Ordering::SeqCst), 4);
    }
}
