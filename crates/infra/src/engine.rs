//! Alert engine: wires stores, capabilities and the pure domain together.
//!
//! Two entry points:
//! - [`AlertEngine::handle_event`] for pushed facts (webhooks)
//! - [`AlertEngine::run_tick`] for the periodic reconciliation + cadence pass
//!
//! Shops are processed independently. At most one sweep per shop is in flight;
//! a tick that finds a shop busy skips it for that cycle.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use stockpulse_alerts::{AlertSettings, CadenceScheduler, DedupWindow, Eligibility, SettingsUpdate};
use stockpulse_core::ShopId;
use stockpulse_inventory::{ItemKey, TrackItem, TrackedItem};

use crate::config::EngineConfig;
use crate::dispatch::{AlertDispatcher, BatchOutcome, DispatchError, InstantOutcome};
use crate::external::Capabilities;
use crate::reconcile::{InboundEvent, IngestOutcome, ReconcileError, Reconciler, SweepReport};
use crate::reporting::{ShopOverview, shop_overview};
use crate::store::{AuditLog, InventoryStore, SettingsStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("engine is shutting down")]
    ShuttingDown,
    #[error("inbound event buffer is full")]
    Backpressure,
}

/// Record stores the engine reads and writes.
#[derive(Clone)]
pub struct EngineStores {
    pub items: Arc<dyn InventoryStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub audit: Arc<dyn AuditLog>,
}

/// What happened to one pushed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReport {
    pub ingest: IngestOutcome,
    /// Present when the event required a sweep and the shop was not busy.
    pub sweep: Option<SweepReport>,
    pub alerts: Vec<InstantOutcome>,
    /// Per-item dispatch failures after a sweep; other items still ran.
    pub errors: Vec<String>,
}

/// Outcome of one shop's share of a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopCycleReport {
    pub shop_id: ShopId,
    pub sweep: Option<SweepReport>,
    pub alerts: Vec<InstantOutcome>,
    pub eligibility: Option<Eligibility>,
    pub batch: Option<BatchOutcome>,
    /// Contained failures; they never abort sibling shops.
    pub errors: Vec<String>,
}

impl ShopCycleReport {
    fn new(shop_id: ShopId) -> Self {
        Self {
            shop_id,
            sweep: None,
            alerts: Vec::new(),
            eligibility: None,
            batch: None,
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub shops: Vec<ShopCycleReport>,
    /// Shops skipped because a previous run was still in flight.
    pub skipped_busy: Vec<ShopId>,
    /// Shops released unprocessed because shutdown was signaled while they
    /// waited for a concurrency permit.
    pub cancelled: Vec<ShopId>,
}

enum ShopRun {
    Completed(ShopCycleReport),
    Cancelled(ShopId),
}

/// Marks a shop as in flight until dropped.
struct ShopClaim {
    in_flight: Arc<Mutex<HashSet<ShopId>>>,
    shop_id: ShopId,
}

impl ShopClaim {
    fn try_claim(in_flight: &Arc<Mutex<HashSet<ShopId>>>, shop_id: &ShopId) -> Option<Self> {
        let mut busy = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !busy.insert(shop_id.clone()) {
            return None;
        }
        Some(Self {
            in_flight: in_flight.clone(),
            shop_id: shop_id.clone(),
        })
    }
}

impl Drop for ShopClaim {
    fn drop(&mut self) {
        let mut busy = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        busy.remove(&self.shop_id);
    }
}

pub struct AlertEngine {
    config: EngineConfig,
    stores: EngineStores,
    reconciler: Reconciler,
    dispatcher: AlertDispatcher,
    scheduler: CadenceScheduler,
    in_flight: Arc<Mutex<HashSet<ShopId>>>,
}

impl AlertEngine {
    pub fn new(config: EngineConfig, stores: EngineStores, capabilities: Capabilities) -> Self {
        let reconciler = Reconciler::new(
            stores.items.clone(),
            capabilities.inventory.clone(),
            config.capability_timeout,
            config.conflict_retries,
        );
        let dispatcher = AlertDispatcher::new(
            stores.items.clone(),
            stores.settings.clone(),
            stores.audit.clone(),
            capabilities.owners.clone(),
            capabilities.delivery.clone(),
            DedupWindow::new(config.dedup_window()),
            config.capability_timeout,
        );
        let scheduler = CadenceScheduler::new(config.tolerance());
        Self {
            config,
            stores,
            reconciler,
            dispatcher,
            scheduler,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Push path: reconcile one event, then alert synchronously on a crossing
    /// when the shop uses instant cadence.
    pub async fn handle_event(
        &self,
        event: &InboundEvent,
        now: DateTime<Utc>,
    ) -> Result<EventReport, EngineError> {
        let shop = &event.shop_id;
        let ingest = self.reconciler.ingest(event, now)?;
        let mut report = EventReport {
            ingest: ingest.clone(),
            sweep: None,
            alerts: Vec::new(),
            errors: Vec::new(),
        };

        match ingest {
            IngestOutcome::Applied(eval) if eval.crossed_into_below => {
                let settings = self.stores.settings.get_or_create(shop, now)?;
                if settings.wants_instant() {
                    let outcome = self
                        .dispatcher
                        .dispatch_instant(&settings, &eval.item, now)
                        .await?;
                    report.alerts.push(outcome);
                } else {
                    debug!(
                        shop = %shop,
                        item = %eval.item.key(),
                        cadence = %settings.cadence(),
                        "crossing left for batch cycle"
                    );
                }
            }
            IngestOutcome::SweepRequired => {
                let Some(_claim) = ShopClaim::try_claim(&self.in_flight, shop) else {
                    info!(shop = %shop, "shop busy, sweep left to the running cycle");
                    return Ok(report);
                };
                let settings = self.stores.settings.get_or_create(shop, now)?;
                let sweep = self.reconciler.sweep_shop(shop, now).await?;
                report.alerts = self
                    .alert_crossings(&settings, &sweep.crossed, now, &mut report.errors)
                    .await;
                report.sweep = Some(sweep);
            }
            _ => {}
        }
        Ok(report)
    }

    /// Pull path: sweep every known shop, then run its cadence pass.
    ///
    /// Only a failure to enumerate shops is returned as an error; everything
    /// per shop is contained in that shop's report.
    pub async fn run_tick(self: &Arc<Self>, now: DateTime<Utc>) -> Result<TickReport, EngineError> {
        let (_never_stopped, stop) = watch::channel(false);
        self.run_tick_until(now, stop).await
    }

    /// [`run_tick`](Self::run_tick) that stops starting shops once `stop`
    /// reads `true`. Shops already past their permit run to completion.
    pub async fn run_tick_until(
        self: &Arc<Self>,
        now: DateTime<Utc>,
        stop: watch::Receiver<bool>,
    ) -> Result<TickReport, EngineError> {
        let mut shops: BTreeSet<ShopId> = self.stores.items.list_shops()?.into_iter().collect();
        shops.extend(self.stores.settings.list_shops()?);

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_shops));
        let mut tasks = JoinSet::new();
        let mut report = TickReport::default();

        for shop in shops {
            let Some(claim) = ShopClaim::try_claim(&self.in_flight, &shop) else {
                info!(shop = %shop, "previous cycle still running, skipping shop");
                report.skipped_busy.push(shop);
                continue;
            };
            let engine = Arc::clone(self);
            let permits = Arc::clone(&permits);
            let stop = stop.clone();
            tasks.spawn(async move {
                let _claim = claim;
                let _permit = permits.acquire_owned().await;
                if *stop.borrow() {
                    debug!(shop = %shop, "shutdown signaled, shop not started");
                    return ShopRun::Cancelled(shop);
                }
                ShopRun::Completed(engine.run_shop(shop, now).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(ShopRun::Completed(shop_report)) => report.shops.push(shop_report),
                Ok(ShopRun::Cancelled(shop)) => report.cancelled.push(shop),
                Err(err) => error!(error = %err, "shop cycle task aborted"),
            }
        }
        report.cancelled.sort();
        report.shops.sort_by(|a, b| a.shop_id.cmp(&b.shop_id));
        Ok(report)
    }

    async fn run_shop(&self, shop: ShopId, now: DateTime<Utc>) -> ShopCycleReport {
        let mut report = ShopCycleReport::new(shop.clone());

        let settings = match self.stores.settings.get_or_create(&shop, now) {
            Ok(s) => s,
            Err(err) => {
                warn!(shop = %shop, error = %err, "settings unavailable, skipping shop");
                report.errors.push(err.to_string());
                return report;
            }
        };

        match self.reconciler.sweep_shop(&shop, now).await {
            Ok(sweep) => {
                report.alerts = self
                    .alert_crossings(&settings, &sweep.crossed, now, &mut report.errors)
                    .await;
                report.sweep = Some(sweep);
            }
            Err(err) => {
                warn!(shop = %shop, error = %err, "sweep failed, continuing with cadence pass");
                report.errors.push(err.to_string());
            }
        }

        let eligibility = self.scheduler.eligibility(&settings, now);
        report.eligibility = Some(eligibility);
        match eligibility {
            Eligibility::Due(cycle) => {
                match self.dispatcher.dispatch_batch(&settings, cycle, now).await {
                    Ok(outcome) => report.batch = Some(outcome),
                    Err(err) => {
                        warn!(shop = %shop, %cycle, error = %err, "batch dispatch failed");
                        report.errors.push(err.to_string());
                    }
                }
            }
            Eligibility::Skip(reason) => {
                debug!(shop = %shop, ?reason, "no batch cycle due");
            }
        }
        report
    }

    /// Instant alerts for the items a sweep pushed below threshold. A failure
    /// on one item is recorded in `errors` and the rest are still sent.
    async fn alert_crossings(
        &self,
        settings: &AlertSettings,
        crossed: &[TrackedItem],
        now: DateTime<Utc>,
        errors: &mut Vec<String>,
    ) -> Vec<InstantOutcome> {
        if !settings.wants_instant() {
            return Vec::new();
        }
        let mut outcomes = Vec::with_capacity(crossed.len());
        for item in crossed {
            match self.dispatcher.dispatch_instant(settings, item, now).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    warn!(
                        shop = %settings.shop_id(),
                        item = %item.key(),
                        error = %err,
                        "instant dispatch failed"
                    );
                    errors.push(err.to_string());
                }
            }
        }
        outcomes
    }

    // Operator actions.

    /// Register or re-register an item; conflicting concurrent registrations
    /// are retried like any other single-key write.
    pub fn track_item(&self, cmd: TrackItem) -> Result<TrackedItem, EngineError> {
        let key = cmd.key.clone();
        let attempts = self.config.conflict_retries + 1;
        for _ in 0..attempts {
            match self.stores.items.track(cmd.clone()) {
                Ok(item) => {
                    info!(item = %key, threshold = item.threshold_quantity(), "item tracked");
                    return Ok(item);
                }
                Err(StoreError::Conflict(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(ReconcileError::ConflictExhausted { key, attempts }.into())
    }

    pub fn set_alerts_enabled(
        &self,
        key: &ItemKey,
        enabled: bool,
    ) -> Result<TrackedItem, EngineError> {
        let item = self.stores.items.set_alerts_enabled(key, enabled)?;
        info!(item = %key, enabled, "item alerts toggled");
        Ok(item)
    }

    pub fn untrack_item(&self, key: &ItemKey) -> Result<Option<TrackedItem>, EngineError> {
        let removed = self.stores.items.untrack(key)?;
        if removed.is_some() {
            info!(item = %key, "item untracked");
        }
        Ok(removed)
    }

    pub fn update_settings(
        &self,
        shop: &ShopId,
        update: SettingsUpdate,
        now: DateTime<Utc>,
    ) -> Result<AlertSettings, EngineError> {
        let settings = self.stores.settings.update(shop, update, now)?;
        info!(
            shop = %shop,
            cadence = %settings.cadence(),
            enabled = settings.notifications_enabled(),
            "alert settings updated"
        );
        Ok(settings)
    }

    pub fn shop_overview(
        &self,
        shop: &ShopId,
        now: DateTime<Utc>,
    ) -> Result<ShopOverview, EngineError> {
        Ok(shop_overview(
            self.stores.items.as_ref(),
            self.stores.settings.as_ref(),
            self.stores.audit.as_ref(),
            shop,
            now,
        )?)
    }
}
