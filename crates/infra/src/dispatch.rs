//! Alert dispatcher.
//!
//! Two paths share one attempt routine: resolve the recipient, deliver under a
//! deadline, write one audit entry per item. Bookkeeping (`mark_alerted`,
//! cycle timestamps) only moves after a confirmed delivery.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use stockpulse_alerts::{
    AlertPayload, AlertSettings, AuditEntry, BatchCycle, DedupWindow, FailureCategory,
};
use stockpulse_inventory::{ItemKey, TrackedItem};

use crate::external::{AlertDelivery, CapabilityError, OwnerDirectory, bounded};
use crate::store::{AuditLog, InventoryStore, SettingsStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstantOutcome {
    Sent { key: ItemKey, recipient: String },
    /// An alert for the item went out inside the dedup window.
    Deduplicated { key: ItemKey },
    /// Wrong cadence, notifications off, alerts disabled or no longer below.
    NotEligible { key: ItemKey },
    Failed { key: ItemKey, category: FailureCategory },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Sent { cycle: BatchCycle, items: usize },
    /// Nothing below threshold; the cycle still counts as completed.
    NothingToReport { cycle: BatchCycle },
    Failed {
        cycle: BatchCycle,
        category: FailureCategory,
        items: usize,
    },
}

struct Attempt {
    recipient: Option<String>,
    outcome: Result<(), (FailureCategory, String)>,
}

pub struct AlertDispatcher {
    items: Arc<dyn InventoryStore>,
    settings: Arc<dyn SettingsStore>,
    audit: Arc<dyn AuditLog>,
    owners: Arc<dyn OwnerDirectory>,
    delivery: Arc<dyn AlertDelivery>,
    dedup: DedupWindow,
    capability_timeout: Duration,
}

impl AlertDispatcher {
    pub fn new(
        items: Arc<dyn InventoryStore>,
        settings: Arc<dyn SettingsStore>,
        audit: Arc<dyn AuditLog>,
        owners: Arc<dyn OwnerDirectory>,
        delivery: Arc<dyn AlertDelivery>,
        dedup: DedupWindow,
        capability_timeout: Duration,
    ) -> Self {
        Self {
            items,
            settings,
            audit,
            owners,
            delivery,
            dedup,
            capability_timeout,
        }
    }

    /// Send a single-item alert for an item that just crossed below threshold.
    ///
    /// Eligibility and dedup are checked against the stored record, not the
    /// caller's copy, so a concurrent send for the same item is observed.
    pub async fn dispatch_instant(
        &self,
        settings: &AlertSettings,
        crossed: &TrackedItem,
        now: DateTime<Utc>,
    ) -> Result<InstantOutcome, DispatchError> {
        let key = crossed.key().clone();
        let current = self.items.get(&key)?;
        let Some(item) = current.filter(|item| settings.wants_instant() && item.should_alert())
        else {
            debug!(item = %key, "instant alert not eligible");
            return Ok(InstantOutcome::NotEligible { key });
        };

        if !self.dedup.allows_item(&item, now) {
            debug!(
                item = %key,
                last_sent = ?item.last_alert_sent_at(),
                "instant alert suppressed by dedup window"
            );
            return Ok(InstantOutcome::Deduplicated { key });
        }

        let payload = AlertPayload::single(&item);
        let attempt = self.attempt(settings, &payload, now).await?;
        match (attempt.outcome, attempt.recipient) {
            (Ok(()), Some(recipient)) => {
                self.mark_alerted(&key, now)?;
                info!(
                    shop = %settings.shop_id(),
                    item = %key,
                    quantity = item.current_inventory(),
                    "instant alert sent"
                );
                Ok(InstantOutcome::Sent { key, recipient })
            }
            (Ok(()), None) => Ok(InstantOutcome::Failed {
                key,
                category: FailureCategory::RecipientUnavailable,
            }),
            (Err((category, detail)), _) => {
                warn!(
                    shop = %settings.shop_id(),
                    item = %key,
                    %category,
                    error = %detail,
                    "instant alert failed"
                );
                Ok(InstantOutcome::Failed { key, category })
            }
        }
    }

    /// Send the daily or weekly report for a shop.
    pub async fn dispatch_batch(
        &self,
        settings: &AlertSettings,
        cycle: BatchCycle,
        now: DateTime<Utc>,
    ) -> Result<BatchOutcome, DispatchError> {
        let shop = settings.shop_id();
        let alerting: Vec<TrackedItem> = self
            .items
            .list_for_shop(shop)?
            .into_iter()
            .filter(TrackedItem::should_alert)
            .collect();

        if alerting.is_empty() {
            self.settings.record_cycle_sent(shop, cycle, now)?;
            info!(shop = %shop, %cycle, "nothing to report, cycle completed");
            return Ok(BatchOutcome::NothingToReport { cycle });
        }

        let payload = AlertPayload::batch(shop.clone(), cycle, &alerting);
        let attempt = self.attempt(settings, &payload, now).await?;
        let items = alerting.len();
        match attempt.outcome {
            Ok(()) => {
                // The report is out; close the cycle before per-item writes
                // so a failing item write cannot cause a resend.
                self.settings.record_cycle_sent(shop, cycle, now)?;
                for item in &alerting {
                    if let Err(err) = self.mark_alerted(item.key(), now) {
                        warn!(
                            shop = %shop,
                            item = %item.key(),
                            error = %err,
                            "batch delivered but item alert time not recorded"
                        );
                    }
                }
                info!(shop = %shop, %cycle, items, "batch report sent");
                Ok(BatchOutcome::Sent { cycle, items })
            }
            Err((category, detail)) => {
                warn!(
                    shop = %shop,
                    %cycle,
                    items,
                    %category,
                    error = %detail,
                    "batch report failed, cycle stays open"
                );
                Ok(BatchOutcome::Failed {
                    cycle,
                    category,
                    items,
                })
            }
        }
    }

    async fn attempt(
        &self,
        settings: &AlertSettings,
        payload: &AlertPayload,
        now: DateTime<Utc>,
    ) -> Result<Attempt, DispatchError> {
        let attempt = match self.resolve_recipient(settings).await {
            Err(err) => Attempt {
                recipient: None,
                outcome: Err((FailureCategory::RecipientUnavailable, err.to_string())),
            },
            Ok(recipient) => {
                let delivery = self.delivery.deliver(&recipient, payload);
                let outcome = bounded(self.capability_timeout, delivery)
                    .await
                    .map_err(|err| (err.category(), err.to_string()));
                Attempt {
                    recipient: Some(recipient),
                    outcome,
                }
            }
        };

        let entries = AuditEntry::for_payload(
            payload,
            attempt.recipient.as_deref(),
            attempt.outcome.clone(),
            now,
        );
        self.audit.append(entries)?;
        Ok(attempt)
    }

    async fn resolve_recipient(&self, settings: &AlertSettings) -> Result<String, CapabilityError> {
        if let Some(email) = settings.alert_email() {
            return Ok(email.to_string());
        }
        let resolved = bounded(
            self.capability_timeout,
            self.owners.resolve_owner_email(settings.shop_id()),
        )
        .await?;
        let resolved = resolved.trim();
        if resolved.is_empty() {
            return Err(CapabilityError::NotFound(format!(
                "no owner email for {}",
                settings.shop_id()
            )));
        }
        Ok(resolved.to_string())
    }

    /// An item untracked between delivery and bookkeeping is not an error.
    fn mark_alerted(&self, key: &ItemKey, now: DateTime<Utc>) -> Result<(), DispatchError> {
        match self.items.mark_alerted(key, now) {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound(_)) => {
                debug!(item = %key, "item untracked before delivery was recorded");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}
