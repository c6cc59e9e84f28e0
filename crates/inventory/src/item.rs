use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockpulse_core::{DomainError, DomainResult, ProductRef, ShopId, VariantRef};

/// Variant title the commerce platform uses for single-variant products.
pub const DEFAULT_VARIANT_TITLE: &str = "Default Title";

/// Identity of a tracked item: unique per (shop, product, variant).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub shop_id: ShopId,
    pub product_ref: ProductRef,
    /// `None` means the product's default variant.
    pub variant_ref: Option<VariantRef>,
}

impl ItemKey {
    pub fn new(shop_id: ShopId, product_ref: ProductRef, variant_ref: Option<VariantRef>) -> Self {
        Self {
            shop_id,
            product_ref,
            variant_ref,
        }
    }

    pub fn shop_id(&self) -> &ShopId {
        &self.shop_id
    }
}

impl core::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.variant_ref {
            Some(v) => write!(f, "{}/{}/{}", self.shop_id, self.product_ref, v),
            None => write!(f, "{}/{}/default", self.shop_id, self.product_ref),
        }
    }
}

/// Operator action: start tracking an item, or update an existing registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackItem {
    pub key: ItemKey,
    pub product_title: String,
    pub variant_title: Option<String>,
    pub threshold_quantity: i64,
    /// Inventory read at registration time (0 when the upstream read failed).
    pub current_inventory: i64,
    pub occurred_at: DateTime<Utc>,
}

/// A shop's product/variant with a configured alert threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedItem {
    key: ItemKey,
    product_title: String,
    variant_title: Option<String>,
    threshold_quantity: i64,
    alerts_enabled: bool,
    current_inventory: i64,
    last_checked_at: Option<DateTime<Utc>>,
    /// Observation time of the absolute fact that produced `current_inventory`.
    last_observed_at: Option<DateTime<Utc>>,
    last_alert_sent_at: Option<DateTime<Utc>>,
}

impl TrackedItem {
    /// Create a tracked item from an operator registration.
    pub fn track(cmd: TrackItem) -> DomainResult<Self> {
        validate_registration(&cmd)?;
        Ok(Self {
            key: cmd.key,
            product_title: cmd.product_title.trim().to_string(),
            variant_title: cmd.variant_title,
            threshold_quantity: cmd.threshold_quantity,
            alerts_enabled: true,
            current_inventory: cmd.current_inventory,
            last_checked_at: Some(cmd.occurred_at),
            last_observed_at: Some(cmd.occurred_at),
            last_alert_sent_at: None,
        })
    }

    /// Re-apply a registration to an existing item (update-or-create semantics).
    ///
    /// Alert flag and alert bookkeeping survive a threshold change.
    pub fn retrack(&mut self, cmd: TrackItem) -> DomainResult<()> {
        validate_registration(&cmd)?;
        if cmd.key != self.key {
            return Err(DomainError::invariant("item key mismatch"));
        }
        self.product_title = cmd.product_title.trim().to_string();
        self.variant_title = cmd.variant_title;
        self.threshold_quantity = cmd.threshold_quantity;
        self.current_inventory = cmd.current_inventory;
        self.last_checked_at = Some(cmd.occurred_at);
        self.last_observed_at = Some(cmd.occurred_at);
        Ok(())
    }

    pub fn key(&self) -> &ItemKey {
        &self.key
    }

    pub fn shop_id(&self) -> &ShopId {
        &self.key.shop_id
    }

    pub fn product_title(&self) -> &str {
        &self.product_title
    }

    pub fn variant_title(&self) -> Option<&str> {
        self.variant_title.as_deref()
    }

    pub fn threshold_quantity(&self) -> i64 {
        self.threshold_quantity
    }

    pub fn alerts_enabled(&self) -> bool {
        self.alerts_enabled
    }

    pub fn current_inventory(&self) -> i64 {
        self.current_inventory
    }

    pub fn last_checked_at(&self) -> Option<DateTime<Utc>> {
        self.last_checked_at
    }

    pub fn last_observed_at(&self) -> Option<DateTime<Utc>> {
        self.last_observed_at
    }

    pub fn last_alert_sent_at(&self) -> Option<DateTime<Utc>> {
        self.last_alert_sent_at
    }

    /// `"Product - Variant"`, or the product title alone for default variants.
    pub fn display_name(&self) -> String {
        match self.variant_title.as_deref() {
            Some(v) if !v.trim().is_empty() && v != DEFAULT_VARIANT_TITLE => {
                format!("{} - {}", self.product_title, v)
            }
            _ => self.product_title.clone(),
        }
    }

    pub fn is_below_threshold(&self) -> bool {
        self.current_inventory < self.threshold_quantity
    }

    pub fn should_alert(&self) -> bool {
        self.alerts_enabled && self.is_below_threshold()
    }

    pub fn set_alerts_enabled(&mut self, enabled: bool) {
        self.alerts_enabled = enabled;
    }

    /// Record a confirmed delivery.
    pub fn mark_alerted(&mut self, sent_at: DateTime<Utc>) {
        self.last_alert_sent_at = Some(sent_at);
    }

    pub(crate) fn set_inventory(
        &mut self,
        quantity: i64,
        checked_at: DateTime<Utc>,
        observed_at: Option<DateTime<Utc>>,
    ) {
        self.current_inventory = quantity;
        self.last_checked_at = Some(checked_at);
        if observed_at.is_some() {
            self.last_observed_at = observed_at;
        }
    }
}

fn validate_registration(cmd: &TrackItem) -> DomainResult<()> {
    if cmd.product_title.trim().is_empty() {
        return Err(DomainError::validation("product title cannot be empty"));
    }
    if cmd.threshold_quantity < 0 {
        return Err(DomainError::validation("threshold quantity cannot be negative"));
    }
    Ok(())
}
