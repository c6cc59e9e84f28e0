//! Threshold evaluation.
//!
//! Pure functions over a tracked item and an incoming observation. Callers are
//! responsible for serializing evaluations per item key; these functions only
//! decide what the next record looks like.

use chrono::{DateTime, Utc};

use stockpulse_core::{DomainError, DomainResult};

use crate::fact::InventoryFact;
use crate::item::TrackedItem;

/// Whether an observation was written into the record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FactDisposition {
    Applied,
    /// Older than the observation already held; the record is unchanged.
    Stale { held_observed_at: DateTime<Utc> },
}

/// Outcome of evaluating one observation against one tracked item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub item: TrackedItem,
    pub previous_quantity: i64,
    /// True only on the transition from at/above threshold to below it.
    pub crossed_into_below: bool,
    /// True only on the transition from below threshold back to at/above it.
    pub crossed_out_of_below: bool,
    pub disposition: FactDisposition,
}

impl Evaluation {
    /// True when the stored quantity differs from before.
    pub fn changed(&self) -> bool {
        self.disposition == FactDisposition::Applied
            && self.item.current_inventory() != self.previous_quantity
    }

    pub fn is_stale(&self) -> bool {
        matches!(self.disposition, FactDisposition::Stale { .. })
    }

    fn unchanged(old: &TrackedItem, held_observed_at: DateTime<Utc>) -> Self {
        Self {
            item: old.clone(),
            previous_quantity: old.current_inventory(),
            crossed_into_below: false,
            crossed_out_of_below: false,
            disposition: FactDisposition::Stale { held_observed_at },
        }
    }

    fn transition(old: &TrackedItem, new: TrackedItem) -> Self {
        let was_below = old.is_below_threshold();
        let now_below = new.is_below_threshold();
        Self {
            previous_quantity: old.current_inventory(),
            crossed_into_below: !was_below && now_below,
            crossed_out_of_below: was_below && !now_below,
            disposition: FactDisposition::Applied,
            item: new,
        }
    }
}

/// Apply an absolute observation.
///
/// Newest `observed_at` wins. Facts without a timestamp, or with a timestamp
/// equal to the held one, are applied (last applied wins).
pub fn evaluate(old: &TrackedItem, fact: &InventoryFact) -> DomainResult<Evaluation> {
    if old.key() != &fact.key {
        return Err(DomainError::invariant("fact key does not match tracked item"));
    }

    if let (Some(incoming), Some(held)) = (fact.observed_at, old.last_observed_at()) {
        if incoming < held {
            return Ok(Evaluation::unchanged(old, held));
        }
    }

    let mut new = old.clone();
    new.set_inventory(fact.quantity, fact.received_at, fact.observed_at);
    Ok(Evaluation::transition(old, new))
}

/// Apply a relative decrement (an order line item), floored at zero.
///
/// The held observation time is left alone: a decrement is not an absolute
/// read and must not make older absolute facts look newer than they are.
pub fn apply_decrement(
    old: &TrackedItem,
    decrement: i64,
    received_at: DateTime<Utc>,
) -> DomainResult<Evaluation> {
    if decrement <= 0 {
        return Err(DomainError::validation("decrement must be positive"));
    }

    let quantity = old.current_inventory().saturating_sub(decrement).max(0);
    let mut new = old.clone();
    new.set_inventory(quantity, received_at, None);
    Ok(Evaluation::transition(old, new))
}
