use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::item::ItemKey;

/// Absolute inventory observation, normalized from any inbound source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryFact {
    pub key: ItemKey,
    pub quantity: i64,
    /// When the upstream platform observed the quantity, if it said so.
    pub observed_at: Option<DateTime<Utc>>,
    /// When the engine received the fact; becomes `last_checked_at`.
    pub received_at: DateTime<Utc>,
}

impl InventoryFact {
    pub fn new(key: ItemKey, quantity: i64, received_at: DateTime<Utc>) -> Self {
        Self {
            key,
            quantity,
            observed_at: None,
            received_at,
        }
    }

    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = Some(at);
        self
    }
}
