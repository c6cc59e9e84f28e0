//! Record stores: tracked items, per-shop settings and the audit log.
//!
//! Locking is scoped to a single item key or a single shop; there is no
//! store-wide write lock held across an update.

mod audit;
mod items;
mod settings;
#[cfg(test)]
pub(crate) mod testing;

pub use audit::{AuditLog, InMemoryAuditLog};
pub use items::{InMemoryInventoryStore, InventoryStore};
pub use settings::{InMemorySettingsStore, SettingsStore};

use thiserror::Error;

use stockpulse_core::DomainError;
use stockpulse_inventory::ItemKey;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing store cannot serve requests at all.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A concurrent write replaced the record mid-update; safe to retry.
    #[error("concurrent write conflict on {0}")]
    Conflict(ItemKey),
    #[error("item not tracked: {0}")]
    NotFound(ItemKey),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl StoreError {
    pub(crate) fn poisoned(what: &str) -> Self {
        Self::Unavailable(format!("{what} lock poisoned"))
    }
}
