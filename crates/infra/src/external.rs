//! External capabilities consumed by the engine.
//!
//! The commerce platform client, the owner directory and the mail transport
//! live outside this crate. They are reached only through these traits, and
//! every call is bounded by [`bounded`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use stockpulse_alerts::{AlertPayload, FailureCategory};
use stockpulse_core::ShopId;
use stockpulse_inventory::ItemKey;

/// Absolute quantity as reported by the upstream platform.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ObservedQuantity {
    pub quantity: i64,
    pub observed_at: DateTime<Utc>,
}

/// Failure of an external capability call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl CapabilityError {
    /// Operator-facing category recorded on failed audit entries.
    pub fn category(&self) -> FailureCategory {
        match self {
            CapabilityError::Timeout(_) => FailureCategory::DeliveryTimeout,
            CapabilityError::RateLimited => FailureCategory::RateLimited,
            CapabilityError::Transport(_) => FailureCategory::TransportError,
            CapabilityError::Rejected(_) => FailureCategory::DeliveryRejected,
            CapabilityError::NotFound(_) => FailureCategory::RecipientUnavailable,
        }
    }
}

/// Read access to the upstream platform's inventory.
#[async_trait::async_trait]
pub trait InventorySource: Send + Sync {
    async fn fetch_inventory(&self, key: &ItemKey) -> Result<ObservedQuantity, CapabilityError>;

    /// Keys the platform reports for the shop. Only used to decide what to
    /// poll; thresholds and flags come from the local store.
    async fn fetch_tracked_catalog(
        &self,
        shop_id: &ShopId,
    ) -> Result<Vec<ItemKey>, CapabilityError>;
}

#[async_trait::async_trait]
pub trait OwnerDirectory: Send + Sync {
    async fn resolve_owner_email(&self, shop_id: &ShopId) -> Result<String, CapabilityError>;
}

/// Notification transport. `Ok(())` means the message was accepted.
#[async_trait::async_trait]
pub trait AlertDelivery: Send + Sync {
    async fn deliver(&self, recipient: &str, payload: &AlertPayload) -> Result<(), CapabilityError>;
}

/// The capability set an engine is wired with.
#[derive(Clone)]
pub struct Capabilities {
    pub inventory: Arc<dyn InventorySource>,
    pub owners: Arc<dyn OwnerDirectory>,
    pub delivery: Arc<dyn AlertDelivery>,
}

/// Run a capability call under a deadline. Expiry is a failure for this
/// attempt; callers do not retry within the same cycle.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, CapabilityError>
where
    F: Future<Output = Result<T, CapabilityError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CapabilityError::Timeout(limit)),
    }
}
