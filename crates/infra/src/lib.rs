//! Infrastructure layer: record stores, external capabilities and the
//! orchestration loop that drives reconciliation and dispatch.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod external;
pub mod reconcile;
pub mod reporting;
pub mod runner;
pub mod store;


pub use config::{ConfigError, EngineConfig};
pub use dispatch::{AlertDispatcher, BatchOutcome, DispatchError, InstantOutcome};
pub use engine::{AlertEngine, EngineError, EngineStores, EventReport, ShopCycleReport, TickReport};
pub use external::{
    AlertDelivery, Capabilities, CapabilityError, InventorySource, ObservedQuantity, OwnerDirectory,
};
pub use reconcile::{
    IgnoreReason, InboundEvent, InboundKind, IngestOutcome, ReconcileError, Reconciler,
    SweepFailure, SweepReport,
};
pub use reporting::{ShopOverview, shop_overview};
pub use runner::{EngineHandle, EngineRunner};
pub use store::{
    AuditLog, InMemoryAuditLog, InMemoryInventoryStore, InMemorySettingsStore, InventoryStore,
    SettingsStore, StoreError,
};
