//! Alerting domain module.
//!
//! Deterministic rules for *when* and *what* to notify: per-shop settings, the
//! cadence scheduler, the instant dedup window, alert payloads and the audit
//! record of each attempt. No IO; clocks are passed in by callers.

pub mod audit;
pub mod cadence;
pub mod dedup;
pub mod payload;
pub mod schedule;
pub mod settings;

pub use audit::{AuditEntry, FailureCategory};
pub use cadence::{AlertKind, BatchCycle, Cadence};
pub use dedup::DedupWindow;
pub use payload::{AlertLine, AlertPayload};
pub use schedule::{CadenceScheduler, Eligibility, SkipReason};
pub use settings::{AlertSettings, SettingsUpdate};
