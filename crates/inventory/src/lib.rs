//! Tracked-item domain module.
//!
//! This crate contains the inventory rules of the alerting engine, implemented
//! purely as deterministic domain logic (no IO, no clocks, no storage):
//!
//! - `item`: the per-(shop, product, variant) tracked record and its predicates
//! - `fact`: the normalized inventory observation shape
//! - `evaluator`: threshold crossing detection and the delta floor rule

pub mod evaluator;
pub mod fact;
pub mod item;

pub use evaluator::{Evaluation, FactDisposition, apply_decrement, evaluate};
pub use fact::InventoryFact;
pub use item::{DEFAULT_VARIANT_TITLE, ItemKey, TrackItem, TrackedItem};
