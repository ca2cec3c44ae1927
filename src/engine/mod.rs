//! Attribute calculation: stacking resolution, per-item stores and the fit aggregator.

pub mod fit;
pub mod fitted;
pub mod report;
pub mod stacking;
pub mod store;

pub use fit::{Fit, PassState, RecomputeSummary};
pub use fitted::{AttrKey, FittedItem, Hull, ItemId, ItemKey, SystemEffect};
pub use report::{AttributeReport, ReportRow};
pub use stacking::{penalty_multiplier, ModifierEntry};
pub use store::ModifiedAttributeStore;
