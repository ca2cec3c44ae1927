//! Static catalog data: attributes, effects, items and their loader.

pub mod attribute;
pub mod catalog;
pub mod effect;
pub mod item;
pub mod validate;

pub use attribute::{AttributeDefinition, AttributeRegistry};
pub use catalog::{Catalog, CatalogFile, ForcedMetaGroup, ItemIdentity, OverrideTable};
pub use effect::{
    ApplicabilityContext, Condition, EffectCatalog, EffectDefinition, EffectTarget, Operation,
    RuntimePhase, Stage, ValueScaling, ValueSource,
};
pub use item::{ItemDefinition, ItemKind};
pub use validate::{validate_catalog, validate_catalog_file, ValidationReport, ValidationSeverity};
