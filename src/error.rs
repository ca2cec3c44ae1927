//! Error types for fitsim.
//!
//! Catalog misses and data inconsistencies surface as typed errors so the
//! orchestrating layer can log them and render a blank value instead of
//! aborting the whole fit.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("unknown effect '{name}'")]
    UnknownEffect { name: String },

    #[error("unknown item '{identity}'")]
    UnknownItem { identity: String },

    #[error("no fitted item with id {id}")]
    UnknownFittedItem { id: String },

    #[error("attribute '{attribute}' has neither a base value nor a default")]
    MissingBaseValue { attribute: String },

    #[error("item '{item}' is not a valid {expected}")]
    InvalidItemCategory { item: String, expected: String },

    #[error("skill level {level} is out of range 0..=5")]
    InvalidSkillLevel { level: u8 },

    #[error("cyclic attribute dependency through '{attribute}'")]
    CyclicDependency { attribute: String },

    #[error("invalid catalog: {message}")]
    InvalidCatalog { message: String },

    #[error("invalid config: {message}")]
    InvalidConfig { message: String },

    #[error("price source failed: {message}")]
    PriceSource { message: String },

    #[error("{worker} worker is no longer running")]
    WorkerClosed { worker: &'static str },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// True for catalog lookup misses, which indicate inconsistent data rather than a bad request.
    pub fn is_catalog_miss(&self) -> bool {
        matches!(
            self,
            Self::UnknownAttribute { .. } | Self::UnknownEffect { .. } | Self::UnknownItem { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
