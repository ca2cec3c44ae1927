//! Engine configuration: stacking curve parameters and data locations.
//!
//! Loaded from a JSON or YAML file, with `FITSIM_CONFIG` selecting the file and
//! `FITSIM_CATALOG` overriding the catalog path. Missing or invalid files fall
//! back to built-in defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_PATH: &str = "data/fitsim.yaml";
pub const DEFAULT_CATALOG_PATH: &str = "data/catalog.yaml";
pub const DEFAULT_PENALTY_SCALE: f64 = 2.4;

/// Parameters of the diminishing-returns curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackingPolicy {
    /// Denominator of the penalty curve `exp(-(n / scale)^2)`.
    pub penalty_scale: f64,
    /// Entries ranked beyond this many in one chain contribute nothing.
    pub max_penalized: Option<usize>,
}

impl StackingPolicy {
    /// The curve is only defined for a finite, positive scale.
    pub fn validate(&self) -> Result<()> {
        if self.penalty_scale.is_finite() && self.penalty_scale > 0.0 {
            Ok(())
        } else {
            Err(Error::InvalidConfig {
                message: format!(
                    "stacking.penalty_scale must be finite and > 0, got {}",
                    self.penalty_scale
                ),
            })
        }
    }
}

impl Default for StackingPolicy {
    fn default() -> Self {
        Self {
            penalty_scale: DEFAULT_PENALTY_SCALE,
            max_penalized: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub stacking: StackingPolicy,
    pub catalog_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stacking: StackingPolicy::default(),
            catalog_path: PathBuf::from(DEFAULT_CATALOG_PATH),
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = if is_json(path) {
            serde_json::from_str(&raw)?
        } else {
            serde_yaml::from_str(&raw)?
        };
        config.stacking.validate()?;
        Ok(config)
    }

    /// Load from `FITSIM_CONFIG` (or the default path), then apply `FITSIM_CATALOG`.
    pub fn load_from_env() -> Self {
        let path = env::var("FITSIM_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = match Self::from_file(&path) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "config.loaded=file");
                config
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "config.load_failed; using defaults");
                Self::default()
            }
        };

        if let Ok(catalog) = env::var("FITSIM_CATALOG") {
            config.catalog_path = PathBuf::from(catalog);
        }
        config
    }
}

pub(crate) fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
