//! Startup-loaded catalog: attribute registry, effect catalog, item definitions
//! and the override table that replaces per-item special cases.
//! Load once, share via `Arc` with every fit and service.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::is_json;
use crate::data::attribute::{AttributeDefinition, AttributeRegistry};
use crate::data::effect::{EffectCatalog, EffectDefinition, ValueSource};
use crate::data::item::ItemDefinition;
use crate::error::{Error, Result};

/// Data-driven exception table consulted before the general rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverrideTable {
    /// Item name -> group name it is listed under.
    pub forced_groups: BTreeMap<String, String>,
    /// Item or group name -> forced publicity.
    pub forced_published: BTreeMap<String, bool>,
    /// Item name -> (meta group, parent item name).
    pub forced_meta_groups: BTreeMap<String, ForcedMetaGroup>,
    /// Item name -> market group id.
    pub forced_market_groups: BTreeMap<String, u32>,
    /// Market group id -> forced visibility.
    pub market_group_visibility: BTreeMap<u32, bool>,
    /// Legacy item name -> current item name.
    pub name_conversions: BTreeMap<String, String>,
    /// Item name -> base attribute values replacing the catalog's.
    pub base_values: BTreeMap<String, HashMap<String, f64>>,
    /// Beacon name prefix -> system effect class it is listed under.
    pub system_effect_classes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForcedMetaGroup {
    pub meta_group: String,
    pub parent: String,
}

/// On-disk layout of a catalog file (YAML or JSON).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub data_version: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
    #[serde(default)]
    pub effects: Vec<EffectDefinition>,
    #[serde(default)]
    pub items: Vec<ItemDefinition>,
    #[serde(default)]
    pub overrides: OverrideTable,
}

/// Lookup key accepted by [Catalog::item]. Serialized as a bare id or name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemIdentity {
    Id(u32),
    Name(String),
}

impl From<u32> for ItemIdentity {
    fn from(id: u32) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for ItemIdentity {
    fn from(name: &str) -> Self {
        match name.trim().parse::<u32>() {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Name(name.to_string()),
        }
    }
}

impl From<String> for ItemIdentity {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl std::fmt::Display for ItemIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

/// Normalize a name for lookup: lowercase, collapse whitespace and underscores.
pub(crate) fn normalize_lookup(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() || c == '_' { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Read-only catalog of static data. Immutable once built.
#[derive(Debug)]
pub struct Catalog {
    pub data_version: Option<String>,
    attributes: AttributeRegistry,
    effects: EffectCatalog,
    items: BTreeMap<u32, Arc<ItemDefinition>>,
    by_name: HashMap<String, u32>,
    /// `name_conversions` with both sides normalized.
    conversions: HashMap<String, String>,
    overrides: OverrideTable,
}

impl Catalog {
    /// Resolve references and apply base-value overrides. Dangling effect or
    /// attribute references fail the whole build.
    pub fn build(file: CatalogFile) -> Result<Self> {
        let attributes = AttributeRegistry::new(file.attributes);

        for effect in &file.effects {
            attributes.get(&effect.target_attribute)?;
            if let ValueSource::Attribute(name) = &effect.value {
                attributes.get(name)?;
            }
        }
        let effects = EffectCatalog::new(file.effects);

        let mut items = BTreeMap::new();
        let mut by_name = HashMap::new();
        for mut item in file.items {
            effects.effects_for(&item)?;
            if let Some(base_values) = file.overrides.base_values.get(&item.name) {
                for (name, value) in base_values {
                    item.attributes.insert(name.clone(), *value);
                }
            }
            if items.contains_key(&item.id) {
                return Err(Error::InvalidCatalog {
                    message: format!("duplicate item id {}", item.id),
                });
            }
            if let Some(previous) = by_name.insert(normalize_lookup(&item.name), item.id) {
                tracing::warn!(name = %item.name, previous, replaced_by = item.id, "catalog.duplicate_name");
            }
            items.insert(item.id, Arc::new(item));
        }
        let conversions = file
            .overrides
            .name_conversions
            .iter()
            .map(|(legacy, current)| (normalize_lookup(legacy), normalize_lookup(current)))
            .collect();

        tracing::info!(
            attributes = attributes.len(),
            effects = effects.len(),
            items = items.len(),
            "catalog.built"
        );

        Ok(Self {
            data_version: file.data_version,
            attributes,
            effects,
            items,
            by_name,
            conversions,
            overrides: file.overrides,
        })
    }

    pub fn parse_file(path: &Path) -> Result<CatalogFile> {
        let raw = fs::read_to_string(path)?;
        let file = if is_json(path) {
            serde_json::from_str(&raw)?
        } else {
            serde_yaml::from_str(&raw)?
        };
        Ok(file)
    }

    pub fn load(path: &Path) -> Result<Arc<Catalog>> {
        let catalog = Self::build(Self::parse_file(path)?)?;
        tracing::info!(path = %path.display(), "catalog.loaded=file");
        Ok(Arc::new(catalog))
    }

    pub fn attributes(&self) -> &AttributeRegistry {
        &self.attributes
    }

    pub fn effects(&self) -> &EffectCatalog {
        &self.effects
    }

    pub fn overrides(&self) -> &OverrideTable {
        &self.overrides
    }

    /// Look up by id, or by name after applying `name_conversions`.
    pub fn item(&self, identity: impl Into<ItemIdentity>) -> Result<&Arc<ItemDefinition>> {
        let identity = identity.into();
        let found = match &identity {
            ItemIdentity::Id(id) => self.items.get(id),
            ItemIdentity::Name(name) => {
                let key = normalize_lookup(name);
                let key = self.conversions.get(&key).unwrap_or(&key);
                self.by_name.get(key).and_then(|id| self.items.get(id))
            }
        };
        found.ok_or_else(|| Error::UnknownItem {
            identity: identity.to_string(),
        })
    }

    pub fn items(&self) -> impl Iterator<Item = &Arc<ItemDefinition>> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
