//! Read path into the catalog for browsing and search. Every lookup consults
//! the catalog's override table before the item's own data.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::data::catalog::{Catalog, ItemIdentity};
use crate::data::item::{ItemDefinition, CATEGORY_SHIP, SYSTEM_EFFECT_GROUP};
use crate::error::Result;

/// Category filter for [Market::search].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SearchFilter {
    /// Fittable categories only.
    #[default]
    Fittable,
    Categories(Vec<String>),
    All,
}

pub const FITTABLE_CATEGORIES: [&str; 4] = ["Module", "Implant", "Skill", "Drone"];

impl SearchFilter {
    fn accepts(&self, category: &str) -> bool {
        match self {
            Self::Fittable => FITTABLE_CATEGORIES
                .iter()
                .any(|c| c.eq_ignore_ascii_case(category)),
            Self::Categories(categories) => categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(category)),
            Self::All => true,
        }
    }
}

/// Meta group an item belongs to and the item it is a variation of.
#[derive(Debug, Clone)]
pub struct MetaGroupInfo {
    pub meta_group: String,
    pub parent: Option<Arc<ItemDefinition>>,
}

/// Dropped from beacon names for display. Longer phrases go first.
const BEACON_NAME_NOISE: [&str; 3] = ["ship attributes effects", "Effect", "Beacon"];

/// One selectable system effect.
#[derive(Debug, Clone)]
pub struct SystemEffectEntry {
    pub beacon: Arc<ItemDefinition>,
    /// Beacon name without the noise words, e.g. "Pulsar Class 1".
    pub name: String,
    /// Remainder after the class prefix, e.g. "Class 1".
    pub short_name: String,
}

fn strip_beacon_noise(name: &str) -> String {
    let mut cleaned = name.to_string();
    for word in BEACON_NAME_NOISE {
        cleaned = cleaned.replace(word, " ");
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug)]
pub struct Market {
    catalog: Arc<Catalog>,
    /// Group name -> category, from the catalog's own items.
    group_categories: HashMap<String, String>,
    /// Effective group name -> items, with forced groups applied.
    by_group: BTreeMap<String, Vec<Arc<ItemDefinition>>>,
}

impl Market {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        let mut group_categories = HashMap::new();
        for item in catalog.items() {
            group_categories
                .entry(item.group.clone())
                .or_insert_with(|| item.category.clone());
        }

        let mut by_group: BTreeMap<String, Vec<Arc<ItemDefinition>>> = BTreeMap::new();
        for item in catalog.items() {
            let group = catalog
                .overrides()
                .forced_groups
                .get(&item.name)
                .cloned()
                .unwrap_or_else(|| item.group.clone());
            by_group.entry(group).or_default().push(Arc::clone(item));
        }

        tracing::info!(groups = by_group.len(), items = catalog.len(), "market.indexed");
        Self {
            catalog,
            group_categories,
            by_group,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn get_item(&self, identity: impl Into<ItemIdentity>) -> Result<&Arc<ItemDefinition>> {
        self.catalog.item(identity)
    }

    pub fn group_by_item<'a>(&'a self, item: &'a ItemDefinition) -> &'a str {
        self.catalog
            .overrides()
            .forced_groups
            .get(&item.name)
            .map(String::as_str)
            .unwrap_or(&item.group)
    }

    pub fn category_by_item<'a>(&'a self, item: &'a ItemDefinition) -> &'a str {
        let group = self.group_by_item(item);
        self.group_categories
            .get(group)
            .map(String::as_str)
            .unwrap_or(&item.category)
    }

    pub fn meta_group_by_item(&self, item: &ItemDefinition) -> Option<MetaGroupInfo> {
        if let Some(forced) = self.catalog.overrides().forced_meta_groups.get(&item.name) {
            let parent = match self.catalog.item(forced.parent.as_str()) {
                Ok(parent) => Some(Arc::clone(parent)),
                Err(err) => {
                    tracing::warn!(item = %item.name, error = %err, "market.forced_parent_missing");
                    None
                }
            };
            return Some(MetaGroupInfo {
                meta_group: forced.meta_group.clone(),
                parent,
            });
        }
        item.meta_group.clone().map(|meta_group| MetaGroupInfo {
            meta_group,
            parent: None,
        })
    }

    /// The item this one is a variation of; with `self_parent`, an item without one is its own parent.
    pub fn parent_item(&self, item: &Arc<ItemDefinition>, self_parent: bool) -> Option<Arc<ItemDefinition>> {
        match self.meta_group_by_item(item).and_then(|info| info.parent) {
            Some(parent) => Some(parent),
            None if self_parent => Some(Arc::clone(item)),
            None => None,
        }
    }

    /// Forced market group, then the item's own, then its parent's.
    pub fn market_group_by_item(&self, item: &Arc<ItemDefinition>) -> Option<u32> {
        if let Some(id) = self.catalog.overrides().forced_market_groups.get(&item.name) {
            return Some(*id);
        }
        if item.market_group.is_some() {
            return item.market_group;
        }
        self.parent_item(item, false)
            .and_then(|parent| parent.market_group)
    }

    pub fn is_market_group_visible(&self, market_group: u32) -> bool {
        self.catalog
            .overrides()
            .market_group_visibility
            .get(&market_group)
            .copied()
            .unwrap_or(true)
    }

    pub fn is_published(&self, item: &ItemDefinition) -> bool {
        self.catalog
            .overrides()
            .forced_published
            .get(&item.name)
            .copied()
            .unwrap_or(item.published)
    }

    /// A group is published when forced so, or when any of its items is.
    pub fn is_group_published(&self, group: &str) -> bool {
        if let Some(forced) = self.catalog.overrides().forced_published.get(group) {
            return *forced;
        }
        self.by_group
            .get(group)
            .map(|items| items.iter().any(|item| item.published))
            .unwrap_or(false)
    }

    pub fn items_in_group(&self, group: &str) -> &[Arc<ItemDefinition>] {
        self.by_group.get(group).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.by_group.keys().map(String::as_str)
    }

    pub fn ships_in_group(&self, group: &str) -> Vec<Arc<ItemDefinition>> {
        self.items_in_group(group)
            .iter()
            .filter(|item| item.is_category(CATEGORY_SHIP))
            .cloned()
            .collect()
    }

    /// Every item sharing this item's parent, the parent included.
    pub fn variations(&self, item: &Arc<ItemDefinition>) -> Vec<Arc<ItemDefinition>> {
        let Some(parent) = self.parent_item(item, true) else {
            return Vec::new();
        };
        let mut variations: Vec<Arc<ItemDefinition>> = self
            .catalog
            .items()
            .filter(|candidate| {
                self.parent_item(candidate, true)
                    .map(|p| p.id == parent.id)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        variations.sort_by_key(|item| item.id);
        variations
    }

    /// Beacons grouped by the class their name prefix maps to in the override
    /// table. Beacons matching no prefix are left out.
    pub fn system_wide_effects(&self) -> BTreeMap<String, Vec<SystemEffectEntry>> {
        let classes = &self.catalog.overrides().system_effect_classes;
        let mut effects: BTreeMap<String, Vec<SystemEffectEntry>> = BTreeMap::new();
        for beacon in self.items_in_group(SYSTEM_EFFECT_GROUP) {
            let Some((prefix, class)) = classes
                .iter()
                .filter(|(prefix, _)| beacon.name.starts_with(prefix.as_str()))
                .max_by_key(|(prefix, _)| prefix.len())
            else {
                tracing::debug!(beacon = %beacon.name, "market.unclassified_beacon");
                continue;
            };
            effects.entry(class.clone()).or_default().push(SystemEffectEntry {
                beacon: Arc::clone(beacon),
                name: strip_beacon_noise(&beacon.name),
                short_name: strip_beacon_noise(&beacon.name[prefix.len()..]),
            });
        }
        for entries in effects.values_mut() {
            entries.sort_by(|a, b| a.name.cmp(&b.name));
        }
        effects
    }

    /// Case-insensitive name search over published items, sorted by name.
    pub fn search(&self, query: &str, filter: &SearchFilter) -> Vec<Arc<ItemDefinition>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut found: Vec<Arc<ItemDefinition>> = self
            .catalog
            .items()
            .filter(|item| item.name.to_lowercase().contains(&needle))
            .filter(|item| filter.accepts(self.category_by_item(item)))
            .filter(|item| self.is_published(item))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }
}
