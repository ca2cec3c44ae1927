//! Fit composition on disk and the two-phase load: parse the raw structure,
//! then [FitComposition::rehydrate] it against a catalog.
//!
//! Only composition is stored. Attribute caches are rebuilt on first read.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{is_json, StackingPolicy};
use crate::data::catalog::{Catalog, ItemIdentity};
use crate::data::item::ItemKind;
use crate::engine::fit::Fit;
use crate::engine::fitted::FittedItem;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item: ItemIdentity,
    pub kind: ItemKind,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
}

fn default_active() -> bool {
    true
}

impl ItemRecord {
    pub fn new(item: impl Into<ItemIdentity>, kind: ItemKind) -> Self {
        Self {
            item: item.into(),
            kind,
            active: true,
            running: false,
            level: None,
        }
    }

    fn capture(item: &FittedItem) -> Self {
        Self {
            item: ItemIdentity::Id(item.definition().id),
            kind: item.kind(),
            active: item.is_active(),
            running: item.is_running(),
            level: item.level(),
        }
    }

    fn build(&self, catalog: &Catalog) -> Result<FittedItem> {
        let definition = Arc::clone(catalog.item(self.item.clone())?);
        let item = match self.kind {
            ItemKind::Skill => FittedItem::skill(definition, self.level.unwrap_or(0))?,
            kind => FittedItem::new(definition, kind)?,
        };
        Ok(item.with_active(self.active).with_running(self.running))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitComposition {
    #[serde(default)]
    pub name: String,
    pub hull: ItemIdentity,
    #[serde(default)]
    pub items: Vec<ItemRecord>,
    #[serde(default)]
    pub projected: Vec<ItemRecord>,
    /// Beacon of the system the fit sits in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_effect: Option<ItemIdentity>,
}

/// An item record that could not be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedItem {
    pub item: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RehydrateReport {
    pub loaded: usize,
    pub dropped: Vec<DroppedItem>,
}

impl RehydrateReport {
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty()
    }
}

impl FitComposition {
    pub fn new(name: impl Into<String>, hull: impl Into<ItemIdentity>) -> Self {
        Self {
            name: name.into(),
            hull: hull.into(),
            items: Vec::new(),
            projected: Vec::new(),
            system_effect: None,
        }
    }

    pub fn with_item(mut self, record: ItemRecord) -> Self {
        self.items.push(record);
        self
    }

    pub fn with_projected(mut self, record: ItemRecord) -> Self {
        self.projected.push(record);
        self
    }

    pub fn with_system_effect(mut self, beacon: impl Into<ItemIdentity>) -> Self {
        self.system_effect = Some(beacon.into());
        self
    }

    /// Snapshot of a fit's composition; caches and overrides are not captured.
    pub fn capture(fit: &Fit) -> Self {
        Self {
            name: fit.name().to_string(),
            hull: ItemIdentity::Id(fit.hull().definition().id),
            items: fit.items().iter().map(ItemRecord::capture).collect(),
            projected: fit.projected().iter().map(ItemRecord::capture).collect(),
            system_effect: fit
                .system_effect()
                .map(|system| ItemIdentity::Id(system.definition().id)),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let composition = if is_json(path) {
            serde_json::from_str(&raw)?
        } else {
            serde_yaml::from_str(&raw)?
        };
        Ok(composition)
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Resolve references and rebuild the fit. An unresolvable hull fails the
    /// whole load; bad item records are dropped and reported.
    pub fn rehydrate(
        &self,
        catalog: &Arc<Catalog>,
        policy: StackingPolicy,
    ) -> Result<(Fit, RehydrateReport)> {
        let hull = Arc::clone(catalog.item(self.hull.clone())?);
        let mut fit = Fit::new(Arc::clone(catalog), hull)?
            .with_name(self.name.clone())
            .with_policy(policy);
        let mut report = RehydrateReport::default();

        for (record, projected) in self
            .items
            .iter()
            .map(|record| (record, false))
            .chain(self.projected.iter().map(|record| (record, true)))
        {
            let added = record.build(catalog).and_then(|item| {
                if projected {
                    fit.project(item)
                } else {
                    fit.add_item(item)
                }
            });
            match added {
                Ok(_) => report.loaded += 1,
                Err(err) => {
                    tracing::warn!(fit = %self.name, item = %record.item, error = %err, "rehydrate.dropped_item");
                    report.dropped.push(DroppedItem {
                        item: record.item.to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        if let Some(beacon) = &self.system_effect {
            let placed = catalog
                .item(beacon.clone())
                .and_then(|definition| fit.set_system_effect(Some(Arc::clone(definition))));
            match placed {
                Ok(()) => report.loaded += 1,
                Err(err) => {
                    tracing::warn!(fit = %self.name, item = %beacon, error = %err, "rehydrate.dropped_system_effect");
                    report.dropped.push(DroppedItem {
                        item: beacon.to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            fit = %self.name,
            loaded = report.loaded,
            dropped = report.dropped.len(),
            "rehydrate.done"
        );
        Ok((fit, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::attribute::AttributeDefinition;
    use crate::data::catalog::CatalogFile;
    use crate::data::item::{
        ItemDefinition, CATEGORY_CELESTIAL, CATEGORY_MODULE, CATEGORY_SHIP, CATEGORY_SKILL,
        SYSTEM_EFFECT_GROUP,
    };
    use crate::error::Error;

    fn catalog() -> Arc<Catalog> {
        let file = CatalogFile {
            attributes: vec![AttributeDefinition::new("maxVelocity", Some(0.0))],
            items: vec![
                ItemDefinition::new(1, "Rifter", "Frigate", CATEGORY_SHIP),
                ItemDefinition::new(2, "Overdrive Injector", "Overdrive", CATEGORY_MODULE),
                ItemDefinition::new(3, "Navigation", "Navigation", CATEGORY_SKILL),
                ItemDefinition::new(4, "Magnetar Effect Beacon Class 2", SYSTEM_EFFECT_GROUP, CATEGORY_CELESTIAL),
            ],
            ..CatalogFile::default()
        };
        Arc::new(Catalog::build(file).unwrap())
    }

    #[test]
    fn capture_then_rehydrate_keeps_state_flags() {
        let catalog = catalog();
        let composition = FitComposition::new("Kite", "Rifter")
            .with_item(ItemRecord {
                running: true,
                ..ItemRecord::new("Overdrive Injector", ItemKind::Module)
            })
            .with_item(ItemRecord {
                level: Some(4),
                ..ItemRecord::new(3u32, ItemKind::Skill)
            });
        let (fit, report) = composition
            .rehydrate(&catalog, StackingPolicy::default())
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.loaded, 2);

        let captured = FitComposition::capture(&fit);
        assert_eq!(captured.name, "Kite");
        assert_eq!(captured.hull, ItemIdentity::Id(1));
        assert!(captured.items[0].running);
        assert_eq!(captured.items[1].level, Some(4));
    }

    #[test]
    fn bad_records_are_dropped_not_fatal() {
        let catalog = catalog();
        let composition = FitComposition::new("Broken", 1u32)
            .with_item(ItemRecord::new("Warp Disruptor II", ItemKind::Module))
            .with_item(ItemRecord::new("Rifter", ItemKind::Module))
            .with_item(ItemRecord {
                level: Some(9),
                ..ItemRecord::new("Navigation", ItemKind::Skill)
            })
            .with_item(ItemRecord::new(2u32, ItemKind::Module));
        let (fit, report) = composition
            .rehydrate(&catalog, StackingPolicy::default())
            .unwrap();
        assert_eq!(report.loaded, 1);
        assert_eq!(report.dropped.len(), 3);
        assert_eq!(fit.items().len(), 1);
    }

    #[test]
    fn unknown_hull_fails_the_load() {
        let catalog = catalog();
        let composition = FitComposition::new("Nothing", "Thorax");
        assert!(matches!(
            composition.rehydrate(&catalog, StackingPolicy::default()),
            Err(Error::UnknownItem { .. })
        ));
    }

    #[test]
    fn json_layout_accepts_ids_and_names() {
        let json = r#"{
            "name": "Kite",
            "hull": 1,
            "items": [
                { "item": "Overdrive Injector", "kind": "module", "running": true },
                { "item": 3, "kind": "skill", "level": 5 }
            ]
        }"#;
        let composition: FitComposition = serde_json::from_str(json).unwrap();
        assert_eq!(composition.hull, ItemIdentity::Id(1));
        assert!(composition.items[0].active);
        assert_eq!(composition.items[1].level, Some(5));
        assert!(composition.projected.is_empty());
    }

    #[test]
    fn system_effect_survives_capture_and_rehydrate() {
        let catalog = catalog();
        let composition = FitComposition::new("Magnetar", "Rifter")
            .with_system_effect("Magnetar Effect Beacon Class 2");
        let (fit, report) = composition
            .rehydrate(&catalog, StackingPolicy::default())
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.loaded, 1);
        assert_eq!(fit.system_effect().unwrap().definition().id, 4);

        let captured = FitComposition::capture(&fit);
        assert_eq!(captured.system_effect, Some(ItemIdentity::Id(4)));
        let json = serde_json::to_string(&captured).unwrap();
        let reloaded: FitComposition = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded, captured);
    }

    #[test]
    fn unusable_system_effect_is_dropped() {
        let catalog = catalog();
        let composition = FitComposition::new("Wrong beacon", "Rifter").with_system_effect(2u32);
        let (fit, report) = composition
            .rehydrate(&catalog, StackingPolicy::default())
            .unwrap();
        assert!(fit.system_effect().is_none());
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].item, "2");

        let json = serde_json::to_string(&FitComposition::new("Plain", 1u32)).unwrap();
        assert!(!json.contains("system_effect"));
    }
}
