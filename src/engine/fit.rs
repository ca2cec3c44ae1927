//! Fit aggregator: owns the hull and every fitted item, derives modifier
//! entries from currently active effects, and keeps each store's cache
//! consistent with fit composition.
//!
//! Mutations mark the (target, attribute) pairs reachable through the changed
//! item's effects dirty and evict them. The next read of a dirty pair gathers
//! entries from every item in the fit, not only the one that changed, so a
//! value is always reproducible from composition plus catalog.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use crate::config::StackingPolicy;
use crate::data::catalog::Catalog;
use crate::data::effect::{
    ApplicabilityContext, EffectDefinition, EffectTarget, RuntimePhase, ValueScaling, ValueSource,
};
use crate::data::item::{ItemDefinition, ItemKind};
use crate::engine::fitted::{AttrKey, FittedItem, Hull, ItemId, ItemKey, SystemEffect};
use crate::engine::stacking::ModifierEntry;
use crate::engine::store::ModifiedAttributeStore;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Clean,
    Dirty,
    Recomputing,
}

/// Outcome of an eager [Fit::recompute] pass.
#[derive(Debug, Default)]
pub struct RecomputeSummary {
    pub recomputed: usize,
    pub failed: Vec<(AttrKey, Error)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Hull,
    System,
    Local(usize),
    Projected(usize),
}

/// An effect that will contribute one entry once its value is known.
struct PendingModifier {
    effect: Arc<EffectDefinition>,
    source: ItemKey,
    level: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct Fit {
    id: Uuid,
    name: String,
    catalog: Arc<Catalog>,
    policy: StackingPolicy,
    hull: Hull,
    system: Option<SystemEffect>,
    items: Vec<FittedItem>,
    projected: Vec<FittedItem>,
    dirty: BTreeSet<AttrKey>,
    dependents: HashMap<AttrKey, HashSet<AttrKey>>,
    state: PassState,
}

impl Fit {
    pub fn new(catalog: Arc<Catalog>, hull: Arc<ItemDefinition>) -> Result<Self> {
        let hull = Hull::new(hull)?;
        Ok(Self {
            id: Uuid::new_v4(),
            name: String::new(),
            catalog,
            policy: StackingPolicy::default(),
            hull,
            system: None,
            items: Vec::new(),
            projected: Vec::new(),
            dirty: BTreeSet::new(),
            dependents: HashMap::new(),
            state: PassState::Clean,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_policy(mut self, policy: StackingPolicy) -> Self {
        self.set_policy(policy);
        self
    }

    pub fn set_policy(&mut self, policy: StackingPolicy) {
        if self.policy == policy {
            return;
        }
        self.policy = policy;
        self.clear_caches();
        self.hull.store.set_policy(policy);
        if let Some(system) = self.system.as_mut() {
            system.store.set_policy(policy);
        }
        for item in self.items.iter_mut().chain(self.projected.iter_mut()) {
            item.store.set_policy(policy);
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn policy(&self) -> &StackingPolicy {
        &self.policy
    }

    pub fn hull(&self) -> &Hull {
        &self.hull
    }

    pub fn system_effect(&self) -> Option<&SystemEffect> {
        self.system.as_ref()
    }

    pub fn items(&self) -> &[FittedItem] {
        &self.items
    }

    pub fn projected(&self) -> &[FittedItem] {
        &self.projected
    }

    pub fn item(&self, id: ItemId) -> Option<&FittedItem> {
        self.items
            .iter()
            .chain(self.projected.iter())
            .find(|item| item.id() == id)
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn dirty_pairs(&self) -> impl Iterator<Item = &AttrKey> {
        self.dirty.iter()
    }

    pub fn is_dirty(&self, key: &AttrKey) -> bool {
        self.dirty.contains(key)
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Modified value of `name` on `target`, recomputing it if it is not cached.
    pub fn attribute(&mut self, target: ItemKey, name: &str) -> Result<f64> {
        let key = AttrKey::new(target, name);
        let mut visiting = Vec::new();
        let result = self.resolve_key(&key, &mut visiting);
        self.settle_state();
        result
    }

    pub fn ship_attribute(&mut self, name: &str) -> Result<f64> {
        self.attribute(ItemKey::Ship, name)
    }

    pub fn item_attribute(&mut self, id: ItemId, name: &str) -> Result<f64> {
        self.attribute(ItemKey::Item(id), name)
    }

    /// Base value of `name` on `target` before any modifier.
    pub fn base_attribute(&self, target: ItemKey, name: &str) -> Result<f64> {
        self.store(target)?
            .base_value(name, self.catalog.attributes())
    }

    /// Entries currently feeding `name` on `target`, resolving it first.
    pub fn modifiers(&mut self, target: ItemKey, name: &str) -> Result<Vec<ModifierEntry>> {
        self.attribute(target, name)?;
        Ok(self.store(target)?.modifiers(name).to_vec())
    }

    /// Eagerly resolve every dirty pair. Pairs that fail are reported and dropped from the dirty set.
    pub fn recompute(&mut self) -> RecomputeSummary {
        let mut summary = RecomputeSummary::default();
        let pending: Vec<AttrKey> = self.dirty.iter().cloned().collect();
        for key in pending {
            if !self.dirty.contains(&key) {
                continue;
            }
            let mut visiting = Vec::new();
            match self.resolve_key(&key, &mut visiting) {
                Ok(_) => summary.recomputed += 1,
                Err(err) => {
                    tracing::warn!(pair = %key, error = %err, "recompute.failed");
                    self.dirty.remove(&key);
                    summary.failed.push((key, err));
                }
            }
        }
        self.settle_state();
        summary
    }

    fn settle_state(&mut self) {
        self.state = if self.dirty.is_empty() {
            PassState::Clean
        } else {
            PassState::Dirty
        };
    }

    fn resolve_key(&mut self, key: &AttrKey, visiting: &mut Vec<AttrKey>) -> Result<f64> {
        if let Some(value) = self.store(key.item)?.cached(&key.attribute) {
            return Ok(value);
        }
        if visiting.contains(key) {
            return Err(Error::CyclicDependency {
                attribute: key.to_string(),
            });
        }
        self.state = PassState::Recomputing;
        visiting.push(key.clone());
        let result = self.recompute_key(key, visiting);
        visiting.pop();
        result
    }

    fn recompute_key(&mut self, key: &AttrKey, visiting: &mut Vec<AttrKey>) -> Result<f64> {
        let pending = self.gather(key)?;
        let mut entries = Vec::with_capacity(pending.len());
        for modifier in pending {
            let raw = match &modifier.effect.value {
                ValueSource::Literal(value) => *value,
                ValueSource::Attribute(name) => {
                    let source_key = AttrKey::new(modifier.source, name.as_str());
                    let value = self.resolve_key(&source_key, visiting)?;
                    self.dependents
                        .entry(source_key)
                        .or_default()
                        .insert(key.clone());
                    value
                }
            };
            let value = match modifier.effect.scaling {
                ValueScaling::None => raw,
                ValueScaling::SkillLevel => raw * f64::from(modifier.level.unwrap_or(1)),
            };
            entries.push(ModifierEntry {
                effect: modifier.effect.name.clone(),
                source: modifier.source,
                operation: modifier.effect.operation,
                stacking_group: modifier.effect.stacking_group.clone(),
                value,
            });
        }

        tracing::debug!(pair = %key, modifiers = entries.len(), "recompute.pair");
        let catalog = Arc::clone(&self.catalog);
        let store = self.store_mut(key.item)?;
        store.set_modifiers(&key.attribute, entries);
        let value = store.get(&key.attribute, catalog.attributes())?;
        self.dirty.remove(key);
        Ok(value)
    }

    /// Every currently active effect landing on `key`, from every source in the fit.
    fn gather(&self, key: &AttrKey) -> Result<Vec<PendingModifier>> {
        let target_definition = self.definition(key.item)?;
        let ship = self.hull.definition();
        let mut pending = Vec::new();

        for origin in self.origins() {
            let (source_key, source_definition, level) = match origin {
                Origin::Hull => (ItemKey::Ship, ship, None),
                Origin::System => match &self.system {
                    Some(system) => (ItemKey::System, system.definition(), None),
                    None => continue,
                },
                Origin::Local(index) => {
                    let item = &self.items[index];
                    (item.key(), item.definition(), item.level())
                }
                Origin::Projected(index) => {
                    let item = &self.projected[index];
                    (item.key(), item.definition(), item.level())
                }
            };
            let ctx = ApplicabilityContext {
                source: source_definition,
                target: target_definition,
                ship,
            };
            let effects = self.catalog.effects().applicable_effects(
                source_definition,
                &key.attribute,
                &ctx,
                |phase| self.phase_applies(origin, phase),
            )?;
            for effect in effects {
                if !self.targets(source_key, &effect.target).contains(&key.item) {
                    continue;
                }
                pending.push(PendingModifier {
                    effect,
                    source: source_key,
                    level,
                });
            }
        }
        Ok(pending)
    }

    fn origins(&self) -> impl Iterator<Item = Origin> {
        std::iter::once(Origin::Hull)
            .chain(self.system.as_ref().map(|_| Origin::System))
            .chain((0..self.items.len()).map(Origin::Local))
            .chain((0..self.projected.len()).map(Origin::Projected))
    }

    /// Local recomputation takes passive/active effects; projected sources only their projected ones.
    fn phase_applies(&self, origin: Origin, phase: RuntimePhase) -> bool {
        match origin {
            Origin::Hull | Origin::System => phase != RuntimePhase::Projected,
            Origin::Local(index) => {
                let item = &self.items[index];
                match phase {
                    RuntimePhase::Passive => item.is_active(),
                    RuntimePhase::Active => item.is_active() && item.is_running(),
                    RuntimePhase::Projected => false,
                }
            }
            Origin::Projected(index) => {
                let item = &self.projected[index];
                phase == RuntimePhase::Projected
                    && item.is_active()
                    && item.kind() != ItemKind::Implant
            }
        }
    }

    /// Projected sources see the receiving fit, so `Fitted` always means local items.
    fn targets(&self, source: ItemKey, target: &EffectTarget) -> Vec<ItemKey> {
        match target {
            EffectTarget::Itself => vec![source],
            EffectTarget::Ship => vec![ItemKey::Ship],
            EffectTarget::Fitted { item_kind } => self
                .items
                .iter()
                .filter(|item| item_kind.map_or(true, |kind| item.kind() == kind))
                .map(FittedItem::key)
                .collect(),
        }
    }

    fn definition(&self, key: ItemKey) -> Result<&Arc<ItemDefinition>> {
        match key {
            ItemKey::Ship => Ok(self.hull.definition()),
            ItemKey::System => self
                .system
                .as_ref()
                .map(SystemEffect::definition)
                .ok_or_else(no_system_effect),
            ItemKey::Item(id) => self
                .item(id)
                .map(FittedItem::definition)
                .ok_or_else(|| unknown_fitted(id)),
        }
    }

    fn store(&self, key: ItemKey) -> Result<&ModifiedAttributeStore> {
        match key {
            ItemKey::Ship => Ok(&self.hull.store),
            ItemKey::System => self
                .system
                .as_ref()
                .map(|system| &system.store)
                .ok_or_else(no_system_effect),
            ItemKey::Item(id) => self
                .item(id)
                .map(|item| &item.store)
                .ok_or_else(|| unknown_fitted(id)),
        }
    }

    fn store_mut(&mut self, key: ItemKey) -> Result<&mut ModifiedAttributeStore> {
        match key {
            ItemKey::Ship => Ok(&mut self.hull.store),
            ItemKey::System => self
                .system
                .as_mut()
                .map(|system| &mut system.store)
                .ok_or_else(no_system_effect),
            ItemKey::Item(id) => self
                .items
                .iter_mut()
                .chain(self.projected.iter_mut())
                .find(|item| item.id() == id)
                .map(|item| &mut item.store)
                .ok_or_else(|| unknown_fitted(id)),
        }
    }

    fn item_mut(&mut self, id: ItemId) -> Result<&mut FittedItem> {
        self.items
            .iter_mut()
            .chain(self.projected.iter_mut())
            .find(|item| item.id() == id)
            .ok_or_else(|| unknown_fitted(id))
    }

    fn origin_of(&self, id: ItemId) -> Result<Origin> {
        if let Some(index) = self.items.iter().position(|item| item.id() == id) {
            return Ok(Origin::Local(index));
        }
        self.projected
            .iter()
            .position(|item| item.id() == id)
            .map(Origin::Projected)
            .ok_or_else(|| unknown_fitted(id))
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    pub fn add_item(&mut self, mut item: FittedItem) -> Result<ItemId> {
        self.catalog.effects().effects_for(item.definition())?;
        item.store.set_policy(self.policy);
        let id = item.id();
        self.items.push(item);
        self.invalidate_effects_of(ItemKey::Item(id))?;
        tracing::debug!(item = %id, "fit.add_item");
        Ok(id)
    }

    pub fn remove_item(&mut self, id: ItemId) -> Result<FittedItem> {
        let Origin::Local(index) = self.origin_of(id)? else {
            return Err(unknown_fitted(id));
        };
        self.invalidate_effects_of(ItemKey::Item(id))?;
        self.forget_item(ItemKey::Item(id));
        let item = self.items.remove(index);
        tracing::debug!(item = %id, "fit.remove_item");
        Ok(item)
    }

    /// Attach an item from another party; only its projected effects apply here.
    pub fn project(&mut self, mut item: FittedItem) -> Result<ItemId> {
        self.catalog.effects().effects_for(item.definition())?;
        item.store.set_policy(self.policy);
        let id = item.id();
        self.projected.push(item);
        self.invalidate_effects_of(ItemKey::Item(id))?;
        tracing::debug!(item = %id, "fit.project");
        Ok(id)
    }

    pub fn remove_projected(&mut self, id: ItemId) -> Result<FittedItem> {
        let Origin::Projected(index) = self.origin_of(id)? else {
            return Err(unknown_fitted(id));
        };
        self.invalidate_effects_of(ItemKey::Item(id))?;
        self.forget_item(ItemKey::Item(id));
        Ok(self.projected.remove(index))
    }

    pub fn set_active(&mut self, id: ItemId, active: bool) -> Result<()> {
        let item = self.item_mut(id)?;
        if item.is_active() == active {
            return Ok(());
        }
        item.set_active(active);
        self.invalidate_effects_of(ItemKey::Item(id))
    }

    pub fn toggle_active(&mut self, id: ItemId) -> Result<bool> {
        let active = !self.item_mut(id)?.is_active();
        self.set_active(id, active)?;
        Ok(active)
    }

    pub fn set_running(&mut self, id: ItemId, running: bool) -> Result<()> {
        let item = self.item_mut(id)?;
        if item.is_running() == running {
            return Ok(());
        }
        item.set_running(running);
        self.invalidate_effects_of(ItemKey::Item(id))
    }

    pub fn set_skill_level(&mut self, id: ItemId, level: u8) -> Result<()> {
        let item = self.item_mut(id)?;
        if item.level() == Some(level) {
            return Ok(());
        }
        item.set_level(level)?;
        self.invalidate_effects_of(ItemKey::Item(id))
    }

    /// Place the fit in a system whose beacon applies its effects to the ship and
    /// local items, or take it out of any system with `None`.
    pub fn set_system_effect(&mut self, beacon: Option<Arc<ItemDefinition>>) -> Result<()> {
        let incoming = match beacon {
            Some(definition) => {
                self.catalog.effects().effects_for(&definition)?;
                let mut system = SystemEffect::new(definition)?;
                system.store.set_policy(self.policy);
                Some(system)
            }
            None => None,
        };
        if self.system.is_some() {
            self.invalidate_effects_of(ItemKey::System)?;
            self.forget_item(ItemKey::System);
        }
        self.system = incoming;
        if self.system.is_some() {
            self.invalidate_effects_of(ItemKey::System)?;
        }
        tracing::debug!(
            beacon = self.system.as_ref().map(|system| system.definition().name.as_str()),
            "fit.set_system_effect"
        );
        Ok(())
    }

    /// Swap the hull. Every store changes identity, so every cache is evicted.
    pub fn set_hull(&mut self, hull: Arc<ItemDefinition>) -> Result<()> {
        let mut hull = Hull::new(hull)?;
        hull.store.set_policy(self.policy);
        let cached = self.cached_pairs();
        self.hull = hull;
        if let Some(system) = self.system.as_mut() {
            system.store.clear();
        }
        for item in self.items.iter_mut().chain(self.projected.iter_mut()) {
            item.store.clear();
        }
        self.dependents.clear();
        self.dirty.extend(cached);
        self.settle_state();
        Ok(())
    }

    pub fn apply_override(&mut self, target: ItemKey, name: &str, value: f64) -> Result<()> {
        self.catalog.attributes().get(name)?;
        self.store_mut(target)?.apply_override(name, value);
        self.invalidate_pair(AttrKey::new(target, name));
        Ok(())
    }

    pub fn remove_override(&mut self, target: ItemKey, name: &str) -> Result<Option<f64>> {
        let removed = self.store_mut(target)?.remove_override(name);
        self.invalidate_pair(AttrKey::new(target, name));
        Ok(removed)
    }

    /// Evict every cached value; the next reads recompute from scratch.
    pub fn clear_caches(&mut self) {
        let cached = self.cached_pairs();
        self.hull.store.clear();
        if let Some(system) = self.system.as_mut() {
            system.store.clear();
        }
        for item in self.items.iter_mut().chain(self.projected.iter_mut()) {
            item.store.clear();
        }
        self.dependents.clear();
        self.dirty.extend(cached);
        self.settle_state();
    }

    fn cached_pairs(&self) -> Vec<AttrKey> {
        let hull = self
            .hull
            .store
            .cached_names()
            .map(|name| AttrKey::new(ItemKey::Ship, name));
        let system = self.system.iter().flat_map(|system| {
            system
                .store
                .cached_names()
                .map(|name| AttrKey::new(ItemKey::System, name))
        });
        let items = self
            .items
            .iter()
            .chain(self.projected.iter())
            .flat_map(|item| {
                item.store
                    .cached_names()
                    .map(move |name| AttrKey::new(item.key(), name))
            });
        hull.chain(system).chain(items).collect()
    }

    /// Mark dirty every pair the source's effects can reach under the current composition.
    fn invalidate_effects_of(&mut self, source: ItemKey) -> Result<()> {
        let definition = Arc::clone(self.definition(source)?);
        let mut reached = Vec::new();
        for effect in self.catalog.effects().effects_for(&definition)? {
            for target in self.targets(source, &effect.target) {
                reached.push(AttrKey::new(target, effect.target_attribute.as_str()));
            }
        }
        tracing::debug!(item = %source, pairs = reached.len(), "fit.invalidate");
        for key in reached {
            self.invalidate_pair(key);
        }
        self.settle_state();
        Ok(())
    }

    /// Evict one pair and, transitively, every pair computed from it.
    fn invalidate_pair(&mut self, key: AttrKey) {
        let mut queue = vec![key];
        let mut seen = HashSet::new();
        while let Some(key) = queue.pop() {
            if !seen.insert(key.clone()) {
                continue;
            }
            if let Ok(store) = self.store_mut(key.item) {
                store.invalidate(&key.attribute);
                self.dirty.insert(key.clone());
            }
            if let Some(dependents) = self.dependents.remove(&key) {
                queue.extend(dependents);
            }
        }
        self.settle_state();
    }

    /// Drop bookkeeping for a source about to leave the fit, invalidating pairs computed from it.
    fn forget_item(&mut self, source: ItemKey) {
        let owned: Vec<AttrKey> = self
            .dependents
            .keys()
            .filter(|key| key.item == source)
            .cloned()
            .collect();
        for key in owned {
            self.invalidate_pair(key);
        }
        self.dirty.retain(|key| key.item != source);
        for dependents in self.dependents.values_mut() {
            dependents.retain(|key| key.item != source);
        }
        self.settle_state();
    }
}

fn unknown_fitted(id: ItemId) -> Error {
    Error::UnknownFittedItem { id: id.to_string() }
}

fn no_system_effect() -> Error {
    Error::UnknownFittedItem {
        id: ItemKey::System.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::attribute::AttributeDefinition;
    use crate::data::catalog::CatalogFile;
    use crate::data::effect::{Condition, Operation};
    use crate::data::item::{
        CATEGORY_CELESTIAL, CATEGORY_MODULE, CATEGORY_SHIP, CATEGORY_SKILL, SYSTEM_EFFECT_GROUP,
    };
    use crate::engine::stacking::penalty_multiplier;

    fn approx_eq(a: f64, b: f64) {
        assert!((a - b).abs() <= 1e-9, "expected {b}, got {a}");
    }

    fn catalog() -> Arc<Catalog> {
        let file = CatalogFile {
            attributes: vec![
                AttributeDefinition::new("scanResolution", Some(0.0)),
                AttributeDefinition::new("scanResolutionBonus", Some(0.0)),
                AttributeDefinition::new("maxVelocity", None),
                AttributeDefinition::new("speedFactor", Some(0.0)),
                AttributeDefinition::new("speedFactorBonus", Some(0.0)),
                AttributeDefinition::new("loopA", Some(1.0)),
                AttributeDefinition::new("loopB", Some(1.0)),
                AttributeDefinition::new("scanResolutionMultiplier", Some(1.0)),
            ],
            effects: vec![
                EffectDefinition::new(
                    "scanResolutionBonus",
                    "scanResolution",
                    Operation::PostPercent,
                    RuntimePhase::Passive,
                    EffectTarget::Ship,
                    ValueSource::Attribute("scanResolutionBonus".to_string()),
                )
                .stacking_group("sensor"),
                EffectDefinition::new(
                    "remoteScanResolutionBonus",
                    "scanResolution",
                    Operation::PostPercent,
                    RuntimePhase::Projected,
                    EffectTarget::Ship,
                    ValueSource::Attribute("scanResolutionBonus".to_string()),
                )
                .stacking_group("sensor"),
                EffectDefinition::new(
                    "speedBoost",
                    "maxVelocity",
                    Operation::PostPercent,
                    RuntimePhase::Active,
                    EffectTarget::Ship,
                    ValueSource::Attribute("speedFactor".to_string()),
                ),
                EffectDefinition::new(
                    "accelerationControl",
                    "speedFactor",
                    Operation::PostPercent,
                    RuntimePhase::Passive,
                    EffectTarget::Fitted {
                        item_kind: Some(ItemKind::Module),
                    },
                    ValueSource::Attribute("speedFactorBonus".to_string()),
                )
                .scaling(ValueScaling::SkillLevel)
                .when(Condition::TargetHasAttribute {
                    attribute: "speedFactor".to_string(),
                }),
                EffectDefinition::new(
                    "loopForward",
                    "loopA",
                    Operation::PostMultiply,
                    RuntimePhase::Passive,
                    EffectTarget::Itself,
                    ValueSource::Attribute("loopB".to_string()),
                ),
                EffectDefinition::new(
                    "loopBackward",
                    "loopB",
                    Operation::PostMultiply,
                    RuntimePhase::Passive,
                    EffectTarget::Itself,
                    ValueSource::Attribute("loopA".to_string()),
                ),
                EffectDefinition::new(
                    "systemScanResolution",
                    "scanResolution",
                    Operation::PostMultiply,
                    RuntimePhase::Passive,
                    EffectTarget::Ship,
                    ValueSource::Attribute("scanResolutionMultiplier".to_string()),
                ),
                EffectDefinition::new(
                    "systemSpeedFactor",
                    "speedFactor",
                    Operation::PostPercent,
                    RuntimePhase::Passive,
                    EffectTarget::Fitted {
                        item_kind: Some(ItemKind::Module),
                    },
                    ValueSource::Literal(50.0),
                )
                .when(Condition::TargetHasAttribute {
                    attribute: "speedFactor".to_string(),
                }),
            ],
            items: vec![
                ItemDefinition::new(1, "Rifter", "Frigate", CATEGORY_SHIP)
                    .with_attribute("scanResolution", 500.0)
                    .with_attribute("maxVelocity", 355.0),
                ItemDefinition::new(2, "Sensor Booster II", "Sensor Booster", CATEGORY_MODULE)
                    .with_attribute("scanResolutionBonus", 10.0)
                    .with_effect("scanResolutionBonus"),
                ItemDefinition::new(3, "Sensor Booster I", "Sensor Booster", CATEGORY_MODULE)
                    .with_attribute("scanResolutionBonus", 8.0)
                    .with_effect("scanResolutionBonus"),
                ItemDefinition::new(4, "1MN Afterburner I", "Propulsion Module", CATEGORY_MODULE)
                    .with_attribute("speedFactor", 100.0)
                    .with_effect("speedBoost"),
                ItemDefinition::new(5, "Acceleration Control", "Navigation", CATEGORY_SKILL)
                    .with_attribute("speedFactorBonus", 5.0)
                    .with_effect("accelerationControl"),
                ItemDefinition::new(6, "Remote Sensor Booster I", "Remote Sensor Booster", CATEGORY_MODULE)
                    .with_attribute("scanResolutionBonus", 20.0)
                    .with_effect("remoteScanResolutionBonus"),
                ItemDefinition::new(7, "Feedback Loop", "Prototype", CATEGORY_MODULE)
                    .with_effect("loopForward")
                    .with_effect("loopBackward"),
                ItemDefinition::new(8, "Test Effect Beacon", SYSTEM_EFFECT_GROUP, CATEGORY_CELESTIAL)
                    .with_attribute("scanResolutionMultiplier", 0.5)
                    .with_effect("systemScanResolution")
                    .with_effect("systemSpeedFactor"),
            ],
            ..CatalogFile::default()
        };
        Arc::new(Catalog::build(file).unwrap())
    }

    fn fit(catalog: &Arc<Catalog>) -> Fit {
        Fit::new(Arc::clone(catalog), Arc::clone(catalog.item("Rifter").unwrap())).unwrap()
    }

    fn module(catalog: &Catalog, name: &str) -> FittedItem {
        FittedItem::module(Arc::clone(catalog.item(name).unwrap())).unwrap()
    }

    #[test]
    fn hull_without_items_reports_base_values() {
        let catalog = catalog();
        let mut fit = fit(&catalog);
        assert_eq!(fit.ship_attribute("scanResolution").unwrap(), 500.0);
        assert_eq!(fit.state(), PassState::Clean);
    }

    #[test]
    fn toggling_a_booster_recomputes_the_chain() {
        let catalog = catalog();
        let mut fit = fit(&catalog);
        let strong = fit.add_item(module(&catalog, "Sensor Booster II")).unwrap();
        fit.add_item(module(&catalog, "Sensor Booster I")).unwrap();

        let both = 500.0 * 1.10 * (1.0 + 0.08 * penalty_multiplier(1, 2.4));
        approx_eq(fit.ship_attribute("scanResolution").unwrap(), both);

        fit.set_active(strong, false).unwrap();
        assert!(fit.is_dirty(&AttrKey::new(ItemKey::Ship, "scanResolution")));
        assert_eq!(fit.state(), PassState::Dirty);
        approx_eq(fit.ship_attribute("scanResolution").unwrap(), 500.0 * 1.08);

        fit.set_active(strong, true).unwrap();
        approx_eq(fit.ship_attribute("scanResolution").unwrap(), both);
    }

    #[test]
    fn active_effects_need_the_running_flag() {
        let catalog = catalog();
        let mut fit = fit(&catalog);
        let ab = fit.add_item(module(&catalog, "1MN Afterburner I")).unwrap();
        assert_eq!(fit.ship_attribute("maxVelocity").unwrap(), 355.0);
        fit.set_running(ab, true).unwrap();
        approx_eq(fit.ship_attribute("maxVelocity").unwrap(), 710.0);
    }

    #[test]
    fn skill_level_change_propagates_through_module_attribute() {
        let catalog = catalog();
        let mut fit = fit(&catalog);
        let ab = fit
            .add_item(module(&catalog, "1MN Afterburner I").with_running(true))
            .unwrap();
        let skill = FittedItem::skill(Arc::clone(catalog.item("Acceleration Control").unwrap()), 0).unwrap();
        let skill = fit.add_item(skill).unwrap();

        approx_eq(fit.ship_attribute("maxVelocity").unwrap(), 710.0);

        fit.set_skill_level(skill, 5).unwrap();
        // speedFactor 100 * 1.25 = 125% on the ship.
        approx_eq(fit.item_attribute(ab, "speedFactor").unwrap(), 125.0);
        approx_eq(fit.ship_attribute("maxVelocity").unwrap(), 355.0 * 2.25);
    }

    #[test]
    fn dependent_pair_is_invalidated_transitively() {
        let catalog = catalog();
        let mut fit = fit(&catalog);
        let ab = fit
            .add_item(module(&catalog, "1MN Afterburner I").with_running(true))
            .unwrap();
        fit.ship_attribute("maxVelocity").unwrap();

        fit.apply_override(ItemKey::Item(ab), "speedFactor", 50.0).unwrap();
        assert!(fit.is_dirty(&AttrKey::new(ItemKey::Ship, "maxVelocity")));
        approx_eq(fit.ship_attribute("maxVelocity").unwrap(), 355.0 * 1.5);

        fit.remove_override(ItemKey::Item(ab), "speedFactor").unwrap();
        approx_eq(fit.ship_attribute("maxVelocity").unwrap(), 710.0);
    }

    #[test]
    fn projected_items_apply_only_projected_effects() {
        let catalog = catalog();
        let mut fit = fit(&catalog);
        // A local remote booster does nothing to its own ship.
        fit.add_item(module(&catalog, "Remote Sensor Booster I")).unwrap();
        assert_eq!(fit.ship_attribute("scanResolution").unwrap(), 500.0);

        let remote = fit.project(module(&catalog, "Remote Sensor Booster I")).unwrap();
        approx_eq(fit.ship_attribute("scanResolution").unwrap(), 600.0);

        // A projected local-only module contributes nothing.
        fit.project(module(&catalog, "Sensor Booster II")).unwrap();
        approx_eq(fit.ship_attribute("scanResolution").unwrap(), 600.0);

        fit.remove_projected(remote).unwrap();
        assert_eq!(fit.ship_attribute("scanResolution").unwrap(), 500.0);
    }

    #[test]
    fn removing_an_item_restores_values() {
        let catalog = catalog();
        let mut fit = fit(&catalog);
        let booster = fit.add_item(module(&catalog, "Sensor Booster II")).unwrap();
        approx_eq(fit.ship_attribute("scanResolution").unwrap(), 550.0);
        fit.remove_item(booster).unwrap();
        assert_eq!(fit.ship_attribute("scanResolution").unwrap(), 500.0);
        assert!(matches!(
            fit.remove_item(booster),
            Err(Error::UnknownFittedItem { .. })
        ));
    }

    #[test]
    fn cyclic_attribute_reads_are_reported() {
        let catalog = catalog();
        let mut fit = fit(&catalog);
        let looped = fit.add_item(module(&catalog, "Feedback Loop")).unwrap();
        assert!(matches!(
            fit.item_attribute(looped, "loopA"),
            Err(Error::CyclicDependency { .. })
        ));
    }

    #[test]
    fn eager_recompute_clears_dirty_pairs() {
        let catalog = catalog();
        let mut fit = fit(&catalog);
        fit.ship_attribute("scanResolution").unwrap();
        fit.add_item(module(&catalog, "Sensor Booster II")).unwrap();
        assert_eq!(fit.state(), PassState::Dirty);

        let summary = fit.recompute();
        assert_eq!(summary.recomputed, 1);
        assert!(summary.failed.is_empty());
        assert_eq!(fit.state(), PassState::Clean);
        approx_eq(fit.hull().store().cached("scanResolution").unwrap(), 550.0);
    }

    #[test]
    fn set_hull_evicts_every_cache() {
        let catalog = catalog();
        let mut fit = fit(&catalog);
        let booster = fit.add_item(module(&catalog, "Sensor Booster II")).unwrap();
        fit.item_attribute(booster, "scanResolutionBonus").unwrap();
        fit.ship_attribute("scanResolution").unwrap();

        let rifter = Arc::clone(catalog.item("Rifter").unwrap());
        fit.set_hull(rifter).unwrap();
        assert!(!fit.hull().store().is_cached("scanResolution"));
        assert!(!fit.item(booster).unwrap().store().is_cached("scanResolutionBonus"));
        approx_eq(fit.ship_attribute("scanResolution").unwrap(), 550.0);

        let not_a_ship = Arc::clone(catalog.item("Sensor Booster I").unwrap());
        assert!(matches!(
            fit.set_hull(not_a_ship),
            Err(Error::InvalidItemCategory { .. })
        ));
    }

    #[test]
    fn policy_change_evicts_cached_values() {
        let catalog = catalog();
        let mut fit = fit(&catalog);
        fit.add_item(module(&catalog, "Sensor Booster II")).unwrap();
        fit.add_item(module(&catalog, "Sensor Booster I")).unwrap();
        fit.ship_attribute("scanResolution").unwrap();

        fit.set_policy(StackingPolicy {
            max_penalized: Some(1),
            ..StackingPolicy::default()
        });
        approx_eq(fit.ship_attribute("scanResolution").unwrap(), 550.0);
    }

    #[test]
    fn system_effect_reaches_ship_and_local_items() {
        let catalog = catalog();
        let mut fit = fit(&catalog);
        let ab = fit
            .add_item(module(&catalog, "1MN Afterburner I").with_running(true))
            .unwrap();
        approx_eq(fit.ship_attribute("maxVelocity").unwrap(), 710.0);
        approx_eq(fit.ship_attribute("scanResolution").unwrap(), 500.0);

        let beacon = Arc::clone(catalog.item("Test Effect Beacon").unwrap());
        fit.set_system_effect(Some(beacon)).unwrap();
        assert!(fit.is_dirty(&AttrKey::new(ItemKey::Ship, "maxVelocity")));
        approx_eq(fit.ship_attribute("scanResolution").unwrap(), 250.0);
        approx_eq(fit.item_attribute(ab, "speedFactor").unwrap(), 150.0);
        approx_eq(fit.ship_attribute("maxVelocity").unwrap(), 355.0 * 2.5);
        approx_eq(
            fit.attribute(ItemKey::System, "scanResolutionMultiplier").unwrap(),
            0.5,
        );

        fit.set_system_effect(None).unwrap();
        assert!(fit.system_effect().is_none());
        approx_eq(fit.ship_attribute("maxVelocity").unwrap(), 710.0);
        approx_eq(fit.ship_attribute("scanResolution").unwrap(), 500.0);
        assert!(matches!(
            fit.attribute(ItemKey::System, "scanResolutionMultiplier"),
            Err(Error::UnknownFittedItem { .. })
        ));
    }

    #[test]
    fn only_beacons_can_be_system_effects() {
        let catalog = catalog();
        let mut fit = fit(&catalog);
        let beacon = Arc::clone(catalog.item("Test Effect Beacon").unwrap());
        fit.set_system_effect(Some(beacon)).unwrap();

        let booster = Arc::clone(catalog.item("Sensor Booster II").unwrap());
        assert!(matches!(
            fit.set_system_effect(Some(booster)),
            Err(Error::InvalidItemCategory { .. })
        ));
        assert_eq!(
            fit.system_effect().unwrap().definition().name,
            "Test Effect Beacon"
        );
        approx_eq(fit.ship_attribute("scanResolution").unwrap(), 250.0);
    }
}
