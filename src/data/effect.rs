//! Effect definitions: typed operations on one target attribute, gated by a
//! runtime phase and a data-driven applicability predicate.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::data::item::{ItemDefinition, ItemKind};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Assign,
    PreAdd,
    PreMultiply,
    #[serde(alias = "PreAssignPercent")]
    PrePercent,
    PostAdd,
    PostMultiply,
    PostPercent,
}

/// Where in the combination order an operation lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Pre,
    Post,
}

impl Operation {
    pub const fn is_additive(self) -> bool {
        matches!(self, Self::PreAdd | Self::PostAdd)
    }

    pub const fn stage(self) -> Option<Stage> {
        match self {
            Self::Assign => None,
            Self::PreAdd | Self::PreMultiply | Self::PrePercent => Some(Stage::Pre),
            Self::PostAdd | Self::PostMultiply | Self::PostPercent => Some(Stage::Post),
        }
    }

    /// Multiplicative factor for a raw value: percentages become `1 + v/100`.
    pub fn factor(self, value: f64) -> f64 {
        match self {
            Self::PrePercent | Self::PostPercent => 1.0 + value / 100.0,
            _ => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuntimePhase {
    /// Applies continuously while the source is fitted and active.
    Passive,
    /// Applies only while the source is running.
    Active,
    /// Applies only when the source is projected onto another fit.
    Projected,
}

/// Which items an effect lands on, relative to its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffectTarget {
    Itself,
    Ship,
    Fitted {
        #[serde(default)]
        item_kind: Option<ItemKind>,
    },
}

/// A number is a literal; a string names an attribute of the source item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueSource {
    Literal(f64),
    /// Read from the source item's modified attribute.
    Attribute(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueScaling {
    #[default]
    None,
    SkillLevel,
}

/// One clause of an applicability predicate. All clauses of an effect must hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    TargetGroup { group: String },
    TargetCategory { category: String },
    TargetRequiresSkill { skill: String },
    ShipGroup { group: String },
    TargetHasAttribute { attribute: String },
}

/// The (source, target, fit) triple an applicability predicate is evaluated over.
#[derive(Debug, Clone, Copy)]
pub struct ApplicabilityContext<'a> {
    pub source: &'a ItemDefinition,
    pub target: &'a ItemDefinition,
    pub ship: &'a ItemDefinition,
}

impl Condition {
    pub fn holds(&self, ctx: &ApplicabilityContext<'_>) -> bool {
        match self {
            Self::TargetGroup { group } => ctx.target.group == *group,
            Self::TargetCategory { category } => ctx.target.is_category(category),
            Self::TargetRequiresSkill { skill } => ctx.target.requires_skill(skill),
            Self::ShipGroup { group } => ctx.ship.group == *group,
            Self::TargetHasAttribute { attribute } => ctx.target.attributes.contains_key(attribute),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectDefinition {
    pub name: String,
    pub target_attribute: String,
    pub operation: Operation,
    pub runtime_phase: RuntimePhase,
    #[serde(default)]
    pub stacking_group: Option<String>,
    pub target: EffectTarget,
    pub value: ValueSource,
    #[serde(default)]
    pub scaling: ValueScaling,
    #[serde(default)]
    pub applicability: Vec<Condition>,
}

impl EffectDefinition {
    pub fn new(
        name: impl Into<String>,
        target_attribute: impl Into<String>,
        operation: Operation,
        runtime_phase: RuntimePhase,
        target: EffectTarget,
        value: ValueSource,
    ) -> Self {
        Self {
            name: name.into(),
            target_attribute: target_attribute.into(),
            operation,
            runtime_phase,
            stacking_group: None,
            target,
            value,
            scaling: ValueScaling::None,
            applicability: Vec::new(),
        }
    }

    pub fn stacking_group(mut self, group: impl Into<String>) -> Self {
        self.stacking_group = Some(group.into());
        self
    }

    pub fn scaling(mut self, scaling: ValueScaling) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.applicability.push(condition);
        self
    }

    pub fn applies_to(&self, ctx: &ApplicabilityContext<'_>) -> bool {
        self.applicability.iter().all(|condition| condition.holds(ctx))
    }
}

/// Read-only effect lookup keyed by effect name.
#[derive(Debug, Clone, Default)]
pub struct EffectCatalog {
    by_name: HashMap<String, Arc<EffectDefinition>>,
}

impl EffectCatalog {
    pub fn new<I>(definitions: I) -> Self
    where
        I: IntoIterator<Item = EffectDefinition>,
    {
        let by_name = definitions
            .into_iter()
            .map(|definition| (definition.name.clone(), Arc::new(definition)))
            .collect();
        Self { by_name }
    }

    pub fn get(&self, name: &str) -> Result<&Arc<EffectDefinition>> {
        self.by_name.get(name).ok_or_else(|| Error::UnknownEffect {
            name: name.to_string(),
        })
    }

    /// All effects an item carries, in the item's declared order.
    pub fn effects_for(&self, item: &ItemDefinition) -> Result<Vec<Arc<EffectDefinition>>> {
        item.effects
            .iter()
            .map(|name| self.get(name).cloned())
            .collect()
    }

    /// Effects of `item` on `attribute` whose phase is admitted and whose predicate
    /// holds over `ctx`; the rest are skipped silently.
    pub fn applicable_effects(
        &self,
        item: &ItemDefinition,
        attribute: &str,
        ctx: &ApplicabilityContext<'_>,
        phase_admitted: impl Fn(RuntimePhase) -> bool,
    ) -> Result<Vec<Arc<EffectDefinition>>> {
        Ok(self
            .effects_for(item)?
            .into_iter()
            .filter(|effect| {
                effect.target_attribute == attribute
                    && phase_admitted(effect.runtime_phase)
                    && effect.applies_to(ctx)
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EffectDefinition>> {
        self.by_name.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::item::{CATEGORY_MODULE, CATEGORY_SHIP};

    fn sensor_booster() -> EffectDefinition {
        EffectDefinition::new(
            "scanResolutionBonus",
            "scanResolution",
            Operation::PostPercent,
            RuntimePhase::Passive,
            EffectTarget::Ship,
            ValueSource::Attribute("scanResolutionBonus".to_string()),
        )
        .stacking_group("sensor")
    }

    #[test]
    fn percent_factor_converts_to_multiplier() {
        assert!((Operation::PostPercent.factor(10.0) - 1.1).abs() < 1e-12);
        assert_eq!(Operation::PreMultiply.factor(1.25), 1.25);
        assert_eq!(Operation::PreAdd.stage(), Some(Stage::Pre));
        assert_eq!(Operation::Assign.stage(), None);
    }

    #[test]
    fn effects_for_reports_unknown_effect() {
        let catalog = EffectCatalog::new([sensor_booster()]);
        let item = ItemDefinition::new(1, "Booster", "Sensor Booster", CATEGORY_MODULE)
            .with_effect("scanResolutionBonus")
            .with_effect("missingEffect");
        match catalog.effects_for(&item) {
            Err(Error::UnknownEffect { name }) => assert_eq!(name, "missingEffect"),
            other => panic!("expected UnknownEffect, got {other:?}"),
        }
    }

    #[test]
    fn phase_filter_skips_inapplicable_effects() {
        let restricted = EffectDefinition::new(
            "frigateOnly",
            "maxVelocity",
            Operation::PostPercent,
            RuntimePhase::Passive,
            EffectTarget::Ship,
            ValueSource::Literal(5.0),
        )
        .when(Condition::ShipGroup {
            group: "Frigate".to_string(),
        });
        let catalog = EffectCatalog::new([sensor_booster(), restricted]);
        let item = ItemDefinition::new(1, "Booster", "Sensor Booster", CATEGORY_MODULE)
            .with_effect("scanResolutionBonus")
            .with_effect("frigateOnly");
        let cruiser = ItemDefinition::new(2, "Thorax", "Cruiser", CATEGORY_SHIP);
        let ctx = ApplicabilityContext {
            source: &item,
            target: &cruiser,
            ship: &cruiser,
        };

        let passive = catalog
            .applicable_effects(&item, "scanResolution", &ctx, |phase| {
                phase == RuntimePhase::Passive
            })
            .unwrap();
        assert_eq!(passive.len(), 1);
        assert_eq!(passive[0].name, "scanResolutionBonus");

        let projected = catalog
            .applicable_effects(&item, "scanResolution", &ctx, |phase| {
                phase == RuntimePhase::Projected
            })
            .unwrap();
        assert!(projected.is_empty());

        let frigate = ItemDefinition::new(3, "Rifter", "Frigate", CATEGORY_SHIP);
        let frigate_ctx = ApplicabilityContext {
            source: &item,
            target: &frigate,
            ship: &frigate,
        };
        let velocity = catalog
            .applicable_effects(&item, "maxVelocity", &frigate_ctx, |_| true)
            .unwrap();
        assert_eq!(velocity.len(), 1);
        assert_eq!(velocity[0].name, "frigateOnly");
    }

    #[test]
    fn effect_definition_parses_from_yaml() {
        let yaml = r#"
name: skillVelocity
target_attribute: maxVelocity
operation: PostPercent
runtime_phase: Passive
target: { kind: ship }
value: 5.0
scaling: skill_level
applicability:
  - { type: ship_group, group: Frigate }
"#;
        let effect: EffectDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(effect.target, EffectTarget::Ship);
        assert_eq!(effect.value, ValueSource::Literal(5.0));
        assert_eq!(effect.scaling, ValueScaling::SkillLevel);
        assert_eq!(effect.stacking_group, None);
        assert_eq!(effect.applicability.len(), 1);
    }
}
