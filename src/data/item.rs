//! Item definitions as supplied by the catalog: base attributes, effect names and grouping.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const CATEGORY_SHIP: &str = "Ship";
pub const CATEGORY_MODULE: &str = "Module";
pub const CATEGORY_IMPLANT: &str = "Implant";
pub const CATEGORY_SKILL: &str = "Skill";
pub const CATEGORY_DRONE: &str = "Drone";
pub const CATEGORY_CELESTIAL: &str = "Celestial";

/// Group holding the beacons that carry system-wide effects.
pub const SYSTEM_EFFECT_GROUP: &str = "Effect Beacon";

/// Kind of item that can be attached to a hull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Module,
    Implant,
    Skill,
    Drone,
}

impl ItemKind {
    pub const fn category(self) -> &'static str {
        match self {
            Self::Module => CATEGORY_MODULE,
            Self::Implant => CATEGORY_IMPLANT,
            Self::Skill => CATEGORY_SKILL,
            Self::Drone => CATEGORY_DRONE,
        }
    }

    pub fn from_category(category: &str) -> Option<Self> {
        [Self::Module, Self::Implant, Self::Skill, Self::Drone]
            .into_iter()
            .find(|kind| kind.category().eq_ignore_ascii_case(category))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDefinition {
    pub id: u32,
    pub name: String,
    pub group: String,
    pub category: String,
    #[serde(default)]
    pub attributes: HashMap<String, f64>,
    /// Effect names, resolved against the effect catalog.
    #[serde(default)]
    pub effects: Vec<String>,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub meta_group: Option<String>,
    #[serde(default)]
    pub market_group: Option<u32>,
    #[serde(default = "default_published")]
    pub published: bool,
}

fn default_published() -> bool {
    true
}

impl ItemDefinition {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        group: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            group: group.into(),
            category: category.into(),
            attributes: HashMap::new(),
            effects: Vec::new(),
            required_skills: Vec::new(),
            meta_group: None,
            market_group: None,
            published: true,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: f64) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn with_effect(mut self, effect: impl Into<String>) -> Self {
        self.effects.push(effect.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<f64> {
        self.attributes.get(name).copied()
    }

    pub fn is_category(&self, category: &str) -> bool {
        self.category.eq_ignore_ascii_case(category)
    }

    pub fn requires_skill(&self, skill: &str) -> bool {
        self.required_skills.iter().any(|s| s == skill)
    }
}
