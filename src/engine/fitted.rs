//! Items attached to a hull. Each owns its modified attribute store; none owns
//! the targets it modifies.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::item::{ItemDefinition, ItemKind, CATEGORY_SHIP, SYSTEM_EFFECT_GROUP};
use crate::engine::store::ModifiedAttributeStore;
use crate::error::{Error, Result};

pub const IMPLANTNESS: &str = "implantness";
pub const MAX_SKILL_LEVEL: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Addresses one store within a fit: the hull, the system effect, or a fitted/projected item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ItemKey {
    Ship,
    System,
    Item(ItemId),
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ship => write!(f, "ship"),
            Self::System => write!(f, "system"),
            Self::Item(id) => write!(f, "{id}"),
        }
    }
}

/// One (target, attribute) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttrKey {
    pub item: ItemKey,
    pub attribute: String,
}

impl AttrKey {
    pub fn new(item: ItemKey, attribute: impl Into<String>) -> Self {
        Self {
            item,
            attribute: attribute.into(),
        }
    }
}

impl fmt::Display for AttrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.item, self.attribute)
    }
}

fn require_category(definition: &ItemDefinition, category: &str) -> Result<()> {
    if definition.is_category(category) {
        Ok(())
    } else {
        Err(Error::InvalidItemCategory {
            item: definition.name.clone(),
            expected: category.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Hull {
    definition: Arc<ItemDefinition>,
    pub(crate) store: ModifiedAttributeStore,
}

impl Hull {
    pub fn new(definition: Arc<ItemDefinition>) -> Result<Self> {
        require_category(&definition, CATEGORY_SHIP)?;
        let store = ModifiedAttributeStore::new(definition.attributes.clone());
        Ok(Self { definition, store })
    }

    pub fn definition(&self) -> &Arc<ItemDefinition> {
        &self.definition
    }

    pub fn store(&self) -> &ModifiedAttributeStore {
        &self.store
    }
}

/// The beacon of the solar system the fit sits in. Its effects reach the
/// ship and local items the same way a hull's do.
#[derive(Debug, Clone)]
pub struct SystemEffect {
    definition: Arc<ItemDefinition>,
    pub(crate) store: ModifiedAttributeStore,
}

impl SystemEffect {
    pub fn new(definition: Arc<ItemDefinition>) -> Result<Self> {
        if definition.group != SYSTEM_EFFECT_GROUP {
            return Err(Error::InvalidItemCategory {
                item: definition.name.clone(),
                expected: SYSTEM_EFFECT_GROUP.to_string(),
            });
        }
        let store = ModifiedAttributeStore::new(definition.attributes.clone());
        Ok(Self { definition, store })
    }

    pub fn definition(&self) -> &Arc<ItemDefinition> {
        &self.definition
    }

    pub fn store(&self) -> &ModifiedAttributeStore {
        &self.store
    }
}

#[derive(Debug, Clone)]
pub struct FittedItem {
    id: ItemId,
    kind: ItemKind,
    definition: Arc<ItemDefinition>,
    active: bool,
    running: bool,
    level: Option<u8>,
    slot: Option<u8>,
    pub(crate) store: ModifiedAttributeStore,
}

impl FittedItem {
    /// Build a wrapper of `kind`, failing fast if the item does not belong to that category.
    pub fn new(definition: Arc<ItemDefinition>, kind: ItemKind) -> Result<Self> {
        require_category(&definition, kind.category())?;
        let slot = match kind {
            ItemKind::Implant => Some(implant_slot(&definition)?),
            _ => None,
        };
        let level = match kind {
            ItemKind::Skill => Some(0),
            _ => None,
        };
        let store = ModifiedAttributeStore::new(definition.attributes.clone());
        Ok(Self {
            id: ItemId::new(),
            kind,
            definition,
            active: true,
            running: false,
            level,
            slot,
            store,
        })
    }

    pub fn module(definition: Arc<ItemDefinition>) -> Result<Self> {
        Self::new(definition, ItemKind::Module)
    }

    pub fn implant(definition: Arc<ItemDefinition>) -> Result<Self> {
        Self::new(definition, ItemKind::Implant)
    }

    pub fn drone(definition: Arc<ItemDefinition>) -> Result<Self> {
        Self::new(definition, ItemKind::Drone)
    }

    pub fn skill(definition: Arc<ItemDefinition>, level: u8) -> Result<Self> {
        let mut item = Self::new(definition, ItemKind::Skill)?;
        item.set_level(level)?;
        Ok(item)
    }

    pub fn with_running(mut self, running: bool) -> Self {
        self.running = running;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::Item(self.id)
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn definition(&self) -> &Arc<ItemDefinition> {
        &self.definition
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Skill level; `None` for non-skills.
    pub fn level(&self) -> Option<u8> {
        self.level
    }

    /// Implant slot; `None` for non-implants.
    pub fn slot(&self) -> Option<u8> {
        self.slot
    }

    pub fn store(&self) -> &ModifiedAttributeStore {
        &self.store
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub(crate) fn set_level(&mut self, level: u8) -> Result<()> {
        if self.kind != ItemKind::Skill {
            return Err(Error::InvalidItemCategory {
                item: self.definition.name.clone(),
                expected: ItemKind::Skill.category().to_string(),
            });
        }
        if level > MAX_SKILL_LEVEL {
            return Err(Error::InvalidSkillLevel { level });
        }
        self.level = Some(level);
        Ok(())
    }

    /// Fresh copy with a new identity and empty caches, keeping state flags.
    pub fn duplicate(&self) -> Self {
        Self {
            id: ItemId::new(),
            store: ModifiedAttributeStore::new(self.definition.attributes.clone()),
            definition: Arc::clone(&self.definition),
            ..*self
        }
    }
}

fn implant_slot(definition: &ItemDefinition) -> Result<u8> {
    definition
        .attribute(IMPLANTNESS)
        .filter(|slot| slot.is_finite() && *slot >= 0.0 && *slot <= f64::from(u8::MAX))
        .map(|slot| slot as u8)
        .ok_or_else(|| Error::InvalidItemCategory {
            item: definition.name.clone(),
            expected: "implant with an implantness slot".to_string(),
        })
}
