//! Per-item modified attribute store: base values, overrides, pending modifier
//! entries and a memoized result per attribute.
//!
//! A cached value stays valid only until a modifier on that attribute is
//! added, removed or toggled; [ModifiedAttributeStore::set_modifiers] and
//! [ModifiedAttributeStore::invalidate] evict exactly that one entry.

use std::collections::HashMap;

use crate::config::StackingPolicy;
use crate::data::attribute::AttributeRegistry;
use crate::data::effect::Operation;
use crate::engine::stacking::{self, ModifierEntry};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct ModifiedAttributeStore {
    original: HashMap<String, f64>,
    overrides: HashMap<String, f64>,
    modifiers: HashMap<String, Vec<ModifierEntry>>,
    cache: HashMap<String, f64>,
    policy: StackingPolicy,
}

impl ModifiedAttributeStore {
    pub fn new(original: HashMap<String, f64>) -> Self {
        Self {
            original,
            ..Self::default()
        }
    }

    pub fn set_policy(&mut self, policy: StackingPolicy) {
        if self.policy != policy {
            self.policy = policy;
            self.cache.clear();
        }
    }

    pub fn policy(&self) -> &StackingPolicy {
        &self.policy
    }

    /// Cached or freshly evaluated value of `name`.
    pub fn get(&mut self, name: &str, registry: &AttributeRegistry) -> Result<f64> {
        if let Some(value) = self.cache.get(name) {
            return Ok(*value);
        }
        let value = self.evaluate(name, registry)?;
        self.cache.insert(name.to_string(), value);
        Ok(value)
    }

    fn evaluate(&self, name: &str, registry: &AttributeRegistry) -> Result<f64> {
        let definition = registry.get(name)?;
        if let Some(value) = self.overrides.get(name) {
            return Ok(*value);
        }
        let entries = self.modifiers.get(name).map(Vec::as_slice).unwrap_or(&[]);
        let base = match self.original.get(name).copied().or(definition.default_value) {
            Some(base) => base,
            None => {
                // An assignment needs no base value.
                let assigned = entries
                    .iter()
                    .rev()
                    .find(|entry| entry.operation == Operation::Assign);
                return assigned.map(|entry| entry.value).ok_or_else(|| Error::MissingBaseValue {
                    attribute: name.to_string(),
                });
            }
        };
        Ok(stacking::resolve(base, entries, definition, &self.policy))
    }

    /// Base value before modifiers, falling back to the attribute default.
    pub fn base_value(&self, name: &str, registry: &AttributeRegistry) -> Result<f64> {
        let definition = registry.get(name)?;
        self.original
            .get(name)
            .copied()
            .or(definition.default_value)
            .ok_or_else(|| Error::MissingBaseValue {
                attribute: name.to_string(),
            })
    }

    pub fn cached(&self, name: &str) -> Option<f64> {
        self.cache.get(name).copied()
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.contains_key(name)
    }

    pub fn invalidate(&mut self, name: &str) {
        self.cache.remove(name);
    }

    /// Evict everything; used when the item changes identity.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.modifiers.clear();
    }

    /// Replace the pending entries for `name` and evict its cached value.
    pub fn set_modifiers(&mut self, name: &str, entries: Vec<ModifierEntry>) {
        self.cache.remove(name);
        if entries.is_empty() {
            self.modifiers.remove(name);
        } else {
            self.modifiers.insert(name.to_string(), entries);
        }
    }

    pub fn modifiers(&self, name: &str) -> &[ModifierEntry] {
        self.modifiers.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Force a value for `name`, taking precedence over every computed modifier.
    pub fn apply_override(&mut self, name: &str, value: f64) {
        self.overrides.insert(name.to_string(), value);
        self.cache.remove(name);
    }

    pub fn remove_override(&mut self, name: &str) -> Option<f64> {
        self.cache.remove(name);
        self.overrides.remove(name)
    }

    pub fn cached_names(&self) -> impl Iterator<Item = &str> {
        self.cache.keys().map(String::as_str)
    }
}
