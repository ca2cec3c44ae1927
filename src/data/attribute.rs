//! Attribute definitions and the read-only registry that serves them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub name: String,
    #[serde(default)]
    pub default_value: Option<f64>,
    /// Stackable attributes are never stacking-penalized.
    #[serde(default)]
    pub stackable: bool,
    #[serde(default = "default_high_is_good")]
    pub high_is_good: bool,
}

fn default_high_is_good() -> bool {
    true
}

impl AttributeDefinition {
    pub fn new(name: impl Into<String>, default_value: Option<f64>) -> Self {
        Self {
            name: name.into(),
            default_value,
            stackable: false,
            high_is_good: true,
        }
    }

    pub fn stackable(mut self, stackable: bool) -> Self {
        self.stackable = stackable;
        self
    }

    pub fn high_is_good(mut self, high_is_good: bool) -> Self {
        self.high_is_good = high_is_good;
        self
    }
}

/// Immutable after construction; safe to share across threads behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct AttributeRegistry {
    by_name: HashMap<String, AttributeDefinition>,
}

impl AttributeRegistry {
    pub fn new<I>(definitions: I) -> Self
    where
        I: IntoIterator<Item = AttributeDefinition>,
    {
        let by_name = definitions
            .into_iter()
            .map(|definition| (definition.name.clone(), definition))
            .collect();
        Self { by_name }
    }

    pub fn get(&self, name: &str) -> Result<&AttributeDefinition> {
        self.by_name.get(name).ok_or_else(|| Error::UnknownAttribute {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeDefinition> {
        self.by_name.values()
    }
}
