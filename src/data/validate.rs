//! Catalog validation: reports dangling references and suspicious data with
//! severities instead of failing on the first problem.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use crate::data::catalog::{normalize_lookup, Catalog, CatalogFile};
use crate::data::effect::{ValueScaling, ValueSource};
use crate::data::item::{ItemKind, CATEGORY_SHIP, CATEGORY_SKILL, SYSTEM_EFFECT_GROUP};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationSeverity {
    Error,
    Warning,
    Info,
}

impl ValidationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for ValidationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationDiagnostic {
    pub severity: ValidationSeverity,
    pub context: String,
    pub message: String,
}

impl fmt::Display for ValidationDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.context, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub diagnostics: Vec<ValidationDiagnostic>,
}

impl ValidationReport {
    pub fn push(
        &mut self,
        severity: ValidationSeverity,
        context: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(ValidationDiagnostic {
            severity,
            context: context.into(),
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|diag| diag.severity == ValidationSeverity::Error)
    }

    pub fn count(&self, severity: ValidationSeverity) -> usize {
        self.diagnostics
            .iter()
            .filter(|diag| diag.severity == severity)
            .count()
    }
}

pub fn validate_catalog_file(path: &Path) -> Result<ValidationReport> {
    let file = Catalog::parse_file(path)?;
    Ok(validate_catalog(&file))
}

pub fn validate_catalog(file: &CatalogFile) -> ValidationReport {
    let mut report = ValidationReport::default();

    let mut attribute_names = HashSet::new();
    for (index, attribute) in file.attributes.iter().enumerate() {
        let context = format!("attributes[{index}]");
        if attribute.name.trim().is_empty() {
            report.push(ValidationSeverity::Error, context, "missing non-empty 'name'");
            continue;
        }
        if !attribute_names.insert(attribute.name.as_str()) {
            report.push(
                ValidationSeverity::Error,
                context,
                format!("duplicate attribute '{}'", attribute.name),
            );
        }
    }

    let mut effect_names = HashSet::new();
    for (index, effect) in file.effects.iter().enumerate() {
        let context = format!("effects[{index}] name='{}'", effect.name);
        if !effect_names.insert(effect.name.as_str()) {
            report.push(
                ValidationSeverity::Error,
                context.clone(),
                format!("duplicate effect '{}'", effect.name),
            );
        }
        if !attribute_names.contains(effect.target_attribute.as_str()) {
            report.push(
                ValidationSeverity::Error,
                format!("{context}.target_attribute"),
                format!("unknown attribute '{}'", effect.target_attribute),
            );
        }
        if let ValueSource::Attribute(name) = &effect.value {
            if !attribute_names.contains(name.as_str()) {
                report.push(
                    ValidationSeverity::Error,
                    format!("{context}.value"),
                    format!("unknown attribute '{name}'"),
                );
            }
        }
        let stackable_target = file
            .attributes
            .iter()
            .any(|a| a.name == effect.target_attribute && a.stackable);
        if effect.stacking_group.is_some() && stackable_target {
            report.push(
                ValidationSeverity::Warning,
                format!("{context}.stacking_group"),
                "target attribute is stackable; the stacking group never penalizes",
            );
        }
        if effect.stacking_group.is_some() && effect.operation.is_additive() {
            report.push(
                ValidationSeverity::Info,
                format!("{context}.stacking_group"),
                "additive operations are exempt from stacking penalties",
            );
        }
    }

    let mut item_ids = HashSet::new();
    let mut used_effects = HashSet::new();
    let mut lookup_names: HashMap<String, u32> = HashMap::new();
    let item_names: HashSet<&str> = file.items.iter().map(|item| item.name.as_str()).collect();
    for (index, item) in file.items.iter().enumerate() {
        let context = format!("items[{index}] id={}", item.id);
        if !item_ids.insert(item.id) {
            report.push(
                ValidationSeverity::Error,
                context.clone(),
                format!("duplicate item id {}", item.id),
            );
        }
        if let Some(previous) = lookup_names.insert(normalize_lookup(&item.name), item.id) {
            if previous != item.id {
                report.push(
                    ValidationSeverity::Warning,
                    format!("{context}.name"),
                    format!(
                        "name '{}' is also used by item {previous}; lookups by name resolve to {}",
                        item.name, item.id
                    ),
                );
            }
        }
        let fittable = ItemKind::from_category(&item.category).is_some()
            || item.is_category(CATEGORY_SHIP)
            || item.group == SYSTEM_EFFECT_GROUP;
        if !fittable {
            report.push(
                ValidationSeverity::Warning,
                format!("{context}.category"),
                format!("category '{}' cannot be fitted", item.category),
            );
        }
        for name in item.attributes.keys() {
            if !attribute_names.contains(name.as_str()) {
                report.push(
                    ValidationSeverity::Warning,
                    format!("{context}.attributes"),
                    format!("unregistered attribute '{name}'"),
                );
            }
        }
        for effect_name in &item.effects {
            used_effects.insert(effect_name.as_str());
            match file.effects.iter().find(|e| &e.name == effect_name) {
                None => report.push(
                    ValidationSeverity::Error,
                    format!("{context}.effects"),
                    format!("unknown effect '{effect_name}'"),
                ),
                Some(effect)
                    if effect.scaling == ValueScaling::SkillLevel
                        && !item.is_category(CATEGORY_SKILL) =>
                {
                    report.push(
                        ValidationSeverity::Warning,
                        format!("{context}.effects"),
                        format!("effect '{effect_name}' scales by skill level on a non-skill item"),
                    );
                }
                Some(_) => {}
            }
        }
    }

    for effect in &file.effects {
        if !used_effects.contains(effect.name.as_str()) {
            report.push(
                ValidationSeverity::Info,
                format!("effects name='{}'", effect.name),
                "effect is not carried by any item",
            );
        }
    }

    let overrides = &file.overrides;
    let override_names = overrides
        .forced_groups
        .keys()
        .chain(overrides.forced_meta_groups.keys())
        .chain(overrides.forced_market_groups.keys())
        .chain(overrides.base_values.keys());
    for name in override_names {
        if !item_names.contains(name.as_str()) {
            report.push(
                ValidationSeverity::Warning,
                "overrides",
                format!("override references unknown item '{name}'"),
            );
        }
    }
    for (legacy, current) in &overrides.name_conversions {
        if !lookup_names.contains_key(&normalize_lookup(current)) {
            report.push(
                ValidationSeverity::Warning,
                "overrides.name_conversions",
                format!("'{legacy}' converts to unknown item '{current}'"),
            );
        }
    }

    report
}
