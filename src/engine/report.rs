//! Tabular snapshot of a fit's modified attributes for export.
//!
//! Attributes with neither a base value nor a default render as a blank value;
//! any other failure also carries the error message.

use std::io::Write;

use serde::Serialize;

use crate::engine::fit::Fit;
use crate::engine::fitted::ItemKey;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    /// "ship" or the fitted item's id.
    pub target: String,
    pub item: String,
    pub attribute: String,
    pub base: Option<f64>,
    pub value: Option<f64>,
    pub modifiers: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AttributeReport {
    pub fit: String,
    pub rows: Vec<ReportRow>,
}

impl AttributeReport {
    /// Every registered attribute of the hull and of each local item.
    pub fn collect(fit: &mut Fit) -> Self {
        let mut names: Vec<String> = fit
            .catalog()
            .attributes()
            .iter()
            .map(|definition| definition.name.clone())
            .collect();
        names.sort();
        Self::for_attributes(fit, &names)
    }

    /// Only the named attributes, for the hull and each local item.
    pub fn for_attributes(fit: &mut Fit, names: &[String]) -> Self {
        let mut targets = vec![(ItemKey::Ship, fit.hull().definition().name.clone())];
        targets.extend(
            fit.items()
                .iter()
                .map(|item| (item.key(), item.definition().name.clone())),
        );

        let mut rows = Vec::new();
        for (target, item) in targets {
            for name in names {
                rows.push(row(fit, target, &item, name));
            }
        }
        tracing::debug!(fit = %fit.id(), rows = rows.len(), "report.collected");
        Self {
            fit: fit.name().to_string(),
            rows,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        for row in &self.rows {
            csv.serialize(row)?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn value(&self, target: &str, attribute: &str) -> Option<f64> {
        self.rows
            .iter()
            .find(|row| row.target == target && row.attribute == attribute)
            .and_then(|row| row.value)
    }
}

fn row(fit: &mut Fit, target: ItemKey, item: &str, name: &str) -> ReportRow {
    let base = fit.base_attribute(target, name).ok();
    let (value, modifiers, error) = match fit.modifiers(target, name) {
        Ok(entries) => {
            let value = fit.attribute(target, name).ok();
            (value, entries.len(), None)
        }
        Err(Error::MissingBaseValue { .. }) => (None, 0, None),
        Err(err) => {
            tracing::warn!(item = %target, attribute = name, error = %err, "report.value_failed");
            (None, 0, Some(err.to_string()))
        }
    };
    ReportRow {
        target: target.to_string(),
        item: item.to_string(),
        attribute: name.to_string(),
        base,
        value,
        modifiers,
        error,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::data::attribute::AttributeDefinition;
    use crate::data::catalog::{Catalog, CatalogFile};
    use crate::data::effect::{EffectDefinition, EffectTarget, Operation, RuntimePhase, ValueSource};
    use crate::data::item::{ItemDefinition, CATEGORY_MODULE, CATEGORY_SHIP};
    use crate::engine::fitted::FittedItem;

    fn fit() -> Fit {
        let file = CatalogFile {
            attributes: vec![
                AttributeDefinition::new("maxVelocity", Some(0.0)),
                AttributeDefinition::new("speedFactor", Some(0.0)),
                AttributeDefinition::new("warpSpeed", None),
            ],
            effects: vec![EffectDefinition::new(
                "overdrive",
                "maxVelocity",
                Operation::PostPercent,
                RuntimePhase::Passive,
                EffectTarget::Ship,
                ValueSource::Attribute("speedFactor".to_string()),
            )],
            items: vec![
                ItemDefinition::new(1, "Rifter", "Frigate", CATEGORY_SHIP)
                    .with_attribute("maxVelocity", 300.0),
                ItemDefinition::new(2, "Overdrive Injector", "Overdrive", CATEGORY_MODULE)
                    .with_attribute("speedFactor", 10.0)
                    .with_effect("overdrive"),
            ],
            ..CatalogFile::default()
        };
        let catalog = Arc::new(Catalog::build(file).unwrap());
        let hull = Arc::clone(catalog.item(1u32).unwrap());
        let module = FittedItem::module(Arc::clone(catalog.item(2u32).unwrap())).unwrap();
        let mut fit = Fit::new(catalog, hull).unwrap().with_name("Fast Rifter");
        fit.add_item(module).unwrap();
        fit
    }

    #[test]
    fn attributes_without_base_render_blank() {
        let mut fit = fit();
        let report = AttributeReport::collect(&mut fit);
        assert_eq!(report.fit, "Fast Rifter");
        assert_eq!(report.rows.len(), 6);
        let warp: Vec<&ReportRow> = report
            .rows
            .iter()
            .filter(|row| row.attribute == "warpSpeed")
            .collect();
        assert_eq!(warp.len(), 2);
        assert!(warp
            .iter()
            .all(|row| row.base.is_none() && row.value.is_none() && row.error.is_none()));
        assert_eq!(report.value("ship", "warpSpeed"), None);
        let speed = report.value("ship", "maxVelocity").unwrap();
        assert!((speed - 330.0).abs() < 1e-9);
        let ship_row = report
            .rows
            .iter()
            .find(|row| row.target == "ship" && row.attribute == "maxVelocity")
            .unwrap();
        assert_eq!(ship_row.base, Some(300.0));
        assert_eq!(ship_row.modifiers, 1);
    }

    #[test]
    fn csv_has_header_and_one_line_per_row() {
        let mut fit = fit();
        let report = AttributeReport::for_attributes(&mut fit, &["maxVelocity".to_string()]);
        let mut out = Vec::new();
        report.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("target,item,attribute,base,value,modifiers,error")
        );
        assert_eq!(lines.count(), 2);
    }

    #[test]
    fn unknown_attribute_renders_blank() {
        let mut fit = fit();
        let report = AttributeReport::for_attributes(&mut fit, &["lockRange".to_string()]);
        assert_eq!(report.rows.len(), 2);
        assert!(report.rows.iter().all(|row| row.value.is_none() && row.error.is_some()));
    }
}
