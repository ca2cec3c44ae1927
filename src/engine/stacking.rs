//! Stacking penalty resolution and the fixed combination order of modifier kinds.
//!
//! Order: Assign (short-circuits) -> PreAdd -> PreMultiply/PrePercent -> PostAdd
//! -> PostMultiply/PostPercent. Multiplicative entries sharing a stacking group
//! within one stage form a penalty chain; the strongest is unpenalized and the
//! n-th strongest is scaled by `exp(-(n / scale)^2)`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::config::StackingPolicy;
use crate::data::attribute::AttributeDefinition;
use crate::data::effect::{Operation, Stage};
use crate::engine::fitted::ItemKey;

/// One modifier derived from a currently active effect. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifierEntry {
    pub effect: String,
    pub source: ItemKey,
    pub operation: Operation,
    pub stacking_group: Option<String>,
    pub value: f64,
}

impl ModifierEntry {
    pub fn new(effect: impl Into<String>, source: ItemKey, operation: Operation, value: f64) -> Self {
        Self {
            effect: effect.into(),
            source,
            operation,
            stacking_group: None,
            value,
        }
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.stacking_group = Some(group.into());
        self
    }
}

/// Multiplier applied to the `rank`-th strongest entry (0-indexed) of a penalty chain.
pub fn penalty_multiplier(rank: usize, scale: f64) -> f64 {
    (-(rank as f64 / scale).powi(2)).exp()
}

/// Strength of one entry, taken from its raw value so that +v% and -v% tie exactly.
fn rank_magnitude(operation: Operation, value: f64) -> f64 {
    match operation {
        Operation::PrePercent | Operation::PostPercent => value.abs() / 100.0,
        _ => (value - 1.0).abs(),
    }
}

/// One member of a penalty chain.
#[derive(Debug, Clone, Copy)]
struct ChainEntry {
    magnitude: f64,
    factor: f64,
}

/// Strongest first. On equal strength a low-is-good attribute ranks the
/// increase (its unfavorable direction) first; otherwise insertion order holds.
fn rank_chain(chain: &mut [ChainEntry], high_is_good: bool) {
    chain.sort_by(|a, b| {
        b.magnitude.total_cmp(&a.magnitude).then_with(|| {
            if high_is_good {
                Ordering::Equal
            } else {
                (b.factor > 1.0).cmp(&(a.factor > 1.0))
            }
        })
    });
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageTotals {
    pub add: f64,
    pub factor: f64,
}

impl Default for StageTotals {
    fn default() -> Self {
        Self {
            add: 0.0,
            factor: 1.0,
        }
    }
}

impl StageTotals {
    pub fn compose(self, value: f64) -> f64 {
        (value + self.add) * self.factor
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResolvedTotals {
    pub assign: Option<f64>,
    pub pre: StageTotals,
    pub post: StageTotals,
}

impl ResolvedTotals {
    fn stage_mut(&mut self, stage: Stage) -> &mut StageTotals {
        match stage {
            Stage::Pre => &mut self.pre,
            Stage::Post => &mut self.post,
        }
    }

    pub fn compose(self, base: f64) -> f64 {
        match self.assign {
            Some(assigned) => assigned,
            None => self.post.compose(self.pre.compose(base)),
        }
    }
}

/// Fold entries into per-stage totals, applying stacking penalties.
/// Entries without a group, and entries on stackable attributes, apply at full strength.
pub fn combine(
    entries: &[ModifierEntry],
    attribute: &AttributeDefinition,
    policy: &StackingPolicy,
) -> ResolvedTotals {
    let penalizable = !attribute.stackable;
    let mut totals = ResolvedTotals::default();
    let mut chains: BTreeMap<(Stage, &str), Vec<ChainEntry>> = BTreeMap::new();

    for entry in entries {
        debug_assert!(entry.value.is_finite(), "non-finite modifier from {}", entry.effect);
        let Some(stage) = entry.operation.stage() else {
            // Later assignments win.
            totals.assign = Some(entry.value);
            continue;
        };
        if entry.operation.is_additive() {
            totals.stage_mut(stage).add += entry.value;
            continue;
        }
        let factor = entry.operation.factor(entry.value);
        match entry.stacking_group.as_deref() {
            Some(group) if penalizable => chains.entry((stage, group)).or_default().push(ChainEntry {
                magnitude: rank_magnitude(entry.operation, entry.value),
                factor,
            }),
            _ => totals.stage_mut(stage).factor *= factor,
        }
    }

    for ((stage, _group), mut chain) in chains {
        rank_chain(&mut chain, attribute.high_is_good);
        let limit = policy.max_penalized.unwrap_or(chain.len());
        let stage_totals = totals.stage_mut(stage);
        for (rank, entry) in chain.into_iter().take(limit).enumerate() {
            stage_totals.factor *=
                1.0 + (entry.factor - 1.0) * penalty_multiplier(rank, policy.penalty_scale);
        }
    }

    totals
}

/// Final value of one attribute. Not rounded.
pub fn resolve(
    base: f64,
    entries: &[ModifierEntry],
    attribute: &AttributeDefinition,
    policy: &StackingPolicy,
) -> f64 {
    combine(entries, attribute, policy).compose(base)
}
