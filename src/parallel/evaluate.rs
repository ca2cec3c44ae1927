//! Evaluate many independent fits at once. Each fit is rehydrated, read and
//! dropped inside a single task, so no fit is ever shared between threads.

use std::sync::Arc;

use rayon::prelude::*;

use crate::config::StackingPolicy;
use crate::data::catalog::Catalog;
use crate::engine::report::AttributeReport;
use crate::error::Result;
use crate::parallel::pool::WorkerPool;
use crate::persist::{FitComposition, RehydrateReport};

#[derive(Debug, Clone)]
pub struct FitEvaluation {
    pub name: String,
    pub report: AttributeReport,
    pub rehydrate: RehydrateReport,
}

/// One result per composition, in input order. An empty `attributes` list reports every attribute.
pub fn evaluate_fits(
    compositions: &[FitComposition],
    catalog: &Arc<Catalog>,
    policy: StackingPolicy,
    attributes: &[String],
    pool: &WorkerPool,
) -> Vec<Result<FitEvaluation>> {
    let evaluate_one = |composition: &FitComposition| -> Result<FitEvaluation> {
        let (mut fit, rehydrate) = composition.rehydrate(catalog, policy)?;
        let report = if attributes.is_empty() {
            AttributeReport::collect(&mut fit)
        } else {
            AttributeReport::for_attributes(&mut fit, attributes)
        };
        Ok(FitEvaluation {
            name: composition.name.clone(),
            report,
            rehydrate,
        })
    };

    tracing::debug!(fits = compositions.len(), workers = pool.workers, "evaluate_fits.start");
    pool.install(|| compositions.par_iter().map(evaluate_one).collect())
}
