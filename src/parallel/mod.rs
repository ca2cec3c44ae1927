pub mod evaluate;
pub mod pool;

pub use evaluate::{evaluate_fits, FitEvaluation};
pub use pool::WorkerPool;
