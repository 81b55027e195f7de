//! # ds-optimizer
//!
//! Black-box distribution search over a flat parameter space.
//!
//! Each generation samples a population from a per-slot Gaussian model,
//! evaluates it concurrently, picks the most stable low-loss window of the
//! ranked population and refits the model from that window. The model is
//! either diagonal or blockwise multivariate.

mod config;
mod distribution;
mod optimizer;
mod pool;
mod refit;
mod selection;
mod status;

pub use config::{FitMode, OptimizerConfig, SelectionMode};
pub use distribution::{Distribution, MultivariateBlock, SamplingStrategy};
pub use optimizer::Optimizer;
pub use pool::EvaluationPool;
pub use refit::{fit_blocks, refit_diagonal, COVARIANCE_RIDGE};
pub use selection::{select_elite, select_window, window_stats, EliteWindow};
pub use status::{GenerationReport, RunId, RunOutcome, RunState, RunStatus, StopReason};
