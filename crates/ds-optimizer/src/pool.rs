//! Concurrent candidate evaluation.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;

use ds_types::{Candidate, DsResult, EvaluationError, Evaluator};

/// A fixed-size pool of evaluation threads.
///
/// Candidates are handed out by rayon's work stealing, so each one is
/// evaluated exactly once and the loss always lands in the candidate it
/// belongs to, whatever order the workers finish in.
pub struct EvaluationPool {
    pool: ThreadPool,
    workers: usize,
}

impl EvaluationPool {
    pub fn new(workers: usize) -> DsResult<Self> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("ds-eval-{i}"))
            .build()
            .map_err(|e| EvaluationError::Pool {
                message: e.to_string(),
            })?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Score every candidate in place.
    ///
    /// The first failure (an evaluator error, a panic, or a candidate whose
    /// length does not match the evaluator's space) aborts the batch.
    pub fn evaluate<E: Evaluator + ?Sized>(
        &self,
        evaluator: &E,
        population: &mut [Candidate],
    ) -> DsResult<()> {
        let expected = evaluator.space().len();
        debug!(
            candidates = population.len(),
            workers = self.workers,
            "evaluating population"
        );

        self.pool.install(|| {
            population
                .par_iter_mut()
                .enumerate()
                .try_for_each(|(index, candidate)| -> DsResult<()> {
                    if candidate.len() != expected {
                        return Err(EvaluationError::WrongArity {
                            index,
                            expected,
                            actual: candidate.len(),
                        }
                        .into());
                    }
                    let evaluate = || evaluator.evaluate(&candidate.values);
                    let outcome = panic::catch_unwind(AssertUnwindSafe(evaluate));
                    match outcome {
                        Ok(loss) => {
                            candidate.loss = loss?;
                            Ok(())
                        }
                        Err(payload) => Err(EvaluationError::Panicked {
                            index,
                            message: panic_message(payload.as_ref()),
                        }
                        .into()),
                    }
                })
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
