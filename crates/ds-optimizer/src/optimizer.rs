//! The generation loop: sample, evaluate, select, refit.

use crossbeam_channel::Sender;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use ds_types::{
    internal_error, sort_by_loss, Candidate, ConfigError, DsResult, EvaluationError, Evaluator,
    ModelSnapshot,
};

use crate::config::{FitMode, OptimizerConfig};
use crate::distribution::Distribution;
use crate::pool::EvaluationPool;
use crate::refit::{fit_blocks, refit_diagonal};
use crate::selection::select_elite;
use crate::status::{finite, GenerationReport, RunOutcome, RunStatus, StopReason};

/// Distribution-search optimizer over one evaluator.
///
/// Sampling happens on the calling thread from a single seeded RNG; only
/// evaluation is spread over the pool. A run is therefore reproducible for a
/// given seed whatever the worker count.
pub struct Optimizer<E: Evaluator> {
    config: OptimizerConfig,
    evaluator: E,
    distribution: Distribution,
    /// Correlation blocks used by the blockwise refit.
    blocks: Vec<Vec<usize>>,
    pool: EvaluationPool,
    rng: ChaCha8Rng,
    best: Option<Candidate>,
    best_loss: f64,
    best_generation: usize,
    generation: usize,
    history: Vec<GenerationReport>,
    status: RunStatus,
    observer: Option<Sender<GenerationReport>>,
    cancel: Arc<AtomicBool>,
}

impl<E: Evaluator> Optimizer<E> {
    pub fn new(
        config: OptimizerConfig,
        evaluator: E,
        distribution: Distribution,
    ) -> DsResult<Self> {
        config.validate()?;
        let space = evaluator.space();
        space.validate()?;
        if distribution.len() != space.len() {
            return Err(ConfigError::LengthMismatch {
                distribution: distribution.len(),
                space: space.len(),
            }
            .into());
        }

        let blocks = match config.fit {
            FitMode::Blockwise => space.neuron_blocks(),
            FitMode::Diagonal => Vec::new(),
        };
        let pool = EvaluationPool::new(config.worker_count())?;
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let status = RunStatus::new(evaluator.name());

        Ok(Self {
            config,
            evaluator,
            distribution,
            blocks,
            pool,
            rng,
            best: None,
            best_loss: f64::INFINITY,
            best_generation: 0,
            generation: 0,
            history: Vec::new(),
            status,
            observer: None,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Send a copy of every generation report to `sender`.
    pub fn with_observer(mut self, sender: Sender<GenerationReport>) -> Self {
        self.observer = Some(sender);
        self
    }

    /// Flag checked between generations; set it to stop the run early.
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }

    pub fn best(&self) -> Option<&Candidate> {
        self.best.as_ref()
    }

    /// `+inf` until a candidate has been accepted.
    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    /// Number of generations executed so far.
    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn history(&self) -> &[GenerationReport] {
        &self.history
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    fn sample_population(&mut self) -> Vec<Candidate> {
        (0..self.config.population)
            .map(|_| Candidate::new(self.distribution.sample(&mut self.rng)))
            .collect()
    }

    /// Execute one generation.
    pub fn run_generation(&mut self) -> DsResult<GenerationReport> {
        let started = Instant::now();

        let mut population = self.sample_population();
        self.pool.evaluate(&self.evaluator, &mut population)?;
        sort_by_loss(&mut population);

        let losses: Vec<f64> = population.iter().map(Candidate::rank_loss).collect();
        let window = select_elite(&losses, self.config.selection, self.config.selection_span)
            .ok_or_else(|| {
                internal_error!(
                    "population of {} cannot hold a window of {}",
                    losses.len(),
                    self.config.selection.width()
                )
            })?;

        let improved = window.representative_loss < self.best_loss;
        if improved {
            self.best = Some(population[window.start].clone());
            self.best_loss = window.representative_loss;
            self.best_generation = self.generation;
            self.refit(&population[window.range()])?;
        } else {
            debug!(
                generation = self.generation,
                representative_loss = window.representative_loss,
                best_loss = self.best_loss,
                "no improvement, distribution unchanged"
            );
        }

        let report = GenerationReport {
            generation: self.generation,
            improved,
            best_loss: finite(self.best_loss),
            window_start: window.start,
            window_width: window.width,
            window_stddev: finite(window.stddev),
            representative_loss: finite(window.representative_loss),
            population_min_loss: losses.first().copied().and_then(finite),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            generation = report.generation,
            best_loss = self.best_loss,
            window_start = report.window_start,
            window_stddev = window.stddev,
            improved = report.improved,
            "generation complete"
        );

        self.status.record(&report);
        self.history.push(report.clone());
        if let Some(observer) = &self.observer {
            // A dropped receiver only means nobody is listening any more.
            let _ = observer.try_send(report.clone());
        }
        self.generation += 1;
        Ok(report)
    }

    /// Refit from the elite set. In `Best` mode the elite set is the single
    /// best candidate, so every stddev falls to `min_stddev`.
    fn refit(&mut self, elite: &[Candidate]) -> DsResult<()> {
        let min_stddev = self.config.min_stddev;
        let previous = self.distribution.marginals();
        self.distribution = match self.config.fit {
            FitMode::Diagonal => {
                Distribution::diagonal(refit_diagonal(elite, &previous, min_stddev))
            }
            FitMode::Blockwise => {
                let blocks = fit_blocks(elite, &self.blocks, &previous, min_stddev);
                Distribution::blockwise(previous.len(), blocks)?
            }
        };
        Ok(())
    }

    /// Run until the generation budget is spent, the target loss is reached
    /// or the cancellation flag is set.
    pub fn run(&mut self) -> DsResult<RunOutcome> {
        self.status.mark_running();
        info!(
            run_id = %self.status.id,
            task = self.evaluator.name(),
            population = self.config.population,
            window = self.config.selection.width(),
            generations = self.config.generations,
            workers = self.pool.workers(),
            "starting distribution search"
        );

        let stop_reason = loop {
            if self.generation >= self.config.generations {
                break StopReason::BudgetExhausted;
            }
            if self.cancel.load(Ordering::Relaxed) {
                break StopReason::Cancelled;
            }
            if let Err(e) = self.run_generation() {
                self.status.mark_failed(e.to_string());
                return Err(e);
            }
            if let Some(target) = self.config.target_loss {
                if self.best_loss <= target {
                    break StopReason::TargetReached;
                }
            }
        };

        let Some(best) = self.best.clone() else {
            let error = EvaluationError::NoFiniteLoss {
                generations: self.generation,
            };
            self.status.mark_failed(error.to_string());
            return Err(error.into());
        };

        match stop_reason {
            StopReason::Cancelled => self.status.mark_cancelled(),
            _ => self.status.mark_completed(),
        }
        info!(
            best_loss = self.best_loss,
            best_generation = self.best_generation,
            generations = self.generation,
            stop_reason = ?stop_reason,
            "distribution search finished"
        );

        Ok(RunOutcome {
            best,
            best_loss: self.best_loss,
            best_generation: self.best_generation,
            generations: self.generation,
            stop_reason,
            status: self.status.clone(),
        })
    }

    /// Persistable form of the best candidate.
    pub fn snapshot(&self) -> DsResult<ModelSnapshot> {
        let best = self.best.as_ref().ok_or(EvaluationError::NoFiniteLoss {
            generations: self.generation,
        })?;
        ModelSnapshot::new(self.evaluator.space().clone(), best, self.best_generation)
    }
}
