//! Optimizer run configuration.

use serde::{Deserialize, Serialize};

use ds_types::ConfigError;

/// How the elite set is chosen from the ranked population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionMode {
    /// Contiguous window of `width` candidates with the smallest loss spread.
    Window { width: usize },
    /// The single lowest-loss candidate.
    Best,
}

impl SelectionMode {
    pub fn width(&self) -> usize {
        match self {
            Self::Window { width } => *width,
            Self::Best => 1,
        }
    }
}

impl Default for SelectionMode {
    fn default() -> Self {
        Self::Window { width: 16 }
    }
}

/// Which model is refit from the elite set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// Independent per-slot Gaussians.
    #[default]
    Diagonal,
    /// Multivariate Gaussians over the space's neuron blocks.
    Blockwise,
}

/// Top-level configuration for an optimizer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Candidates sampled per generation.
    pub population: usize,

    pub selection: SelectionMode,

    /// Only the first `selection_span` ranked candidates are scanned for the
    /// elite window. `None` scans the whole population.
    pub selection_span: Option<usize>,

    pub fit: FitMode,

    /// Generation budget.
    pub generations: usize,

    /// Evaluation threads. `None` uses the available parallelism.
    pub workers: Option<usize>,

    /// Seed for the sampling RNG.
    pub seed: u64,

    /// Stop early once the best loss is at or below this value.
    pub target_loss: Option<f64>,

    /// Lower bound applied to every refit stddev. Zero keeps the pure
    /// window estimate.
    pub min_stddev: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            population: 128,
            selection: SelectionMode::default(),
            selection_span: None,
            fit: FitMode::Diagonal,
            generations: 256,
            workers: None,
            seed: 1,
            target_loss: None,
            min_stddev: 0.0,
        }
    }
}

impl OptimizerConfig {
    pub fn new(population: usize, window: usize, generations: usize) -> Self {
        Self {
            population,
            selection: SelectionMode::Window { width: window },
            generations,
            ..Self::default()
        }
    }

    pub fn with_population(mut self, n: usize) -> Self {
        self.population = n;
        self
    }

    pub fn with_selection(mut self, selection: SelectionMode) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_selection_span(mut self, span: usize) -> Self {
        self.selection_span = Some(span);
        self
    }

    pub fn with_fit(mut self, fit: FitMode) -> Self {
        self.fit = fit;
        self
    }

    pub fn with_generations(mut self, n: usize) -> Self {
        self.generations = n;
        self
    }

    pub fn with_workers(mut self, n: usize) -> Self {
        self.workers = Some(n);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_target_loss(mut self, target: f64) -> Self {
        self.target_loss = Some(target);
        self
    }

    pub fn with_min_stddev(mut self, floor: f64) -> Self {
        self.min_stddev = floor;
        self
    }

    /// Number of evaluation threads actually used: `min(population, workers)`.
    pub fn worker_count(&self) -> usize {
        let requested = self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        requested.min(self.population).max(1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population == 0 {
            return Err(ConfigError::EmptyPopulation);
        }
        let width = self.selection.width();
        if width == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        if self.population < width {
            return Err(ConfigError::PopulationSmallerThanWindow {
                population: self.population,
                window: width,
            });
        }
        if self.generations == 0 {
            return Err(ConfigError::NoGenerations);
        }
        if let Some(span) = self.selection_span {
            if span < width {
                return Err(ConfigError::Invalid {
                    message: format!("selection span {span} is smaller than window width {width}"),
                });
            }
        }
        if self.workers == Some(0) {
            return Err(ConfigError::Invalid {
                message: "worker count must be positive".to_string(),
            });
        }
        if !(self.min_stddev >= 0.0 && self.min_stddev.is_finite()) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "min_stddev must be a finite non-negative number, got {}",
                    self.min_stddev
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chain() {
        let config = OptimizerConfig::new(64, 8, 200)
            .with_seed(7)
            .with_workers(3)
            .with_fit(FitMode::Blockwise)
            .with_target_loss(0.01);

        assert_eq!(config.population, 64);
        assert_eq!(config.selection, SelectionMode::Window { width: 8 });
        assert_eq!(config.generations, 200);
        assert_eq!(config.seed, 7);
        assert_eq!(config.worker_count(), 3);
        assert_eq!(config.fit, FitMode::Blockwise);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn worker_count_is_capped_by_population() {
        let config = OptimizerConfig::new(2, 1, 1).with_workers(16);
        assert_eq!(config.worker_count(), 2);
    }

    #[test]
    fn population_smaller_than_window_is_rejected() {
        let config = OptimizerConfig::new(4, 8, 10);
        assert_eq!(
            config.validate(),
            Err(ConfigError::PopulationSmallerThanWindow {
                population: 4,
                window: 8
            })
        );
    }

    #[test]
    fn degenerate_values_are_rejected() {
        assert_eq!(
            OptimizerConfig::new(0, 1, 1).validate(),
            Err(ConfigError::EmptyPopulation)
        );
        assert_eq!(
            OptimizerConfig::new(8, 0, 1).validate(),
            Err(ConfigError::EmptyWindow)
        );
        assert_eq!(
            OptimizerConfig::new(8, 2, 0).validate(),
            Err(ConfigError::NoGenerations)
        );
        assert!(OptimizerConfig::new(8, 4, 1)
            .with_selection_span(2)
            .validate()
            .is_err());
        assert!(OptimizerConfig::new(8, 4, 1)
            .with_min_stddev(-1.0)
            .validate()
            .is_err());
        assert!(OptimizerConfig::new(8, 4, 1).with_workers(0).validate().is_err());
    }

    #[test]
    fn best_mode_has_unit_width() {
        let config = OptimizerConfig::new(8, 4, 1).with_selection(SelectionMode::Best);
        assert_eq!(config.selection.width(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_round_trip_with_defaults() {
        let json = r#"{
            "population": 32,
            "selection": {"kind": "window", "width": 4},
            "fit": "blockwise"
        }"#;
        let config: OptimizerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.population, 32);
        assert_eq!(config.selection, SelectionMode::Window { width: 4 });
        assert_eq!(config.fit, FitMode::Blockwise);
        assert_eq!(config.generations, OptimizerConfig::default().generations);

        let best: OptimizerConfig =
            serde_json::from_str(r#"{"selection": {"kind": "best"}}"#).unwrap();
        assert_eq!(best.selection, SelectionMode::Best);
    }
}
