//! Optimizer settings: an optional JSON file, then command-line overrides.

use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;

use ds_optimizer::{FitMode, OptimizerConfig, SelectionMode};

#[derive(Args, Debug, Default, Clone)]
pub struct Tuning {
    /// Candidates sampled per generation
    #[arg(long, global = true)]
    pub population: Option<usize>,

    /// Elite window width
    #[arg(long, global = true)]
    pub window: Option<usize>,

    /// Refit from the single best candidate instead of a window
    #[arg(long, global = true, conflicts_with = "window")]
    pub best: bool,

    /// Only scan the first N ranked candidates for the window
    #[arg(long, global = true)]
    pub span: Option<usize>,

    /// Fit multivariate Gaussians per neuron instead of per slot
    #[arg(long, global = true)]
    pub blockwise: bool,

    /// Generation budget
    #[arg(long, global = true)]
    pub generations: Option<usize>,

    /// Evaluation threads (default: available parallelism)
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// Stop once the best loss reaches this value
    #[arg(long, global = true)]
    pub target_loss: Option<f64>,

    /// Lower bound on every refit stddev
    #[arg(long, global = true)]
    pub min_stddev: Option<f64>,
}

impl Tuning {
    pub fn apply(&self, mut config: OptimizerConfig) -> OptimizerConfig {
        if let Some(n) = self.population {
            config = config.with_population(n);
        }
        if self.best {
            config = config.with_selection(SelectionMode::Best);
        } else if let Some(width) = self.window {
            config = config.with_selection(SelectionMode::Window { width });
        }
        if let Some(span) = self.span {
            config = config.with_selection_span(span);
        }
        if self.blockwise {
            config = config.with_fit(FitMode::Blockwise);
        }
        if let Some(n) = self.generations {
            config = config.with_generations(n);
        }
        if let Some(n) = self.workers {
            config = config.with_workers(n);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(target) = self.target_loss {
            config = config.with_target_loss(target);
        }
        if let Some(floor) = self.min_stddev {
            config = config.with_min_stddev(floor);
        }
        config
    }
}

/// Load `path` (or the defaults), apply overrides and validate.
pub fn resolve(path: Option<&Path>, tuning: &Tuning) -> Result<OptimizerConfig> {
    let base = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => OptimizerConfig::default(),
    };
    let config = tuning.apply(base);
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn flags_override_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "population": 40,
                "generations": 7,
                "selection": {{"kind": "window", "width": 5}}
            }}"#
        )
        .unwrap();
        file.flush().unwrap();

        let tuning = Tuning {
            generations: Some(12),
            blockwise: true,
            ..Tuning::default()
        };
        let config = resolve(Some(file.path()), &tuning).unwrap();
        assert_eq!(config.population, 40);
        assert_eq!(config.generations, 12);
        assert_eq!(config.selection, SelectionMode::Window { width: 5 });
        assert_eq!(config.fit, FitMode::Blockwise);
    }

    #[test]
    fn invalid_settings_are_reported() {
        let tuning = Tuning {
            population: Some(4),
            window: Some(8),
            ..Tuning::default()
        };
        let err = resolve(None, &tuning).unwrap_err();
        assert!(err.to_string().contains("smaller than window"));

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        file.flush().unwrap();
        assert!(resolve(Some(file.path()), &Tuning::default()).is_err());
    }

    #[test]
    fn best_flag_selects_single_candidate() {
        let tuning = Tuning {
            best: true,
            ..Tuning::default()
        };
        let config = resolve(None, &tuning).unwrap();
        assert_eq!(config.selection, SelectionMode::Best);
    }
}
