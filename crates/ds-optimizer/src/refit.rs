//! Re-estimating the sampling model from an elite set.

use nalgebra::DMatrix;
use tracing::warn;

use ds_types::{Candidate, GaussianDescriptor};

use crate::distribution::MultivariateBlock;

/// Added to the diagonal of every block covariance before factoring. An elite
/// set of `W` samples has rank at most `W - 1`, so blocks wider than that are
/// singular without it.
pub const COVARIANCE_RIDGE: f64 = 1e-9;

/// Slot-wise population mean and stddev over the elite set.
///
/// Slots whose estimate is not finite keep their `previous` descriptor.
/// Every stddev is raised to at least `min_stddev`.
pub fn refit_diagonal(
    elite: &[Candidate],
    previous: &[GaussianDescriptor],
    min_stddev: f64,
) -> Vec<GaussianDescriptor> {
    let mut fallbacks = 0usize;
    let next = previous
        .iter()
        .enumerate()
        .map(|(k, prev)| {
            match GaussianDescriptor::fit(elite.iter().map(|c| c.values[k])) {
                Some(d) if d.mean.is_finite() && d.stddev.is_finite() => {
                    GaussianDescriptor::new(d.mean, d.stddev.max(min_stddev))
                }
                _ => {
                    fallbacks += 1;
                    *prev
                }
            }
        })
        .collect();
    if fallbacks > 0 {
        warn!(fallbacks, "non-finite refit estimates, kept previous descriptors");
    }
    next
}

/// Fit one multivariate Gaussian per block from the elite set.
///
/// Covariance is the population estimate plus [`COVARIANCE_RIDGE`]. When a
/// block cannot be factored it falls back to its diagonal, and when even that
/// is not finite the block is rebuilt from `previous`.
pub fn fit_blocks(
    elite: &[Candidate],
    blocks: &[Vec<usize>],
    previous: &[GaussianDescriptor],
    min_stddev: f64,
) -> Vec<MultivariateBlock> {
    let w = elite.len() as f64;
    let floor = min_stddev * min_stddev;
    let mut degraded = 0usize;

    let fitted = blocks
        .iter()
        .map(|indices| {
            let n = indices.len();
            let mean: Vec<f64> = indices
                .iter()
                .map(|&slot| elite.iter().map(|c| c.values[slot]).sum::<f64>() / w)
                .collect();

            let covariance = DMatrix::from_fn(n, n, |i, j| {
                let cov = elite
                    .iter()
                    .map(|c| (c.values[indices[i]] - mean[i]) * (c.values[indices[j]] - mean[j]))
                    .sum::<f64>()
                    / w;
                if i == j {
                    cov.max(floor) + COVARIANCE_RIDGE
                } else {
                    cov
                }
            });

            if !(mean.iter().all(|m| m.is_finite()) && covariance.iter().all(|c| c.is_finite())) {
                degraded += 1;
                return MultivariateBlock::independent(indices.clone(), previous);
            }

            let factor = match covariance.clone().cholesky() {
                Some(cholesky) => {
                    let l = cholesky.l();
                    let mut factor = vec![0.0; n * n];
                    for i in 0..n {
                        for j in 0..=i {
                            factor[i * n + j] = l[(i, j)];
                        }
                    }
                    factor
                }
                None => {
                    degraded += 1;
                    let mut factor = vec![0.0; n * n];
                    for i in 0..n {
                        factor[i * n + i] = covariance[(i, i)].max(0.0).sqrt();
                    }
                    factor
                }
            };

            MultivariateBlock {
                indices: indices.clone(),
                mean,
                factor,
            }
        })
        .collect();

    if degraded > 0 {
        warn!(degraded, "blocks fell back to a diagonal or previous model");
    }
    fitted
}
