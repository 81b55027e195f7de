//! The sampling model: diagonal or blockwise multivariate Gaussian.

use rand::Rng;
use rand_distr::StandardNormal;

use ds_types::{ConfigError, GaussianDescriptor, ParameterSpace, SlotRole};

/// A multivariate Gaussian over a subset of slots.
///
/// `factor` is the row-major lower-triangular Cholesky factor `L` of the
/// block covariance, so samples are `mean + L·z`.
#[derive(Debug, Clone, PartialEq)]
pub struct MultivariateBlock {
    pub indices: Vec<usize>,
    pub mean: Vec<f64>,
    pub factor: Vec<f64>,
}

impl MultivariateBlock {
    /// Block with independent slots: `L = diag(stddev)`.
    pub fn independent(indices: Vec<usize>, descriptors: &[GaussianDescriptor]) -> Self {
        let n = indices.len();
        let mut factor = vec![0.0; n * n];
        let mut mean = Vec::with_capacity(n);
        for (i, &slot) in indices.iter().enumerate() {
            let d = descriptors[slot];
            mean.push(d.mean);
            factor[i * n + i] = d.scale();
        }
        Self {
            indices,
            mean,
            factor,
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    fn sample_into<R: Rng + ?Sized>(&self, rng: &mut R, values: &mut [f64]) {
        let n = self.len();
        let z: Vec<f64> = (0..n).map(|_| rng.sample(StandardNormal)).collect();
        for (i, &slot) in self.indices.iter().enumerate() {
            let row = &self.factor[i * n..i * n + i + 1];
            let offset: f64 = row.iter().zip(&z).map(|(l, z)| l * z).sum();
            values[slot] = self.mean[i] + offset;
        }
    }

    /// Marginal stddev of each slot: the norm of its factor row.
    fn marginal_stddevs(&self) -> impl Iterator<Item = f64> + '_ {
        let n = self.len();
        (0..n).map(move |i| {
            self.factor[i * n..i * n + i + 1]
                .iter()
                .map(|l| l * l)
                .sum::<f64>()
                .sqrt()
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SamplingStrategy {
    Diagonal(Vec<GaussianDescriptor>),
    Blockwise(Vec<MultivariateBlock>),
}

/// Parameter distribution over a fixed number of slots.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    len: usize,
    strategy: SamplingStrategy,
}

impl Distribution {
    pub fn diagonal(descriptors: Vec<GaussianDescriptor>) -> Self {
        Self {
            len: descriptors.len(),
            strategy: SamplingStrategy::Diagonal(descriptors),
        }
    }

    /// Blockwise model; every slot in `0..len` must be covered exactly once.
    pub fn blockwise(len: usize, blocks: Vec<MultivariateBlock>) -> Result<Self, ConfigError> {
        let mut seen = vec![false; len];
        for block in &blocks {
            if block.mean.len() != block.len() || block.factor.len() != block.len() * block.len() {
                return Err(ConfigError::Invalid {
                    message: "block mean/factor shape does not match its indices".to_string(),
                });
            }
            for &slot in &block.indices {
                match seen.get_mut(slot) {
                    Some(flag) if !*flag => *flag = true,
                    _ => {
                        return Err(ConfigError::Invalid {
                            message: format!("slot {slot} is out of range or covered twice"),
                        })
                    }
                }
            }
        }
        if let Some(missing) = seen.iter().position(|s| !s) {
            return Err(ConfigError::Invalid {
                message: format!("slot {missing} is not covered by any block"),
            });
        }
        Ok(Self {
            len,
            strategy: SamplingStrategy::Blockwise(blocks),
        })
    }

    /// Every slot starts at the same `(mean, stddev)`.
    pub fn uniform(space: &ParameterSpace, mean: f64, stddev: f64) -> Self {
        Self::diagonal(vec![GaussianDescriptor::new(mean, stddev); space.len()])
    }

    /// Random start scaled per group by `sqrt(2 / cols)`.
    ///
    /// Means and stddevs are both drawn as `factor · z`; bias groups use the
    /// factor of the same-named weight group. Negative draws for the stddev
    /// are clamped to zero.
    pub fn he<R: Rng + ?Sized>(space: &ParameterSpace, rng: &mut R) -> Self {
        let mut descriptors = Vec::with_capacity(space.len());
        for group in space.groups() {
            let fan_in = match group.role {
                SlotRole::Bias => space
                    .group(&group.name, SlotRole::Weight)
                    .map(|w| w.cols)
                    .unwrap_or(group.cols),
                _ => group.cols,
            };
            let factor = (2.0 / fan_in.max(1) as f64).sqrt();
            for _ in 0..group.len() {
                let mean = factor * rng.sample::<f64, _>(StandardNormal);
                let stddev = factor * rng.sample::<f64, _>(StandardNormal);
                descriptors.push(GaussianDescriptor::new(mean, stddev));
            }
        }
        Self::diagonal(descriptors)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn strategy(&self) -> &SamplingStrategy {
        &self.strategy
    }

    /// Draw one parameter vector.
    ///
    /// Every slot consumes its own standard normal draw, in slot order for
    /// the diagonal model and in block order for the blockwise one.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        match &self.strategy {
            SamplingStrategy::Diagonal(descriptors) => descriptors
                .iter()
                .map(|d| d.transform(rng.sample(StandardNormal)))
                .collect(),
            SamplingStrategy::Blockwise(blocks) => {
                let mut values = vec![0.0; self.len];
                for block in blocks {
                    block.sample_into(rng, &mut values);
                }
                values
            }
        }
    }

    /// Per-slot mean and marginal stddev.
    pub fn marginals(&self) -> Vec<GaussianDescriptor> {
        match &self.strategy {
            SamplingStrategy::Diagonal(descriptors) => descriptors.clone(),
            SamplingStrategy::Blockwise(blocks) => {
                let mut out = vec![GaussianDescriptor::new(0.0, 0.0); self.len];
                for block in blocks {
                    for ((&slot, &mean), stddev) in block
                        .indices
                        .iter()
                        .zip(&block.mean)
                        .zip(block.marginal_stddevs())
                    {
                        out[slot] = GaussianDescriptor::new(mean, stddev);
                    }
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn moments(samples: &[f64]) -> (f64, f64) {
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let var = samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        (mean, var.sqrt())
    }

    #[test]
    fn standard_normal_sampling_matches_moments() {
        let dist = Distribution::diagonal(vec![GaussianDescriptor::new(0.0, 1.0)]);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let samples: Vec<f64> = (0..100_000).map(|_| dist.sample(&mut rng)[0]).collect();

        let (mean, stddev) = moments(&samples);
        assert!(mean.abs() < 0.02, "mean = {mean}");
        assert!((stddev - 1.0).abs() < 0.02, "stddev = {stddev}");
    }

    #[test]
    fn slots_use_independent_draws() {
        let dist = Distribution::diagonal(vec![GaussianDescriptor::new(0.0, 1.0); 2]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let pairs: Vec<Vec<f64>> = (0..1000).map(|_| dist.sample(&mut rng)).collect();
        assert!(pairs.iter().any(|p| p[0] != p[1]));

        let n = pairs.len() as f64;
        let cov = pairs.iter().map(|p| p[0] * p[1]).sum::<f64>() / n;
        assert!(cov.abs() < 0.15, "cov = {cov}");
    }

    #[test]
    fn zero_and_negative_stddev_sample_the_mean() {
        let dist = Distribution::diagonal(vec![
            GaussianDescriptor::new(2.0, 0.0),
            GaussianDescriptor {
                mean: -1.0,
                stddev: -4.0,
            },
        ]);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..10 {
            assert_eq!(dist.sample(&mut rng), vec![2.0, -1.0]);
        }
    }

    #[test]
    fn blockwise_sampling_reproduces_correlation() {
        // Covariance [[1, 0.9], [0.9, 1]] -> L = [[1, 0], [0.9, sqrt(0.19)]].
        let block = MultivariateBlock {
            indices: vec![1, 0],
            mean: vec![5.0, -5.0],
            factor: vec![1.0, 0.0, 0.9, 0.19f64.sqrt()],
        };
        let dist = Distribution::blockwise(2, vec![block]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let samples: Vec<Vec<f64>> = (0..50_000).map(|_| dist.sample(&mut rng)).collect();

        let (m1, s1) = moments(&samples.iter().map(|s| s[1]).collect::<Vec<_>>());
        let (m0, s0) = moments(&samples.iter().map(|s| s[0]).collect::<Vec<_>>());
        assert!((m1 - 5.0).abs() < 0.03);
        assert!((m0 + 5.0).abs() < 0.03);
        let corr = samples
            .iter()
            .map(|s| (s[1] - m1) * (s[0] - m0))
            .sum::<f64>()
            / samples.len() as f64
            / (s0 * s1);
        assert!((corr - 0.9).abs() < 0.02, "corr = {corr}");

        let marginals = dist.marginals();
        assert!((marginals[0].stddev - 1.0).abs() < 1e-12);
        assert_eq!(marginals[1].mean, 5.0);
    }

    #[test]
    fn blockwise_rejects_bad_coverage() {
        let descriptors = vec![GaussianDescriptor::default(); 3];
        let partial = vec![MultivariateBlock::independent(vec![0, 1], &descriptors)];
        assert!(Distribution::blockwise(3, partial).is_err());

        let overlap = vec![
            MultivariateBlock::independent(vec![0, 1], &descriptors),
            MultivariateBlock::independent(vec![1, 2], &descriptors),
        ];
        assert!(Distribution::blockwise(3, overlap).is_err());

        let out_of_range = vec![MultivariateBlock::independent(vec![0, 1, 2], &descriptors)];
        assert!(Distribution::blockwise(2, out_of_range).is_err());
    }

    #[test]
    fn he_initialisation_scales_by_fan_in() {
        let space = ParameterSpace::new().add_layer("wide", 200, 50);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let dist = Distribution::he(&space, &mut rng);
        assert_eq!(dist.len(), space.len());

        let marginals = dist.marginals();
        let means: Vec<f64> = marginals.iter().map(|d| d.mean).collect();
        let (_, spread) = moments(&means);
        assert!((spread - 0.1).abs() < 0.01, "spread = {spread}");
        assert!(marginals.iter().all(|d| d.stddev >= 0.0));
    }
}
