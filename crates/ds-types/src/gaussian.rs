use serde::{Deserialize, Serialize};

/// Per-slot Gaussian: the sampling law for one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianDescriptor {
    pub mean: f64,
    pub stddev: f64,
}

impl GaussianDescriptor {
    /// Negative scales are clamped to zero (a point mass at `mean`).
    pub fn new(mean: f64, stddev: f64) -> Self {
        Self {
            mean,
            stddev: stddev.max(0.0),
        }
    }

    /// Scale actually used for sampling; a negative or NaN stddev that was
    /// written directly into the field behaves as zero.
    pub fn scale(&self) -> f64 {
        if self.stddev > 0.0 {
            self.stddev
        } else {
            0.0
        }
    }

    /// Map a standard normal draw onto this slot.
    pub fn transform(&self, z: f64) -> f64 {
        self.mean + self.scale() * z
    }

    /// Population mean and standard deviation of `values`.
    ///
    /// Returns `None` for an empty slice.
    pub fn fit(values: impl IntoIterator<Item = f64> + Clone) -> Option<Self> {
        let (count, sum) = values
            .clone()
            .into_iter()
            .fold((0usize, 0.0), |(n, s), v| (n + 1, s + v));
        if count == 0 {
            return None;
        }
        let mean = sum / count as f64;
        let variance = values
            .into_iter()
            .map(|v| {
                let diff = mean - v;
                diff * diff
            })
            .sum::<f64>()
            / count as f64;
        Some(Self::new(mean, variance.sqrt()))
    }
}

impl Default for GaussianDescriptor {
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_stddev_is_clamped() {
        let g = GaussianDescriptor::new(1.0, -2.0);
        assert_eq!(g.stddev, 0.0);
        assert_eq!(g.transform(5.0), 1.0);

        let raw = GaussianDescriptor {
            mean: 0.5,
            stddev: -3.0,
        };
        assert_eq!(raw.scale(), 0.0);
        assert_eq!(raw.transform(-1.0), 0.5);

        let nan = GaussianDescriptor {
            mean: 0.0,
            stddev: f64::NAN,
        };
        assert_eq!(nan.transform(1.0), 0.0);
    }

    #[test]
    fn fit_uses_population_stddev() {
        let g = GaussianDescriptor::fit([1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!((g.mean - 2.5).abs() < 1e-12);
        assert!((g.stddev - 1.25f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn fit_of_constant_values_has_zero_spread() {
        let g = GaussianDescriptor::fit([7.0; 5]).unwrap();
        assert_eq!(g.mean, 7.0);
        assert_eq!(g.stddev, 0.0);
        assert!(GaussianDescriptor::fit(Vec::<f64>::new()).is_none());
    }
}
