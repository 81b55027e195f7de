use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One concrete sample of the parameter distribution and its measured loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub values: Vec<f64>,
    /// `+inf` until evaluated.
    pub loss: f64,
}

impl Candidate {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            loss: f64::INFINITY,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Loss used for ranking: NaN ranks as `+inf`.
    pub fn rank_loss(&self) -> f64 {
        if self.loss.is_nan() {
            f64::INFINITY
        } else {
            self.loss
        }
    }

    pub fn cmp_loss(&self, other: &Self) -> Ordering {
        self.rank_loss().total_cmp(&other.rank_loss())
    }
}

/// Stable ascending sort by loss.
pub fn sort_by_loss(population: &mut [Candidate]) {
    population.sort_by(Candidate::cmp_loss);
}
