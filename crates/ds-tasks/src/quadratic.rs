use ds_types::{DsResult, Evaluator, ParameterSpace};

/// Squared distance to a fixed target point.
#[derive(Debug, Clone)]
pub struct Quadratic {
    target: Vec<f64>,
    space: ParameterSpace,
}

impl Quadratic {
    pub fn new(target: Vec<f64>) -> Self {
        let space = ParameterSpace::new().add_scalars("point", target.len());
        Self { target, space }
    }

    pub fn target(&self) -> &[f64] {
        &self.target
    }
}

impl Evaluator for Quadratic {
    fn space(&self) -> &ParameterSpace {
        &self.space
    }

    fn evaluate(&self, parameters: &[f64]) -> DsResult<f64> {
        Ok(parameters
            .iter()
            .zip(&self.target)
            .map(|(p, t)| (p - t) * (p - t))
            .sum())
    }

    fn name(&self) -> &str {
        "quadratic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_is_squared_distance() {
        let task = Quadratic::new(vec![3.0, -1.0]);
        assert_eq!(task.space().len(), 2);
        assert_eq!(task.evaluate(&[3.0, -1.0]).unwrap(), 0.0);
        assert_eq!(task.evaluate(&[0.0, 0.0]).unwrap(), 10.0);
    }
}
