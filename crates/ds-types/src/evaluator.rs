use std::sync::Arc;

use crate::errors::DsResult;
use crate::space::ParameterSpace;

/// A task that scores candidate parameter vectors.
///
/// Implementations must be pure with respect to the optimizer: the same
/// parameters over the same task data always produce the same loss, and task
/// data is only ever read. Evaluations run concurrently from several worker
/// threads, hence `Send + Sync`.
pub trait Evaluator: Send + Sync {
    /// Flat parameter layout this evaluator expects.
    fn space(&self) -> &ParameterSpace;

    /// Compute a non-negative loss for one candidate.
    fn evaluate(&self, parameters: &[f64]) -> DsResult<f64>;

    /// Human-readable task name.
    fn name(&self) -> &str;
}

impl<T: Evaluator + ?Sized> Evaluator for &T {
    fn space(&self) -> &ParameterSpace {
        (**self).space()
    }

    fn evaluate(&self, parameters: &[f64]) -> DsResult<f64> {
        (**self).evaluate(parameters)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: Evaluator + ?Sized> Evaluator for Arc<T> {
    fn space(&self) -> &ParameterSpace {
        (**self).space()
    }

    fn evaluate(&self, parameters: &[f64]) -> DsResult<f64> {
        (**self).evaluate(parameters)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Adapter turning a plain function into an [`Evaluator`].
pub struct FnEvaluator<F> {
    name: String,
    space: ParameterSpace,
    func: F,
}

impl<F> FnEvaluator<F>
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    pub fn new(name: impl Into<String>, space: ParameterSpace, func: F) -> Self {
        Self {
            name: name.into(),
            space,
            func,
        }
    }
}

impl<F> Evaluator for FnEvaluator<F>
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn space(&self) -> &ParameterSpace {
        &self.space
    }

    fn evaluate(&self, parameters: &[f64]) -> DsResult<f64> {
        Ok((self.func)(parameters))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fn_evaluator_delegates() {
        let space = ParameterSpace::new().add_scalars("p", 2);
        let eval = FnEvaluator::new("sum", space, |p: &[f64]| p.iter().sum());
        assert_eq!(eval.name(), "sum");
        assert_eq!(eval.space().len(), 2);
        assert_eq!(eval.evaluate(&[1.5, 2.0]).unwrap(), 3.5);
    }

    #[test]
    fn shared_handles_delegate() {
        let space = ParameterSpace::new().add_scalars("p", 1);
        let eval: Arc<dyn Evaluator> =
            Arc::new(FnEvaluator::new("double", space, |p: &[f64]| 2.0 * p[0]));
        assert_eq!(eval.evaluate(&[4.0]).unwrap(), 8.0);
        let by_ref = &eval;
        assert_eq!(by_ref.name(), "double");
    }
}
