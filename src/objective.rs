//! Parametric objective for optimizers.
//!
//! An optimizer proposes parameter vectors θ; a builder turns θ into a
//! template; the evaluator turns the template into a divergence. This module
//! glues those together and keeps track of the best point seen.

use crate::error::{DivergenceError, Result};
use crate::evaluator::DivergenceEvaluator;
use crate::template::IntensityModel;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Box constraints on a parameter vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
        if lower.len() != upper.len() {
            return Err(DivergenceError::InvalidParameter(format!(
                "bounds have {} lower and {} upper entries",
                lower.len(),
                upper.len()
            )));
        }
        if let Some(i) = (0..lower.len()).find(|&i| !(lower[i] <= upper[i])) {
            return Err(DivergenceError::InvalidParameter(format!(
                "bound {} is empty: [{}, {}]",
                i, lower[i], upper[i]
            )));
        }
        Ok(Self { lower, upper })
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// Error unless `params` has the right length and lies inside the box.
    pub fn check(&self, params: &[f64]) -> Result<()> {
        if params.len() != self.dim() {
            return Err(DivergenceError::InvalidParameter(format!(
                "expected {} parameters, got {}",
                self.dim(),
                params.len()
            )));
        }
        for (i, &v) in params.iter().enumerate() {
            if !(self.lower[i] <= v && v <= self.upper[i]) {
                return Err(DivergenceError::InvalidParameter(format!(
                    "parameter {} = {} outside [{}, {}]",
                    i, v, self.lower[i], self.upper[i]
                )));
            }
        }
        Ok(())
    }

    /// Centre of the box, a common starting point.
    pub fn midpoint(&self) -> Vec<f64> {
        self.lower
            .iter()
            .zip(self.upper.iter())
            .map(|(&lo, &hi)| 0.5 * (lo + hi))
            .collect()
    }
}

/// Best point seen by an objective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestPoint {
    pub value: f64,
    pub params: Vec<f64>,
}

/// Divergence as a function of template parameters.
pub struct TemplateObjective<F> {
    evaluator: DivergenceEvaluator,
    builder: F,
    bounds: Option<Bounds>,
    best: Option<BestPoint>,
}

impl<F, M> TemplateObjective<F>
where
    F: Fn(&[f64]) -> Result<M>,
    M: IntensityModel,
{
    pub fn new(evaluator: DivergenceEvaluator, builder: F) -> Self {
        Self {
            evaluator,
            builder,
            bounds: None,
            best: None,
        }
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    #[inline]
    pub fn bounds(&self) -> Option<&Bounds> {
        self.bounds.as_ref()
    }

    #[inline]
    pub fn evaluator(&self) -> &DivergenceEvaluator {
        &self.evaluator
    }

    pub fn into_evaluator(self) -> DivergenceEvaluator {
        self.evaluator
    }

    /// Lowest value seen so far
    #[inline]
    pub fn best(&self) -> Option<&BestPoint> {
        self.best.as_ref()
    }

    /// Divergence of the template built from `params`.
    pub fn value(&mut self, params: &[f64]) -> Result<f64> {
        if let Some(bounds) = &self.bounds {
            bounds.check(params)?;
        }

        let model = (self.builder)(params)?;
        let value = self.evaluator.evaluate(&model)?;

        let improved = self.best.as_ref().map_or(true, |b| value < b.value);
        if improved {
            self.best = Some(BestPoint {
                value,
                params: params.to_vec(),
            });
        }
        Ok(value)
    }

    /// Like [`value`](Self::value), but failures become `+inf`.
    ///
    /// For optimizers that only understand plain numbers.
    pub fn value_or_penalty(&mut self, params: &[f64]) -> f64 {
        match self.value(params) {
            Ok(v) => v,
            Err(e) if e.is_recoverable() => {
                debug!("TemplateObjective: penalizing {:?}: {}", params, e);
                f64::INFINITY
            }
            Err(e) => {
                warn!("TemplateObjective: evaluation failed at {:?}: {}", params, e);
                f64::INFINITY
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::divergence::Divergence;
    use crate::image::{Image, ImageGeometry};
    use crate::template::Gaussian;

    fn gaussian_image() -> Image {
        let g = ImageGeometry::from_fov(12.0, 12.0, 24, 24).unwrap();
        let truth = Gaussian::new(1.5, 1.0, -0.5).unwrap();
        Image::from_fn(g, |x, y| truth.intensity_point(x, y)).unwrap()
    }

    fn objective(
        d: Divergence,
    ) -> TemplateObjective<impl Fn(&[f64]) -> Result<Gaussian>> {
        let eval = DivergenceEvaluator::new(&gaussian_image(), d).unwrap();
        let bounds = Bounds::new(vec![0.1, -5.0, -5.0], vec![5.0, 5.0, 5.0]).unwrap();
        TemplateObjective::new(eval, |p: &[f64]| Gaussian::new(p[0], p[1], p[2]))
            .with_bounds(bounds)
    }

    #[test]
    fn test_bounds_validation() {
        assert!(Bounds::new(vec![0.0], vec![1.0, 2.0]).is_err());
        assert!(Bounds::new(vec![2.0], vec![1.0]).is_err());
        assert!(Bounds::new(vec![f64::NAN], vec![1.0]).is_err());

        let b = Bounds::new(vec![0.0, -1.0], vec![1.0, 1.0]).unwrap();
        assert_eq!(b.midpoint(), vec![0.5, 0.0]);
        assert!(b.check(&[0.5, 0.0]).is_ok());
        assert!(b.check(&[0.5]).is_err());
        assert!(b.check(&[1.5, 0.0]).is_err());
    }

    #[test]
    fn test_truth_is_minimum_along_each_axis() {
        for d in [Divergence::Bhattacharyya, Divergence::renyi(2.0).unwrap()] {
            let mut obj = objective(d);
            let truth = obj.value(&[1.5, 1.0, -0.5]).unwrap();
            for probe in [[1.0, 1.0, -0.5], [1.5, 2.0, -0.5], [1.5, 1.0, 0.5]] {
                let v = obj.value(&probe).unwrap();
                assert!(truth < v, "{}: {:?} gave {} <= {}", d, probe, v, truth);
            }
            let best = obj.best().unwrap();
            assert_eq!(best.params, vec![1.5, 1.0, -0.5]);
            assert_eq!(best.value, truth);
        }
    }

    #[test]
    fn test_penalty_for_bad_points() {
        let mut obj = objective(Divergence::Bhattacharyya);

        // Outside the box
        assert_eq!(obj.value_or_penalty(&[10.0, 0.0, 0.0]), f64::INFINITY);
        // Wrong arity
        assert_eq!(obj.value_or_penalty(&[1.0]), f64::INFINITY);
        assert!(obj.best().is_none());

        let v = obj.value_or_penalty(&[1.0, 0.0, 0.0]);
        assert!(v.is_finite());
        assert_eq!(obj.evaluator().evaluations(), 1);
    }

    #[test]
    fn test_builder_errors_propagate() {
        let eval = DivergenceEvaluator::new(&gaussian_image(), Divergence::LeastSquares).unwrap();
        let mut obj = TemplateObjective::new(eval, |p: &[f64]| Gaussian::new(p[0], 0.0, 0.0));
        assert!(matches!(
            obj.value(&[-1.0]),
            Err(DivergenceError::InvalidParameter(_))
        ));
        assert!(obj.value(&[1.0]).is_ok());
        assert_eq!(obj.into_evaluator().evaluations(), 1);
    }
}
