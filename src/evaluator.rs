//! Divergence evaluator - the object an optimizer's objective calls.
//!
//! Holds the normalized reference image and a scratch grid of the same
//! geometry. Every evaluation renders the model into the scratch grid,
//! validates it, and reduces the (reference, rendered) pair to one scalar.
//!
//! Evaluation takes `&mut self` because the scratch grid is reused; one
//! evaluator cannot be driven from several threads at once. Give each
//! worker its own evaluator, or wrap it in a lock.

use crate::divergence::{
    check_rendered, Divergence, DivergenceMetrics, NegativeIntensity, RenderedFlux,
};
use crate::error::{DivergenceError, Result};
use crate::image::{Image, ImageGeometry};
use crate::template::{IntensityModel, Render};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

/// Evaluator configuration
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Divergence kind
    #[serde(default)]
    pub divergence: Divergence,

    /// Handling of negative rendered samples
    #[serde(default)]
    pub negative_intensity: NegativeIntensity,
}

impl EvaluatorConfig {
    pub fn new(divergence: Divergence) -> Self {
        Self {
            divergence,
            ..Default::default()
        }
    }

    pub fn with_negative_intensity(mut self, policy: NegativeIntensity) -> Self {
        self.negative_intensity = policy;
        self
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| DivergenceError::SerializationError(e.to_string()))
    }

    /// Deserialize from JSON and validate
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DivergenceError::SerializationError(e.to_string()))?;
        config.divergence.validate()?;
        Ok(config)
    }
}

/// Compares rendered models against a fixed reference image.
#[derive(Debug, Clone)]
pub struct DivergenceEvaluator {
    config: EvaluatorConfig,
    reference: Image,
    scratch: Image,
    evaluations: u64,
}

impl DivergenceEvaluator {
    /// Create an evaluator with the default negative-intensity policy
    pub fn new(reference: &Image, divergence: Divergence) -> Result<Self> {
        Self::with_config(reference, EvaluatorConfig::new(divergence))
    }

    /// Create with custom configuration
    pub fn with_config(reference: &Image, config: EvaluatorConfig) -> Result<Self> {
        config.divergence.validate()?;
        reference.geometry().validate()?;

        if let Some((idx, v)) = reference
            .samples()
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(DivergenceError::InvalidImage(format!(
                "reference sample {} must be non-negative and finite, got {}",
                idx, v
            )));
        }

        let reference = reference.normalized()?;
        let scratch = Image::zeros(*reference.geometry())?;

        debug!(
            "DivergenceEvaluator: {} on {} ({:?} negative samples)",
            config.divergence,
            reference.geometry(),
            config.negative_intensity
        );

        Ok(Self {
            config,
            reference,
            scratch,
            evaluations: 0,
        })
    }

    #[inline]
    pub fn divergence(&self) -> &Divergence {
        &self.config.divergence
    }

    #[inline]
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Normalized reference image (samples sum to 1)
    #[inline]
    pub fn reference(&self) -> &Image {
        &self.reference
    }

    /// Grid holding the most recently rendered model
    #[inline]
    pub fn scratch(&self) -> &Image {
        &self.scratch
    }

    #[inline]
    pub fn geometry(&self) -> &ImageGeometry {
        self.reference.geometry()
    }

    /// Number of evaluation calls so far, successful or not
    #[inline]
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Divergence between the reference and `model` sampled at pixel centres.
    pub fn evaluate<M>(&mut self, model: &M) -> Result<f64>
    where
        M: IntensityModel + ?Sized,
    {
        self.evaluations += 1;
        self.scratch.fill_with(|x, y| model.intensity_point(x, y));
        self.reduce()
    }

    /// Divergence between the reference and a model that renders itself.
    pub fn evaluate_render<R>(&mut self, model: &R) -> Result<f64>
    where
        R: Render + ?Sized,
    {
        self.evaluations += 1;
        self.render_into_scratch(model)?;
        self.reduce()
    }

    /// Every divergence kind for one model, Renyi at order `alpha`.
    pub fn metrics<M>(&mut self, model: &M, alpha: f64) -> Result<DivergenceMetrics>
    where
        M: IntensityModel + ?Sized,
    {
        self.evaluations += 1;
        self.scratch.fill_with(|x, y| model.intensity_point(x, y));
        self.reduce_metrics(alpha)
    }

    /// Every divergence kind for a model that renders itself.
    pub fn metrics_render<R>(&mut self, model: &R, alpha: f64) -> Result<DivergenceMetrics>
    where
        R: Render + ?Sized,
    {
        self.evaluations += 1;
        self.render_into_scratch(model)?;
        self.reduce_metrics(alpha)
    }

    fn render_into_scratch<R>(&mut self, model: &R) -> Result<()>
    where
        R: Render + ?Sized,
    {
        model.render(&mut self.scratch)?;
        if let Err(err) = self.geometry().ensure_matches(self.scratch.geometry()) {
            // A renderer replaced the grid outright; restore it for the next call.
            self.scratch = Image::zeros(*self.reference.geometry())?;
            return Err(err);
        }
        Ok(())
    }

    /// Apply the negative-intensity policy to the scratch grid.
    fn check_scratch(&mut self) -> Result<RenderedFlux> {
        let rendered = check_rendered(self.scratch.samples_mut(), self.config.negative_intensity)?;
        if rendered.clamped > 0 {
            debug!(
                "DivergenceEvaluator: clamped {} negative samples to zero",
                rendered.clamped
            );
        }
        Ok(rendered)
    }

    fn reduce(&mut self) -> Result<f64> {
        let rendered = self.check_scratch()?;

        let value = self.config.divergence.evaluate_samples(
            self.reference.samples(),
            self.scratch.samples(),
            rendered.flux,
        )?;

        trace!(
            "DivergenceEvaluator: #{} {} = {} (flux {})",
            self.evaluations,
            self.config.divergence,
            value,
            rendered.flux
        );
        Ok(value)
    }

    fn reduce_metrics(&mut self, alpha: f64) -> Result<DivergenceMetrics> {
        let rendered = self.check_scratch()?;

        let metrics =
            DivergenceMetrics::compute(self.reference.samples(), self.scratch.samples(), alpha)?;

        trace!(
            "DivergenceEvaluator: #{} metrics {:?} (flux {})",
            self.evaluations,
            metrics,
            rendered.flux
        );
        Ok(metrics)
    }
}
