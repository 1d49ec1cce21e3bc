//! # Image Divergence
//!
//! Divergence objectives between an observed intensity image and a model
//! rendered on the same pixel grid, for use inside an optimizer's objective
//! (image-domain feature extraction, regularizers for interferometric
//! imaging, template fitting).
//!
//! ## Theory
//!
//! With `p` the reference image normalized to unit flux, `q` the rendered
//! model and `fm = Σ q` its flux:
//!
//! ```text
//! Bhattacharyya   -log( Σ √(p·|q|) / √fm )
//! KullbackLeibler  Σ q·log(q / (p + ε)) / fm
//! Renyi(α)         log( Σ p·(q/p)^α · fm^-α ) / (α - 1)
//! LeastSquares     Σ (p - q)²
//! ```
//!
//! ## Features
//!
//! - `std` (default): Standard library support
//! - `wasm`: WebAssembly bindings via wasm-bindgen
//!
//! ## Example
//!
//! ```rust
//! use image_divergence::{Divergence, DivergenceEvaluator, Gaussian, Image, ImageGeometry};
//!
//! let geometry = ImageGeometry::from_fov(10.0, 10.0, 32, 32).unwrap();
//! let truth = Gaussian::new(1.0, 0.5, -0.5).unwrap();
//! let image = Image::from_fn(geometry, |x, y| {
//!     image_divergence::IntensityModel::intensity_point(&truth, x, y)
//! })
//! .unwrap();
//!
//! let mut evaluator = DivergenceEvaluator::new(&image, Divergence::Bhattacharyya).unwrap();
//!
//! let good = evaluator.evaluate(&truth).unwrap();
//! let bad = evaluator.evaluate(&Gaussian::new(2.0, 0.0, 0.0).unwrap()).unwrap();
//! assert!(good < bad);
//! ```

pub mod divergence;
pub mod error;
pub mod evaluator;
pub mod image;
pub mod objective;
pub mod template;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-exports
pub use divergence::*;
pub use error::*;
pub use evaluator::*;
pub use image::*;
pub use objective::*;
pub use template::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the crate (call once, especially important for WASM)
#[cfg(feature = "wasm")]
pub fn init() {
    console_error_panic_hook::set_once();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_workflow() {
        let geometry = ImageGeometry::from_fov(16.0, 16.0, 48, 48).unwrap();
        let ring = GaussianRing::new(4.0, 0.8, 0.0, 0.0).unwrap();
        let floor = Constant::new(1e-4).unwrap();
        let truth = Sum::new(ring, floor);
        let image = Image::from_fn(geometry, |x, y| truth.intensity_point(x, y)).unwrap();

        let config = EvaluatorConfig::from_json(r#"{"divergence":{"kind":"kullback_leibler"}}"#)
            .unwrap();
        let eval = DivergenceEvaluator::with_config(&image, config).unwrap();

        let mut objective = TemplateObjective::new(eval, |p: &[f64]| -> Result<_> {
            Ok(Sum::new(GaussianRing::new(p[0], p[1], 0.0, 0.0)?, floor))
        })
        .with_bounds(Bounds::new(vec![1.0, 0.1], vec![8.0, 3.0]).unwrap());

        // Coarse scan over the ring radius
        let mut best_radius = 0.0;
        let mut best_value = f64::INFINITY;
        for k in 0..=14 {
            let radius = 1.0 + 0.5 * k as f64;
            let v = objective.value_or_penalty(&[radius, 0.8]);
            if v < best_value {
                best_value = v;
                best_radius = radius;
            }
        }

        assert_eq!(best_radius, 4.0);
        assert_eq!(objective.best().unwrap().params, vec![4.0, 0.8]);
    }
}
