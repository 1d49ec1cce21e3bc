//! WebAssembly bindings for the divergence evaluator.
//!
//! Provides a JavaScript-friendly API for browser and Node.js environments,
//! where the optimizer runs in JS and renders its own models.
//!
//! ## Usage (JavaScript/TypeScript)
//!
//! ```javascript
//! import init, { WasmDivergenceEvaluator } from 'image-divergence';
//!
//! await init();
//!
//! // 2x2 reference, x varies fastest
//! const evaluator = new WasmDivergenceEvaluator(2, 2, 1.0, 1.0, [1, 0, 0, 0], 'least_squares');
//!
//! const value = evaluator.evaluate([0.25, 0.25, 0.25, 0.25]);
//! console.log(`LS = ${value}`);
//! ```

use crate::divergence::Divergence;
use crate::evaluator::{DivergenceEvaluator, EvaluatorConfig};
use crate::image::{Image, ImageGeometry};
use wasm_bindgen::prelude::*;

/// Initialize the WASM module (call once at startup)
#[wasm_bindgen(start)]
pub fn wasm_init() {
    console_error_panic_hook::set_once();
}

fn parse_divergence(kind: &str, alpha: Option<f64>) -> Result<Divergence, JsValue> {
    let d = match kind {
        "bhattacharyya" => Divergence::Bhattacharyya,
        "kullback_leibler" | "kl" => Divergence::KullbackLeibler,
        "least_squares" | "ls" => Divergence::LeastSquares,
        "renyi" => Divergence::renyi(alpha.unwrap_or(0.5))?,
        other => {
            return Err(JsValue::from_str(&format!(
                "Unknown divergence kind: {}",
                other
            )))
        }
    };
    Ok(d)
}

/// WASM-compatible divergence evaluator
#[wasm_bindgen]
pub struct WasmDivergenceEvaluator {
    evaluator: DivergenceEvaluator,
    rendered: Image,
}

#[wasm_bindgen]
impl WasmDivergenceEvaluator {
    /// Create an evaluator for a reference image given as x-fastest samples
    #[wasm_bindgen(constructor)]
    pub fn new(
        nx: usize,
        ny: usize,
        dx: f64,
        dy: f64,
        samples: Vec<f64>,
        kind: &str,
        alpha: Option<f64>,
    ) -> Result<WasmDivergenceEvaluator, JsValue> {
        let geometry = ImageGeometry::new(nx, ny, dx, dy)?;
        let reference = Image::from_samples(geometry, samples)?;
        let divergence = parse_divergence(kind, alpha)?;
        Self::build(&reference, EvaluatorConfig::new(divergence))
    }

    /// Create with custom configuration (JSON)
    #[wasm_bindgen(js_name = "withConfig")]
    pub fn with_config(
        nx: usize,
        ny: usize,
        dx: f64,
        dy: f64,
        samples: Vec<f64>,
        config_json: &str,
    ) -> Result<WasmDivergenceEvaluator, JsValue> {
        let config = EvaluatorConfig::from_json(config_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid config: {}", e)))?;
        let geometry = ImageGeometry::new(nx, ny, dx, dy)?;
        let reference = Image::from_samples(geometry, samples)?;
        Self::build(&reference, config)
    }

    /// Divergence against a model already rendered on the reference grid
    pub fn evaluate(&mut self, rendered: Vec<f64>) -> Result<f64, JsValue> {
        self.load(rendered)?;
        Ok(self.evaluator.evaluate_render(&self.rendered)?)
    }

    /// All divergence kinds at once, as JSON
    pub fn metrics(&mut self, rendered: Vec<f64>, alpha: f64) -> Result<JsValue, JsValue> {
        self.load(rendered)?;
        let metrics = self.evaluator.metrics_render(&self.rendered, alpha)?;
        let json = serde_json::to_string(&metrics)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))?;
        Ok(JsValue::from_str(&json))
    }

    /// Pixel centre x coordinates, in sample order of one row
    #[wasm_bindgen(js_name = "xCentres")]
    pub fn x_centres(&self) -> Vec<f64> {
        let g = self.evaluator.geometry();
        (0..g.nx).map(|i| g.x_centre(i)).collect()
    }

    /// Pixel centre y coordinates
    #[wasm_bindgen(js_name = "yCentres")]
    pub fn y_centres(&self) -> Vec<f64> {
        let g = self.evaluator.geometry();
        (0..g.ny).map(|j| g.y_centre(j)).collect()
    }

    /// Number of evaluations so far
    pub fn evaluations(&self) -> f64 {
        self.evaluator.evaluations() as f64
    }

    /// Get crate version
    #[wasm_bindgen(js_name = "version")]
    pub fn version() -> String {
        crate::VERSION.to_string()
    }
}

impl WasmDivergenceEvaluator {
    fn build(reference: &Image, config: EvaluatorConfig) -> Result<WasmDivergenceEvaluator, JsValue> {
        let evaluator = DivergenceEvaluator::with_config(reference, config)?;
        let rendered = Image::zeros(*evaluator.geometry())?;
        Ok(Self {
            evaluator,
            rendered,
        })
    }

    fn load(&mut self, rendered: Vec<f64>) -> Result<(), JsValue> {
        let geometry = *self.evaluator.geometry();
        self.rendered = Image::from_samples(geometry, rendered)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_wasm_evaluator_basic() {
        let mut evaluator = WasmDivergenceEvaluator::new(
            2,
            2,
            1.0,
            1.0,
            vec![1.0, 0.0, 0.0, 0.0],
            "least_squares",
            None,
        )
        .unwrap();

        let v = evaluator.evaluate(vec![0.25; 4]).unwrap();
        assert!((v - 0.75).abs() < 1e-9);
        assert!(evaluator.evaluate(vec![0.25; 3]).is_err());
    }

    #[wasm_bindgen_test]
    fn test_wasm_metrics() {
        let mut evaluator =
            WasmDivergenceEvaluator::new(2, 2, 1.0, 1.0, vec![1.0; 4], "bhattacharyya", None)
                .unwrap();

        let result = evaluator.metrics(vec![0.25; 4], 0.5).unwrap();
        assert!(!result.is_null());
        assert!(WasmDivergenceEvaluator::new(2, 2, 1.0, 1.0, vec![1.0; 4], "renyi", Some(1.0)).is_err());
    }

    #[wasm_bindgen_test]
    fn test_wasm_metrics_clamp_config() {
        let config = r#"{"divergence":{"kind":"least_squares"},"negative_intensity":"clamp"}"#;
        let mut evaluator =
            WasmDivergenceEvaluator::with_config(2, 2, 1.0, 1.0, vec![1.0; 4], config).unwrap();

        assert!(evaluator.metrics(vec![0.5, -0.1, 0.3, 0.3], 0.5).is_ok());
        assert_eq!(evaluator.evaluations(), 1.0);

        let mut strict =
            WasmDivergenceEvaluator::new(2, 2, 1.0, 1.0, vec![1.0; 4], "least_squares", None)
                .unwrap();
        assert!(strict.metrics(vec![0.5, -0.1, 0.3, 0.3], 0.5).is_err());
        assert_eq!(strict.evaluations(), 1.0);
    }
}
