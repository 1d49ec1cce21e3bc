//! Error types for divergence evaluation.

use crate::image::ImageGeometry;
use thiserror::Error;

/// Main error type for divergence evaluation.
#[derive(Error, Debug, Clone)]
pub enum DivergenceError {
    /// Grid dimensions or pixel sizes don't match
    #[error("Shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch {
        expected: ImageGeometry,
        got: ImageGeometry,
    },

    /// Sample count doesn't match the grid it is meant to fill
    #[error("Sample count mismatch: expected {expected}, got {got}")]
    SampleCountMismatch { expected: usize, got: usize },

    /// Invalid divergence or template parameter (e.g. Renyi with alpha = 1)
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Rendered model cannot be compared (zero flux, NaN, negative samples)
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Reference image or grid geometry is malformed
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type alias for divergence operations.
pub type Result<T> = std::result::Result<T, DivergenceError>;

impl DivergenceError {
    /// Check if an optimizer can step away from this error and keep going.
    ///
    /// Model and parameter errors depend on the point being evaluated;
    /// shape and image errors mean the evaluator itself was set up wrong.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DivergenceError::InvalidModel(_) | DivergenceError::InvalidParameter(_)
        )
    }
}

#[cfg(feature = "wasm")]
impl From<DivergenceError> for wasm_bindgen::JsValue {
    fn from(err: DivergenceError) -> Self {
        wasm_bindgen::JsValue::from_str(&err.to_string())
    }
}
