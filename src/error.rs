//! Error types for masked layers and architecture loading.

use thiserror::Error;

/// Errors raised by layer construction, shape inference and mask updates.
///
/// Every failure is reported synchronously to the caller. Layers never retry
/// or fall back; an operation that fails leaves the layer as it was.
#[derive(Debug, Error)]
pub enum LayerError {
    /// Invalid construction arguments or architecture file content.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Input, mask or parameter shape incompatible with the layer.
    #[error("shape mismatch: expected {expected}, got {actual}")]
    Shape {
        /// Shape the layer requires
        expected: String,
        /// Shape that was supplied
        actual: String,
    },

    /// Parameters were requested before the layer saw its first input shape.
    #[error("layer '{0}' has not been built yet")]
    NotBuilt(String),

    /// Array could not be reshaped into the layout a computation needs.
    #[error("array layout error: {0}")]
    Layout(#[from] ndarray::ShapeError),

    #[error("failed to read architecture file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse architecture file: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LayerError>;

impl LayerError {
    pub(crate) fn shape(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        LayerError::Shape {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Fails with `LayerError::Shape` unless both concrete shapes are equal.
pub(crate) fn ensure_same_shape(expected: &[usize], actual: &[usize]) -> Result<()> {
    if expected != actual {
        return Err(LayerError::shape(
            format!("{:?}", expected),
            format!("{:?}", actual),
        ));
    }
    Ok(())
}
