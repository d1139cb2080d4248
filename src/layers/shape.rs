//! Shape inference helpers shared by the masked layers.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{LayerError, Result};

/// Convolution padding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    /// No padding; windows must fit entirely inside the input.
    #[default]
    Valid,
    /// Zero padding so that `output = ceil(input / stride)`.
    Same,
}

impl FromStr for Padding {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "valid" => Ok(Padding::Valid),
            "same" => Ok(Padding::Same),
            _ => Err(LayerError::Config(format!(
                "unknown padding '{}'; expected 'valid' or 'same'",
                s
            ))),
        }
    }
}

impl fmt::Display for Padding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Padding::Valid => write!(f, "valid"),
            Padding::Same => write!(f, "same"),
        }
    }
}

/// Output length of a convolution along one spatial axis.
///
/// - valid: `floor((input_length - kernel_size + stride) / stride)`
/// - same: `ceil(input_length / stride)`
///
/// A valid convolution over an axis shorter than the kernel has no output
/// positions and is reported as a shape error.
pub fn conv_output_length(
    input_length: usize,
    kernel_size: usize,
    padding: Padding,
    stride: usize,
) -> Result<usize> {
    if kernel_size == 0 || stride == 0 {
        return Err(LayerError::Config(format!(
            "kernel size and stride must be positive, got kernel={} stride={}",
            kernel_size, stride
        )));
    }
    match padding {
        Padding::Valid => {
            if input_length < kernel_size {
                return Err(LayerError::shape(
                    format!("spatial length >= {} for valid padding", kernel_size),
                    input_length.to_string(),
                ));
            }
            Ok((input_length - kernel_size + stride) / stride)
        }
        Padding::Same => Ok((input_length + stride - 1) / stride),
    }
}

/// Zero padding inserted before the first element of one spatial axis.
///
/// Same padding splits the total padding with the smaller half in front.
pub(crate) fn leading_padding(
    input_length: usize,
    kernel_size: usize,
    padding: Padding,
    stride: usize,
    output_length: usize,
) -> usize {
    match padding {
        Padding::Valid => 0,
        Padding::Same if output_length == 0 => 0,
        Padding::Same => {
            let total = ((output_length - 1) * stride + kernel_size).saturating_sub(input_length);
            total / 2
        }
    }
}

/// Formats a partially known shape, printing unknown axes as `?`.
pub(crate) fn format_shape(shape: &[Option<usize>]) -> String {
    let dims: Vec<String> = shape
        .iter()
        .map(|d| d.map_or_else(|| "?".to_string(), |v| v.to_string()))
        .collect();
    format!("[{}]", dims.join(", "))
}

/// Lifts a concrete shape into the partially known form used by shape inference.
pub(crate) fn known_shape(shape: &[usize]) -> Vec<Option<usize>> {
    shape.iter().map(|&d| Some(d)).collect()
}
