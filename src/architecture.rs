//! Architecture configuration structures
//!
//! This module describes stacks of masked layers in JSON files, so pruning
//! experiments can change the network without code changes. A file names the
//! input shape, an optional seed, and the layers in order.

use std::fs;

use serde::Deserialize;

use crate::error::{LayerError, Result};
use crate::layers::shape::format_shape;
use crate::layers::{MaskedConv2D, MaskedDense, Padding, Prunable};

/// Configuration for a single layer.
///
/// The `layer_type` field selects the variant:
///
/// - **masked_dense**: requires `output_neurons`
/// - **masked_conv2d**: requires `filters` and `kernel_size`, optional
///   `strides` (default `[1, 1]`) and `padding` (default `"valid"`)
///
/// Both accept an optional `name`.
///
/// # Examples
///
/// ```json
/// {
///   "layer_type": "masked_conv2d",
///   "filters": 8,
///   "kernel_size": [3, 3],
///   "strides": [1, 1],
///   "padding": "same"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "layer_type", rename_all = "snake_case")]
pub enum LayerConfig {
    MaskedDense {
        output_neurons: usize,
        #[serde(default)]
        name: Option<String>,
    },
    MaskedConv2d {
        filters: usize,
        kernel_size: [usize; 2],
        #[serde(default = "default_strides")]
        strides: [usize; 2],
        #[serde(default)]
        padding: Padding,
        #[serde(default)]
        name: Option<String>,
    },
}

fn default_strides() -> [usize; 2] {
    [1, 1]
}

impl LayerConfig {
    /// Construct the (unbuilt) layer this entry describes.
    pub fn instantiate(&self, seed: Option<u64>) -> Result<Box<dyn Prunable>> {
        match self {
            LayerConfig::MaskedDense {
                output_neurons,
                name,
            } => {
                let mut layer = MaskedDense::new(*output_neurons)?;
                if let Some(name) = name {
                    layer = layer.with_name(name.clone());
                }
                if let Some(seed) = seed {
                    layer = layer.with_seed(seed);
                }
                Ok(Box::new(layer))
            }
            LayerConfig::MaskedConv2d {
                filters,
                kernel_size,
                strides,
                padding,
                name,
            } => {
                let mut layer = MaskedConv2D::new(
                    *filters,
                    (kernel_size[0], kernel_size[1]),
                    (strides[0], strides[1]),
                    *padding,
                )?;
                if let Some(name) = name {
                    layer = layer.with_name(name.clone());
                }
                if let Some(seed) = seed {
                    layer = layer.with_seed(seed);
                }
                Ok(Box::new(layer))
            }
        }
    }
}

/// Configuration for a whole stack of masked layers.
///
/// # Example
///
/// ```json
/// {
///   "input_shape": [null, 28, 28, 1],
///   "seed": 42,
///   "layers": [
///     { "layer_type": "masked_conv2d", "filters": 8, "kernel_size": [3, 3], "padding": "same" },
///     { "layer_type": "masked_dense", "output_neurons": 10 }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArchitectureConfig {
    /// Shape of the network input; `null` marks an unknown axis such as the batch.
    pub input_shape: Vec<Option<usize>>,
    /// Base seed; layer `i` is initialized with `seed + i`.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Layers in application order.
    pub layers: Vec<LayerConfig>,
}

impl ArchitectureConfig {
    /// Propagates `input_shape` through every layer and returns the final shape.
    pub fn output_shape(&self) -> Result<Vec<Option<usize>>> {
        let mut shape = self.input_shape.clone();
        for (i, layer_config) in self.layers.iter().enumerate() {
            // Both layer types size their kernel from the last axis at build time.
            if !matches!(shape.last(), Some(Some(dim)) if *dim > 0) {
                return Err(LayerError::shape(
                    format!("known, non-zero last axis for layer {}", i),
                    format_shape(&shape),
                ));
            }
            let layer = layer_config.instantiate(None)?;
            shape = layer.output_shape(&shape)?;
        }
        Ok(shape)
    }

    fn layer_seed(&self, index: usize) -> Option<u64> {
        self.seed.map(|seed| seed.wrapping_add(index as u64))
    }
}

/// Loads an architecture configuration from a JSON file.
///
/// Reads the file at `path`, deserializes it and validates it.
///
/// # Examples
///
/// ```no_run
/// use parameter_pruning::architecture::load_architecture;
///
/// let arch = load_architecture("config/architectures/pruned_mlp.json").unwrap();
/// assert!(!arch.layers.is_empty());
/// ```
pub fn load_architecture(path: &str) -> Result<ArchitectureConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    validate_architecture(&config)?;
    Ok(config)
}

/// Validates an architecture configuration.
///
/// Checks that:
/// - Architecture has at least one layer
/// - Every layer can be constructed from its settings
/// - The input shape propagates through the whole stack
pub fn validate_architecture(config: &ArchitectureConfig) -> Result<()> {
    if config.layers.is_empty() {
        return Err(LayerError::Config(
            "architecture must have at least one layer".to_string(),
        ));
    }
    config.output_shape()?;
    Ok(())
}

/// Builds every layer of a validated configuration.
///
/// Each layer is constructed, seeded with `seed + index` when the config has a
/// seed, and built with the shape produced by the layers before it.
///
/// # Examples
///
/// ```no_run
/// use parameter_pruning::architecture::{build_model, load_architecture};
///
/// let config = load_architecture("config/architectures/pruned_cnn.json").unwrap();
/// let layers = build_model(&config).unwrap();
/// assert_eq!(layers.len(), config.layers.len());
/// ```
pub fn build_model(config: &ArchitectureConfig) -> Result<Vec<Box<dyn Prunable>>> {
    validate_architecture(config)?;

    let mut layers = Vec::with_capacity(config.layers.len());
    let mut shape = config.input_shape.clone();
    for (i, layer_config) in config.layers.iter().enumerate() {
        let mut layer = layer_config.instantiate(config.layer_seed(i))?;
        layer.build(&shape)?;
        shape = layer.output_shape(&shape)?;
        layers.push(layer);
    }
    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ArchitectureConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_conv_defaults() {
        let config = parse(
            r#"{"input_shape": [null, 8, 8, 1],
                "layers": [{"layer_type": "masked_conv2d", "filters": 2, "kernel_size": [3, 3]}]}"#,
        );
        assert_eq!(config.seed, None);
        assert_eq!(
            config.layers[0],
            LayerConfig::MaskedConv2d {
                filters: 2,
                kernel_size: [3, 3],
                strides: [1, 1],
                padding: Padding::Valid,
                name: None,
            }
        );
    }

    #[test]
    fn test_unknown_layer_type_rejected() {
        let result: std::result::Result<ArchitectureConfig, _> = serde_json::from_str(
            r#"{"input_shape": [null, 4], "layers": [{"layer_type": "batchnorm", "size": 4}]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_output_shape_propagation() {
        let config = parse(
            r#"{"input_shape": [null, 10, 10, 3],
                "layers": [
                  {"layer_type": "masked_conv2d", "filters": 4, "kernel_size": [3, 3]},
                  {"layer_type": "masked_conv2d", "filters": 6, "kernel_size": [2, 2],
                   "strides": [2, 2], "padding": "same"},
                  {"layer_type": "masked_dense", "output_neurons": 5}
                ]}"#,
        );
        assert_eq!(
            config.output_shape().unwrap(),
            vec![None, Some(4), Some(4), Some(5)]
        );
    }

    #[test]
    fn test_layer_seeds_are_offset() {
        let config = parse(
            r#"{"input_shape": [null, 3], "seed": 10,
                "layers": [{"layer_type": "masked_dense", "output_neurons": 2}]}"#,
        );
        assert_eq!(config.layer_seed(0), Some(10));
        assert_eq!(config.layer_seed(3), Some(13));
    }

    #[test]
    fn test_layers_need_known_last_axis() {
        let dense = parse(
            r#"{"input_shape": [null, null],
                "layers": [{"layer_type": "masked_dense", "output_neurons": 2}]}"#,
        );
        assert!(matches!(
            validate_architecture(&dense),
            Err(LayerError::Shape { .. })
        ));

        let conv = parse(
            r#"{"input_shape": [null, 8, 8, null],
                "layers": [{"layer_type": "masked_conv2d", "filters": 2, "kernel_size": [3, 3]}]}"#,
        );
        assert!(matches!(
            validate_architecture(&conv),
            Err(LayerError::Shape { .. })
        ));
    }
}
