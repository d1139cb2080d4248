//! Comprehensive tests for architecture parsing and building
//!
//! This file tests the architecture module including:
//! - Loading valid JSON architecture configs
//! - Parsing both masked layer types
//! - Building models from configs
//! - Handling invalid JSON and missing files
//! - Validating shape propagation between layers

use ndarray::ArrayD;
use parameter_pruning::architecture::{
    build_model, load_architecture, validate_architecture, ArchitectureConfig, LayerConfig,
};
use parameter_pruning::layers::Padding;
use parameter_pruning::LayerError;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_temp_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("failed to write temp config");
    file
}

fn load(contents: &str) -> Result<ArchitectureConfig, LayerError> {
    let temp_file = write_temp_config(contents);
    load_architecture(temp_file.path().to_str().unwrap())
}

fn bundled(name: &str) -> String {
    format!("{}/config/architectures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

// ============================================================================
// Valid Architecture Loading Tests
// ============================================================================

mod valid_architecture_tests {
    use super::*;

    #[test]
    fn test_load_masked_mlp() {
        let config = load(
            r#"{
  "input_shape": [null, 784],
  "layers": [
    {
      "layer_type": "masked_dense",
      "output_neurons": 256
    },
    {
      "layer_type": "masked_dense",
      "output_neurons": 10,
      "name": "logits"
    }
  ]
}"#,
        )
        .unwrap();

        assert_eq!(config.input_shape, vec![None, Some(784)]);
        assert_eq!(config.seed, None);
        assert_eq!(config.layers.len(), 2);
        assert_eq!(
            config.layers[1],
            LayerConfig::MaskedDense {
                output_neurons: 10,
                name: Some("logits".to_string()),
            }
        );
    }

    #[test]
    fn test_load_masked_cnn() {
        let config = load(
            r#"{
  "input_shape": [null, 28, 28, 1],
  "seed": 3,
  "layers": [
    {
      "layer_type": "masked_conv2d",
      "filters": 8,
      "kernel_size": [5, 3],
      "strides": [2, 1],
      "padding": "same"
    }
  ]
}"#,
        )
        .unwrap();

        assert_eq!(config.seed, Some(3));
        assert_eq!(
            config.layers[0],
            LayerConfig::MaskedConv2d {
                filters: 8,
                kernel_size: [5, 3],
                strides: [2, 1],
                padding: Padding::Same,
                name: None,
            }
        );
        assert_eq!(
            config.output_shape().unwrap(),
            vec![None, Some(14), Some(28), Some(8)]
        );
    }

    #[test]
    fn test_bundled_architectures_load() {
        let mlp = load_architecture(&bundled("pruned_mlp.json")).unwrap();
        assert_eq!(mlp.output_shape().unwrap(), vec![None, Some(10)]);

        let cnn = load_architecture(&bundled("pruned_cnn.json")).unwrap();
        // 28 -same-> 28 -valid 3x3 stride 2-> 13; the dense layer acts per pixel
        assert_eq!(
            cnn.output_shape().unwrap(),
            vec![None, Some(13), Some(13), Some(10)]
        );
    }
}

// ============================================================================
// Invalid Architecture Tests
// ============================================================================

mod invalid_architecture_tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let err = load_architecture("does/not/exist.json").unwrap_err();
        assert!(matches!(err, LayerError::Io(_)));
    }

    #[test]
    fn test_invalid_json() {
        let err = load(r#"{ "input_shape": [null, 4], "layers": [ "#).unwrap_err();
        assert!(matches!(err, LayerError::Json(_)));
    }

    #[test]
    fn test_unknown_layer_type() {
        let err = load(
            r#"{"input_shape": [null, 4],
                "layers": [{"layer_type": "dense", "output_size": 4}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, LayerError::Json(_)));
    }

    #[test]
    fn test_unknown_padding() {
        let err = load(
            r#"{"input_shape": [null, 8, 8, 1],
                "layers": [{"layer_type": "masked_conv2d", "filters": 2,
                            "kernel_size": [3, 3], "padding": "causal"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, LayerError::Json(_)));
    }

    #[test]
    fn test_empty_layers() {
        let err = load(r#"{"input_shape": [null, 4], "layers": []}"#).unwrap_err();
        assert!(matches!(err, LayerError::Config(_)));
    }

    #[test]
    fn test_zero_output_neurons() {
        let err = load(
            r#"{"input_shape": [null, 4],
                "layers": [{"layer_type": "masked_dense", "output_neurons": 0}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, LayerError::Config(_)));
    }

    #[test]
    fn test_zero_stride() {
        let err = load(
            r#"{"input_shape": [null, 8, 8, 1],
                "layers": [{"layer_type": "masked_conv2d", "filters": 2,
                            "kernel_size": [3, 3], "strides": [0, 1]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, LayerError::Config(_)));
    }

    #[test]
    fn test_kernel_larger_than_feature_map() {
        // second conv sees a 2x2 map
        let err = load(
            r#"{"input_shape": [null, 4, 4, 1],
                "layers": [
                  {"layer_type": "masked_conv2d", "filters": 2, "kernel_size": [3, 3]},
                  {"layer_type": "masked_conv2d", "filters": 2, "kernel_size": [3, 3]}
                ]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, LayerError::Shape { .. }));
    }

    #[test]
    fn test_zero_feature_axis_rejected_before_build() {
        let dense = r#"{"input_shape": [null, 0],
            "layers": [{"layer_type": "masked_dense", "output_neurons": 3}]}"#;
        let conv = r#"{"input_shape": [null, 8, 8, 0],
            "layers": [{"layer_type": "masked_conv2d", "filters": 2, "kernel_size": [3, 3]}]}"#;
        let unknown_channels = r#"{"input_shape": [null, 8, 8, null],
            "layers": [{"layer_type": "masked_conv2d", "filters": 2, "kernel_size": [3, 3]}]}"#;

        for contents in [dense, conv, unknown_channels] {
            let err = load(contents).unwrap_err();
            assert!(matches!(err, LayerError::Shape { .. }), "{}", contents);

            // build_model agrees with load-time validation
            let config: ArchitectureConfig = serde_json::from_str(contents).unwrap();
            assert!(validate_architecture(&config).is_err());
            assert!(build_model(&config).is_err());
        }
    }

    #[test]
    fn test_conv_after_dense_rejected() {
        let err = load(
            r#"{"input_shape": [null, 16],
                "layers": [
                  {"layer_type": "masked_dense", "output_neurons": 8},
                  {"layer_type": "masked_conv2d", "filters": 2, "kernel_size": [1, 1]}
                ]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, LayerError::Shape { .. }));
    }
}

// ============================================================================
// Model Building Tests
// ============================================================================

mod build_model_tests {
    use super::*;

    #[test]
    fn test_build_model_builds_every_layer() {
        let config = load_architecture(&bundled("pruned_cnn.json")).unwrap();
        let layers = build_model(&config).unwrap();

        assert_eq!(layers.len(), 3);
        assert!(layers.iter().all(|layer| layer.is_built()));
        assert_eq!(layers[0].name(), "conv1");
        // no flatten: the dense layer maps each pixel's 16 channels to 10
        assert_eq!(layers[2].name(), "pixel_dense");

        assert_eq!(layers[0].get_mask().unwrap().shape(), &[3, 3, 1, 8]);
        assert_eq!(layers[1].get_mask().unwrap().shape(), &[3, 3, 8, 16]);
        assert_eq!(layers[2].get_mask().unwrap().shape(), &[16, 10]);
        assert_eq!(layers[0].parameter_count(), 3 * 3 * 8 + 8);
    }

    #[test]
    fn test_build_model_forward_chain() {
        let config = load_architecture(&bundled("pruned_cnn.json")).unwrap();
        let layers = build_model(&config).unwrap();

        let mut activation = ArrayD::from_elem(vec![2, 28, 28, 1], 0.1);
        for layer in &layers {
            activation = layer.forward(&activation).unwrap();
        }
        assert_eq!(activation.shape(), &[2, 13, 13, 10]);
    }

    #[test]
    fn test_seeded_models_are_reproducible() {
        let config = load_architecture(&bundled("pruned_mlp.json")).unwrap();
        let first = build_model(&config).unwrap();
        let second = build_model(&config).unwrap();

        let input = ArrayD::from_elem(vec![1, 784], 0.5);
        assert_eq!(
            first[0].forward(&input).unwrap(),
            second[0].forward(&input).unwrap()
        );
    }

    #[test]
    fn test_layers_get_distinct_seeds() {
        let config = load(
            r#"{"input_shape": [null, 4], "seed": 1,
                "layers": [
                  {"layer_type": "masked_dense", "output_neurons": 4},
                  {"layer_type": "masked_dense", "output_neurons": 4}
                ]}"#,
        )
        .unwrap();
        let layers = build_model(&config).unwrap();

        let input = ArrayD::from_elem(vec![1, 4], 1.0);
        assert_ne!(
            layers[0].forward(&input).unwrap(),
            layers[1].forward(&input).unwrap()
        );
    }

    #[test]
    fn test_pruning_through_trait_objects() {
        let config = load_architecture(&bundled("pruned_mlp.json")).unwrap();
        let mut layers = build_model(&config).unwrap();

        let mask = ArrayD::zeros(vec![256, 10]);
        layers[1].set_mask(&mask).unwrap();
        assert_eq!(layers[1].sparsity().unwrap(), 1.0);
        assert_eq!(layers[0].sparsity().unwrap(), 0.0);

        let output = layers[1].forward(&ArrayD::ones(vec![3, 256])).unwrap();
        assert!(output.iter().all(|&v| v == 0.0));
    }
}
