//! Masked dense (fully connected) layer implementation
//!
//! This module provides a MaskedDense layer that performs the transformation
//! `output = input × (weights ⊙ mask) + biases`, where the mask is a
//! non-trainable tensor shaped like the weight matrix.

use ndarray::{ArrayD, Axis, Ix1, Ix2};

use crate::error::{LayerError, Result};
use crate::layers::params::MaskedParams;
use crate::layers::shape::format_shape;
use crate::layers::{Layer, Prunable};
use crate::utils::{glorot_normal, SimpleRng};

/// Dense layer with a pruning mask on its weight matrix.
///
/// Performs the linear transformation: y = x(W ⊙ M) + b
/// where x is the input (batch × ... × input_dim),
/// W is the weight matrix (input_dim × output_neurons),
/// M is the mask (same shape as W) and b is the bias vector (output_neurons).
///
/// Construction only stores the configuration. `input_dim` is taken from the
/// last axis of the first input shape the layer is built with.
///
/// # Example
///
/// ```ignore
/// use parameter_pruning::layers::{Layer, MaskedDense, Prunable};
///
/// let mut layer = MaskedDense::new(4)?.with_seed(42);
/// layer.build(&[None, Some(3)])?;
/// assert_eq!(layer.get_mask()?.shape(), &[3, 4]);
/// ```
#[derive(Debug, Clone)]
pub struct MaskedDense {
    name: String,
    output_neurons: usize,
    rng: SimpleRng,
    params: Option<MaskedParams>,
}

impl MaskedDense {
    /// Create an unbuilt MaskedDense layer.
    ///
    /// Weights are allocated on `build` (or the first `call`) using Glorot
    /// normal initialization; biases start at zero and the mask at one.
    ///
    /// # Errors
    ///
    /// `LayerError::Config` when `output_neurons` is 0.
    pub fn new(output_neurons: usize) -> Result<Self> {
        if output_neurons == 0 {
            return Err(LayerError::Config(
                "output_neurons must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            name: "masked_dense".to_string(),
            output_neurons,
            rng: SimpleRng::from_time(),
            params: None,
        })
    }

    /// Set the layer name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Seed the initializer so that builds are reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SimpleRng::new(seed);
        self
    }

    /// Get the number of output features.
    pub fn output_neurons(&self) -> usize {
        self.output_neurons
    }

    /// Get the number of input features, known once the layer is built.
    pub fn input_dim(&self) -> Option<usize> {
        self.params.as_ref().map(|p| p.weight.shape()[0])
    }

    /// Stored weight matrix, without the mask applied.
    pub fn weight(&self) -> Result<&ArrayD<f32>> {
        Ok(&self.params()?.weight)
    }

    pub fn bias(&self) -> Result<&ArrayD<f32>> {
        Ok(&self.params()?.bias)
    }

    /// Weight matrix as the forward pass sees it: `weight ⊙ mask`.
    pub fn effective_weight(&self) -> Result<ArrayD<f32>> {
        Ok(self.params()?.effective_weight())
    }

    /// Accumulated weight gradient since the last update.
    pub fn weight_gradient(&self) -> Result<ArrayD<f32>> {
        Ok(self.params()?.grad_weight())
    }

    /// Accumulated bias gradient since the last update.
    pub fn bias_gradient(&self) -> Result<ArrayD<f32>> {
        Ok(self.params()?.grad_bias())
    }

    /// Overwrite weight and bias, e.g. when restoring a checkpoint.
    pub fn set_parameters(&mut self, weight: &ArrayD<f32>, bias: &ArrayD<f32>) -> Result<()> {
        self.params_mut()?.replace_parameters(weight, bias)
    }

    fn params(&self) -> Result<&MaskedParams> {
        self.params
            .as_ref()
            .ok_or_else(|| LayerError::NotBuilt(self.name.clone()))
    }

    fn params_mut(&mut self) -> Result<&mut MaskedParams> {
        let name = &self.name;
        self.params
            .as_mut()
            .ok_or_else(|| LayerError::NotBuilt(name.clone()))
    }

    /// Checks that `shape` ends in `input_dim` and returns the number of rows
    /// once all leading axes are flattened.
    fn flat_rows(&self, shape: &[usize], input_dim: usize) -> Result<usize> {
        if shape.len() < 2 || shape[shape.len() - 1] != input_dim {
            return Err(LayerError::shape(
                format!("[batch, ..., {}]", input_dim),
                format!("{:?}", shape),
            ));
        }
        Ok(shape[..shape.len() - 1].iter().product())
    }
}

impl Layer for MaskedDense {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_built(&self) -> bool {
        self.params.is_some()
    }

    fn build(&mut self, input_shape: &[Option<usize>]) -> Result<()> {
        if input_shape.len() < 2 {
            return Err(LayerError::shape(
                "input of rank >= 2",
                format_shape(input_shape),
            ));
        }
        let input_dim = match input_shape.last() {
            Some(&Some(dim)) if dim > 0 => dim,
            _ => {
                return Err(LayerError::shape(
                    "known, non-zero last axis",
                    format_shape(input_shape),
                ))
            }
        };

        if let Some(existing) = self.input_dim() {
            if existing == input_dim {
                return Ok(());
            }
            return Err(LayerError::shape(
                format!("last axis {} (layer '{}' is already built)", existing, self.name),
                format_shape(input_shape),
            ));
        }

        let weight = glorot_normal(&[input_dim, self.output_neurons], &mut self.rng);
        self.params = Some(MaskedParams::new(weight, self.output_neurons));
        Ok(())
    }

    fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let params = self.params()?;
        let input_dim = params.weight.shape()[0];
        let rows = self.flat_rows(input.shape(), input_dim)?;

        let x = input.as_standard_layout();
        let x2 = x.view().into_shape((rows, input_dim))?;
        let w = params.effective_weight().into_dimensionality::<Ix2>()?;
        let b = params.bias.view().into_dimensionality::<Ix1>()?;

        let mut output = x2.dot(&w);
        output += &b;

        let mut output_shape = input.shape().to_vec();
        let last = output_shape.len() - 1;
        output_shape[last] = self.output_neurons;
        Ok(output.into_shape(output_shape)?)
    }

    fn backward(&self, input: &ArrayD<f32>, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let params = self.params()?;
        let input_dim = params.weight.shape()[0];
        let rows = self.flat_rows(input.shape(), input_dim)?;

        let mut expected = input.shape().to_vec();
        let last = expected.len() - 1;
        expected[last] = self.output_neurons;
        if grad_output.shape() != expected.as_slice() {
            return Err(LayerError::shape(
                format!("{:?}", expected),
                format!("{:?}", grad_output.shape()),
            ));
        }

        let x = input.as_standard_layout();
        let x2 = x.view().into_shape((rows, input_dim))?;
        let g = grad_output.as_standard_layout();
        let g2 = g.view().into_shape((rows, self.output_neurons))?;

        let batch_size = input.shape()[0].max(1);
        let scale = 1.0 / batch_size as f32;

        let grad_w = x2.t().dot(&g2) * scale;
        let grad_b = g2.sum_axis(Axis(0)) * scale;
        params.accumulate(&grad_w.into_dyn(), &grad_b.into_dyn());

        let w = params.effective_weight().into_dimensionality::<Ix2>()?;
        let grad_input = g2.dot(&w.t());
        Ok(grad_input.into_shape(input.shape().to_vec())?)
    }

    fn update_parameters(&mut self, learning_rate: f32) {
        if let Some(params) = self.params.as_mut() {
            params.apply_gradients(learning_rate);
        }
    }

    fn output_shape(&self, input_shape: &[Option<usize>]) -> Result<Vec<Option<usize>>> {
        if input_shape.len() < 2 {
            return Err(LayerError::shape(
                "input of rank >= 2",
                format_shape(input_shape),
            ));
        }
        let last = input_shape.len() - 1;
        if input_shape[last] == Some(0) {
            return Err(LayerError::shape(
                "non-zero last axis",
                format_shape(input_shape),
            ));
        }
        if let (Some(dim), Some(input_dim)) = (input_shape[last], self.input_dim()) {
            if dim != input_dim {
                return Err(LayerError::shape(
                    format!("[batch, ..., {}]", input_dim),
                    format_shape(input_shape),
                ));
            }
        }
        let mut output_shape = input_shape.to_vec();
        output_shape[last] = Some(self.output_neurons);
        Ok(output_shape)
    }

    fn parameter_count(&self) -> usize {
        self.params.as_ref().map_or(0, |p| p.trainable_count())
    }

    fn non_trainable_parameter_count(&self) -> usize {
        self.params.as_ref().map_or(0, |p| p.mask_count())
    }
}

impl Prunable for MaskedDense {
    fn get_mask(&self) -> Result<ArrayD<f32>> {
        Ok(self.params()?.mask.clone())
    }

    fn set_mask(&mut self, mask: &ArrayD<f32>) -> Result<()> {
        self.params_mut()?.replace_mask(mask)
    }
}
