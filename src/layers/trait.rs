//! Layer trait definitions for masked layers
//!
//! `Layer` is the host-framework side of a layer: lazy parameter allocation,
//! forward and backward propagation, and the gradient step on trainable
//! parameters. `Prunable` is the pruning-policy side: reading and replacing
//! the weight mask.

use ndarray::ArrayD;

use crate::error::Result;
use crate::layers::shape::known_shape;

/// Core trait for neural network layers.
///
/// Layers go through two phases. After construction they only hold their
/// configuration; the first successful `build` allocates parameters from the
/// input's feature axis, and later builds only check that axis against the
/// allocated parameters. Shapes passed to `build`
/// and `output_shape` use `None` for axes that are not known yet, typically the
/// batch axis.
///
/// # Example
///
/// ```ignore
/// let mut layer = MaskedDense::new(4)?.with_seed(42);
/// let output = layer.call(&input)?; // builds on first call
///
/// let grad_input = layer.backward(&input, &grad_output)?;
/// layer.update_parameters(0.01);
/// ```
pub trait Layer {
    /// Name given at construction, used in error messages.
    fn name(&self) -> &str;

    /// Whether parameters have been allocated.
    fn is_built(&self) -> bool;

    /// Allocate parameters for the given input shape.
    ///
    /// Calling `build` again with a compatible shape is a no-op; an
    /// incompatible shape fails with `LayerError::Shape` and leaves the
    /// existing parameters in place.
    fn build(&mut self, input_shape: &[Option<usize>]) -> Result<()>;

    /// Forward propagation through a built layer.
    ///
    /// The mask is multiplied into the weights on every call, so a mask
    /// replaced between calls takes effect immediately.
    fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>>;

    /// Build from the input's shape if needed, then run `forward`.
    fn call(&mut self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        if !self.is_built() {
            self.build(&known_shape(input.shape()))?;
        }
        self.forward(input)
    }

    /// Backward propagation through the layer.
    ///
    /// Returns the gradient with respect to `input` and accumulates
    /// batch-averaged gradients for weight and bias internally. The weight
    /// gradient is masked; the mask itself never receives a gradient.
    ///
    /// # Arguments
    ///
    /// * `input` - Input used in the corresponding forward pass
    /// * `grad_output` - Gradient of the loss with respect to the layer output
    fn backward(&self, input: &ArrayD<f32>, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>>;

    /// Apply accumulated gradients to weight and bias and clear them.
    ///
    /// weight = weight - learning_rate * gradient
    ///
    /// Does nothing on an unbuilt layer.
    fn update_parameters(&mut self, learning_rate: f32);

    /// Shape of the output produced for an input of the given shape.
    fn output_shape(&self, input_shape: &[Option<usize>]) -> Result<Vec<Option<usize>>>;

    /// Number of trainable parameters (weights and biases), 0 before build.
    fn parameter_count(&self) -> usize;

    /// Number of non-trainable parameters (mask entries), 0 before build.
    fn non_trainable_parameter_count(&self) -> usize;
}

/// Layers whose weights can be pruned through a binary mask.
///
/// This is the whole contract between a layer and a pruning policy: the policy
/// inspects the current mask, computes a new one, and installs it.
pub trait Prunable: Layer {
    /// Copy of the current mask, shaped like the weight tensor.
    ///
    /// The returned array does not alias layer state.
    fn get_mask(&self) -> Result<ArrayD<f32>>;

    /// Replace the mask.
    ///
    /// Fails with `LayerError::Shape` when `mask` is not shaped like the
    /// weight tensor, leaving the current mask unchanged. Values are not
    /// range-checked; anything other than 0 or 1 scales the weight it covers.
    fn set_mask(&mut self, mask: &ArrayD<f32>) -> Result<()>;

    /// Fraction of mask entries equal to zero.
    fn sparsity(&self) -> Result<f32> {
        let mask = self.get_mask()?;
        if mask.is_empty() {
            return Ok(0.0);
        }
        let pruned = mask.iter().filter(|&&m| m == 0.0).count();
        Ok(pruned as f32 / mask.len() as f32)
    }
}
