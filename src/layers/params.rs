//! Parameter block shared by the masked layers.
//!
//! Holds the trainable weight and bias, the non-trainable mask, and the
//! gradient accumulators filled by `backward`.

use std::cell::RefCell;

use ndarray::ArrayD;

use crate::error::{ensure_same_shape, Result};

#[derive(Debug, Clone)]
pub(crate) struct MaskedParams {
    pub(crate) weight: ArrayD<f32>,
    pub(crate) bias: ArrayD<f32>,
    pub(crate) mask: ArrayD<f32>,
    // Interior mutability lets backward take &self, matching forward.
    grad_weight: RefCell<ArrayD<f32>>,
    grad_bias: RefCell<ArrayD<f32>>,
}

impl MaskedParams {
    /// Wraps an initialized weight with a zero bias and an all-ones mask.
    pub(crate) fn new(weight: ArrayD<f32>, bias_len: usize) -> Self {
        let shape = weight.shape().to_vec();
        Self {
            mask: ArrayD::ones(shape.clone()),
            grad_weight: RefCell::new(ArrayD::zeros(shape)),
            bias: ArrayD::zeros(vec![bias_len]),
            grad_bias: RefCell::new(ArrayD::zeros(vec![bias_len])),
            weight,
        }
    }

    /// `weight ⊙ mask`, recomputed on every call.
    pub(crate) fn effective_weight(&self) -> ArrayD<f32> {
        &self.weight * &self.mask
    }

    /// Overwrites the whole mask. The old mask survives a shape mismatch.
    pub(crate) fn replace_mask(&mut self, mask: &ArrayD<f32>) -> Result<()> {
        ensure_same_shape(self.mask.shape(), mask.shape())?;
        self.mask.assign(mask);
        Ok(())
    }

    /// Overwrites weight and bias. Both shapes are checked before either is written.
    pub(crate) fn replace_parameters(
        &mut self,
        weight: &ArrayD<f32>,
        bias: &ArrayD<f32>,
    ) -> Result<()> {
        ensure_same_shape(self.weight.shape(), weight.shape())?;
        ensure_same_shape(self.bias.shape(), bias.shape())?;
        self.weight.assign(weight);
        self.bias.assign(bias);
        Ok(())
    }

    /// Adds one backward pass worth of gradients.
    ///
    /// The weight gradient is multiplied by the mask, so pruned weights never
    /// receive an update.
    pub(crate) fn accumulate(&self, grad_weight: &ArrayD<f32>, grad_bias: &ArrayD<f32>) {
        *self.grad_weight.borrow_mut() += &(grad_weight * &self.mask);
        *self.grad_bias.borrow_mut() += grad_bias;
    }

    pub(crate) fn grad_weight(&self) -> ArrayD<f32> {
        self.grad_weight.borrow().clone()
    }

    pub(crate) fn grad_bias(&self) -> ArrayD<f32> {
        self.grad_bias.borrow().clone()
    }

    /// Gradient descent step on weight and bias, then clears the accumulators.
    pub(crate) fn apply_gradients(&mut self, learning_rate: f32) {
        let grad_w = self.grad_weight.get_mut();
        self.weight.scaled_add(-learning_rate, &*grad_w);
        grad_w.fill(0.0);

        let grad_b = self.grad_bias.get_mut();
        self.bias.scaled_add(-learning_rate, &*grad_b);
        grad_b.fill(0.0);
    }

    pub(crate) fn trainable_count(&self) -> usize {
        self.weight.len() + self.bias.len()
    }

    pub(crate) fn mask_count(&self) -> usize {
        self.mask.len()
    }
}
