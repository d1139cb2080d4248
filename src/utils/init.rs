//! Weight initializers.
//!
//! Glorot (Xavier) normal initialization as used by both masked layers:
//! a normal distribution with `std = sqrt(2 / (fan_in + fan_out))`,
//! truncated at two standard deviations.

use ndarray::ArrayD;

use crate::utils::rng::SimpleRng;

/// Standard deviation of a unit normal truncated to [-2, 2].
///
/// Dividing the target std by this keeps the variance of the truncated
/// samples equal to the untruncated target.
const TRUNCATED_NORMAL_STD: f32 = 0.879_625_66;

/// Fan-in and fan-out of a weight tensor.
///
/// Dense weights are `[fan_in, fan_out]`. Convolution kernels are
/// `[kernel_h, kernel_w, in_channels, out_channels]`, where the receptive field
/// multiplies both fans.
pub fn compute_fans(shape: &[usize]) -> (usize, usize) {
    match shape.len() {
        0 => (1, 1),
        1 => (shape[0], shape[0]),
        2 => (shape[0], shape[1]),
        n => {
            let receptive_field: usize = shape[..n - 2].iter().product();
            (shape[n - 2] * receptive_field, shape[n - 1] * receptive_field)
        }
    }
}

/// Glorot normal initialization for a tensor of the given shape.
pub fn glorot_normal(shape: &[usize], rng: &mut SimpleRng) -> ArrayD<f32> {
    let (fan_in, fan_out) = compute_fans(shape);
    let std = (2.0 / (fan_in + fan_out).max(1) as f32).sqrt() / TRUNCATED_NORMAL_STD;
    ArrayD::from_shape_simple_fn(shape, || truncated_normal(rng, std))
}

fn truncated_normal(rng: &mut SimpleRng, std: f32) -> f32 {
    loop {
        let z = rng.next_gaussian();
        if z.abs() <= 2.0 {
            return z * std;
        }
    }
}
