//! Masked 2D convolutional layer implementation
//!
//! This module provides a MaskedConv2D layer that convolves channels-last
//! (NHWC) inputs with a kernel multiplied elementwise by a pruning mask.

use ndarray::ArrayD;

use crate::error::{LayerError, Result};
use crate::layers::params::MaskedParams;
use crate::layers::shape::{conv_output_length, format_shape, leading_padding, Padding};
use crate::layers::{Layer, Prunable};
use crate::utils::{glorot_normal, SimpleRng};

/// 2D convolutional layer with a pruning mask on its kernel.
///
/// Slides `filters` kernels over the spatial axes of the input and adds a
/// per-filter bias. The kernel is stored as
/// `[kernel_h, kernel_w, in_channels, filters]` and the mask has exactly that
/// shape.
///
/// # Fields
///
/// * `filters` - Number of output feature maps
/// * `kernel_size` - Kernel extent as (height, width)
/// * `strides` - Step between windows as (vertical, horizontal)
/// * `padding` - `Valid` or `Same`
/// * `params` - Kernel, bias and mask, allocated on build
///
/// # Example
///
/// ```ignore
/// use parameter_pruning::layers::{Layer, MaskedConv2D, Padding};
///
/// // 8 filters, 3x3 kernel, stride 1, same padding
/// let mut conv = MaskedConv2D::new(8, (3, 3), (1, 1), Padding::Same)?;
/// conv.build(&[None, Some(28), Some(28), Some(1)])?;
/// assert_eq!(conv.get_mask()?.shape(), &[3, 3, 1, 8]);
/// ```
#[derive(Debug, Clone)]
pub struct MaskedConv2D {
    name: String,
    filters: usize,
    kernel_size: (usize, usize),
    strides: (usize, usize),
    padding: Padding,
    rng: SimpleRng,
    params: Option<MaskedParams>,
}

/// Resolved geometry of one convolution over a concrete input.
#[derive(Debug, Clone, Copy)]
struct Geometry {
    batch: usize,
    in_h: usize,
    in_w: usize,
    channels: usize,
    out_h: usize,
    out_w: usize,
    pad_top: usize,
    pad_left: usize,
}

impl MaskedConv2D {
    /// Create an unbuilt MaskedConv2D layer.
    ///
    /// # Arguments
    ///
    /// * `filters` - Number of output channels
    /// * `kernel_size` - Kernel (height, width)
    /// * `strides` - Strides (vertical, horizontal)
    /// * `padding` - Padding mode
    ///
    /// # Errors
    ///
    /// `LayerError::Config` when any of `filters`, the kernel extents or the
    /// strides is 0.
    pub fn new(
        filters: usize,
        kernel_size: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
    ) -> Result<Self> {
        if filters == 0 {
            return Err(LayerError::Config(
                "filters must be greater than 0".to_string(),
            ));
        }
        if kernel_size.0 == 0 || kernel_size.1 == 0 {
            return Err(LayerError::Config(format!(
                "kernel_size must be positive, got {:?}",
                kernel_size
            )));
        }
        if strides.0 == 0 || strides.1 == 0 {
            return Err(LayerError::Config(format!(
                "strides must be positive, got {:?}",
                strides
            )));
        }
        Ok(Self {
            name: "masked_conv2d".to_string(),
            filters,
            kernel_size,
            strides,
            padding,
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

    pub fn filters(&self) -> usize {
        self.filters
    }

    pub fn kernel_size(&self) -> (usize, usize) {
        self.kernel_size
    }

    pub fn strides(&self) -> (usize, usize) {
        self.strides
    }

    pub fn padding(&self) -> Padding {
        self.padding
    }

    /// Number of input channels, known once the layer is built.
    pub fn in_channels(&self) -> Option<usize> {
        self.params.as_ref().map(|p| p.weight.shape()[2])
    }

    /// Stored kernel, without the mask applied.
    pub fn weight(&self) -> Result<&ArrayD<f32>> {
        Ok(&self.params()?.weight)
    }

    pub fn bias(&self) -> Result<&ArrayD<f32>> {
        Ok(&self.params()?.bias)
    }

    /// Kernel as the forward pass sees it: `weight ⊙ mask`.
    pub fn effective_weight(&self) -> Result<ArrayD<f32>> {
        Ok(self.params()?.effective_weight())
    }

    pub fn weight_gradient(&self) -> Result<ArrayD<f32>> {
        Ok(self.params()?.grad_weight())
    }

    pub fn bias_gradient(&self) -> Result<ArrayD<f32>> {
        Ok(self.params()?.grad_bias())
    }

    /// Overwrite kernel and bias.
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

    fn geometry(&self, shape: &[usize], in_channels: usize) -> Result<Geometry> {
        if shape.len() != 4 || shape[3] != in_channels {
            return Err(LayerError::shape(
                format!("[batch, height, width, {}]", in_channels),
                format!("{:?}", shape),
            ));
        }
        let (kh, kw) = self.kernel_size;
        let (sh, sw) = self.strides;
        let out_h = conv_output_length(shape[1], kh, self.padding, sh)?;
        let out_w = conv_output_length(shape[2], kw, self.padding, sw)?;
        Ok(Geometry {
            batch: shape[0],
            in_h: shape[1],
            in_w: shape[2],
            channels: in_channels,
            out_h,
            out_w,
            pad_top: leading_padding(shape[1], kh, self.padding, sh, out_h),
            pad_left: leading_padding(shape[2], kw, self.padding, sw, out_w),
        })
    }

    /// Input row/column read by kernel offset `k` at output position `o`,
    /// or None when it falls in the zero padding.
    fn source_index(o: usize, stride: usize, k: usize, pad: usize, len: usize) -> Option<usize> {
        (o * stride + k).checked_sub(pad).filter(|&i| i < len)
    }
}

impl Layer for MaskedConv2D {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_built(&self) -> bool {
        self.params.is_some()
    }

    fn build(&mut self, input_shape: &[Option<usize>]) -> Result<()> {
        if input_shape.len() != 4 {
            return Err(LayerError::shape(
                "rank 4 input [batch, height, width, channels]",
                format_shape(input_shape),
            ));
        }
        let channels = match input_shape[3] {
            Some(c) if c > 0 => c,
            _ => {
                return Err(LayerError::shape(
                    "known, non-zero channel axis",
                    format_shape(input_shape),
                ))
            }
        };

        if let Some(existing) = self.in_channels() {
            if existing != channels {
                return Err(LayerError::shape(
                    format!("{} channels (layer '{}' is already built)", existing, self.name),
                    format_shape(input_shape),
                ));
            }
        }
        // Rejects spatial axes the kernel cannot cover before anything is allocated.
        self.output_shape(input_shape)?;
        if self.params.is_some() {
            return Ok(());
        }

        let (kh, kw) = self.kernel_size;
        let weight = glorot_normal(&[kh, kw, channels, self.filters], &mut self.rng);
        self.params = Some(MaskedParams::new(weight, self.filters));
        Ok(())
    }

    fn forward(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let params = self.params()?;
        let g = self.geometry(input.shape(), params.weight.shape()[2])?;
        let (kh, kw) = self.kernel_size;
        let (sh, sw) = self.strides;
        let filters = self.filters;

        let x: Vec<f32> = input.iter().copied().collect();
        let kernel: Vec<f32> = params.effective_weight().iter().copied().collect();
        let bias: Vec<f32> = params.bias.iter().copied().collect();
        let mut output = vec![0.0f32; g.batch * g.out_h * g.out_w * filters];

        for b in 0..g.batch {
            for oy in 0..g.out_h {
                for ox in 0..g.out_w {
                    let out_base = ((b * g.out_h + oy) * g.out_w + ox) * filters;
                    let out_px = &mut output[out_base..out_base + filters];
                    out_px.copy_from_slice(&bias);

                    for ky in 0..kh {
                        let Some(iy) = Self::source_index(oy, sh, ky, g.pad_top, g.in_h) else {
                            continue;
                        };
                        for kx in 0..kw {
                            let Some(ix) = Self::source_index(ox, sw, kx, g.pad_left, g.in_w)
                            else {
                                continue;
                            };
                            let in_base = ((b * g.in_h + iy) * g.in_w + ix) * g.channels;

                            for ic in 0..g.channels {
                                let xv = x[in_base + ic];
                                let w_base = ((ky * kw + kx) * g.channels + ic) * filters;
                                let w_row = &kernel[w_base..w_base + filters];
                                for (o, &w) in out_px.iter_mut().zip(w_row) {
                                    *o += xv * w;
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(ArrayD::from_shape_vec(
            vec![g.batch, g.out_h, g.out_w, filters],
            output,
        )?)
    }

    fn backward(&self, input: &ArrayD<f32>, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let params = self.params()?;
        let g = self.geometry(input.shape(), params.weight.shape()[2])?;
        let (kh, kw) = self.kernel_size;
        let (sh, sw) = self.strides;
        let filters = self.filters;

        let expected = [g.batch, g.out_h, g.out_w, filters];
        if grad_output.shape() != expected {
            return Err(LayerError::shape(
                format!("{:?}", expected),
                format!("{:?}", grad_output.shape()),
            ));
        }

        let scale = 1.0 / g.batch.max(1) as f32;
        let x: Vec<f32> = input.iter().copied().collect();
        let grad: Vec<f32> = grad_output.iter().copied().collect();
        let kernel: Vec<f32> = params.effective_weight().iter().copied().collect();

        let mut grad_w = vec![0.0f32; kernel.len()];
        let mut grad_b = vec![0.0f32; filters];
        let mut grad_input = vec![0.0f32; x.len()];

        for b in 0..g.batch {
            for oy in 0..g.out_h {
                for ox in 0..g.out_w {
                    let out_base = ((b * g.out_h + oy) * g.out_w + ox) * filters;
                    let g_px = &grad[out_base..out_base + filters];

                    for (gb, &gv) in grad_b.iter_mut().zip(g_px) {
                        *gb += gv * scale;
                    }

                    for ky in 0..kh {
                        let Some(iy) = Self::source_index(oy, sh, ky, g.pad_top, g.in_h) else {
                            continue;
                        };
                        for kx in 0..kw {
                            let Some(ix) = Self::source_index(ox, sw, kx, g.pad_left, g.in_w)
                            else {
                                continue;
                            };
                            let in_base = ((b * g.in_h + iy) * g.in_w + ix) * g.channels;

                            for ic in 0..g.channels {
                                let xv = x[in_base + ic];
                                let w_base = ((ky * kw + kx) * g.channels + ic) * filters;
                                let mut gi = 0.0f32;
                                for oc in 0..filters {
                                    grad_w[w_base + oc] += xv * g_px[oc] * scale;
                                    gi += g_px[oc] * kernel[w_base + oc];
                                }
                                grad_input[in_base + ic] += gi;
                            }
                        }
                    }
                }
            }
        }

        let grad_w = ArrayD::from_shape_vec(params.weight.shape().to_vec(), grad_w)?;
        let grad_b = ArrayD::from_shape_vec(vec![filters], grad_b)?;
        params.accumulate(&grad_w, &grad_b);

        Ok(ArrayD::from_shape_vec(input.shape().to_vec(), grad_input)?)
    }

    fn update_parameters(&mut self, learning_rate: f32) {
        if let Some(params) = self.params.as_mut() {
            params.apply_gradients(learning_rate);
        }
    }

    fn output_shape(&self, input_shape: &[Option<usize>]) -> Result<Vec<Option<usize>>> {
        if input_shape.len() != 4 {
            return Err(LayerError::shape(
                "rank 4 input [batch, height, width, channels]",
                format_shape(input_shape),
            ));
        }
        if input_shape[3] == Some(0) {
            return Err(LayerError::shape(
                "non-zero channel axis",
                format_shape(input_shape),
            ));
        }
        if let (Some(c), Some(in_channels)) = (input_shape[3], self.in_channels()) {
            if c != in_channels {
                return Err(LayerError::shape(
                    format!("[batch, height, width, {}]", in_channels),
                    format_shape(input_shape),
                ));
            }
        }

        let (kh, kw) = self.kernel_size;
        let (sh, sw) = self.strides;
        let rows = input_shape[1]
            .map(|h| conv_output_length(h, kh, self.padding, sh))
            .transpose()?;
        let cols = input_shape[2]
            .map(|w| conv_output_length(w, kw, self.padding, sw))
            .transpose()?;
        Ok(vec![input_shape[0], rows, cols, Some(self.filters)])
    }

    fn parameter_count(&self) -> usize {
        self.params.as_ref().map_or(0, |p| p.trainable_count())
    }

    fn non_trainable_parameter_count(&self) -> usize {
        self.params.as_ref().map_or(0, |p| p.mask_count())
    }
}

impl Prunable for MaskedConv2D {
    fn get_mask(&self) -> Result<ArrayD<f32>> {
        Ok(self.params()?.mask.clone())
    }

    fn set_mask(&mut self, mask: &ArrayD<f32>) -> Result<()> {
        self.params_mut()?.replace_mask(mask)
    }
}
