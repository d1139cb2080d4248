//! Masked layers for weight pruning
//!
//! This module provides the Layer and Prunable traits and the two masked layer
//! types, MaskedDense and MaskedConv2D, together with the shape inference they
//! share.

mod params;
mod r#trait;
pub mod conv2d;
pub mod dense;
pub mod shape;

// Re-export the traits and layers for convenience
pub use conv2d::MaskedConv2D;
pub use dense::MaskedDense;
pub use r#trait::{Layer, Prunable};
pub use shape::{conv_output_length, Padding};
