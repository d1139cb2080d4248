//! Parameter pruning layers
//!
//! Dense and 2D convolution layers whose weights are multiplied by a binary
//! mask on every forward pass. A pruning policy reads the mask with
//! `get_mask`, decides which weights to drop, and installs a new mask with
//! `set_mask`; the rest of the network keeps working unchanged.
//!
//! # Modules
//!
//! - `layers`: `Layer` / `Prunable` traits, `MaskedDense`, `MaskedConv2D`
//! - `architecture`: JSON architecture files and model building
//! - `utils`: seeded RNG and weight initializers
//! - `error`: error type shared by the whole crate

pub mod architecture;
pub mod error;
pub mod layers;
pub mod utils;

pub use error::{LayerError, Result};
pub use layers::{Layer, MaskedConv2D, MaskedDense, Padding, Prunable};
