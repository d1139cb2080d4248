//! Shared utilities for the masked layers
//!
//! Seeded random number generation and the weight initializers built on it.

pub mod init;
pub mod rng;

pub use init::{compute_fans, glorot_normal};
pub use rng::SimpleRng;
