//! Simple random number generator for reproducible initialization.
//!
//! A small xorshift PRNG with a Box-Muller Gaussian sampler. Layers own one
//! of these so that a fixed seed always produces the same weights.

use std::time::{SystemTime, UNIX_EPOCH};

const FALLBACK_STATE: u64 = 0x9e3779b97f4a7c15;

/// Xorshift generator with uniform and Gaussian sampling.
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: u64,
    spare_gaussian: Option<f32>,
}

impl SimpleRng {
    /// Create a new RNG with explicit seed (if zero, use a fixed value).
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { FALLBACK_STATE } else { seed };
        Self {
            state,
            spare_gaussian: None,
        }
    }

    /// Create an RNG seeded from the current time.
    pub fn from_time() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        Self::new(nanos)
    }

    /// Basic xorshift to generate u32.
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        (x >> 32) as u32
    }

    /// Uniform sample in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        // 24 bits fit the f32 mantissa exactly, so the result never rounds up to 1.0.
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Uniform sample in [low, high).
    pub fn gen_range_f32(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32()
    }

    /// Standard normal sample (mean 0, std 1).
    ///
    /// Box-Muller produces samples in pairs; the second one is cached and
    /// returned by the next call.
    pub fn next_gaussian(&mut self) -> f32 {
        if let Some(z) = self.spare_gaussian.take() {
            return z;
        }
        // u1 in (0, 1] keeps ln() finite
        let u1 = 1.0 - self.next_f32();
        let u2 = self.next_f32();
        let radius = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f32::consts::PI * u2;
        self.spare_gaussian = Some(radius * theta.sin());
        radius * theta.cos()
    }
}
