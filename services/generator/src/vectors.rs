//! Random vector source
//!
//! Endless stream of vectors with samples drawn from the standard normal
//! distribution (Box-Muller over a uniform `StdRng`).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;

pub struct VectorSource {
    rng: StdRng,
    size: usize,
    spare: Option<f64>,
}

impl VectorSource {
    /// Source of `size`-sample vectors; `seed` makes the stream reproducible
    pub fn new(size: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            size,
            spare: None,
        }
    }

    pub fn vector_size(&self) -> usize {
        self.size
    }

    pub fn next_vector(&mut self) -> Vec<f64> {
        (0..self.size).map(|_| self.standard_normal()).collect()
    }

    fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.spare.take() {
            return z;
        }
        // u1 in (0, 1] keeps ln() finite
        let u1: f64 = 1.0 - self.rng.gen::<f64>();
        let u2: f64 = self.rng.gen();
        let radius = (-2.0 * u1.ln()).sqrt();
        let theta = TAU * u2;
        self.spare = Some(radius * theta.sin());
        radius * theta.cos()
    }
}

impl Iterator for VectorSource {
    type Item = Vec<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_vector())
    }
}
