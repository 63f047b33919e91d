// SPDX-License-Identifier: Apache-2.0

//! Injectable outcome sources for simulated attacks. The default is a fixed
//! threshold so scenario outcomes are reproducible in tests; simulation modes can
//! opt into a pseudo-random source with an explicit seed, which is equally
//! reproducible across runs with the same seed.

use rand::{rngs::StdRng, Rng, SeedableRng};

/// Decides whether a simulated attack with a given success rate succeeds
pub trait OutcomeSource: Send {
    fn decide(&mut self, success_rate: f64) -> bool;
}

/// Deterministic default: succeed exactly when the crafted exploit's success rate
/// clears the threshold
#[derive(Debug, Clone, Copy)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(threshold: f64) -> Self {
        Self(threshold)
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(0.5)
    }
}

impl OutcomeSource for Threshold {
    fn decide(&mut self, success_rate: f64) -> bool {
        success_rate >= self.0
    }
}

/// Seeded pseudo-random source for simulation modes. Same seed, same decision
/// sequence.
#[derive(Debug, Clone)]
pub struct Seeded {
    rng: StdRng,
}

impl Seeded {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl OutcomeSource for Seeded {
    fn decide(&mut self, success_rate: f64) -> bool {
        self.rng.gen::<f64>() < success_rate
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_threshold_is_deterministic() {
        let mut source = Threshold::default();
        assert!(source.decide(0.85));
        assert!(source.decide(0.5));
        assert!(!source.decide(0.49));
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let mut a = Seeded::new(42);
        let mut b = Seeded::new(42);
        let decisions_a = (0..64).map(|_| a.decide(0.7)).collect::<Vec<_>>();
        let decisions_b = (0..64).map(|_| b.decide(0.7)).collect::<Vec<_>>();
        assert_eq!(decisions_a, decisions_b);
    }

    #[test]
    fn test_seeded_extremes() {
        let mut source = Seeded::new(7);
        assert!((0..64).all(|_| source.decide(1.0)));
        assert!((0..64).all(|_| !source.decide(0.0)));
    }
}
