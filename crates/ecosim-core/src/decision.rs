//! Random choices consumed by the entity rules.

use rand::{Rng, SeedableRng, rngs::SmallRng};

use crate::Direction;

/// Source of the probabilistic decisions an entity makes while acting.
pub trait DecisionSource: Send {
    /// Returns `true` with probability `p`.
    fn chance(&mut self, p: f64) -> bool;

    /// One of the four cardinal directions, uniformly.
    fn direction(&mut self) -> Direction;
}

/// Decision source backed by a per-worker generator.
#[derive(Debug, Clone)]
pub struct RandomDecisions {
    rng: SmallRng,
}

impl RandomDecisions {
    pub fn new(rng: SmallRng) -> Self {
        Self { rng }
    }

    /// Derive an independent stream from a parent generator.
    pub fn derive(parent: &mut impl Rng) -> Self {
        Self::new(SmallRng::seed_from_u64(parent.random()))
    }
}

impl DecisionSource for RandomDecisions {
    fn chance(&mut self, p: f64) -> bool {
        if p <= 0.0 {
            false
        } else if p >= 1.0 {
            true
        } else {
            self.rng.random_bool(p)
        }
    }

    fn direction(&mut self) -> Direction {
        Direction::ALL[self.rng.random_range(0..Direction::ALL.len())]
    }
}
