use std::time::Duration;

use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};

use crate::{EntityKind, SimulationError};

/// Behavior parameters for a single species.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SpeciesRules {
    /// Age at which the entity dies on its next death check.
    pub max_age: u32,
    /// Chance of attempting a move each iteration. Ignored for plants.
    pub move_probability: f64,
    /// Chance of scanning the neighborhood for prey each iteration. Ignored for plants.
    pub eat_probability: f64,
    /// Chance of attempting to reproduce each iteration.
    pub reproduction_probability: f64,
    /// Energy gained when consuming one unit of prey. Ignored for plants.
    pub food_energy: i32,
}

impl SpeciesRules {
    pub const fn plant() -> Self {
        Self {
            max_age: 10,
            move_probability: 0.0,
            eat_probability: 0.0,
            reproduction_probability: 0.2,
            food_energy: 0,
        }
    }

    pub const fn herbivore() -> Self {
        Self {
            max_age: 50,
            move_probability: 0.7,
            eat_probability: 0.9,
            reproduction_probability: 0.075,
            food_energy: 30,
        }
    }

    pub const fn carnivore() -> Self {
        Self {
            max_age: 80,
            move_probability: 0.5,
            eat_probability: 1.0,
            reproduction_probability: 0.025,
            food_energy: 20,
        }
    }

    fn validate(&self) -> Result<(), SimulationError> {
        let probabilities = [
            self.move_probability,
            self.eat_probability,
            self.reproduction_probability,
        ];
        if probabilities
            .iter()
            .any(|p| !p.is_finite() || !(0.0..=1.0).contains(p))
        {
            return Err(SimulationError::InvalidConfig(
                "species probabilities must lie in [0, 1]",
            ));
        }
        if self.food_energy < 0 {
            return Err(SimulationError::InvalidConfig(
                "food_energy must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Static configuration for one ecosystem simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EcosystemConfig {
    /// Number of rows (and columns) of the square grid.
    pub grid_size: u32,
    /// Upper bound for animal energy.
    pub max_energy: i32,
    /// Energy assigned to animals placed by seeding.
    pub initial_animal_energy: i32,
    /// Energy paid by an animal every iteration for moving or trying to.
    pub move_cost: i32,
    /// Animals reproduce only with energy strictly above this value.
    pub reproduction_energy_threshold: i32,
    /// Energy deducted from both parent and child on reproduction.
    pub reproduction_cost: i32,
    /// Optional RNG seed; drawn from entropy when absent.
    pub rng_seed: Option<u64>,
    /// How long the coordinator waits for workers before giving up.
    pub iteration_timeout_ms: u64,
    /// Maximum number of iteration summaries retained in memory.
    pub history_capacity: usize,
    pub plant: SpeciesRules,
    pub herbivore: SpeciesRules,
    pub carnivore: SpeciesRules,
}

impl Default for EcosystemConfig {
    fn default() -> Self {
        Self {
            grid_size: 15,
            max_energy: 100,
            initial_animal_energy: 100,
            move_cost: 5,
            reproduction_energy_threshold: 20,
            reproduction_cost: 10,
            rng_seed: None,
            iteration_timeout_ms: 5_000,
            history_capacity: 256,
            plant: SpeciesRules::plant(),
            herbivore: SpeciesRules::herbivore(),
            carnivore: SpeciesRules::carnivore(),
        }
    }
}

impl EcosystemConfig {
    /// Checks every field, returning the first violation.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.grid_size == 0 {
            return Err(SimulationError::InvalidConfig("grid_size must be non-zero"));
        }
        if self.max_energy <= 0 {
            return Err(SimulationError::InvalidConfig("max_energy must be positive"));
        }
        if self.initial_animal_energy <= 0 || self.initial_animal_energy > self.max_energy {
            return Err(SimulationError::InvalidConfig(
                "initial_animal_energy must lie in (0, max_energy]",
            ));
        }
        if self.move_cost < 0
            || self.reproduction_cost < 0
            || self.reproduction_energy_threshold < 0
        {
            return Err(SimulationError::InvalidConfig(
                "energy costs and thresholds must be non-negative",
            ));
        }
        if self.iteration_timeout_ms == 0 {
            return Err(SimulationError::InvalidConfig(
                "iteration_timeout_ms must be non-zero",
            ));
        }
        if self.history_capacity == 0 {
            return Err(SimulationError::InvalidConfig(
                "history_capacity must be non-zero",
            ));
        }
        self.plant.validate()?;
        self.herbivore.validate()?;
        self.carnivore.validate()?;
        Ok(())
    }

    /// Total number of cells in the grid.
    pub fn capacity(&self) -> u64 {
        u64::from(self.grid_size) * u64::from(self.grid_size)
    }

    pub fn iteration_timeout(&self) -> Duration {
        Duration::from_millis(self.iteration_timeout_ms)
    }

    /// Rules for a living kind. `None` for empty cells.
    pub fn rules(&self, kind: EntityKind) -> Option<&SpeciesRules> {
        match kind {
            EntityKind::Plant => Some(&self.plant),
            EntityKind::Herbivore => Some(&self.herbivore),
            EntityKind::Carnivore => Some(&self.carnivore),
            EntityKind::Empty => None,
        }
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}
