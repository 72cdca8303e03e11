use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the simulation engine.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Seeding asked for more entities than the grid has cells.
    #[error("too many entities: requested {requested}, grid holds {capacity}")]
    TooManyEntities { requested: u64, capacity: u64 },
    /// The position is outside the grid or the kind is not a living entity.
    #[error("cannot place an entity at row {row}, column {col}")]
    InvalidPlacement { row: u32, col: u32 },
    /// Workers stopped reporting before the iteration completed.
    #[error(
        "iteration timed out after {waited:?}: {completed} of {expected} workers reported"
    )]
    IterationTimeout {
        completed: usize,
        expected: usize,
        waited: Duration,
    },
    /// A thread panicked while holding one of the engine locks.
    #[error("simulation lock poisoned")]
    LockPoisoned,
    /// The OS refused to start a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(String),
}
