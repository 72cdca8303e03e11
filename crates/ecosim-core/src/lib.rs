//! Core engine for the ecosim predator-prey grid.
//!
//! Every living entity on the grid is driven by its own worker thread. A
//! [`Coordinator`] releases all workers at once through an
//! [`IterationGate`], waits for each of them to report, and publishes a
//! [`GridSnapshot`] of the result.

use serde::{Deserialize, Serialize};

mod cell;
mod config;
mod coordinator;
pub mod decision;
mod error;
pub mod gate;
mod grid;
pub mod worker;

pub use cell::{Cell, Direction, EntityId, EntityKind, Position};
pub use config::{EcosystemConfig, SpeciesRules};
pub use coordinator::{Coordinator, IterationSummary, Population};
pub use error::SimulationError;
pub use gate::IterationGate;
pub use grid::{CellView, Grid, GridSnapshot, GridStore, PopulationCounts};

/// Number of completed iterations since the last seed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}
