use std::sync::{MutexGuard, PoisonError};

use ecosim_core::{Coordinator, GridSnapshot, IterationSummary, Population, SimulationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::SharedSimulation;

/// Body of `POST /start-simulation`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartRequest {
    pub plants: u32,
    pub herbivores: u32,
    pub carnivores: u32,
}

impl From<StartRequest> for Population {
    fn from(value: StartRequest) -> Self {
        Self {
            plants: value.plants,
            herbivores: value.herbivores,
            carnivores: value.carnivores,
        }
    }
}

/// Query string accepted by `GET /history`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub const DEFAULT_LIMIT: usize = 50;
}

/// Errors produced by the control domain.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("failed to lock simulation state")]
    Lock,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("Too many entities")]
    TooManyEntities,
    #[error(transparent)]
    Simulation(SimulationError),
    #[error("simulation task failed: {0}")]
    Join(String),
}

impl ControlError {
    /// Whether the caller is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest(_) | Self::TooManyEntities)
    }
}

impl From<SimulationError> for ControlError {
    fn from(err: SimulationError) -> Self {
        match err {
            SimulationError::TooManyEntities { .. } => Self::TooManyEntities,
            SimulationError::LockPoisoned => Self::Lock,
            other => Self::Simulation(other),
        }
    }
}

impl From<PoisonError<MutexGuard<'_, Coordinator>>> for ControlError {
    fn from(_: PoisonError<MutexGuard<'_, Coordinator>>) -> Self {
        ControlError::Lock
    }
}

/// Shared handle used by the REST surface to drive the running simulation.
#[derive(Clone)]
pub struct ControlHandle {
    simulation: SharedSimulation,
}

impl ControlHandle {
    pub fn new(simulation: SharedSimulation) -> Self {
        Self { simulation }
    }

    fn lock_simulation(&self) -> Result<MutexGuard<'_, Coordinator>, ControlError> {
        self.simulation.lock().map_err(|err| err.into())
    }

    /// Parse a raw start request body and reseed the grid.
    pub fn start_from_json(&self, body: &str) -> Result<GridSnapshot, ControlError> {
        let request: StartRequest = serde_json::from_str(body)
            .map_err(|err| ControlError::InvalidRequest(err.to_string()))?;
        self.start(request)
    }

    /// Reseed the grid with the requested population.
    pub fn start(&self, request: StartRequest) -> Result<GridSnapshot, ControlError> {
        let mut simulation = self.lock_simulation()?;
        let snapshot = simulation.seed(request.into())?;
        debug!(?request, "simulation started");
        Ok(snapshot)
    }

    /// Run one iteration. Blocks until every worker has reported or the
    /// configured timeout elapses.
    pub fn next_iteration(&self) -> Result<GridSnapshot, ControlError> {
        let mut simulation = self.lock_simulation()?;
        Ok(simulation.run_iteration()?)
    }

    /// Current grid without advancing the simulation.
    pub fn snapshot(&self) -> Result<GridSnapshot, ControlError> {
        let simulation = self.lock_simulation()?;
        Ok(simulation.snapshot()?)
    }

    /// Latest iteration summary, or a zeroed one describing the seeded grid.
    pub fn latest_summary(&self) -> Result<IterationSummary, ControlError> {
        let simulation = self.lock_simulation()?;
        if let Some(latest) = simulation.latest_summary() {
            return Ok(latest.clone());
        }
        let population = simulation.snapshot()?.population();
        Ok(IterationSummary {
            iteration: simulation.tick(),
            expected: 0,
            completed: 0,
            births: 0,
            deaths: 0,
            population,
        })
    }

    /// Up to `limit` most recent summaries, oldest first.
    pub fn history(&self, limit: usize) -> Result<Vec<IterationSummary>, ControlError> {
        let simulation = self.lock_simulation()?;
        let mut recent: Vec<IterationSummary> =
            simulation.history().rev().take(limit).cloned().collect();
        recent.reverse();
        Ok(recent)
    }
}
