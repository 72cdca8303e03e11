use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::decision::RandomDecisions;
use crate::gate::IterationGate;
use crate::worker::EntityWorker;
use crate::{
    EcosystemConfig, EntityId, EntityKind, Grid, GridSnapshot, GridStore, PopulationCounts,
    Position, SimulationError, Tick,
};

/// Requested initial population per species.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Population {
    pub plants: u32,
    pub herbivores: u32,
    pub carnivores: u32,
}

impl Population {
    #[must_use]
    pub fn total(&self) -> u64 {
        u64::from(self.plants) + u64::from(self.herbivores) + u64::from(self.carnivores)
    }
}

/// Bookkeeping recorded after every completed iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationSummary {
    pub iteration: Tick,
    /// Workers released at the start of the iteration.
    pub expected: usize,
    /// Workers that reported back before the iteration closed.
    pub completed: usize,
    pub births: usize,
    pub deaths: usize,
    pub population: PopulationCounts,
}

/// Drives iterations: schedules workers for new entities, releases them and
/// waits for every one of them to report.
pub struct Coordinator {
    config: Arc<EcosystemConfig>,
    grid: Arc<GridStore>,
    gate: Arc<IterationGate>,
    workers: Vec<JoinHandle<()>>,
    rng: SmallRng,
    tick: Tick,
    history: VecDeque<IterationSummary>,
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("grid_size", &self.config.grid_size)
            .field("tick", &self.tick)
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl Coordinator {
    /// Build an empty simulation from a validated configuration.
    pub fn new(config: EcosystemConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let grid = Grid::new(config.grid_size)?;
        let rng = config.seeded_rng();
        let history = VecDeque::with_capacity(config.history_capacity);
        Ok(Self {
            config: Arc::new(config),
            grid: Arc::new(GridStore::new(grid)),
            gate: Arc::new(IterationGate::new()),
            workers: Vec::new(),
            rng,
            tick: Tick::zero(),
            history,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EcosystemConfig {
        &self.config
    }

    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Recent iteration summaries, oldest first.
    pub fn history(&self) -> impl DoubleEndedIterator<Item = &IterationSummary> + '_ {
        self.history.iter()
    }

    #[must_use]
    pub fn latest_summary(&self) -> Option<&IterationSummary> {
        self.history.back()
    }

    /// Threads currently owned by the coordinator, including ones that have
    /// exited but not been reaped yet.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn snapshot(&self) -> Result<GridSnapshot, SimulationError> {
        self.grid.snapshot()
    }

    /// Stop every worker and clear the grid.
    pub fn reset(&mut self) -> Result<(), SimulationError> {
        self.stop_workers();
        self.grid.lock()?.clear();
        self.tick = Tick::zero();
        self.history.clear();
        Ok(())
    }

    /// Replace the grid contents with a random placement of `population`.
    /// Over-capacity requests leave the current simulation untouched.
    pub fn seed(&mut self, population: Population) -> Result<GridSnapshot, SimulationError> {
        let capacity = self.config.capacity();
        let requested = population.total();
        if requested > capacity {
            warn!(requested, capacity, "rejecting over-capacity seed request");
            return Err(SimulationError::TooManyEntities {
                requested,
                capacity,
            });
        }

        self.reset()?;
        let size = self.config.grid_size;
        let energy = self.config.initial_animal_energy;
        let kinds = std::iter::repeat_n(EntityKind::Plant, population.plants as usize)
            .chain(std::iter::repeat_n(
                EntityKind::Herbivore,
                population.herbivores as usize,
            ))
            .chain(std::iter::repeat_n(
                EntityKind::Carnivore,
                population.carnivores as usize,
            ));
        let slots = rand::seq::index::sample(&mut self.rng, capacity as usize, requested as usize);

        let mut grid = self.grid.lock()?;
        for (slot, kind) in slots.iter().zip(kinds) {
            let pos = Position::new((slot / size as usize) as u32, (slot % size as usize) as u32);
            let initial = if kind.is_animal() { energy } else { 0 };
            grid.spawn(pos, kind, initial);
        }
        let snapshot = grid.snapshot();
        drop(grid);

        info!(
            plants = population.plants,
            herbivores = population.herbivores,
            carnivores = population.carnivores,
            "seeded grid"
        );
        Ok(snapshot)
    }

    /// Put a single fresh entity at `pos`, replacing whatever was there.
    pub fn place(
        &mut self,
        pos: Position,
        kind: EntityKind,
        energy: i32,
    ) -> Result<EntityId, SimulationError> {
        if !kind.is_alive() {
            return Err(SimulationError::InvalidPlacement {
                row: pos.row,
                col: pos.col,
            });
        }
        let energy = if kind.is_animal() {
            energy.clamp(0, self.config.max_energy)
        } else {
            0
        };
        self.grid
            .lock()?
            .spawn(pos, kind, energy)
            .ok_or(SimulationError::InvalidPlacement {
                row: pos.row,
                col: pos.col,
            })
    }

    /// Run one iteration and return the resulting grid.
    pub fn run_iteration(&mut self) -> Result<GridSnapshot, SimulationError> {
        let spawned = self.spawn_pending()?;
        let expected = self.gate.release()?;
        let timeout = self.config.iteration_timeout();
        let counts = match self.gate.wait_for_completion(timeout) {
            Ok(counts) => counts,
            Err(err) => {
                error!(%err, tick = self.tick.0, expected, "iteration did not complete");
                return Err(err);
            }
        };
        self.reap_finished();

        let (snapshot, population) = {
            let grid = self.grid.lock()?;
            (grid.snapshot(), grid.population())
        };
        self.tick = self.tick.next();
        let summary = IterationSummary {
            iteration: self.tick,
            expected: counts.expected,
            completed: counts.completed,
            births: counts.births,
            deaths: counts.deaths,
            population,
        };
        debug!(
            tick = self.tick.0,
            spawned,
            expected = summary.expected,
            completed = summary.completed,
            births = summary.births,
            deaths = summary.deaths,
            living = counts.living,
            "iteration complete"
        );
        if self.history.len() == self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary);
        Ok(snapshot)
    }

    /// Start a worker for every entity that does not have one yet.
    fn spawn_pending(&mut self) -> Result<usize, SimulationError> {
        let pending: Vec<(EntityId, Position)> = {
            let mut grid = self.grid.lock()?;
            let mut pending = Vec::new();
            grid.for_each(|pos, cell| {
                if cell.kind.is_alive() && cell.age == 0 && !cell.scheduled {
                    pending.push((cell.id(), pos));
                }
            });
            for (_, pos) in &pending {
                if let Some(cell) = grid.get_mut(*pos) {
                    cell.scheduled = true;
                }
            }
            pending
        };

        for (index, (id, pos)) in pending.iter().enumerate() {
            if let Err(err) = self.spawn_worker(*id, *pos) {
                // Leave the rest unscheduled so the next iteration retries them.
                let mut grid = self.grid.lock()?;
                for (_, pos) in &pending[index..] {
                    if let Some(cell) = grid.get_mut(*pos) {
                        cell.scheduled = false;
                    }
                }
                return Err(err);
            }
        }
        Ok(pending.len())
    }

    fn spawn_worker(&mut self, id: EntityId, pos: Position) -> Result<(), SimulationError> {
        let seen = self.gate.register()?;
        let worker = EntityWorker::new(
            id,
            pos,
            seen,
            RandomDecisions::derive(&mut self.rng),
            Arc::clone(&self.grid),
            Arc::clone(&self.gate),
            Arc::clone(&self.config),
        );
        match thread::Builder::new()
            .name(format!("ecosim-worker-{}", id.0))
            .spawn(move || worker.run())
        {
            Ok(handle) => {
                self.workers.push(handle);
                Ok(())
            }
            Err(err) => {
                self.gate.deregister()?;
                Err(SimulationError::WorkerSpawn(err.to_string()))
            }
        }
    }

    fn reap_finished(&mut self) {
        let mut idx = 0;
        while idx < self.workers.len() {
            if self.workers[idx].is_finished() {
                let handle = self.workers.swap_remove(idx);
                if handle.join().is_err() {
                    warn!("entity worker panicked");
                }
            } else {
                idx += 1;
            }
        }
    }

    /// Shut the gate, join every worker and install a fresh gate.
    fn stop_workers(&mut self) {
        self.gate.shutdown();
        let count = self.workers.len();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("entity worker panicked during shutdown");
            }
        }
        if count > 0 {
            debug!(count, "joined entity workers");
        }
        self.gate = Arc::new(IterationGate::new());
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.stop_workers();
    }
}
