//! Per-entity behavior and the thread loop that drives it.

use std::sync::Arc;

use tracing::{debug, error, trace};

use crate::decision::DecisionSource;
use crate::gate::{IterationGate, Release, WorkerOutcome};
use crate::{
    Cell, Direction, EcosystemConfig, EntityId, EntityKind, Grid, GridStore, Position,
    SpeciesRules,
};

/// Result of applying one iteration's rules to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The entity died or was eaten; its worker must stop.
    Died,
    /// The entity survived, now at `position`.
    Alive { position: Position, births: usize },
}

/// Apply the death, movement, feeding, reproduction and aging rules to the
/// entity `id` believed to live at `position`. Caller holds the grid lock.
pub fn step_entity(
    grid: &mut Grid,
    position: Position,
    id: EntityId,
    config: &EcosystemConfig,
    decisions: &mut impl DecisionSource,
) -> StepOutcome {
    let cell = grid.read(position);
    if cell.id() != id || !cell.kind.is_alive() {
        // Eaten since our last step; whoever ate us owns the cell now.
        return StepOutcome::Died;
    }
    let Some(rules) = config.rules(cell.kind).copied() else {
        return StepOutcome::Died;
    };

    if cell.age >= rules.max_age || (cell.kind.is_animal() && cell.energy <= 0) {
        grid.write(position, Cell::EMPTY);
        return StepOutcome::Died;
    }

    let mut position = position;
    if cell.kind.is_animal() {
        position = apply_movement(grid, position, &rules, config, decisions);
        apply_feeding(grid, position, &rules, config, decisions);
    }
    let births = apply_reproduction(grid, position, &rules, config, decisions);

    if let Some(cell) = grid.get_mut(position) {
        cell.age += 1;
    }
    StepOutcome::Alive { position, births }
}

fn gain(energy: i32, food: i32, config: &EcosystemConfig) -> i32 {
    energy.saturating_add(food).min(config.max_energy)
}

fn accepts_mover(kind: EntityKind, target: EntityKind) -> bool {
    target == EntityKind::Empty || Some(target) == kind.prey()
}

fn apply_movement(
    grid: &mut Grid,
    position: Position,
    rules: &SpeciesRules,
    config: &EcosystemConfig,
    decisions: &mut impl DecisionSource,
) -> Position {
    let mut cell = grid.read(position);
    let target = if decisions.chance(rules.move_probability) {
        let direction = decisions.direction();
        position
            .step(direction, grid.size())
            .filter(|target| accepts_mover(cell.kind, grid.read(*target).kind))
    } else {
        None
    };

    match target {
        Some(target) => {
            if Some(grid.read(target).kind) == cell.kind.prey() {
                cell.energy = gain(cell.energy, rules.food_energy, config);
            }
            cell.energy = (cell.energy - config.move_cost).max(0);
            grid.write(target, cell);
            grid.write(position, Cell::EMPTY);
            target
        }
        None => {
            cell.energy = (cell.energy - config.move_cost).max(0);
            grid.write(position, cell);
            position
        }
    }
}

fn apply_feeding(
    grid: &mut Grid,
    position: Position,
    rules: &SpeciesRules,
    config: &EcosystemConfig,
    decisions: &mut impl DecisionSource,
) {
    if !decisions.chance(rules.eat_probability) {
        return;
    }
    let mut cell = grid.read(position);
    let Some(prey) = cell.kind.prey() else {
        return;
    };
    let size = grid.size();
    let meal = Direction::ALL
        .iter()
        .filter_map(|direction| position.step(*direction, size))
        .find(|neighbor| grid.read(*neighbor).kind == prey);
    if let Some(neighbor) = meal {
        grid.write(neighbor, Cell::EMPTY);
        cell.energy = gain(cell.energy, rules.food_energy, config);
        grid.write(position, cell);
    }
}

fn apply_reproduction(
    grid: &mut Grid,
    position: Position,
    rules: &SpeciesRules,
    config: &EcosystemConfig,
    decisions: &mut impl DecisionSource,
) -> usize {
    let mut parent = grid.read(position);
    if parent.kind.is_animal() && parent.energy <= config.reproduction_energy_threshold {
        return 0;
    }
    if !decisions.chance(rules.reproduction_probability) {
        return 0;
    }
    let direction = decisions.direction();
    let Some(target) = position.step(direction, grid.size()) else {
        return 0;
    };
    if !grid.read(target).is_empty() {
        return 0;
    }

    let child_energy = if parent.kind.is_animal() {
        let child = (parent.energy - config.reproduction_cost).max(0);
        parent.energy = child;
        grid.write(position, parent);
        child
    } else {
        0
    };
    match grid.spawn(target, parent.kind, child_energy) {
        Some(child) => {
            trace!(parent = parent.id().0, child = child.0, ?target, "entity reproduced");
            1
        }
        None => 0,
    }
}

/// Owns one entity for its lifetime and runs on its own thread.
pub struct EntityWorker<D> {
    id: EntityId,
    position: Position,
    seen: u64,
    decisions: D,
    grid: Arc<GridStore>,
    gate: Arc<IterationGate>,
    config: Arc<EcosystemConfig>,
}

impl<D: DecisionSource> EntityWorker<D> {
    /// `seen` is the gate generation at registration; the worker first acts
    /// on the release after it.
    pub fn new(
        id: EntityId,
        position: Position,
        seen: u64,
        decisions: D,
        grid: Arc<GridStore>,
        gate: Arc<IterationGate>,
        config: Arc<EcosystemConfig>,
    ) -> Self {
        Self {
            id,
            position,
            seen,
            decisions,
            grid,
            gate,
            config,
        }
    }

    /// Wait for releases and act until the entity dies or the gate shuts down.
    pub fn run(mut self) {
        trace!(id = self.id.0, position = ?self.position, "worker started");
        loop {
            let generation = match self.gate.wait_for_release(self.seen) {
                Ok(Release::Act(generation)) => generation,
                Ok(Release::Shutdown) => {
                    trace!(id = self.id.0, "worker shut down");
                    return;
                }
                Err(err) => {
                    error!(id = self.id.0, %err, "worker lost the iteration gate");
                    return;
                }
            };
            self.seen = generation;

            let outcome = self.act();
            let report = match outcome {
                StepOutcome::Died => WorkerOutcome {
                    died: true,
                    births: 0,
                },
                StepOutcome::Alive { position, births } => {
                    self.position = position;
                    WorkerOutcome {
                        died: false,
                        births,
                    }
                }
            };
            if let Err(err) = self.gate.report(generation, report) {
                error!(id = self.id.0, %err, "worker failed to report completion");
                return;
            }
            if report.died {
                debug!(id = self.id.0, position = ?self.position, generation, "entity died");
                return;
            }
        }
    }

    fn act(&mut self) -> StepOutcome {
        match self.grid.lock() {
            Ok(mut grid) => step_entity(
                &mut grid,
                self.position,
                self.id,
                &self.config,
                &mut self.decisions,
            ),
            Err(err) => {
                error!(id = self.id.0, %err, "grid unavailable; retiring worker");
                StepOutcome::Died
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Probabilities of 1.0 always fire, anything else never does.
    struct Scripted {
        directions: VecDeque<Direction>,
    }

    impl Scripted {
        fn new(directions: &[Direction]) -> Self {
            Self {
                directions: directions.iter().copied().collect(),
            }
        }
    }

    impl DecisionSource for Scripted {
        fn chance(&mut self, p: f64) -> bool {
            p >= 1.0
        }

        fn direction(&mut self) -> Direction {
            self.directions.pop_front().unwrap_or(Direction::Up)
        }
    }

    fn quiet_config() -> EcosystemConfig {
        let mut config = EcosystemConfig::default();
        for rules in [&mut config.plant, &mut config.herbivore, &mut config.carnivore] {
            rules.move_probability = 0.0;
            rules.eat_probability = 0.0;
            rules.reproduction_probability = 0.0;
        }
        config
    }

    fn place(grid: &mut Grid, row: u32, col: u32, kind: EntityKind, energy: i32) -> EntityId {
        grid.spawn(Position::new(row, col), kind, energy)
            .expect("in bounds")
    }

    #[test]
    fn plant_ages_then_dies_at_max_age() {
        let config = quiet_config();
        let mut grid = Grid::new(3).expect("grid");
        let id = place(&mut grid, 1, 1, EntityKind::Plant, 0);
        let pos = Position::new(1, 1);
        let mut decisions = Scripted::new(&[]);

        for expected_age in 1..=config.plant.max_age {
            let outcome = step_entity(&mut grid, pos, id, &config, &mut decisions);
            assert_eq!(outcome, StepOutcome::Alive { position: pos, births: 0 });
            assert_eq!(grid.read(pos).age, expected_age);
        }
        let outcome = step_entity(&mut grid, pos, id, &config, &mut decisions);
        assert_eq!(outcome, StepOutcome::Died);
        assert!(grid.read(pos).is_empty());
    }

    #[test]
    fn idle_animal_pays_move_cost() {
        let config = quiet_config();
        let mut grid = Grid::new(3).expect("grid");
        let id = place(&mut grid, 0, 0, EntityKind::Herbivore, 40);
        let pos = Position::new(0, 0);
        step_entity(&mut grid, pos, id, &config, &mut Scripted::new(&[]));
        assert_eq!(grid.read(pos).energy, 35);
        assert_eq!(grid.read(pos).age, 1);
    }

    #[test]
    fn starving_animal_dies() {
        let config = quiet_config();
        let mut grid = Grid::new(3).expect("grid");
        let id = place(&mut grid, 0, 0, EntityKind::Carnivore, 5);
        let pos = Position::new(0, 0);
        let mut decisions = Scripted::new(&[]);
        step_entity(&mut grid, pos, id, &config, &mut decisions);
        assert_eq!(grid.read(pos).energy, 0);
        assert_eq!(
            step_entity(&mut grid, pos, id, &config, &mut decisions),
            StepOutcome::Died
        );
        assert!(grid.read(pos).is_empty());
    }

    #[test]
    fn herbivore_moves_onto_plant_and_eats_it() {
        let mut config = quiet_config();
        config.herbivore.move_probability = 1.0;
        let mut grid = Grid::new(3).expect("grid");
        let id = place(&mut grid, 1, 1, EntityKind::Herbivore, 50);
        place(&mut grid, 1, 2, EntityKind::Plant, 0);

        let outcome = step_entity(
            &mut grid,
            Position::new(1, 1),
            id,
            &config,
            &mut Scripted::new(&[Direction::Right]),
        );
        let moved = Position::new(1, 2);
        assert_eq!(outcome, StepOutcome::Alive { position: moved, births: 0 });
        assert!(grid.read(Position::new(1, 1)).is_empty());
        let cell = grid.read(moved);
        assert_eq!(cell.kind, EntityKind::Herbivore);
        assert_eq!(cell.id(), id);
        assert_eq!(cell.energy, 75);
        assert_eq!(cell.age, 1);
    }

    #[test]
    fn movement_off_the_edge_is_a_failed_move() {
        let mut config = quiet_config();
        config.carnivore.move_probability = 1.0;
        let mut grid = Grid::new(3).expect("grid");
        let id = place(&mut grid, 0, 0, EntityKind::Carnivore, 50);
        let outcome = step_entity(
            &mut grid,
            Position::new(0, 0),
            id,
            &config,
            &mut Scripted::new(&[Direction::Up]),
        );
        assert_eq!(
            outcome,
            StepOutcome::Alive { position: Position::new(0, 0), births: 0 }
        );
        assert_eq!(grid.read(Position::new(0, 0)).energy, 45);
    }

    #[test]
    fn carnivore_cannot_move_onto_plant() {
        let mut config = quiet_config();
        config.carnivore.move_probability = 1.0;
        let mut grid = Grid::new(3).expect("grid");
        let id = place(&mut grid, 1, 1, EntityKind::Carnivore, 50);
        place(&mut grid, 0, 1, EntityKind::Plant, 0);
        step_entity(
            &mut grid,
            Position::new(1, 1),
            id,
            &config,
            &mut Scripted::new(&[Direction::Up]),
        );
        assert_eq!(grid.read(Position::new(0, 1)).kind, EntityKind::Plant);
        assert_eq!(grid.read(Position::new(1, 1)).kind, EntityKind::Carnivore);
    }

    #[test]
    fn feeding_scans_up_down_left_right_and_caps_energy() {
        let mut config = quiet_config();
        config.herbivore.eat_probability = 1.0;
        let mut grid = Grid::new(3).expect("grid");
        let id = place(&mut grid, 1, 1, EntityKind::Herbivore, 100);
        place(&mut grid, 1, 0, EntityKind::Plant, 0);
        place(&mut grid, 2, 1, EntityKind::Plant, 0);

        step_entity(&mut grid, Position::new(1, 1), id, &config, &mut Scripted::new(&[]));
        assert!(grid.read(Position::new(2, 1)).is_empty(), "down precedes left");
        assert_eq!(grid.read(Position::new(1, 0)).kind, EntityKind::Plant);
        assert_eq!(grid.read(Position::new(1, 1)).energy, 100);
    }

    #[test]
    fn eaten_entity_reports_death_without_clearing_cell() {
        let config = quiet_config();
        let mut grid = Grid::new(3).expect("grid");
        let plant = place(&mut grid, 0, 0, EntityKind::Plant, 0);
        let herbivore = place(&mut grid, 0, 0, EntityKind::Herbivore, 80);
        let outcome = step_entity(
            &mut grid,
            Position::new(0, 0),
            plant,
            &config,
            &mut Scripted::new(&[]),
        );
        assert_eq!(outcome, StepOutcome::Died);
        assert_eq!(grid.read(Position::new(0, 0)).id(), herbivore);
    }

    #[test]
    fn animal_reproduction_splits_energy() {
        let mut config = quiet_config();
        config.herbivore.reproduction_probability = 1.0;
        let mut grid = Grid::new(3).expect("grid");
        let id = place(&mut grid, 1, 1, EntityKind::Herbivore, 60);

        let outcome = step_entity(
            &mut grid,
            Position::new(1, 1),
            id,
            &config,
            &mut Scripted::new(&[Direction::Down]),
        );
        assert_eq!(
            outcome,
            StepOutcome::Alive { position: Position::new(1, 1), births: 1 }
        );
        let parent = grid.read(Position::new(1, 1));
        let child = grid.read(Position::new(2, 1));
        assert_eq!(parent.energy, 45);
        assert_eq!(child.kind, EntityKind::Herbivore);
        assert_eq!(child.energy, 45);
        assert_eq!(child.age, 0);
        assert!(!child.scheduled);
        assert_ne!(child.id(), id);
    }

    #[test]
    fn weak_animal_does_not_reproduce() {
        let mut config = quiet_config();
        config.carnivore.reproduction_probability = 1.0;
        let mut grid = Grid::new(3).expect("grid");
        let id = place(&mut grid, 1, 1, EntityKind::Carnivore, 25);
        let outcome = step_entity(
            &mut grid,
            Position::new(1, 1),
            id,
            &config,
            &mut Scripted::new(&[Direction::Down]),
        );
        assert_eq!(
            outcome,
            StepOutcome::Alive { position: Position::new(1, 1), births: 0 }
        );
        assert!(grid.read(Position::new(2, 1)).is_empty());
    }

    #[test]
    fn plant_reproduces_only_into_empty_cells() {
        let mut config = quiet_config();
        config.plant.reproduction_probability = 1.0;
        let mut grid = Grid::new(3).expect("grid");
        let id = place(&mut grid, 1, 1, EntityKind::Plant, 0);
        place(&mut grid, 1, 2, EntityKind::Carnivore, 90);
        let pos = Position::new(1, 1);

        let blocked = step_entity(
            &mut grid,
            pos,
            id,
            &config,
            &mut Scripted::new(&[Direction::Right]),
        );
        assert_eq!(blocked, StepOutcome::Alive { position: pos, births: 0 });

        let placed = step_entity(&mut grid, pos, id, &config, &mut Scripted::new(&[Direction::Left]));
        assert_eq!(placed, StepOutcome::Alive { position: pos, births: 1 });
        let seedling = grid.read(Position::new(1, 0));
        assert_eq!(seedling.kind, EntityKind::Plant);
        assert_eq!(seedling.energy, 0);
    }
}
