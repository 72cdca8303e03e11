use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::{Cell, EntityId, EntityKind, Position, SimulationError};

/// Square, row-major matrix of cells.
#[derive(Debug, Clone)]
pub struct Grid {
    size: u32,
    cells: Vec<Cell>,
    next_id: u64,
}

impl Grid {
    /// Construct an all-empty `size`×`size` grid.
    pub fn new(size: u32) -> Result<Self, SimulationError> {
        if size == 0 {
            return Err(SimulationError::InvalidConfig(
                "grid dimensions must be non-zero",
            ));
        }
        Ok(Self {
            size,
            cells: vec![Cell::EMPTY; (size as usize) * (size as usize)],
            next_id: 1,
        })
    }

    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    fn offset(&self, pos: Position) -> Option<usize> {
        (pos.row < self.size && pos.col < self.size)
            .then(|| (pos.row as usize) * (self.size as usize) + (pos.col as usize))
    }

    /// Copy of the cell at `pos`; out-of-bounds reads see an empty cell.
    #[must_use]
    pub fn read(&self, pos: Position) -> Cell {
        self.offset(pos)
            .map(|idx| self.cells[idx])
            .unwrap_or(Cell::EMPTY)
    }

    /// Mutable access to a specific cell.
    pub fn get_mut(&mut self, pos: Position) -> Option<&mut Cell> {
        let idx = self.offset(pos)?;
        Some(&mut self.cells[idx])
    }

    /// Overwrites the cell at `pos`. Writes outside the grid are ignored.
    pub fn write(&mut self, pos: Position, cell: Cell) {
        if let Some(slot) = self.get_mut(pos) {
            *slot = cell;
        }
    }

    /// Visits every cell in row-major order.
    pub fn for_each(&self, mut visit: impl FnMut(Position, &Cell)) {
        let size = self.size as usize;
        for (idx, cell) in self.cells.iter().enumerate() {
            visit(Position::new((idx / size) as u32, (idx % size) as u32), cell);
        }
    }

    /// Resets every cell to empty.
    pub fn clear(&mut self) {
        self.cells.fill(Cell::EMPTY);
    }

    /// Places a new unscheduled entity at `pos`, returning its identity.
    pub fn spawn(&mut self, pos: Position, kind: EntityKind, energy: i32) -> Option<EntityId> {
        let idx = self.offset(pos)?;
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.cells[idx] = Cell::newborn(kind, energy, id);
        Some(id)
    }

    /// Number of cells holding each living kind.
    #[must_use]
    pub fn population(&self) -> PopulationCounts {
        let mut counts = PopulationCounts::default();
        for cell in &self.cells {
            counts.record(cell.kind);
        }
        counts
    }

    #[must_use]
    pub fn snapshot(&self) -> GridSnapshot {
        let rows = self
            .cells
            .chunks(self.size as usize)
            .map(|row| row.iter().map(CellView::from).collect())
            .collect();
        GridSnapshot { rows }
    }
}

/// Mutex-guarded grid shared by the coordinator and every worker.
#[derive(Debug)]
pub struct GridStore {
    inner: Mutex<Grid>,
}

impl GridStore {
    pub fn new(grid: Grid) -> Self {
        Self {
            inner: Mutex::new(grid),
        }
    }

    /// Acquire the grid lock. The guard releases it on every exit path.
    pub fn lock(&self) -> Result<MutexGuard<'_, Grid>, SimulationError> {
        self.inner.lock().map_err(|_| SimulationError::LockPoisoned)
    }

    pub fn snapshot(&self) -> Result<GridSnapshot, SimulationError> {
        Ok(self.lock()?.snapshot())
    }
}

/// Living entity totals per species.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationCounts {
    pub plants: usize,
    pub herbivores: usize,
    pub carnivores: usize,
}

impl PopulationCounts {
    fn record(&mut self, kind: EntityKind) {
        match kind {
            EntityKind::Plant => self.plants += 1,
            EntityKind::Herbivore => self.herbivores += 1,
            EntityKind::Carnivore => self.carnivores += 1,
            EntityKind::Empty => {}
        }
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.plants + self.herbivores + self.carnivores
    }
}

/// Externally visible state of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellView {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub energy: i32,
    pub age: u32,
}

impl From<&Cell> for CellView {
    fn from(cell: &Cell) -> Self {
        Self {
            kind: cell.kind,
            energy: cell.energy,
            age: cell.age,
        }
    }
}

/// Point-in-time copy of the grid, encoded as an array of rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GridSnapshot {
    rows: Vec<Vec<CellView>>,
}

impl GridSnapshot {
    #[must_use]
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<CellView>] {
        &self.rows
    }

    #[must_use]
    pub fn get(&self, pos: Position) -> Option<&CellView> {
        self.rows.get(pos.row as usize)?.get(pos.col as usize)
    }

    /// Iterates `(position, cell)` pairs in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (Position, &CellView)> + '_ {
        self.rows.iter().enumerate().flat_map(|(row, cells)| {
            cells
                .iter()
                .enumerate()
                .map(move |(col, cell)| (Position::new(row as u32, col as u32), cell))
        })
    }

    #[must_use]
    pub fn population(&self) -> PopulationCounts {
        let mut counts = PopulationCounts::default();
        for (_, cell) in self.iter() {
            counts.record(cell.kind);
        }
        counts
    }
}
