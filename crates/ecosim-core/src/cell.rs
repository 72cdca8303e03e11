use serde::{Deserialize, Serialize};

/// What occupies a grid cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum EntityKind {
    #[default]
    #[serde(rename = " ")]
    Empty,
    #[serde(rename = "P")]
    Plant,
    #[serde(rename = "H")]
    Herbivore,
    #[serde(rename = "C")]
    Carnivore,
}

impl EntityKind {
    #[must_use]
    pub const fn is_alive(self) -> bool {
        !matches!(self, Self::Empty)
    }

    #[must_use]
    pub const fn is_animal(self) -> bool {
        matches!(self, Self::Herbivore | Self::Carnivore)
    }

    /// The kind this entity feeds on, if any.
    #[must_use]
    pub const fn prey(self) -> Option<Self> {
        match self {
            Self::Herbivore => Some(Self::Plant),
            Self::Carnivore => Some(Self::Herbivore),
            Self::Plant | Self::Empty => None,
        }
    }

    /// Single-character label used by snapshots and terminal views.
    #[must_use]
    pub const fn symbol(self) -> char {
        match self {
            Self::Empty => ' ',
            Self::Plant => 'P',
            Self::Herbivore => 'H',
            Self::Carnivore => 'C',
        }
    }
}

/// Identity of one entity for its whole lifetime. Zero is reserved for empty cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl EntityId {
    pub const NONE: Self = Self(0);
}

/// Row/column coordinate on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: u32,
    pub col: u32,
}

impl Position {
    #[must_use]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Neighbor in `direction`, or `None` when it would leave a `size`×`size` grid.
    #[must_use]
    pub fn step(self, direction: Direction, size: u32) -> Option<Self> {
        let (row, col) = match direction {
            Direction::Up => (self.row.checked_sub(1)?, self.col),
            Direction::Down => (self.row + 1, self.col),
            Direction::Left => (self.row, self.col.checked_sub(1)?),
            Direction::Right => (self.row, self.col + 1),
        };
        (row < size && col < size).then_some(Self { row, col })
    }
}

/// Cardinal direction on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Fixed neighbor scan order.
    pub const ALL: [Self; 4] = [Self::Up, Self::Down, Self::Left, Self::Right];
}

/// Contents of one grid position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cell {
    pub kind: EntityKind,
    pub energy: i32,
    pub age: u32,
    pub(crate) id: EntityId,
    /// Set once a worker has been spawned for this entity.
    pub(crate) scheduled: bool,
}

impl Cell {
    pub const EMPTY: Self = Self {
        kind: EntityKind::Empty,
        energy: 0,
        age: 0,
        id: EntityId::NONE,
        scheduled: false,
    };

    /// Fresh, unscheduled entity with `age = 0`.
    pub(crate) const fn newborn(kind: EntityKind, energy: i32, id: EntityId) -> Self {
        Self {
            kind,
            energy,
            age: 0,
            id,
            scheduled: false,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.kind.is_alive()
    }

    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }
}
