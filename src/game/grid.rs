//! Grid geometry: cells, unit directions, bounds and free-cell sampling

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Rejection-sampling attempts before falling back to enumerating free cells
const MAX_PLACEMENT_ATTEMPTS: usize = 64;

/// A cell coordinate. Signed so that a candidate head may step off the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring cell one step along `direction`
    pub fn step(self, direction: Direction) -> Self {
        Self {
            x: self.x + direction.x,
            y: self.y + direction.y,
        }
    }
}

/// One of the four unit vectors. Anything else fails to deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDirection")]
pub struct Direction {
    pub x: i32,
    pub y: i32,
}

impl Direction {
    pub const UP: Self = Self { x: 0, y: -1 };
    pub const DOWN: Self = Self { x: 0, y: 1 };
    pub const LEFT: Self = Self { x: -1, y: 0 };
    pub const RIGHT: Self = Self { x: 1, y: 0 };

    pub fn opposite(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }

    pub fn is_opposite_of(self, other: Direction) -> bool {
        self == other.opposite()
    }
}

#[derive(Deserialize)]
struct RawDirection {
    x: i32,
    y: i32,
}

impl TryFrom<RawDirection> for Direction {
    type Error = String;

    fn try_from(raw: RawDirection) -> Result<Self, Self::Error> {
        match (raw.x, raw.y) {
            (0, 1) | (0, -1) | (1, 0) | (-1, 0) => Ok(Direction { x: raw.x, y: raw.y }),
            (x, y) => Err(format!("({x}, {y}) is not a unit direction")),
        }
    }
}

/// Board dimensions in cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub width: i32,
    pub height: i32,
}

impl Grid {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Grid derived from a square canvas split into square cells
    pub fn from_canvas(canvas_size: u32, cell_size: u32) -> Self {
        let cells = (canvas_size / cell_size.max(1)) as i32;
        Self::new(cells, cells)
    }

    pub fn contains(&self, cell: Cell) -> bool {
        (0..self.width).contains(&cell.x) && (0..self.height).contains(&cell.y)
    }

    /// Uniformly random cell anywhere on the board
    pub fn random_cell<R: Rng + ?Sized>(&self, rng: &mut R) -> Cell {
        Cell::new(rng.gen_range(0..self.width), rng.gen_range(0..self.height))
    }

    /// Uniformly random cell for which `occupied` is false.
    ///
    /// Samples with rejection first; once that has failed often enough the board
    /// is crowded, so the free cells are enumerated and one is drawn directly.
    /// Returns `None` only when every cell is occupied.
    pub fn random_free_cell<R, F>(&self, rng: &mut R, occupied: F) -> Option<Cell>
    where
        R: Rng + ?Sized,
        F: Fn(Cell) -> bool,
    {
        for _ in 0..MAX_PLACEMENT_ATTEMPTS {
            let cell = self.random_cell(rng);
            if !occupied(cell) {
                return Some(cell);
            }
        }

        let free: Vec<Cell> = (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| Cell::new(x, y)))
            .filter(|cell| !occupied(*cell))
            .collect();

        if free.is_empty() {
            None
        } else {
            Some(free[rng.gen_range(0..free.len())])
        }
    }
}
