//! Per-participant snake state

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::grid::{Cell, Direction, Grid};

/// Points awarded per food eaten; one body cell per award
pub const FOOD_SCORE: u32 = 10;

/// Distance of each spawn from its corner, in cells
pub const SPAWN_OFFSET: i32 = 5;

/// Role a participant joins with; fixes spawn position, heading and color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Host,
    Challenger,
}

impl Role {
    pub fn other(self) -> Self {
        match self {
            Role::Host => Role::Challenger,
            Role::Challenger => Role::Host,
        }
    }

    /// Host spawns near the top-left corner, challenger at the mirrored cell
    /// near the bottom-right, heading the opposite way.
    pub fn spawn(self, grid: &Grid) -> (Cell, Direction) {
        match self {
            Role::Host => (Cell::new(SPAWN_OFFSET, SPAWN_OFFSET), Direction::RIGHT),
            Role::Challenger => (
                Cell::new(grid.width - 1 - SPAWN_OFFSET, grid.height - 1 - SPAWN_OFFSET),
                Direction::LEFT,
            ),
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Role::Host => "#ccff00",
            Role::Challenger => "#00ccff",
        }
    }
}

/// Authoritative state of one snake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerState {
    pub id: Uuid,
    pub role: Role,
    pub head: Cell,
    /// Head first
    pub body: VecDeque<Cell>,
    pub direction: Direction,
    pub score: u32,
    pub alive: bool,
}

impl PlayerState {
    /// Fresh single-cell snake at the role's spawn
    pub fn spawn(id: Uuid, role: Role, grid: &Grid) -> Self {
        let (head, direction) = role.spawn(grid);
        Self::at(id, role, head, direction)
    }

    /// Single-cell snake at an arbitrary cell
    pub fn at(id: Uuid, role: Role, head: Cell, direction: Direction) -> Self {
        Self {
            id,
            role,
            head,
            body: VecDeque::from([head]),
            direction,
            score: 0,
            alive: true,
        }
    }

    pub fn color(&self) -> &'static str {
        self.role.color()
    }

    /// Body length implied by the score
    pub fn expected_len(&self) -> usize {
        1 + (self.score / FOOD_SCORE) as usize
    }

    pub fn occupies(&self, cell: Cell) -> bool {
        self.body.contains(&cell)
    }

    /// Move the head onto `cell`. The tail is left in place; callers either
    /// keep it (growth) or call [`PlayerState::drop_tail`].
    pub fn advance_to(&mut self, cell: Cell) {
        self.head = cell;
        self.body.push_front(cell);
    }

    pub fn drop_tail(&mut self) {
        self.body.pop_back();
        self.debug_check();
    }

    pub fn grow(&mut self) {
        self.score += FOOD_SCORE;
        self.debug_check();
    }

    /// Overwrite the stored heading unless it would reverse straight into the
    /// neck. Returns whether the heading was accepted.
    pub fn steer(&mut self, direction: Direction) -> bool {
        if direction.is_opposite_of(self.direction) {
            return false;
        }
        self.direction = direction;
        true
    }

    pub fn debug_check(&self) {
        debug_assert_eq!(self.body.front(), Some(&self.head), "head must lead the body");
        debug_assert_eq!(
            self.body.len(),
            self.expected_len(),
            "body length out of step with score"
        );
        debug_assert_eq!(self.score % FOOD_SCORE, 0);
    }
}
