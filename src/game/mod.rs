//! Game simulation modules

pub mod grid;
pub mod lifecycle;
pub mod player;
pub mod registry;
pub mod session;
pub mod snapshot;
pub mod tick;

pub use grid::{Cell, Direction, Grid};
pub use lifecycle::SessionHandle;
pub use player::{PlayerState, Role};
pub use registry::SessionRegistry;
pub use session::{MatchSession, SessionStatus};
pub use tick::Winner;

use std::time::Duration;

/// Default canvas edge in pixels
pub const DEFAULT_CANVAS_SIZE: u32 = 500;
/// Default cell edge in pixels
pub const DEFAULT_CELL_SIZE: u32 = 25;
pub const DEFAULT_TICK_MS: u64 = 100;
pub const DEFAULT_COUNTDOWN_FROM: u32 = 3;

/// Process-wide game parameters, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameSettings {
    pub grid: Grid,
    pub tick_interval: Duration,
    pub countdown_from: u32,
    /// Time between countdown announcements
    pub countdown_step: Duration,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            grid: Grid::from_canvas(DEFAULT_CANVAS_SIZE, DEFAULT_CELL_SIZE),
            tick_interval: Duration::from_millis(DEFAULT_TICK_MS),
            countdown_from: DEFAULT_COUNTDOWN_FROM,
            countdown_step: Duration::from_secs(1),
        }
    }
}
