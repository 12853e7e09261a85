//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::player::SPAWN_OFFSET;
use crate::game::{
    GameSettings, Grid, DEFAULT_CANVAS_SIZE, DEFAULT_CELL_SIZE, DEFAULT_COUNTDOWN_FROM,
    DEFAULT_TICK_MS,
};

/// Smallest board on which both mirrored spawns fit and stay apart
const MIN_GRID_CELLS: i32 = 2 * SPAWN_OFFSET + 2;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma-separated; `*` allows any
    pub client_origin: String,

    /// Canvas edge in pixels
    pub canvas_size: u32,
    /// Cell edge in pixels
    pub cell_size: u32,
    /// Simulation tick interval in milliseconds
    pub tick_interval_ms: u64,
    /// First countdown value
    pub countdown_from: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosted platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string())
        };

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            canvas_size: parse_or("CANVAS_SIZE", DEFAULT_CANVAS_SIZE)?,
            cell_size: parse_or("CELL_SIZE", DEFAULT_CELL_SIZE)?,
            tick_interval_ms: parse_or("TICK_INTERVAL_MS", DEFAULT_TICK_MS)?,
            countdown_from: parse_or("COUNTDOWN_FROM", DEFAULT_COUNTDOWN_FROM)?,
        };

        config.game_settings()?;
        Ok(config)
    }

    /// Validated game parameters
    pub fn game_settings(&self) -> Result<GameSettings, ConfigError> {
        if self.cell_size == 0 {
            return Err(ConfigError::Invalid("CELL_SIZE", "must be positive"));
        }
        let grid = Grid::from_canvas(self.canvas_size, self.cell_size);
        if grid.width < MIN_GRID_CELLS || grid.height < MIN_GRID_CELLS {
            return Err(ConfigError::Invalid(
                "CANVAS_SIZE",
                "grid must be at least 12 cells on each side",
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("TICK_INTERVAL_MS", "must be positive"));
        }
        if self.countdown_from == 0 {
            return Err(ConfigError::Invalid("COUNTDOWN_FROM", "must be at least 1"));
        }

        Ok(GameSettings {
            grid,
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            countdown_from: self.countdown_from,
            countdown_step: Duration::from_secs(1),
        })
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, "not a valid number")),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
