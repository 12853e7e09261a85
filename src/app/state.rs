//! Application state shared across routes

use std::sync::Arc;

use crate::config::{Config, ConfigError};
use crate::game::SessionRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let settings = config.game_settings()?;

        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(SessionRegistry::new(settings)),
        })
    }
}
