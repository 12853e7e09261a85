//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::{Cell, Direction, Role, Winner};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Join (or create) a session
    JoinGame {
        game_id: String,
        role: Role,
    },

    /// Change heading; takes effect on the next tick
    Input {
        game_id: String,
        direction: Direction,
    },

    /// Leave a session
    LeaveGame {
        game_id: String,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        participant_id: Uuid,
        server_time: u64,
    },

    /// One participant is in, the session waits for the second
    WaitingForOpponent {
        game_id: String,
    },

    /// Countdown before the first tick
    Countdown {
        remaining: u32,
    },

    /// Match has started
    MatchStart {
        message: String,
    },

    /// Canonical state after a tick
    StateSnapshot {
        players: HashMap<Uuid, PlayerSnapshot>,
        food: Cell,
    },

    /// Match has ended
    MatchOver {
        winner: Winner,
        scores: HashMap<Uuid, u32>,
    },

    /// A participant left before the match was decided
    ParticipantLeft {
        participant_id: Uuid,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Public state of one snake in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub role: Role,
    pub head: Cell,
    /// Head first
    pub body: Vec<Cell>,
    pub direction: Direction,
    pub score: u32,
    pub alive: bool,
    pub color: String,
}
