//! Tick simulation: simultaneous movement, collisions, food and termination
//!
//! Every rule in a tick is evaluated against one frozen pre-tick snapshot of
//! both bodies, so the order in which the two snakes are stored never decides a
//! collision. Only after all verdicts are in is any movement applied.

use std::collections::VecDeque;
use std::fmt;

use rand::Rng;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, warn};
use uuid::Uuid;

use super::grid::{Cell, Grid};
use super::player::PlayerState;

/// Declared result of a finished match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Participant(Uuid),
    Draw,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::Participant(id) => write!(f, "{id}"),
            Winner::Draw => f.write_str("draw"),
        }
    }
}

impl Serialize for Winner {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Winner {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == "draw" {
            return Ok(Winner::Draw);
        }
        raw.parse::<Uuid>()
            .map(Winner::Participant)
            .map_err(de::Error::custom)
    }
}

/// What a tick decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Finished(Winner),
}

/// Advance both snakes by one cell and resolve the consequences.
///
/// `players` holds the two participants of a playing session. Dead snakes are
/// left untouched. A snake killed this tick still moves onto its candidate
/// cell so the final state shows where it died.
pub fn simulate<R: Rng + ?Sized>(
    players: &mut [PlayerState],
    food: &mut Cell,
    grid: &Grid,
    rng: &mut R,
) -> TickOutcome {
    debug_assert_eq!(players.len(), 2, "a tick needs exactly two players");

    // Phase one: verdicts from the frozen snapshot
    let before: Vec<VecDeque<Cell>> = players.iter().map(|p| p.body.clone()).collect();
    let moving: Vec<bool> = players.iter().map(|p| p.alive).collect();
    let candidates: Vec<Cell> = players.iter().map(|p| p.head.step(p.direction)).collect();
    let mut alive = moving.clone();

    for i in 0..players.len() {
        if !moving[i] {
            continue;
        }
        let candidate = candidates[i];

        if !grid.contains(candidate) {
            alive[i] = false;
        }
        if before[i].contains(&candidate) {
            alive[i] = false;
        }
    }

    for i in 0..players.len() {
        if !alive[i] {
            continue;
        }
        let hits_other = before
            .iter()
            .enumerate()
            .any(|(j, body)| j != i && body.contains(&candidates[i]));
        if hits_other {
            alive[i] = false;
        }
    }

    let survivors_before_heads = alive.clone();
    for i in 0..players.len() {
        for j in (i + 1)..players.len() {
            if survivors_before_heads[i]
                && survivors_before_heads[j]
                && candidates[i] == candidates[j]
            {
                alive[i] = false;
                alive[j] = false;
            }
        }
    }

    // Phase two: apply movement, then food
    for (i, player) in players.iter_mut().enumerate() {
        if moving[i] {
            player.advance_to(candidates[i]);
            player.alive = alive[i];
        }
    }

    let mut eaten = false;
    for (i, player) in players.iter_mut().enumerate() {
        if !moving[i] {
            continue;
        }
        if player.alive && player.head == *food {
            player.grow();
            eaten = true;
            debug!(participant_id = %player.id, score = player.score, "Food eaten");
        } else {
            player.drop_tail();
        }
    }

    // Relocate only once every tail has settled
    if eaten {
        match place_food(players, grid, rng) {
            Some(cell) => *food = cell,
            None => warn!("No free cell left for food"),
        }
    }

    resolve_winner(players)
}

/// Pick a food cell outside every body
pub fn place_food<R: Rng + ?Sized>(
    players: &[PlayerState],
    grid: &Grid,
    rng: &mut R,
) -> Option<Cell> {
    let cell = grid.random_free_cell(rng, |cell| players.iter().any(|p| p.occupies(cell)))?;
    debug_assert!(players.iter().all(|p| !p.occupies(cell)), "food placed on a snake");
    Some(cell)
}

fn resolve_winner(players: &[PlayerState]) -> TickOutcome {
    if players.iter().all(|p| p.alive) {
        return TickOutcome::Continue;
    }

    let mut survivors = players.iter().filter(|p| p.alive);
    match (survivors.next(), survivors.next()) {
        (Some(winner), None) => TickOutcome::Finished(Winner::Participant(winner.id)),
        _ => TickOutcome::Finished(Winner::Draw),
    }
}
