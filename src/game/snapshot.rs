//! Snapshot building for network transmission

use std::collections::HashMap;
use uuid::Uuid;

use crate::ws::protocol::{PlayerSnapshot, ServerMsg};

use super::grid::Cell;
use super::player::PlayerState;
use super::tick::Winner;

impl From<&PlayerState> for PlayerSnapshot {
    fn from(p: &PlayerState) -> Self {
        Self {
            role: p.role,
            head: p.head,
            body: p.body.iter().copied().collect(),
            direction: p.direction,
            score: p.score,
            alive: p.alive,
            color: p.color().to_string(),
        }
    }
}

/// Build the per-tick state message
pub fn state_snapshot(players: &[PlayerState], food: Cell) -> ServerMsg {
    ServerMsg::StateSnapshot {
        players: players.iter().map(|p| (p.id, PlayerSnapshot::from(p))).collect(),
        food,
    }
}

/// Scores keyed by participant
pub fn scores<'a>(players: impl IntoIterator<Item = &'a PlayerState>) -> HashMap<Uuid, u32> {
    players.into_iter().map(|p| (p.id, p.score)).collect()
}

/// Build the terminal message
pub fn match_over<'a>(
    winner: Winner,
    players: impl IntoIterator<Item = &'a PlayerState>,
) -> ServerMsg {
    ServerMsg::MatchOver {
        winner,
        scores: scores(players),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Grid, Role};

    #[test]
    fn test_state_snapshot_carries_both_players_and_food() {
        let grid = Grid::new(20, 20);
        let host = PlayerState::spawn(Uuid::new_v4(), Role::Host, &grid);
        let challenger = PlayerState::spawn(Uuid::new_v4(), Role::Challenger, &grid);
        let players = vec![host.clone(), challenger.clone()];

        match state_snapshot(&players, Cell::new(1, 2)) {
            ServerMsg::StateSnapshot { players, food } => {
                assert_eq!(food, Cell::new(1, 2));
                assert_eq!(players.len(), 2);
                let h = &players[&host.id];
                assert_eq!(h.head, Cell::new(5, 5));
                assert_eq!(h.body, vec![Cell::new(5, 5)]);
                assert_eq!(h.color, "#ccff00");
                assert!(h.alive);
                assert_eq!(players[&challenger.id].role, Role::Challenger);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_match_over_scores() {
        let grid = Grid::new(20, 20);
        let mut host = PlayerState::spawn(Uuid::new_v4(), Role::Host, &grid);
        host.score = 30;
        let challenger = PlayerState::spawn(Uuid::new_v4(), Role::Challenger, &grid);

        match match_over(Winner::Participant(host.id), [&host, &challenger]) {
            ServerMsg::MatchOver { winner, scores } => {
                assert_eq!(winner, Winner::Participant(host.id));
                assert_eq!(scores[&host.id], 30);
                assert_eq!(scores[&challenger.id], 0);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
