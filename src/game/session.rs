//! Match session: participants, food, lifecycle status and event fan-out
//!
//! A `MatchSession` is a synchronous state machine. Every entry point checks
//! the current status first, so a stale timer callback or a late input is a
//! no-op rather than a mutation. Timers themselves live in `lifecycle`.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

use super::grid::{Cell, Direction};
use super::lifecycle::{SessionTimer, TimerKind};
use super::player::{PlayerState, Role};
use super::snapshot;
use super::tick::{self, TickOutcome, Winner};
use super::GameSettings;

/// Participants per session
pub const MAX_PLAYERS: usize = 2;

/// Outbound buffer per session; slow receivers skip rather than stall ticks
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    Countdown,
    Playing,
    Finished,
}

/// Why a join was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinRejected {
    #[error("session is full")]
    SessionFull,

    #[error("participant already joined")]
    AlreadyJoined,

    #[error("session has finished")]
    Finished,

    #[error("session was removed from the registry")]
    Retired,
}

/// Why a direction change was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InputRejected {
    #[error("session is not playing")]
    NotPlaying,

    #[error("participant is not in this session")]
    UnknownParticipant,

    #[error("participant is dead")]
    Dead,

    #[error("direction reverses the current heading")]
    Reversal,
}

/// Result of an accepted join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// First participant in, waiting for the second
    Waiting,
    /// Second participant in, countdown must be started
    CountdownStarted,
}

/// Result of a countdown timer firing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    /// Countdown still running
    Continue,
    /// Countdown hit zero and the match is now playing
    Start,
    /// Session already moved on; the callback is discarded
    Stale,
}

/// Result of a leave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Participant was not (or no longer) in the session
    NotPresent,
    /// Participant removed without affecting the status
    Left,
    /// Departure ended a countdown or running match
    Forfeit(Winner),
}

/// Public summary for the HTTP surface
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub game_id: String,
    pub status: SessionStatus,
    pub players: Vec<ParticipantSummary>,
    pub winner: Option<Winner>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantSummary {
    pub participant_id: Uuid,
    pub role: Role,
    pub score: u32,
    pub alive: bool,
}

/// Authoritative state of one match
pub struct MatchSession {
    pub id: String,
    pub status: SessionStatus,
    /// Join order; never more than two
    pub players: Vec<PlayerState>,
    pub food: Cell,
    pub winner: Option<Winner>,
    pub countdown_remaining: u32,
    /// Set once the registry has dropped this session
    pub retired: bool,
    timer: Option<SessionTimer>,
    settings: GameSettings,
    rng: ChaCha8Rng,
    events: broadcast::Sender<ServerMsg>,
}

impl MatchSession {
    pub fn new(id: impl Into<String>, settings: GameSettings, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let food = settings.grid.random_cell(&mut rng);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            id: id.into(),
            status: SessionStatus::Waiting,
            players: Vec::with_capacity(MAX_PLAYERS),
            food,
            winner: None,
            countdown_remaining: 0,
            retired: false,
            timer: None,
            settings,
            rng,
            events,
        }
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.events.subscribe()
    }

    /// Fan an event out to every subscriber. No subscribers is not an error.
    pub fn emit(&self, msg: ServerMsg) {
        let _ = self.events.send(msg);
    }

    pub fn player(&self, participant: Uuid) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.id == participant)
    }

    pub fn player_mut(&mut self, participant: Uuid) -> Option<&mut PlayerState> {
        self.players.iter_mut().find(|p| p.id == participant)
    }

    pub fn is_finished(&self) -> bool {
        self.status == SessionStatus::Finished
    }

    /// Nothing left worth keeping: finished or never started, and empty
    pub fn is_disposable(&self) -> bool {
        self.players.is_empty()
            && matches!(self.status, SessionStatus::Finished | SessionStatus::Waiting)
    }

    pub fn timer_kind(&self) -> Option<TimerKind> {
        self.timer.as_ref().map(SessionTimer::kind)
    }

    /// Admit a participant. A requested role that is already taken is swapped
    /// for the free one.
    pub fn join(&mut self, participant: Uuid, role: Role) -> Result<JoinOutcome, JoinRejected> {
        if self.retired {
            return Err(JoinRejected::Retired);
        }
        if self.is_finished() {
            return Err(JoinRejected::Finished);
        }
        if self.player(participant).is_some() {
            return Err(JoinRejected::AlreadyJoined);
        }
        if self.players.len() >= MAX_PLAYERS || self.status != SessionStatus::Waiting {
            return Err(JoinRejected::SessionFull);
        }

        let role = if self.players.iter().any(|p| p.role == role) {
            debug!(
                game_id = %self.id,
                participant_id = %participant,
                ?role,
                "Role taken, assigning the other"
            );
            role.other()
        } else {
            role
        };

        self.players
            .push(PlayerState::spawn(participant, role, &self.settings.grid));
        debug_assert!(self.players.len() <= MAX_PLAYERS);

        info!(
            game_id = %self.id,
            participant_id = %participant,
            ?role,
            player_count = self.players.len(),
            "Participant joined session"
        );

        if self.players.len() < MAX_PLAYERS {
            self.emit(ServerMsg::WaitingForOpponent {
                game_id: self.id.clone(),
            });
            return Ok(JoinOutcome::Waiting);
        }

        self.begin_countdown();
        Ok(JoinOutcome::CountdownStarted)
    }

    fn begin_countdown(&mut self) {
        self.status = SessionStatus::Countdown;
        self.countdown_remaining = self.settings.countdown_from;

        if self.players.iter().any(|p| p.occupies(self.food)) {
            let grid = self.settings.grid;
            if let Some(cell) = tick::place_food(&self.players, &grid, &mut self.rng) {
                self.food = cell;
            }
        }

        info!(game_id = %self.id, from = self.countdown_remaining, "Countdown started");
        self.emit(ServerMsg::Countdown {
            remaining: self.countdown_remaining,
        });
    }

    /// One countdown interval elapsed
    pub fn countdown_step(&mut self) -> CountdownStep {
        if self.status != SessionStatus::Countdown {
            return CountdownStep::Stale;
        }

        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        if self.countdown_remaining > 0 {
            self.emit(ServerMsg::Countdown {
                remaining: self.countdown_remaining,
            });
            return CountdownStep::Continue;
        }

        self.status = SessionStatus::Playing;
        info!(game_id = %self.id, "Match started");
        self.emit(ServerMsg::MatchStart {
            message: "GO!".to_string(),
        });
        CountdownStep::Start
    }

    /// One tick interval elapsed. `None` when the session is not playing.
    pub fn advance_tick(&mut self) -> Option<TickOutcome> {
        if self.status != SessionStatus::Playing {
            return None;
        }

        let outcome = tick::simulate(
            &mut self.players,
            &mut self.food,
            &self.settings.grid,
            &mut self.rng,
        );

        match outcome {
            TickOutcome::Continue => {
                self.emit(snapshot::state_snapshot(&self.players, self.food));
            }
            TickOutcome::Finished(winner) => {
                self.finish(winner);
                self.emit(snapshot::match_over(winner, &self.players));
            }
        }

        Some(outcome)
    }

    /// Store a new heading for the next tick. Last write wins.
    pub fn set_direction(
        &mut self,
        participant: Uuid,
        direction: Direction,
    ) -> Result<(), InputRejected> {
        if self.status != SessionStatus::Playing {
            return Err(InputRejected::NotPlaying);
        }
        let player = self
            .player_mut(participant)
            .ok_or(InputRejected::UnknownParticipant)?;
        if !player.alive {
            return Err(InputRejected::Dead);
        }
        if !player.steer(direction) {
            return Err(InputRejected::Reversal);
        }
        Ok(())
    }

    /// Remove a participant. Dropping below two players during a countdown or
    /// a running match ends it, with the remaining participant winning.
    pub fn leave(&mut self, participant: Uuid) -> LeaveOutcome {
        let Some(index) = self.players.iter().position(|p| p.id == participant) else {
            return LeaveOutcome::NotPresent;
        };
        let departed = self.players.remove(index);

        info!(
            game_id = %self.id,
            participant_id = %participant,
            status = ?self.status,
            "Participant left session"
        );

        let in_match = matches!(
            self.status,
            SessionStatus::Countdown | SessionStatus::Playing
        );
        if !in_match || self.players.len() >= MAX_PLAYERS {
            return LeaveOutcome::Left;
        }

        let winner = self
            .players
            .first()
            .map(|p| Winner::Participant(p.id))
            .unwrap_or(Winner::Draw);
        self.finish(winner);

        self.emit(ServerMsg::ParticipantLeft {
            participant_id: participant,
        });
        self.emit(snapshot::match_over(
            winner,
            self.players.iter().chain(std::iter::once(&departed)),
        ));

        LeaveOutcome::Forfeit(winner)
    }

    /// Enter the terminal status and cancel whatever timer is live
    fn finish(&mut self, winner: Winner) {
        self.status = SessionStatus::Finished;
        self.winner = Some(winner);
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        info!(game_id = %self.id, %winner, "Match over");
    }

    /// Install the session's only live timer, cancelling any previous one
    pub fn install_timer(&mut self, timer: SessionTimer) {
        debug_assert!(self.timer.is_none(), "session already owns a live timer");
        if let Some(previous) = self.timer.replace(timer) {
            previous.cancel();
        }
    }

    /// Called once the registry has dropped the session: no further joins,
    /// no live timer.
    pub fn retire(&mut self) {
        self.retired = true;
        self.status = SessionStatus::Finished;
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }

    /// Drop the handle of a timer that is ending on its own
    pub fn release_timer(&mut self) {
        self.timer.take();
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            game_id: self.id.clone(),
            status: self.status,
            players: self
                .players
                .iter()
                .map(|p| ParticipantSummary {
                    participant_id: p.id,
                    role: p.role,
                    score: p.score,
                    alive: p.alive,
                })
                .collect(),
            winner: self.winner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn session() -> MatchSession {
        MatchSession::new("m1", GameSettings::default(), 11)
    }

    fn drain(rx: &mut broadcast::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(msg) => out.push(msg),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return out,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
    }

    /// Two participants joined and the countdown run to completion
    fn playing() -> (MatchSession, Uuid, Uuid) {
        let mut s = session();
        let host = Uuid::new_v4();
        let challenger = Uuid::new_v4();
        s.join(host, Role::Host).unwrap();
        s.join(challenger, Role::Challenger).unwrap();
        while s.countdown_step() == CountdownStep::Continue {}
        assert_eq!(s.status, SessionStatus::Playing);
        (s, host, challenger)
    }

    #[test]
    fn test_join_flow() {
        let mut s = session();
        let mut rx = s.subscribe();
        let host = Uuid::new_v4();
        let challenger = Uuid::new_v4();

        assert_eq!(s.join(host, Role::Host), Ok(JoinOutcome::Waiting));
        assert_eq!(s.status, SessionStatus::Waiting);
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMsg::WaitingForOpponent { game_id }] if game_id == "m1"
        ));

        assert_eq!(s.join(challenger, Role::Challenger), Ok(JoinOutcome::CountdownStarted));
        assert_eq!(s.status, SessionStatus::Countdown);
        assert_eq!(s.player(host).unwrap().head, Cell::new(5, 5));
        assert_eq!(s.player(challenger).unwrap().head, Cell::new(14, 14));
        assert!(s.players.iter().all(|p| !p.occupies(s.food)));
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMsg::Countdown { remaining: 3 }]
        ));
    }

    #[test]
    fn test_join_rejections() {
        let mut s = session();
        let host = Uuid::new_v4();
        s.join(host, Role::Host).unwrap();
        assert_eq!(s.join(host, Role::Host), Err(JoinRejected::AlreadyJoined));

        s.join(Uuid::new_v4(), Role::Challenger).unwrap();
        assert_eq!(
            s.join(Uuid::new_v4(), Role::Challenger),
            Err(JoinRejected::SessionFull)
        );
        assert_eq!(s.players.len(), 2);
    }

    #[test]
    fn test_role_conflict_assigns_free_role() {
        let mut s = session();
        s.join(Uuid::new_v4(), Role::Host).unwrap();
        let second = Uuid::new_v4();
        s.join(second, Role::Host).unwrap();

        let p = s.player(second).unwrap();
        assert_eq!(p.role, Role::Challenger);
        assert_eq!(p.head, Cell::new(14, 14));
    }

    #[test]
    fn test_countdown_steps() {
        let mut s = session();
        s.join(Uuid::new_v4(), Role::Host).unwrap();
        s.join(Uuid::new_v4(), Role::Challenger).unwrap();
        let mut rx = s.subscribe();

        assert_eq!(s.countdown_step(), CountdownStep::Continue);
        assert_eq!(s.countdown_step(), CountdownStep::Continue);
        assert_eq!(s.countdown_step(), CountdownStep::Start);
        assert_eq!(s.status, SessionStatus::Playing);
        assert_eq!(s.countdown_step(), CountdownStep::Stale);

        let events = drain(&mut rx);
        assert!(matches!(
            events.as_slice(),
            [
                ServerMsg::Countdown { remaining: 2 },
                ServerMsg::Countdown { remaining: 1 },
                ServerMsg::MatchStart { .. },
            ]
        ));
    }

    #[test]
    fn test_tick_only_while_playing() {
        let mut s = session();
        assert_eq!(s.advance_tick(), None);

        let (mut s, _, _) = playing();
        let mut rx = s.subscribe();
        assert_eq!(s.advance_tick(), Some(TickOutcome::Continue));
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMsg::StateSnapshot { .. }]
        ));
    }

    #[test]
    fn test_reversal_rejected() {
        let (mut s, host, _) = playing();

        assert_eq!(
            s.set_direction(host, Direction::LEFT),
            Err(InputRejected::Reversal)
        );
        assert_eq!(s.player(host).unwrap().direction, Direction::RIGHT);

        assert_eq!(s.set_direction(host, Direction::DOWN), Ok(()));
        assert_eq!(s.set_direction(host, Direction::UP), Err(InputRejected::Reversal));
        assert_eq!(s.player(host).unwrap().direction, Direction::DOWN);
    }

    #[test]
    fn test_input_ignored_outside_play() {
        let mut s = session();
        let host = Uuid::new_v4();
        s.join(host, Role::Host).unwrap();
        assert_eq!(
            s.set_direction(host, Direction::DOWN),
            Err(InputRejected::NotPlaying)
        );

        let (mut s, _, _) = playing();
        assert_eq!(
            s.set_direction(Uuid::new_v4(), Direction::DOWN),
            Err(InputRejected::UnknownParticipant)
        );
    }

    #[test]
    fn test_wall_death_ends_match() {
        let (mut s, host, challenger) = playing();
        {
            let p = s.player_mut(host).unwrap();
            p.head = Cell::new(19, 5);
            p.body = [Cell::new(19, 5)].into();
        }
        s.food = Cell::new(0, 0);
        let mut rx = s.subscribe();

        let outcome = s.advance_tick();

        assert_eq!(
            outcome,
            Some(TickOutcome::Finished(Winner::Participant(challenger)))
        );
        assert!(!s.player(host).unwrap().alive);
        assert_eq!(s.status, SessionStatus::Finished);
        assert_eq!(s.winner, Some(Winner::Participant(challenger)));
        match drain(&mut rx).as_slice() {
            [ServerMsg::MatchOver { winner, scores }] => {
                assert_eq!(*winner, Winner::Participant(challenger));
                assert_eq!(scores.len(), 2);
            }
            other => panic!("unexpected events: {other:?}"),
        }

        // No further mutation once finished
        assert_eq!(s.advance_tick(), None);
        assert_eq!(
            s.set_direction(challenger, Direction::UP),
            Err(InputRejected::NotPlaying)
        );
    }

    #[test]
    fn test_forfeit_on_leave() {
        let (mut s, host, challenger) = playing();
        let mut rx = s.subscribe();

        assert_eq!(
            s.leave(challenger),
            LeaveOutcome::Forfeit(Winner::Participant(host))
        );
        assert_eq!(s.status, SessionStatus::Finished);

        match drain(&mut rx).as_slice() {
            [
                ServerMsg::ParticipantLeft { participant_id },
                ServerMsg::MatchOver { winner, scores },
            ] => {
                assert_eq!(*participant_id, challenger);
                assert_eq!(*winner, Winner::Participant(host));
                assert!(scores.contains_key(&host));
                assert!(scores.contains_key(&challenger));
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn test_leave_is_idempotent() {
        let (mut s, host, challenger) = playing();
        let mut rx = s.subscribe();

        s.leave(challenger);
        let first = drain(&mut rx);
        assert_eq!(first.len(), 2);

        assert_eq!(s.leave(challenger), LeaveOutcome::NotPresent);
        assert_eq!(s.status, SessionStatus::Finished);
        assert_eq!(s.winner, Some(Winner::Participant(host)));
        assert!(drain(&mut rx).is_empty());

        // Last one out leaves a disposable session behind
        assert_eq!(s.leave(host), LeaveOutcome::Left);
        assert!(s.is_disposable());
    }

    #[test]
    fn test_leave_during_countdown_forfeits() {
        let mut s = session();
        let host = Uuid::new_v4();
        s.join(host, Role::Host).unwrap();
        let challenger = Uuid::new_v4();
        s.join(challenger, Role::Challenger).unwrap();

        assert_eq!(s.leave(host), LeaveOutcome::Forfeit(Winner::Participant(challenger)));
        assert_eq!(s.countdown_step(), CountdownStep::Stale);
    }

    #[test]
    fn test_leave_while_waiting() {
        let mut s = session();
        let host = Uuid::new_v4();
        s.join(host, Role::Host).unwrap();

        assert_eq!(s.leave(host), LeaveOutcome::Left);
        assert_eq!(s.status, SessionStatus::Waiting);
        assert!(s.is_disposable());
    }

    #[test]
    fn test_finished_session_rejects_join() {
        let (mut s, host, _) = playing();
        s.leave(host);
        assert_eq!(s.join(Uuid::new_v4(), Role::Host), Err(JoinRejected::Finished));
    }
}
