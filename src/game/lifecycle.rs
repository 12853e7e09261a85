//! Lifecycle controller: drives a session through countdown and play on
//! owned, cancelable timer tasks.
//!
//! Each session has at most one timer task alive. Callbacks take the session
//! lock and re-check the status before mutating, so a tick that fires after
//! `finish` has aborted its task is discarded.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

use super::grid::Direction;
use super::player::Role;
use super::session::{
    CountdownStep, InputRejected, JoinOutcome, JoinRejected, LeaveOutcome, MatchSession,
    SessionStatus, SessionSummary,
};
use super::tick::TickOutcome;

/// Which timer a session currently owns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Countdown,
    Tick,
}

/// Handle to a running timer task
#[derive(Debug)]
pub struct SessionTimer {
    kind: TimerKind,
    handle: JoinHandle<()>,
}

impl SessionTimer {
    pub fn new(kind: TimerKind, handle: JoinHandle<()>) -> Self {
        Self { kind, handle }
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

/// Shared handle to a session; cheap to clone
#[derive(Clone)]
pub struct SessionHandle {
    id: Arc<str>,
    inner: Arc<Mutex<MatchSession>>,
}

impl SessionHandle {
    pub fn new(session: MatchSession) -> Self {
        Self {
            id: Arc::from(session.id.as_str()),
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn lock(&self) -> MutexGuard<'_, MatchSession> {
        self.inner.lock()
    }

    pub fn ptr_eq(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Join and subscribe in one step, so the joiner receives the events its
    /// own join produces. Starts the countdown timer on the second join.
    pub fn join(
        &self,
        participant: Uuid,
        role: Role,
    ) -> Result<broadcast::Receiver<ServerMsg>, JoinRejected> {
        let mut session = self.lock();
        let rx = session.subscribe();

        if session.join(participant, role)? == JoinOutcome::CountdownStarted {
            let handle = tokio::spawn(run_countdown(self.clone()));
            session.install_timer(SessionTimer::new(TimerKind::Countdown, handle));
        }

        Ok(rx)
    }

    pub fn set_direction(
        &self,
        participant: Uuid,
        direction: Direction,
    ) -> Result<(), InputRejected> {
        self.lock().set_direction(participant, direction)
    }

    pub fn leave(&self, participant: Uuid) -> LeaveOutcome {
        self.lock().leave(participant)
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().status
    }

    pub fn player_count(&self) -> usize {
        self.lock().players.len()
    }

    pub fn summary(&self) -> SessionSummary {
        self.lock().summary()
    }
}

/// Countdown timer: one step per `countdown_step`, then hand over to the tick
/// timer.
async fn run_countdown(session: SessionHandle) {
    let period = session.lock().settings().countdown_step;
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        ticker.tick().await;

        let mut state = session.lock();
        match state.countdown_step() {
            CountdownStep::Continue => {}
            CountdownStep::Start => {
                state.release_timer();
                let handle = tokio::spawn(run_ticks(session.clone()));
                state.install_timer(SessionTimer::new(TimerKind::Tick, handle));
                return;
            }
            CountdownStep::Stale => {
                debug!(game_id = %session.id(), "Discarding stale countdown callback");
                return;
            }
        }
    }
}

/// Tick timer: runs the simulator until the match is decided
async fn run_ticks(session: SessionHandle) {
    let period = session.lock().settings().tick_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let mut state = session.lock();
        match state.advance_tick() {
            Some(TickOutcome::Continue) => {}
            Some(TickOutcome::Finished(_)) => return,
            None => {
                debug!(game_id = %session.id(), "Discarding stale tick callback");
                return;
            }
        }
    }
}
