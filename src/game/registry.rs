//! Registry of all live sessions

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

use super::lifecycle::SessionHandle;
use super::player::Role;
use super::session::{JoinRejected, LeaveOutcome, MatchSession};
use super::GameSettings;

/// Maps session identifiers to sessions. Creation goes through the map's entry
/// API, so two racing joins for an unseen id end up in the same session.
pub struct SessionRegistry {
    sessions: DashMap<String, SessionHandle>,
    settings: GameSettings,
}

impl SessionRegistry {
    pub fn new(settings: GameSettings) -> Self {
        Self {
            sessions: DashMap::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    /// Existing session, or a new `waiting` one with freshly placed food
    pub fn get_or_create(&self, id: &str) -> SessionHandle {
        if let Some(existing) = self.get(id) {
            return existing;
        }

        self.sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                info!(game_id = %id, "Created new session");
                let seed = rand::random::<u64>();
                SessionHandle::new(MatchSession::new(id, self.settings, seed))
            })
            .value()
            .clone()
    }

    /// Join a session, creating it if needed. A join that lands on a handle
    /// the registry has just retired is retried against a fresh session.
    pub fn join(
        &self,
        id: &str,
        participant: Uuid,
        role: Role,
    ) -> Result<(SessionHandle, broadcast::Receiver<ServerMsg>), JoinRejected> {
        let mut attempt = 0;
        loop {
            let session = self.get_or_create(id);
            match session.join(participant, role) {
                Ok(rx) => return Ok((session, rx)),
                Err(JoinRejected::Retired) if attempt == 0 => attempt += 1,
                Err(e) => return Err(e),
            }
        }
    }

    /// Leave a session and drop it from the registry once nothing is left
    pub fn leave(&self, id: &str, participant: Uuid) -> LeaveOutcome {
        let Some(session) = self.get(id) else {
            debug!(game_id = %id, participant_id = %participant, "Leave for unknown session");
            return LeaveOutcome::NotPresent;
        };

        let outcome = session.leave(participant);
        self.remove_if_disposable(&session);
        outcome
    }

    /// Delete a session outright, cancelling whatever timer it still runs
    pub fn remove(&self, id: &str) -> Option<SessionHandle> {
        let (_, session) = self.sessions.remove(id)?;
        session.lock().retire();
        info!(game_id = %id, "Session removed from registry");
        Some(session)
    }

    /// Drop every finished, empty session. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| {
            let mut state = session.lock();
            if state.is_disposable() {
                state.retire();
                false
            } else {
                true
            }
        });
        before.saturating_sub(self.sessions.len())
    }

    fn remove_if_disposable(&self, session: &SessionHandle) {
        let removed = self.sessions.remove_if(session.id(), |_, current| {
            if !current.ptr_eq(session) {
                return false;
            }
            let mut state = current.lock();
            if state.is_disposable() {
                state.retire();
                true
            } else {
                false
            }
        });
        if removed.is_some() {
            info!(game_id = %session.id(), "Session removed from registry");
        }
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|s| s.key().clone()).collect()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn total_players(&self) -> usize {
        self.sessions.iter().map(|s| s.value().player_count()).sum()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(GameSettings::default())
    }
}
