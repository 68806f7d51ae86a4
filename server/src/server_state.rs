use crate::session::Session;
use std::collections::HashMap;
use std::num::Wrapping;
use std::time::Instant;
use system::{CommandError, ConnectionId, SessionId, SessionSummary, TimerMethod};

/// All server-side state, owned by the dispatch loop. Sessions plus the
/// connection-to-session registry used to clean up on disconnect.
pub struct ServerState {
    connection_id_source: Wrapping<ConnectionId>,
    pub connection_locations: HashMap<ConnectionId, SessionId>,
    pub sessions: HashMap<SessionId, Session>,
}

pub struct LeaveOutcome {
    pub session_id: SessionId,
    /// True when the leaver was the last participant and the session was
    /// destroyed with them.
    pub deleted: bool,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            connection_id_source: Wrapping(0),
            connection_locations: HashMap::new(),
            sessions: HashMap::new(),
        }
    }

    pub fn create_connection(&mut self) -> ConnectionId {
        self.connection_id_source += Wrapping(1);
        self.connection_id_source.0
    }

    pub fn disconnect(&mut self, connection_id: &ConnectionId) {
        self.connection_locations.remove(connection_id);
    }

    pub fn current_session_of(&self, connection_id: &ConnectionId) -> Option<SessionId> {
        self.connection_locations.get(connection_id).copied()
    }

    pub fn create_session(
        &mut self,
        creator: ConnectionId,
        method: TimerMethod,
        duration_minutes: u64,
    ) -> SessionId {
        let session_id = SessionId::new_v4();
        self.sessions.insert(
            session_id,
            Session::new(session_id, method, duration_minutes, creator),
        );
        self.connection_locations.insert(creator, session_id);
        log::info!("Connection {} created session {}", creator, session_id);
        session_id
    }

    /// Adds the connection to the session's participant set. Idempotent
    /// for a connection that is already a participant.
    pub fn join_session(
        &mut self,
        connection_id: ConnectionId,
        session_id: &SessionId,
    ) -> Result<(), CommandError> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or(CommandError::SessionNotFound)?;
        if !session.participants.contains(&connection_id) {
            session.participants.push(connection_id);
        }
        self.connection_locations.insert(connection_id, *session_id);
        log::info!("Connection {} joined session {}", connection_id, session_id);
        Ok(())
    }

    /// Removes the connection from its current session, destroying the
    /// session when its participant set becomes empty.
    pub fn leave_session(&mut self, connection_id: &ConnectionId) -> Option<LeaveOutcome> {
        let session_id = self.connection_locations.remove(connection_id)?;
        let mut deleted = false;
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.participants.retain(|id| id != connection_id);
            if session.participants.is_empty() {
                self.sessions.remove(&session_id);
                deleted = true;
                log::info!("Session {} deleted (no participants)", session_id);
            }
        }
        log::info!("Connection {} left session {}", connection_id, session_id);
        Some(LeaveOutcome {
            session_id,
            deleted,
        })
    }

    pub fn get_session(&self, session_id: &SessionId) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn get_session_mut(&mut self, session_id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(session_id)
    }

    pub fn summaries_at(&self, now: Instant) -> Vec<SessionSummary> {
        self.sessions
            .values()
            .map(|session| session.summary_at(now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_removes_the_session_when_all_participants_leave() {
        let mut state = ServerState::new();
        let first = state.create_connection();
        let second = state.create_connection();
        let session_id = state.create_session(first, TimerMethod::Pomodoro, 25);
        state.join_session(second, &session_id).expect("join");

        let outcome = state.leave_session(&first).expect("leave");
        assert!(!outcome.deleted);
        assert!(state.get_session(&session_id).is_some());

        let outcome = state.leave_session(&second).expect("leave");
        assert!(outcome.deleted);
        assert!(state.get_session(&session_id).is_none());
        assert!(state.sessions.is_empty());
    }

    #[test]
    fn it_joins_idempotently() {
        let mut state = ServerState::new();
        let creator = state.create_connection();
        let session_id = state.create_session(creator, TimerMethod::Pomodoro, 25);

        state.join_session(creator, &session_id).expect("join");
        state.join_session(creator, &session_id).expect("join");
        assert_eq!(
            state.get_session(&session_id).unwrap().participants,
            vec![creator]
        );
    }

    #[test]
    fn it_rejects_joining_a_missing_session() {
        let mut state = ServerState::new();
        let connection_id = state.create_connection();
        assert_eq!(
            state.join_session(connection_id, &SessionId::new_v4()),
            Err(CommandError::SessionNotFound)
        );
        assert!(state.current_session_of(&connection_id).is_none());
    }

    #[test]
    fn it_tracks_the_connection_location() {
        let mut state = ServerState::new();
        let creator = state.create_connection();
        let session_id = state.create_session(creator, TimerMethod::ShortBreak, 5);
        assert_eq!(state.current_session_of(&creator), Some(session_id));

        state.disconnect(&creator);
        assert!(state.current_session_of(&creator).is_none());
    }
}
