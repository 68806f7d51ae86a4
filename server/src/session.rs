use std::time::Instant;
use system::{ConnectionId, SessionId, SessionSummary, SessionTimer, TimerMethod, TimerView};

/// One shared timer with its participant set. Destroyed by `ServerState`
/// the instant the participant set becomes empty.
pub struct Session {
    pub session_id: SessionId,
    pub participants: Vec<ConnectionId>,
    pub timer: SessionTimer,
}

impl Session {
    pub fn new(
        session_id: SessionId,
        method: TimerMethod,
        duration_minutes: u64,
        creator: ConnectionId,
    ) -> Self {
        Self {
            session_id,
            participants: vec![creator],
            timer: SessionTimer::new(method, duration_minutes),
        }
    }

    pub fn view_at(&self, now: Instant) -> TimerView {
        self.timer.view_at(self.session_id, now)
    }

    pub fn summary_at(&self, now: Instant) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id,
            method: self.timer.method(),
            participant_count: self.participants.len(),
            is_running: self.timer.is_running(),
            time_left_seconds: self.timer.remaining_at(now),
        }
    }
}
