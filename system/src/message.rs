use crate::types::{CommandId, SessionId, TimerId, TimerMethod};
use serde::{Deserialize, Serialize};

/// A command as it travels over the wire, tagged so the issuing client can
/// correlate the reply with its request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifiableCommand {
    pub command_id: CommandId,
    pub timer_command: TimerCommand,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TimerCommand {
    CreateSession {
        method: TimerMethod,
        duration_minutes: u64,
    },
    JoinSession {
        session_id: SessionId,
    },
    StartTimer {
        session_id: SessionId,
    },
    PauseTimer {
        session_id: SessionId,
    },
    ResetTimer {
        session_id: SessionId,
        duration_minutes: Option<u64>,
    },
    SwitchMethod {
        session_id: SessionId,
        method: TimerMethod,
        duration_minutes: u64,
    },
    LeaveSession {
        session_id: SessionId,
    },
    GetState {
        session_id: SessionId,
    },
    GetActiveSessions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IdentifiableEvent {
    /// Direct reply to a command this connection issued.
    ByMyself {
        command_id: CommandId,
        result: CommandResult,
    },
    /// Unsolicited push to every participant of a session.
    BySystem { timer_event: TimerEvent },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommandResult {
    Reply(CommandReply),
    Error(CommandError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommandReply {
    SessionCreated {
        session_id: SessionId,
        timer_id: TimerId,
    },
    Ack,
    State(TimerView),
    ActiveSessions {
        sessions: Vec<SessionSummary>,
    },
}

/// Command rejections surfaced to the caller. None of these leave any
/// server-side state change behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum CommandError {
    #[error("Session not found")]
    SessionNotFound,
    #[error("Timer is already running")]
    TimerAlreadyRunning,
    #[error("Timer is not running")]
    TimerNotRunning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TimerEvent {
    StateChanged(TimerView),
    Completed(CompletionNotice),
}

/// Derived snapshot of a session's timer, broadcast to every participant.
/// Never stored; always recomputed from the authoritative session state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerView {
    pub session_id: SessionId,
    pub timer_id: TimerId,
    pub method: TimerMethod,
    pub minutes: u64,
    pub seconds: u64,
    pub is_running: bool,
    pub progress: f32,
}

/// Emitted exactly once when a running timer reaches zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionNotice {
    pub session_id: SessionId,
    pub method: TimerMethod,
    /// Milliseconds since the unix epoch.
    pub completed_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub method: TimerMethod,
    pub participant_count: usize,
    pub is_running: bool,
    pub time_left_seconds: u64,
}
