use serde::{Deserialize, Serialize};

pub type ConnectionId = u16;
pub type CommandId = u16;
pub type SessionId = uuid::Uuid;
pub type TimerId = uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerMethod {
    Pomodoro,
    ShortBreak,
    LongBreak,
}

impl TimerMethod {
    pub fn default_duration_minutes(&self) -> u64 {
        match self {
            TimerMethod::Pomodoro => 25,
            TimerMethod::ShortBreak => 5,
            TimerMethod::LongBreak => 15,
        }
    }

    pub fn default_duration_seconds(&self) -> u64 {
        self.default_duration_minutes() * 60
    }
}

impl std::fmt::Display for TimerMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerMethod::Pomodoro => write!(f, "pomodoro"),
            TimerMethod::ShortBreak => write!(f, "shortBreak"),
            TimerMethod::LongBreak => write!(f, "longBreak"),
        }
    }
}
