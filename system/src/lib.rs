pub extern crate bincode;
pub extern crate serde;
pub extern crate serde_json;
pub extern crate uuid;

mod client_timer;
mod local_countdown;
mod message;
mod session_timer;
mod types;

pub use client_timer::{ClientNotification, ClientTimer, MergedView, SavedMode, ViewMode};
pub use local_countdown::LocalCountdown;
pub use message::{
    CommandError, CommandReply, CommandResult, CompletionNotice, IdentifiableCommand,
    IdentifiableEvent, SessionSummary, TimerCommand, TimerEvent, TimerView,
};
pub use session_timer::{progress_percent, SessionTimer, TickOutcome};
pub use types::{CommandId, ConnectionId, SessionId, TimerId, TimerMethod};
