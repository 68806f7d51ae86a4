use crate::local_countdown::LocalCountdown;
use crate::message::{
    CommandError, CommandReply, CommandResult, IdentifiableCommand, TimerCommand, TimerEvent,
    TimerView,
};
use crate::types::{CommandId, SessionId, TimerMethod};
use std::collections::{HashMap, VecDeque};

/// The mode the host last persisted, fed back in on initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SavedMode {
    Local,
    Remote { session_id: Option<SessionId> },
}

/// Where the remote side of the reconciler currently stands. Everything
/// before `Joined` is part of the resume/discovery chain: rejoin the
/// remembered session, fall back to discovering one, create one if none
/// exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemotePhase {
    Rejoining,
    Discovering,
    Joining,
    Creating,
    Joined,
}

#[derive(Debug, Clone)]
struct RemoteSession {
    session_id: Option<SessionId>,
    last_view: Option<TimerView>,
    phase: RemotePhase,
}

/// Exactly one time source drives the displayed fields at any moment.
/// Modeled as a tagged variant so a mode switch cannot leave stale fields
/// of the other source behind.
#[derive(Debug, Clone)]
enum TimerMode {
    Remote(RemoteSession),
    Local(LocalCountdown),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Remote,
    Local,
}

/// The single observable view merged from whichever source is active.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedView {
    pub mode: ViewMode,
    pub session_id: Option<SessionId>,
    pub method: TimerMethod,
    pub minutes: u64,
    pub seconds: u64,
    pub is_running: bool,
    pub progress: f32,
}

/// Side effects the host must perform, drained after every call that can
/// produce them. Completion is what triggers the notification sound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientNotification {
    TimerCompleted { method: TimerMethod },
}

/// Client-side reconciler holding the remote session mirror and the local
/// fallback countdown behind one view.
///
/// The reconciler performs no I/O itself. The host pushes received server
/// events in through `handle_event`/`handle_result`, drains commands to
/// send from `take_outbound`, and drives the local fallback by calling
/// `local_tick` once per second while `wants_local_tick` returns true.
/// In remote mode the displayed state is never updated ahead of server
/// confirmation; commands only take effect once their broadcast arrives.
pub struct ClientTimer {
    mode: TimerMode,
    next_command_id: CommandId,
    pending: HashMap<CommandId, TimerCommand>,
    outbound: VecDeque<IdentifiableCommand>,
    notifications: VecDeque<ClientNotification>,
}

impl ClientTimer {
    pub fn new(saved: Option<SavedMode>) -> Self {
        let mut client = Self {
            mode: TimerMode::Local(LocalCountdown::new(TimerMethod::Pomodoro)),
            next_command_id: 0,
            pending: HashMap::new(),
            outbound: VecDeque::new(),
            notifications: VecDeque::new(),
        };
        match saved {
            Some(SavedMode::Remote {
                session_id: Some(session_id),
            }) => {
                client.mode = TimerMode::Remote(RemoteSession {
                    session_id: None,
                    last_view: None,
                    phase: RemotePhase::Rejoining,
                });
                client.issue(TimerCommand::JoinSession { session_id });
            }
            Some(SavedMode::Remote { session_id: None }) => {
                client.mode = TimerMode::Remote(RemoteSession {
                    session_id: None,
                    last_view: None,
                    phase: RemotePhase::Discovering,
                });
                client.issue(TimerCommand::GetActiveSessions);
            }
            Some(SavedMode::Local) | None => {}
        }
        client
    }

    /// The mode the host should persist for the next launch.
    pub fn saved_mode(&self) -> SavedMode {
        match &self.mode {
            TimerMode::Remote(remote) => SavedMode::Remote {
                session_id: remote.session_id,
            },
            TimerMode::Local(_) => SavedMode::Local,
        }
    }

    pub fn view(&self) -> MergedView {
        match &self.mode {
            TimerMode::Remote(remote) => match &remote.last_view {
                Some(view) => MergedView {
                    mode: ViewMode::Remote,
                    session_id: Some(view.session_id),
                    method: view.method,
                    minutes: view.minutes,
                    seconds: view.seconds,
                    is_running: view.is_running,
                    progress: view.progress,
                },
                // Nothing received yet; show an idle default.
                None => MergedView {
                    mode: ViewMode::Remote,
                    session_id: remote.session_id,
                    method: TimerMethod::Pomodoro,
                    minutes: TimerMethod::Pomodoro.default_duration_minutes(),
                    seconds: 0,
                    is_running: false,
                    progress: 0.0,
                },
            },
            TimerMode::Local(countdown) => MergedView {
                mode: ViewMode::Local,
                session_id: None,
                method: countdown.method(),
                minutes: countdown.minutes(),
                seconds: countdown.seconds(),
                is_running: countdown.is_running(),
                progress: countdown.progress(),
            },
        }
    }

    /// True while the host must run the one-second fallback interval.
    /// Goes false on pause, completion and mode switch, so a leaked
    /// interval can always be detected and stopped.
    pub fn wants_local_tick(&self) -> bool {
        matches!(&self.mode, TimerMode::Local(countdown) if countdown.is_running())
    }

    /// One second of local fallback time. No-op in remote mode.
    pub fn local_tick(&mut self) {
        if let TimerMode::Local(countdown) = &mut self.mode {
            if countdown.tick() {
                self.notifications.push_back(ClientNotification::TimerCompleted {
                    method: countdown.method(),
                });
            }
        }
    }

    /// Server push received over the socket.
    pub fn handle_event(&mut self, event: TimerEvent) {
        let TimerMode::Remote(remote) = &mut self.mode else {
            // A broadcast can still be in flight right after switching to
            // local mode; it no longer drives anything.
            log::debug!("Dropping server event in local mode: {:?}", event);
            return;
        };
        match event {
            TimerEvent::StateChanged(view) => {
                remote.session_id = Some(view.session_id);
                remote.phase = RemotePhase::Joined;
                remote.last_view = Some(view);
            }
            TimerEvent::Completed(notice) => {
                self.notifications.push_back(ClientNotification::TimerCompleted {
                    method: notice.method,
                });
            }
        }
    }

    /// Reply to a command this client issued earlier.
    pub fn handle_result(&mut self, command_id: CommandId, result: CommandResult) {
        let Some(command) = self.pending.remove(&command_id) else {
            log::warn!("Reply for unknown command id {}", command_id);
            return;
        };
        if !matches!(self.mode, TimerMode::Remote(_)) {
            return;
        }
        match (command, result) {
            (TimerCommand::JoinSession { .. }, CommandResult::Reply(_)) => {
                self.with_remote(|remote| {
                    remote.phase = RemotePhase::Joined;
                });
            }
            (
                TimerCommand::JoinSession { .. },
                CommandResult::Error(CommandError::SessionNotFound),
            ) => {
                // The remembered session is gone; discover or create one
                // instead of surfacing the failure.
                log::info!("Session to rejoin no longer exists, discovering");
                self.with_remote(|remote| {
                    remote.session_id = None;
                    remote.phase = RemotePhase::Discovering;
                });
                self.issue(TimerCommand::GetActiveSessions);
            }
            (
                TimerCommand::GetActiveSessions,
                CommandResult::Reply(CommandReply::ActiveSessions { sessions }),
            ) => match sessions.first() {
                Some(summary) => {
                    let session_id = summary.session_id;
                    self.with_remote(|remote| remote.phase = RemotePhase::Joining);
                    self.issue(TimerCommand::JoinSession { session_id });
                }
                None => {
                    self.with_remote(|remote| remote.phase = RemotePhase::Creating);
                    self.issue(TimerCommand::CreateSession {
                        method: TimerMethod::Pomodoro,
                        duration_minutes: TimerMethod::Pomodoro.default_duration_minutes(),
                    });
                }
            },
            (
                TimerCommand::CreateSession { .. },
                CommandResult::Reply(CommandReply::SessionCreated { session_id, .. }),
            ) => {
                self.with_remote(|remote| {
                    remote.session_id = Some(session_id);
                    remote.phase = RemotePhase::Joined;
                });
            }
            (command, CommandResult::Error(error)) => {
                // Start/pause races and the like; the next broadcast will
                // settle the view.
                log::warn!("Command {:?} rejected: {}", command, error);
            }
            _ => {}
        }
    }

    /// Start when stopped, pause when running, whichever source is live.
    pub fn toggle_timer(&mut self) {
        if let TimerMode::Local(countdown) = &mut self.mode {
            if countdown.is_running() {
                countdown.pause();
            } else {
                countdown.start();
            }
            return;
        }
        let Some(session_id) = self.remote_session_id() else {
            log::warn!("No session to control yet");
            return;
        };
        let running = self.view().is_running;
        if running {
            self.issue(TimerCommand::PauseTimer { session_id });
        } else {
            self.issue(TimerCommand::StartTimer { session_id });
        }
    }

    pub fn reset_timer(&mut self) {
        if let TimerMode::Local(countdown) = &mut self.mode {
            countdown.reset();
            return;
        }
        if let Some(session_id) = self.remote_session_id() {
            let duration_minutes = self.current_method().default_duration_minutes();
            self.issue(TimerCommand::ResetTimer {
                session_id,
                duration_minutes: Some(duration_minutes),
            });
        }
    }

    /// "Finish now": a reset to a zero duration.
    pub fn finish_timer(&mut self) {
        if let TimerMode::Local(countdown) = &mut self.mode {
            countdown.finish();
            return;
        }
        if let Some(session_id) = self.remote_session_id() {
            self.issue(TimerCommand::ResetTimer {
                session_id,
                duration_minutes: Some(0),
            });
        }
    }

    pub fn switch_method(&mut self, method: TimerMethod) {
        if let TimerMode::Local(countdown) = &mut self.mode {
            countdown.switch_method(method);
            return;
        }
        if let Some(session_id) = self.remote_session_id() {
            self.issue(TimerCommand::SwitchMethod {
                session_id,
                method,
                duration_minutes: method.default_duration_minutes(),
            });
        }
    }

    /// Leaves the session (if any) and hands the view over to a fresh,
    /// stopped countdown for the current method.
    pub fn switch_to_local(&mut self) {
        let method = self.current_method();
        if let TimerMode::Remote(remote) = &self.mode {
            if let Some(session_id) = remote.session_id {
                self.issue(TimerCommand::LeaveSession { session_id });
            }
        }
        self.mode = TimerMode::Local(LocalCountdown::new(method));
    }

    /// Stops the fallback countdown and starts session discovery.
    pub fn switch_to_remote(&mut self) {
        if matches!(self.mode, TimerMode::Remote(_)) {
            return;
        }
        self.mode = TimerMode::Remote(RemoteSession {
            session_id: None,
            last_view: None,
            phase: RemotePhase::Discovering,
        });
        self.issue(TimerCommand::GetActiveSessions);
    }

    pub fn current_method(&self) -> TimerMethod {
        match &self.mode {
            TimerMode::Remote(remote) => remote
                .last_view
                .as_ref()
                .map(|view| view.method)
                .unwrap_or(TimerMethod::Pomodoro),
            TimerMode::Local(countdown) => countdown.method(),
        }
    }

    /// Commands waiting to be written to the socket.
    pub fn take_outbound(&mut self) -> Vec<IdentifiableCommand> {
        self.outbound.drain(..).collect()
    }

    /// Side effects waiting to be performed by the host.
    pub fn take_notifications(&mut self) -> Vec<ClientNotification> {
        self.notifications.drain(..).collect()
    }

    fn issue(&mut self, command: TimerCommand) {
        let command_id = self.next_command_id;
        self.next_command_id = self.next_command_id.wrapping_add(1);
        self.pending.insert(command_id, command.clone());
        self.outbound.push_back(IdentifiableCommand {
            command_id,
            timer_command: command,
        });
    }

    fn with_remote(&mut self, f: impl FnOnce(&mut RemoteSession)) {
        if let TimerMode::Remote(remote) = &mut self.mode {
            f(remote);
        }
    }

    fn remote_session_id(&self) -> Option<SessionId> {
        match &self.mode {
            TimerMode::Remote(remote) => remote.session_id,
            TimerMode::Local(_) => None,
        }
    }
}
