use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc::{channel, Sender};

use system::{
    CommandError, CommandReply, CommandResult, CompletionNotice, ConnectionId,
    IdentifiableCommand, IdentifiableEvent, SessionId, TickOutcome, TimerCommand, TimerEvent,
};

use crate::admin::AdminCommand;
use crate::connection::ConnectionEvent;
use crate::connection_tx_storage::{ConnectionTx, ConnectionTxStorage};
use crate::server_state::ServerState;
use crate::tick_scheduler::TickScheduler;

pub type ServerTx = Sender<ServerCommand>;

#[derive(Debug)]
pub enum ServerCommand {
    Connect {
        tx: ConnectionTx,
    },
    Disconnect {
        from: ConnectionId,
    },
    IdentifiableCommand {
        from: ConnectionId,
        command: IdentifiableCommand,
    },
    Tick {
        session_id: SessionId,
    },
    Admin(AdminCommand),
}

/// Single-dispatch command processor. Every command handler and every tick
/// runs to completion inside one loop iteration, so session mutations are
/// atomic with respect to each other and broadcasts observe committed
/// state in mutation order.
struct Server {
    state: ServerState,
    connections: ConnectionTxStorage,
    scheduler: TickScheduler,
    srv_tx: ServerTx,
}

impl Server {
    fn new(srv_tx: ServerTx) -> Self {
        Self {
            state: ServerState::new(),
            connections: ConnectionTxStorage::new(),
            scheduler: TickScheduler::new(),
            srv_tx,
        }
    }

    async fn handle_server_command(&mut self, command: ServerCommand) {
        match command {
            ServerCommand::Connect { tx } => {
                let connection_id = self.state.create_connection();
                self.connections.insert(connection_id, tx);
                self.connections
                    .send(&connection_id, ConnectionEvent::Connected { connection_id })
                    .await;
                log::info!("Connection {} established", connection_id);
            }
            ServerCommand::Disconnect { from } => {
                // Same cleanup as an explicit leave; a dropped connection
                // must not keep a session or its tick entry alive.
                self.leave_current_session(&from).await;
                self.state.disconnect(&from);
                self.connections.remove(&from);
                log::info!("Connection {} disconnected", from);
            }
            ServerCommand::IdentifiableCommand {
                from,
                command:
                    IdentifiableCommand {
                        command_id,
                        timer_command,
                    },
            } => {
                log::debug!("Command from {}: {:?}", from, timer_command);
                let result = match self.handle_timer_command(&from, timer_command).await {
                    Ok(reply) => CommandResult::Reply(reply),
                    Err(error) => CommandResult::Error(error),
                };
                self.connections
                    .send(
                        &from,
                        ConnectionEvent::IdentifiableEvent(IdentifiableEvent::ByMyself {
                            command_id,
                            result,
                        }),
                    )
                    .await;
            }
            ServerCommand::Tick { session_id } => self.handle_tick(&session_id).await,
            ServerCommand::Admin(AdminCommand::ListSessions { tx }) => {
                let _ = tx.send(self.state.summaries_at(Instant::now()));
            }
        }
    }

    /// Applies one client command. Either the mutation commits fully and
    /// the resulting view is broadcast, or nothing changes and the error
    /// goes back to the caller.
    async fn handle_timer_command(
        &mut self,
        from: &ConnectionId,
        command: TimerCommand,
    ) -> Result<CommandReply, CommandError> {
        match command {
            TimerCommand::CreateSession {
                method,
                duration_minutes,
            } => {
                self.leave_current_session(from).await;
                let session_id = self.state.create_session(*from, method, duration_minutes);
                let timer_id = self
                    .state
                    .get_session(&session_id)
                    .expect("session was just created")
                    .timer
                    .timer_id();
                self.broadcast_view(&session_id).await;
                Ok(CommandReply::SessionCreated {
                    session_id,
                    timer_id,
                })
            }
            TimerCommand::JoinSession { session_id } => {
                if self.state.get_session(&session_id).is_none() {
                    return Err(CommandError::SessionNotFound);
                }
                // A connection lives in at most one session; joining a
                // different one implies leaving the old one.
                if self.state.current_session_of(from) != Some(session_id) {
                    self.leave_current_session(from).await;
                }
                self.state.join_session(*from, &session_id)?;
                let view = self
                    .state
                    .get_session(&session_id)
                    .expect("session exists")
                    .view_at(Instant::now());
                self.connections
                    .send(
                        from,
                        ConnectionEvent::IdentifiableEvent(IdentifiableEvent::BySystem {
                            timer_event: TimerEvent::StateChanged(view),
                        }),
                    )
                    .await;
                self.broadcast_view(&session_id).await;
                Ok(CommandReply::Ack)
            }
            TimerCommand::StartTimer { session_id } => {
                let now = Instant::now();
                let session = self
                    .state
                    .get_session_mut(&session_id)
                    .ok_or(CommandError::SessionNotFound)?;
                session.timer.start(now)?;
                self.scheduler.register(session_id, self.srv_tx.clone());
                log::info!("Timer started for session {}", session_id);
                self.broadcast_view(&session_id).await;
                Ok(CommandReply::Ack)
            }
            TimerCommand::PauseTimer { session_id } => {
                let now = Instant::now();
                let session = self
                    .state
                    .get_session_mut(&session_id)
                    .ok_or(CommandError::SessionNotFound)?;
                session.timer.pause(now)?;
                self.scheduler.cancel(&session_id);
                log::info!("Timer paused for session {}", session_id);
                self.broadcast_view(&session_id).await;
                Ok(CommandReply::Ack)
            }
            TimerCommand::ResetTimer {
                session_id,
                duration_minutes,
            } => {
                let session = self
                    .state
                    .get_session_mut(&session_id)
                    .ok_or(CommandError::SessionNotFound)?;
                session.timer.reset(duration_minutes);
                self.scheduler.cancel(&session_id);
                log::info!("Timer reset for session {}", session_id);
                self.broadcast_view(&session_id).await;
                Ok(CommandReply::Ack)
            }
            TimerCommand::SwitchMethod {
                session_id,
                method,
                duration_minutes,
            } => {
                let session = self
                    .state
                    .get_session_mut(&session_id)
                    .ok_or(CommandError::SessionNotFound)?;
                session.timer.switch_method(method, duration_minutes);
                self.scheduler.cancel(&session_id);
                log::info!("Method switched to {} for session {}", method, session_id);
                self.broadcast_view(&session_id).await;
                Ok(CommandReply::Ack)
            }
            TimerCommand::LeaveSession { .. } => {
                self.leave_current_session(from).await;
                Ok(CommandReply::Ack)
            }
            TimerCommand::GetState { session_id } => self
                .state
                .get_session(&session_id)
                .map(|session| CommandReply::State(session.view_at(Instant::now())))
                .ok_or(CommandError::SessionNotFound),
            TimerCommand::GetActiveSessions => Ok(CommandReply::ActiveSessions {
                sessions: self.state.summaries_at(Instant::now()),
            }),
        }
    }

    /// One periodic recomputation for a running session. Remaining time is
    /// re-derived from the store; a tick racing a cancellation or session
    /// deletion finds nothing to do.
    async fn handle_tick(&mut self, session_id: &SessionId) {
        let now = Instant::now();
        let outcome = match self.state.get_session_mut(session_id) {
            Some(session) => session.timer.tick(now),
            None => return,
        };
        match outcome {
            TickOutcome::Stale => {}
            TickOutcome::Running(_) => self.broadcast_view(session_id).await,
            TickOutcome::Completed => {
                self.scheduler.cancel(session_id);
                let method = self
                    .state
                    .get_session(session_id)
                    .expect("session still exists")
                    .timer
                    .method();
                log::info!("Timer completed for session {}", session_id);
                self.broadcast_event(
                    session_id,
                    TimerEvent::Completed(CompletionNotice {
                        session_id: *session_id,
                        method,
                        completed_at: epoch_millis(),
                    }),
                )
                .await;
                self.broadcast_view(session_id).await;
            }
        }
    }

    /// Detaches the connection from whatever session it is in, destroying
    /// the session (and its tick entry) when it empties out, otherwise
    /// broadcasting the view to the remaining participants.
    async fn leave_current_session(&mut self, connection_id: &ConnectionId) {
        if let Some(outcome) = self.state.leave_session(connection_id) {
            if outcome.deleted {
                self.scheduler.cancel(&outcome.session_id);
            } else {
                self.broadcast_view(&outcome.session_id).await;
            }
        }
    }

    async fn broadcast_view(&mut self, session_id: &SessionId) {
        let Some(session) = self.state.get_session(session_id) else {
            return;
        };
        let view = session.view_at(Instant::now());
        self.broadcast_event(session_id, TimerEvent::StateChanged(view))
            .await;
    }

    async fn broadcast_event(&mut self, session_id: &SessionId, timer_event: TimerEvent) {
        let Some(session) = self.state.get_session(session_id) else {
            return;
        };
        let participants = session.participants.clone();
        for connection_id in participants {
            self.connections
                .send(
                    &connection_id,
                    ConnectionEvent::IdentifiableEvent(IdentifiableEvent::BySystem {
                        timer_event: timer_event.clone(),
                    }),
                )
                .await;
        }
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

pub fn spawn_server() -> ServerTx {
    let (srv_tx, mut srv_rx) = channel::<ServerCommand>(64);

    let loop_tx = srv_tx.clone();
    tokio::spawn(async move {
        let mut server = Box::new(Server::new(loop_tx));

        while let Some(command) = srv_rx.recv().await {
            server.handle_server_command(command).await;
        }
    });

    srv_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use system::TimerMethod;
    use tokio::sync::mpsc::Receiver;

    async fn connect(srv_tx: &ServerTx) -> (ConnectionId, Receiver<ConnectionEvent>) {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<ConnectionEvent>(32);
        srv_tx.send(ServerCommand::Connect { tx }).await.unwrap();
        match rx.recv().await.unwrap() {
            ConnectionEvent::Connected { connection_id } => (connection_id, rx),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    async fn send(srv_tx: &ServerTx, from: ConnectionId, command_id: u16, command: TimerCommand) {
        srv_tx
            .send(ServerCommand::IdentifiableCommand {
                from,
                command: IdentifiableCommand {
                    command_id,
                    timer_command: command,
                },
            })
            .await
            .unwrap();
    }

    /// Skips push events and returns the next direct command reply.
    async fn next_reply(rx: &mut Receiver<ConnectionEvent>) -> CommandResult {
        loop {
            match rx.recv().await.unwrap() {
                ConnectionEvent::IdentifiableEvent(IdentifiableEvent::ByMyself {
                    result, ..
                }) => return result,
                _ => continue,
            }
        }
    }

    /// Skips everything up to the first broadcast of a running view.
    async fn next_running_view(rx: &mut Receiver<ConnectionEvent>) -> system::TimerView {
        loop {
            if let ConnectionEvent::IdentifiableEvent(IdentifiableEvent::BySystem {
                timer_event: TimerEvent::StateChanged(view),
            }) = rx.recv().await.unwrap()
            {
                if view.is_running {
                    return view;
                }
            }
        }
    }

    #[tokio::test]
    async fn it_runs_the_session_lifecycle_through_commands() {
        let srv_tx = spawn_server();
        let (alice, mut alice_rx) = connect(&srv_tx).await;
        let (bob, mut bob_rx) = connect(&srv_tx).await;

        send(
            &srv_tx,
            alice,
            1,
            TimerCommand::CreateSession {
                method: TimerMethod::Pomodoro,
                duration_minutes: 25,
            },
        )
        .await;
        let session_id = match next_reply(&mut alice_rx).await {
            CommandResult::Reply(CommandReply::SessionCreated { session_id, .. }) => session_id,
            other => panic!("unexpected result: {:?}", other),
        };

        send(&srv_tx, bob, 1, TimerCommand::JoinSession { session_id }).await;
        assert!(matches!(
            next_reply(&mut bob_rx).await,
            CommandResult::Reply(CommandReply::Ack)
        ));

        // Pausing an idle timer is rejected without a state change.
        send(&srv_tx, bob, 2, TimerCommand::PauseTimer { session_id }).await;
        assert!(matches!(
            next_reply(&mut bob_rx).await,
            CommandResult::Error(CommandError::TimerNotRunning)
        ));

        send(&srv_tx, alice, 2, TimerCommand::StartTimer { session_id }).await;
        assert!(matches!(
            next_reply(&mut alice_rx).await,
            CommandResult::Reply(CommandReply::Ack)
        ));

        // The second start is rejected.
        send(&srv_tx, bob, 3, TimerCommand::StartTimer { session_id }).await;
        assert!(matches!(
            next_reply(&mut bob_rx).await,
            CommandResult::Error(CommandError::TimerAlreadyRunning)
        ));

        // Both participants observe the running broadcast.
        for rx in [&mut alice_rx, &mut bob_rx] {
            let view = next_running_view(rx).await;
            assert_eq!(view.session_id, session_id);
        }

        send(&srv_tx, alice, 3, TimerCommand::PauseTimer { session_id }).await;
        assert!(matches!(
            next_reply(&mut alice_rx).await,
            CommandResult::Reply(CommandReply::Ack)
        ));
    }

    #[tokio::test]
    async fn it_destroys_the_session_once_every_participant_left() {
        let srv_tx = spawn_server();
        let (alice, mut alice_rx) = connect(&srv_tx).await;
        let (bob, mut bob_rx) = connect(&srv_tx).await;

        send(
            &srv_tx,
            alice,
            1,
            TimerCommand::CreateSession {
                method: TimerMethod::ShortBreak,
                duration_minutes: 5,
            },
        )
        .await;
        let session_id = match next_reply(&mut alice_rx).await {
            CommandResult::Reply(CommandReply::SessionCreated { session_id, .. }) => session_id,
            other => panic!("unexpected result: {:?}", other),
        };
        send(&srv_tx, bob, 1, TimerCommand::JoinSession { session_id }).await;
        next_reply(&mut bob_rx).await;

        send(&srv_tx, alice, 2, TimerCommand::LeaveSession { session_id }).await;
        next_reply(&mut alice_rx).await;

        // Bob remains; the session is still reachable.
        send(&srv_tx, bob, 2, TimerCommand::GetState { session_id }).await;
        assert!(matches!(
            next_reply(&mut bob_rx).await,
            CommandResult::Reply(CommandReply::State(_))
        ));

        // The last participant drops its connection instead of leaving.
        srv_tx
            .send(ServerCommand::Disconnect { from: bob })
            .await
            .unwrap();

        let (carol, mut carol_rx) = connect(&srv_tx).await;
        send(&srv_tx, carol, 1, TimerCommand::GetState { session_id }).await;
        assert!(matches!(
            next_reply(&mut carol_rx).await,
            CommandResult::Error(CommandError::SessionNotFound)
        ));

        send(&srv_tx, carol, 2, TimerCommand::GetActiveSessions).await;
        match next_reply(&mut carol_rx).await {
            CommandResult::Reply(CommandReply::ActiveSessions { sessions }) => {
                assert!(sessions.is_empty())
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn it_delivers_the_view_to_the_joiner_before_acknowledging() {
        let srv_tx = spawn_server();
        let (alice, mut alice_rx) = connect(&srv_tx).await;
        let (bob, mut bob_rx) = connect(&srv_tx).await;

        send(
            &srv_tx,
            alice,
            1,
            TimerCommand::CreateSession {
                method: TimerMethod::LongBreak,
                duration_minutes: 15,
            },
        )
        .await;
        let session_id = match next_reply(&mut alice_rx).await {
            CommandResult::Reply(CommandReply::SessionCreated { session_id, .. }) => session_id,
            other => panic!("unexpected result: {:?}", other),
        };

        send(&srv_tx, bob, 1, TimerCommand::JoinSession { session_id }).await;
        // The targeted state delivery precedes the command reply.
        match bob_rx.recv().await.unwrap() {
            ConnectionEvent::IdentifiableEvent(IdentifiableEvent::BySystem {
                timer_event: TimerEvent::StateChanged(view),
            }) => {
                assert_eq!(view.session_id, session_id);
                assert_eq!(view.minutes, 15);
                assert_eq!(view.seconds, 0);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
