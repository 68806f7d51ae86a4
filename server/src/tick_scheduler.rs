use crate::server::{ServerCommand, ServerTx};
use std::collections::HashMap;
use std::time::Duration;
use system::SessionId;
use tokio::task::JoinHandle;

/// One periodic tick task per running session. Each task captures only the
/// session id and a sender back into the dispatch loop; the tick handler
/// re-fetches current session state from the store, so cancellation never
/// races against a stale closure.
pub struct TickScheduler {
    entries: HashMap<SessionId, JoinHandle<()>>,
}

const TICK_PERIOD: Duration = Duration::from_secs(1);

impl TickScheduler {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registers the periodic tick for a session. At most one entry per
    /// session may exist; the command layer rejects a second start before
    /// this is reached.
    pub fn register(&mut self, session_id: SessionId, srv_tx: ServerTx) {
        if self.entries.contains_key(&session_id) {
            log::warn!("Session {} already has a tick entry", session_id);
            return;
        }
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + TICK_PERIOD;
            let mut ticks = tokio::time::interval_at(start, TICK_PERIOD);
            loop {
                ticks.tick().await;
                if srv_tx
                    .send(ServerCommand::Tick { session_id })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
        self.entries.insert(session_id, handle);
    }

    /// Stops the tick task. A tick message already queued at this point is
    /// ignored by the handler, which checks the session's running state.
    pub fn cancel(&mut self, session_id: &SessionId) {
        if let Some(handle) = self.entries.remove(session_id) {
            handle.abort();
        }
    }
}
