use system::SessionSummary;
use tokio::sync::oneshot::Sender;

/// Requests from the HTTP admin handlers into the dispatch loop, answered
/// over a oneshot channel.
#[derive(Debug)]
pub enum AdminCommand {
    ListSessions { tx: Sender<Vec<SessionSummary>> },
}
