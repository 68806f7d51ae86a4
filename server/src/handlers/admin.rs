use crate::admin::AdminCommand;
use crate::server::{ServerCommand, ServerTx};
use actix_web::error;
use actix_web::web;
use actix_web::Responder;
use actix_web::Result;
use askama_actix::Template;
use serde::Deserialize;
use system::SessionSummary;

#[derive(Template)]
#[template(path = "admin-index.html")]
pub struct AdminIndexTemplate {
    sessions: Vec<SessionRow>,
}

struct SessionRow {
    session_id: String,
    method: String,
    participant_count: usize,
    is_running: bool,
    time_left: String,
}

impl From<SessionSummary> for SessionRow {
    fn from(summary: SessionSummary) -> Self {
        Self {
            session_id: summary.session_id.to_string(),
            method: summary.method.to_string(),
            participant_count: summary.participant_count,
            is_running: summary.is_running,
            time_left: format!(
                "{:02}:{:02}",
                summary.time_left_seconds / 60,
                summary.time_left_seconds % 60
            ),
        }
    }
}

#[derive(Deserialize)]
pub struct AdminIndexQuery {
    method: Option<String>,
}

pub fn configure_admin_handlers(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/admin").service(web::resource("").route(web::get().to(admin_index))));
}

pub async fn admin_index(
    query: web::Query<AdminIndexQuery>,
    srv_tx: web::Data<ServerTx>,
) -> Result<impl Responder> {
    let (tx, rx) = tokio::sync::oneshot::channel::<Vec<SessionSummary>>();

    srv_tx
        .get_ref()
        .clone()
        .send(ServerCommand::Admin(AdminCommand::ListSessions { tx }))
        .await
        .map_err(|_| error::ErrorInternalServerError("Internal Server Error"))?;

    let summaries = rx
        .await
        .map_err(|_| error::ErrorInternalServerError("Receiver await error"))?;

    Ok(AdminIndexTemplate {
        sessions: summaries
            .into_iter()
            .filter(|summary| match &query.method {
                Some(method) => summary.method.to_string() == *method,
                None => true,
            })
            .map(SessionRow::from)
            .collect(),
    })
}
