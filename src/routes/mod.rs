use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

pub mod campaigns;
pub mod mails;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/mails", get(mails::list_mails))
        .route("/mails/stream", get(mails::mails_stream))
        .route("/mails/:mail_id", get(mails::get_mail))
        .route("/mails/:mail_id", delete(mails::delete_mail))
        .route(
            "/mails/:mail_id/attachment/:filename",
            get(mails::get_attachment),
        )
        .route("/campaigns", post(campaigns::send_campaign))
        .route(
            "/campaigns/:task_id/progress",
            get(campaigns::campaign_progress),
        )
        .with_state(state)
}
