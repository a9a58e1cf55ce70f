use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::models::campaign::CampaignRequest;
use crate::services::campaign_service::{self, CampaignManager};

/// POST /campaigns - validate and enqueue a campaign; the send loop runs
/// in the background and is observed via the progress stream.
pub async fn send_campaign(
    State(config): State<Arc<Config>>,
    State(campaigns): State<Arc<CampaignManager>>,
    Json(req): Json<CampaignRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    if req.targets.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No targets given".to_string()));
    }
    if req.targets.len() > config.campaign_max_targets {
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            format!("At most {} targets are allowed", config.campaign_max_targets),
        ));
    }
    if !config.smtp_configured() {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            "SMTP is not configured".to_string(),
        ));
    }

    let image_path = campaign_service::resolve_image_path(&config, &req.image_name);
    if !tokio::fs::try_exists(&image_path).await.unwrap_or(false) {
        return Err((StatusCode::BAD_REQUEST, "Image not found".to_string()));
    }

    let task_id = campaign_service::submit(config, campaigns, req, image_path).await;
    Ok(Json(serde_json::json!({ "task_id": task_id })))
}

/// GET /campaigns/:task_id/progress - SSE percentage stream; closes when
/// the task reaches a terminal state or disappears.
pub async fn campaign_progress(
    State(campaigns): State<Arc<CampaignManager>>,
    Path(task_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    if campaigns.get(&task_id).await.is_none() {
        return Err((StatusCode::NOT_FOUND, "Task not found".to_string()));
    }

    let stream = async_stream::stream! {
        let mut last_progress: i32 = -1;
        loop {
            let Some(task) = campaigns.get(&task_id).await else {
                break;
            };
            let progress = task.progress as i32;
            if progress != last_progress {
                yield Ok(Event::default().data(progress.to_string()));
                last_progress = progress;
            }
            if progress >= 100 || task.status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
