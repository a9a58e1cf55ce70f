use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use crate::config::Config;
use crate::models::mail::MailRecord;
use crate::services::event_stream::MailEvents;
use crate::store::MailStore;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub phishing: Option<bool>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

/// GET /mails - non-deleted records, date ascending, paginated.
pub async fn list_mails(
    State(store): State<Arc<MailStore>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<MailRecord>>, (StatusCode, String)> {
    store
        .list(
            params.phishing,
            params.skip.unwrap_or(0),
            params.limit.unwrap_or(20),
        )
        .await
        .map(Json)
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Store error: {e}"),
            )
        })
}

/// GET /mails/stream - SSE feed of newly ingested records. Idle periods
/// carry only keep-alive comments; a lagged subscriber skips ahead.
pub async fn mails_stream(
    State(events): State<Arc<MailEvents>>,
    State(config): State<Arc<Config>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = events.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(record) => {
                    let json = serde_json::to_string(&record).unwrap_or_default();
                    yield Ok(Event::default().event("mail:new").data(json));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "slow mail stream subscriber, skipping ahead");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(config.sse_keepalive_secs))
            .text("idle"),
    )
}

/// GET /mails/:mail_id
pub async fn get_mail(
    State(store): State<Arc<MailStore>>,
    Path(mail_id): Path<String>,
) -> Result<Json<MailRecord>, (StatusCode, String)> {
    let record = store.get(&mail_id).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Store error: {e}"),
        )
    })?;
    record
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Mail not found".to_string()))
}

/// GET /mails/:mail_id/attachment/:filename - download one retained blob.
pub async fn get_attachment(
    State(store): State<Arc<MailStore>>,
    Path((mail_id, filename)): Path<(String, String)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let record = store
        .get(&mail_id)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Store error: {e}"),
            )
        })?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Mail not found".to_string()))?;

    // Match on the stored basename only; the client never names a path.
    let path = record
        .attachments
        .iter()
        .find(|att| {
            std::path::Path::new(att)
                .file_name()
                .map(|n| n.to_string_lossy() == filename)
                .unwrap_or(false)
        })
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Attachment not found".to_string()))?;

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|_| (StatusCode::NOT_FOUND, "Attachment not found".to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    ))
}

/// DELETE /mails/:mail_id - soft delete; the record stays until evicted.
pub async fn delete_mail(
    State(store): State<Arc<MailStore>>,
    Path(mail_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let found = store.soft_delete(&mail_id).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Store error: {e}"),
        )
    })?;
    if !found {
        return Err((StatusCode::NOT_FOUND, "Mail not found".to_string()));
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}
