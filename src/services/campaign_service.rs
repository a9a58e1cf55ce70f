//! Outbound campaign delivery: a simple send-and-log loop per submitted
//! batch, tracked in a keyed task registry so progress can be queried and
//! streamed while the worker runs.

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::Config;
use crate::models::campaign::{CampaignRequest, CampaignStatus, CampaignTask, SendLogEntry};
use crate::smtp::{self, SmtpMailer};

/// How long a finished task stays queryable before it is dropped from the
/// registry.
const COMPLETED_TASK_GRACE_SECS: u64 = 300;

/// Owned, lock-guarded task table. Entries are created on submission,
/// updated by the worker, read by progress queries and evicted after a
/// grace period once they reach a terminal state.
pub struct CampaignManager {
    tasks: RwLock<HashMap<String, CampaignTask>>,
}

impl CampaignManager {
    pub fn new() -> Self {
        CampaignManager {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create(&self, total: usize) -> String {
        let id = Uuid::new_v4().to_string();
        self.tasks
            .write()
            .await
            .insert(id.clone(), CampaignTask::new(total));
        id
    }

    pub async fn get(&self, id: &str) -> Option<CampaignTask> {
        self.tasks.read().await.get(id).cloned()
    }

    pub async fn active_count(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn mark_running(&self, id: &str) {
        if let Some(task) = self.tasks.write().await.get_mut(id) {
            task.status = CampaignStatus::Running;
        }
    }

    pub async fn record_send(&self, id: &str, sent: usize) {
        if let Some(task) = self.tasks.write().await.get_mut(id) {
            task.sent = sent;
            task.progress = if task.total == 0 {
                100
            } else {
                ((sent * 100) / task.total) as u8
            };
        }
    }

    pub async fn finish(&self, id: &str) {
        if let Some(task) = self.tasks.write().await.get_mut(id) {
            task.progress = 100;
            task.status = CampaignStatus::Done;
        }
    }

    pub async fn fail(&self, id: &str, error: String) {
        if let Some(task) = self.tasks.write().await.get_mut(id) {
            task.status = CampaignStatus::Error;
            task.error = Some(error);
        }
    }

    pub async fn remove(&self, id: &str) {
        self.tasks.write().await.remove(id);
    }
}

impl Default for CampaignManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a submitted image name against the configured directories, the
/// same way uploads have always been addressed.
pub fn resolve_image_path(config: &Config, image_name: &str) -> PathBuf {
    let as_path = Path::new(image_name);
    if as_path.is_absolute() {
        return as_path.to_path_buf();
    }
    if let Some(stripped) = image_name.strip_prefix("uploads/") {
        return config.upload_dir.join(stripped);
    }
    if image_name.starts_with("uploaded_") {
        return config.upload_dir.join(image_name);
    }
    PathBuf::from("data").join(image_name)
}

/// Register a campaign and start its background worker. The caller has
/// already validated the request.
pub async fn submit(
    config: Arc<Config>,
    manager: Arc<CampaignManager>,
    req: CampaignRequest,
    image_path: PathBuf,
) -> String {
    let task_id = manager.create(req.targets.len()).await;
    let worker_id = task_id.clone();
    tokio::spawn(async move {
        run_campaign(config, manager, worker_id, req, image_path).await;
    });
    task_id
}

async fn run_campaign(
    config: Arc<Config>,
    manager: Arc<CampaignManager>,
    task_id: String,
    req: CampaignRequest,
    image_path: PathBuf,
) {
    if let Err(e) = send_all(&config, &manager, &task_id, &req, &image_path).await {
        tracing::error!(task_id = %task_id, error = %e, "campaign failed");
        manager.fail(&task_id, e.to_string()).await;
    }
    tokio::time::sleep(std::time::Duration::from_secs(COMPLETED_TASK_GRACE_SECS)).await;
    manager.remove(&task_id).await;
}

async fn send_all(
    config: &Config,
    manager: &CampaignManager,
    task_id: &str,
    req: &CampaignRequest,
    image_path: &Path,
) -> Result<()> {
    let mailer = SmtpMailer::new(
        &config.smtp_host,
        config.smtp_port,
        &config.smtp_user,
        &config.smtp_pass,
    )?;
    let image_bytes = tokio::fs::read(image_path)
        .await
        .with_context(|| format!("reading campaign image {}", image_path.display()))?;
    let image_name = image_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| req.image_name.clone());

    manager.mark_running(task_id).await;
    tracing::info!(task_id, targets = req.targets.len(), "campaign started");

    let mut sent = 0;
    for target in &req.targets {
        let outcome = match smtp::build_campaign_message(
            mailer.from_mailbox(),
            target,
            &req.subject,
            &req.html_body,
            &image_name,
            image_bytes.clone(),
        ) {
            Ok(message) => match mailer.send(message).await {
                Ok(()) => "success",
                Err(e) => {
                    tracing::warn!(task_id, target = %target, error = %e, "send failed");
                    "fail"
                }
            },
            Err(e) => {
                tracing::warn!(task_id, target = %target, error = %e, "message build failed");
                "fail"
            }
        };

        let entry = SendLogEntry {
            target: target.clone(),
            status: outcome.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            template: req.subject.clone(),
            image_used: req.image_name.clone(),
        };
        if let Err(e) = append_send_log(&config.mail_logs_path, &entry).await {
            tracing::warn!(task_id, error = %e, "could not append send log entry");
        }

        sent += 1;
        manager.record_send(task_id, sent).await;
    }

    manager.finish(task_id).await;
    tracing::info!(task_id, sent, "campaign completed");
    Ok(())
}

async fn append_send_log(path: &Path, entry: &SendLogEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    Ok(())
}
