use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Runtime configuration, loaded once at startup from the environment.
/// Caps, the phishing threshold and the retention window are all
/// overridable env vars rather than embedded constants.
#[derive(Debug, Clone)]
pub struct Config {
    pub imap_host: String,
    pub imap_port: u16,
    pub imap_user: String,
    pub imap_pass: String,
    pub imap_folder: String,
    pub poll_interval_secs: u64,
    pub poll_batch_limit: usize,

    pub analyze_url: String,
    pub analyze_timeout_secs: u64,
    pub phishing_threshold: f64,

    pub inbox_cache: PathBuf,
    pub inbox_capacity: usize,
    pub last_uid_path: PathBuf,
    pub tmp_dir: PathBuf,
    pub max_attachments: usize,
    pub max_attachment_bytes: usize,

    pub days_keep: i64,
    pub retention_interval_secs: u64,
    pub sse_keepalive_secs: u64,

    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_pass: String,
    pub mail_logs_path: PathBuf,
    pub campaign_max_targets: usize,
    pub upload_dir: PathBuf,

    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let imap_host = env::var("IMAP_HOST").context("IMAP_HOST must be set")?;
        let imap_user = env::var("IMAP_USER").context("IMAP_USER must be set")?;
        let imap_pass = env::var("IMAP_PASS").context("IMAP_PASS must be set")?;

        Ok(Config {
            imap_host,
            imap_port: env_parse("IMAP_PORT", 993),
            imap_user,
            imap_pass,
            imap_folder: env::var("IMAP_FOLDER").unwrap_or_else(|_| "INBOX".into()),
            poll_interval_secs: env_parse("POLL_INTERVAL_SECS", 60),
            poll_batch_limit: env_parse("POLL_BATCH_LIMIT", 50),

            analyze_url: env::var("ANALYZE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8000/analyze".into()),
            analyze_timeout_secs: env_parse("ANALYZE_TIMEOUT_SECS", 5),
            phishing_threshold: env_parse("PHISHING_THRESHOLD", 0.8),

            inbox_cache: env_path("INBOX_CACHE", "data/inbox_cache.jsonl"),
            inbox_capacity: env_parse("INBOX_CAPACITY", 20),
            last_uid_path: env_path("LAST_UID_PATH", "data/last_seen_uid.txt"),
            tmp_dir: env_path("TMP_DIR", "tmp"),
            max_attachments: env_parse("MAX_ATTACHMENTS", 5),
            max_attachment_bytes: env_parse("MAX_ATTACHMENT_BYTES", 2 * 1024 * 1024),

            days_keep: env_parse("DAYS_KEEP", 30),
            retention_interval_secs: env_parse("RETENTION_INTERVAL_SECS", 3600),
            sse_keepalive_secs: env_parse("SSE_KEEPALIVE_SECS", 10),

            smtp_host: env::var("SMTP_HOST").unwrap_or_default(),
            smtp_port: env_parse("SMTP_PORT", 587),
            smtp_user: env::var("SMTP_USER").unwrap_or_default(),
            smtp_pass: env::var("SMTP_PASS").unwrap_or_default(),
            mail_logs_path: env_path("MAIL_LOGS_PATH", "data/mail_logs.jsonl"),
            campaign_max_targets: env_parse("CAMPAIGN_MAX_TARGETS", 200),
            upload_dir: env_path("UPLOAD_DIR", "uploads"),

            port: env_parse("PORT", 8000),
        })
    }

    pub fn smtp_configured(&self) -> bool {
        !self.smtp_host.is_empty() && !self.smtp_user.is_empty() && !self.smtp_pass.is_empty()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_path(key: &str, default: &str) -> PathBuf {
    env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}
