use std::sync::Arc;
use tokio::time::{sleep, Duration};

use crate::config::Config;
use crate::store::MailStore;

/// Starts the periodic cache retention loop. Each pass keeps the most
/// recent records within the configured age and count and rewrites the
/// cache atomically; running it twice in a row is a no-op.
pub fn start(config: Arc<Config>, store: Arc<MailStore>) {
    tokio::spawn(async move {
        tracing::info!(
            days_keep = config.days_keep,
            max_count = config.inbox_capacity,
            "retention service started"
        );
        // Initial delay to let the app start up comfortably.
        sleep(Duration::from_secs(60)).await;
        loop {
            match store
                .evict_to_retention(config.days_keep, config.inbox_capacity)
                .await
            {
                Ok(0) => tracing::debug!("retention pass: nothing to evict"),
                Ok(removed) => tracing::info!(removed, "retention pass evicted records"),
                Err(e) => tracing::error!(error = %e, "retention pass failed"),
            }
            sleep(Duration::from_secs(config.retention_interval_secs)).await;
        }
    });
}
