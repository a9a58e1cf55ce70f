//! The ingestion loop: one background task polling the mailbox on a fixed
//! interval, serially fetching, parsing and classifying whatever is newer
//! than the persisted watermark.

use anyhow::Result;
use async_imap::Session;
use tokio::io::{AsyncRead, AsyncWrite};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::classify::{self, Classifier};
use crate::config::Config;
use crate::imap::conn::{self, ImapSession};
use crate::imap::poll;
use crate::models::mail::MailRecord;
use crate::parse::{self, AttachmentLimits};
use crate::services::event_stream::MailEvents;
use crate::store::MailStore;
use crate::watermark::WatermarkStore;

pub fn start(config: Arc<Config>, store: Arc<MailStore>, events: Arc<MailEvents>) {
    tokio::spawn(async move {
        run(config, store, events).await;
    });
}

async fn run(config: Arc<Config>, store: Arc<MailStore>, events: Arc<MailEvents>) {
    let classifier = match Classifier::new(&config.analyze_url, config.analyze_timeout_secs) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "could not build classifier client, poller not started");
            return;
        }
    };
    let watermarks = WatermarkStore::new(&config.last_uid_path);
    let mut last_seen = watermarks.load().await;
    tracing::info!(
        host = %config.imap_host,
        folder = %config.imap_folder,
        last_seen_uid = ?last_seen,
        "mailbox poller started"
    );

    loop {
        match run_cycle(&config, &store, &events, &classifier, &watermarks, &mut last_seen).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(processed = n, "poll cycle completed"),
            // Connection-level failures abort the whole cycle; the next
            // one starts from scratch after the interval. No backoff.
            Err(e) => tracing::warn!(error = %e, "poll cycle failed"),
        }
        tokio::time::sleep(Duration::from_secs(config.poll_interval_secs)).await;
    }
}

async fn run_cycle(
    config: &Config,
    store: &MailStore,
    events: &MailEvents,
    classifier: &Classifier,
    watermarks: &WatermarkStore,
    last_seen: &mut Option<u32>,
) -> Result<usize> {
    let conn = conn::connect(
        &config.imap_host,
        config.imap_port,
        &config.imap_user,
        &config.imap_pass,
    )
    .await?;

    match conn {
        ImapSession::Tls(mut session) => {
            let res = cycle_with(&mut session, config, store, events, classifier, watermarks, last_seen).await;
            let _ = session.logout().await;
            res
        }
        ImapSession::Plain(mut session) => {
            let res = cycle_with(&mut session, config, store, events, classifier, watermarks, last_seen).await;
            let _ = session.logout().await;
            res
        }
    }
}

async fn cycle_with<S>(
    session: &mut Session<S>,
    config: &Config,
    store: &MailStore,
    events: &MailEvents,
    classifier: &Classifier,
    watermarks: &WatermarkStore,
    last_seen: &mut Option<u32>,
) -> Result<usize>
where
    S: AsyncRead + AsyncWrite + Unpin + fmt::Debug + Send,
{
    let all = poll::list_uids(session, &config.imap_folder).await?;
    let batch = poll::select_batch(&all, *last_seen, config.poll_batch_limit);
    let Some(&newest) = batch.last() else {
        return Ok(0);
    };
    tracing::debug!(count = batch.len(), newest, "new UIDs to process");

    // The watermark advances to the batch maximum before any message is
    // processed. A crash mid-batch loses the unprocessed remainder rather
    // than ever re-delivering a message.
    watermarks.save(newest).await?;
    *last_seen = Some(newest);

    let mut processed = 0;
    for uid in batch {
        let raw = match poll::fetch_raw(session, uid).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::warn!(uid, "fetch returned no body, skipping");
                continue;
            }
            Err(e) => {
                tracing::warn!(uid, error = %e, "fetch failed, skipping");
                continue;
            }
        };
        match process_message(uid, &raw, config, classifier).await {
            Ok(Some(record)) => {
                store.append(record.clone()).await?;
                events.publish(record);
                processed += 1;
            }
            Ok(None) => tracing::warn!(uid, "message envelope unparsable, skipped"),
            Err(e) => tracing::warn!(uid, error = %e, "message processing failed, skipped"),
        }
    }
    Ok(processed)
}

/// Parse one raw message and classify its retained attachments into a
/// complete record. `None` means the envelope could not be parsed at all.
async fn process_message(
    uid: u32,
    raw: &[u8],
    config: &Config,
    classifier: &Classifier,
) -> Result<Option<MailRecord>> {
    let limits = AttachmentLimits {
        max_count: config.max_attachments,
        max_bytes: config.max_attachment_bytes,
        tmp_dir: config.tmp_dir.clone(),
    };
    let parsed = match parse::parse_message(raw, &limits).await? {
        Some(p) => p,
        None => return Ok(None),
    };
    if !parsed.skipped_attachments.is_empty() {
        tracing::debug!(uid, skipped = ?parsed.skipped_attachments, "attachments over limits");
    }

    let mut verdicts = Vec::with_capacity(parsed.attachments.len());
    for attachment in &parsed.attachments {
        verdicts.push(classifier.analyze(attachment).await);
    }
    let (phishing, score) = classify::aggregate(&verdicts, config.phishing_threshold);

    Ok(Some(MailRecord {
        id: Uuid::new_v4().to_string(),
        uid,
        from: parsed.from,
        to: parsed.to,
        subject: parsed.subject,
        date: parsed.date,
        html: parsed.html,
        text: parsed.text,
        phishing,
        score,
        attachments: parsed.attachments,
        skipped_attachments: parsed.skipped_attachments,
        deleted: false,
    }))
}
