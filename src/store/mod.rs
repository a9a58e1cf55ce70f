//! Bounded, durable mail record store.
//!
//! Records live one JSON object per line, in arrival order, capped at a
//! configured capacity. Every mutation is a read-modify-write of the whole
//! file finished by an atomic rename, so readers never observe a
//! half-written record. An internal async mutex serializes the mutators
//! (poller append, query-layer soft delete, retention evictor).

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::models::mail::{date_sort_key, parse_mail_date, MailRecord};

pub struct MailStore {
    path: PathBuf,
    capacity: usize,
    write_lock: Mutex<()>,
}

impl MailStore {
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        MailStore {
            path: path.into(),
            capacity: capacity.max(1),
            write_lock: Mutex::new(()),
        }
    }

    /// Load every valid record. Corrupt lines are skipped, not fatal.
    pub async fn read_all(&self) -> Result<Vec<MailRecord>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()))
            }
        };
        let mut records = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MailRecord>(line) {
                Ok(rec) => records.push(rec),
                Err(e) => tracing::debug!(error = %e, "skipping corrupt cache line"),
            }
        }
        Ok(records)
    }

    /// Append one record, evicting the oldest by arrival order once the
    /// capacity is exceeded. Eviction ignores the `deleted` flag.
    pub async fn append(&self, record: MailRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;
        records.push(record);
        while records.len() > self.capacity {
            records.remove(0);
        }
        self.rewrite(&records).await
    }

    /// Non-deleted records, optionally filtered by verdict, ordered by
    /// parsed date ascending (unparsable dates first), then paginated.
    pub async fn list(
        &self,
        phishing: Option<bool>,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<MailRecord>> {
        let mut records: Vec<MailRecord> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|r| !r.deleted)
            .filter(|r| phishing.map_or(true, |p| r.phishing == p))
            .collect();
        records.sort_by_key(date_sort_key);
        Ok(records.into_iter().skip(skip).take(limit).collect())
    }

    pub async fn get(&self, id: &str) -> Result<Option<MailRecord>> {
        Ok(self.read_all().await?.into_iter().find(|r| r.id == id))
    }

    /// Mark a record deleted in place. Returns false when the id is
    /// unknown, in which case the file is left untouched.
    pub async fn soft_delete(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;
        let mut found = false;
        for rec in records.iter_mut() {
            if rec.id == id {
                rec.deleted = true;
                found = true;
            }
        }
        if found {
            self.rewrite(&records).await?;
        }
        Ok(found)
    }

    /// Periodic maintenance: keep the `max_count` most recent records by
    /// parsed date, dropping parseable-dated records older than
    /// `max_age_days`. Records whose date does not parse are exempt from
    /// the age test but rank oldest for the count cap. Survivors keep
    /// their arrival order on disk so append eviction stays FIFO.
    /// Returns the number of evicted records.
    pub async fn evict_to_retention(&self, max_age_days: i64, max_count: usize) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let records = self.read_all().await?;
        let before = records.len();

        let cutoff = Utc::now() - Duration::days(max_age_days);
        let mut ranked: Vec<(usize, &MailRecord)> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| match parse_mail_date(&r.date) {
                Some(dt) => dt >= cutoff,
                None => true,
            })
            .collect();
        ranked.sort_by_key(|(_, r)| std::cmp::Reverse(date_sort_key(r)));
        ranked.truncate(max_count);

        let mut keep_indices: Vec<usize> = ranked.into_iter().map(|(i, _)| i).collect();
        keep_indices.sort_unstable();
        let kept: Vec<MailRecord> = keep_indices
            .into_iter()
            .map(|i| records[i].clone())
            .collect();

        let removed = before - kept.len();
        if removed > 0 {
            self.rewrite(&kept).await?;
        }
        Ok(removed)
    }

    /// Serialize everything and swap it in with a rename so concurrent
    /// readers only ever see a complete file.
    async fn rewrite(&self, records: &[MailRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        let mut buf = String::new();
        for rec in records {
            buf.push_str(&serde_json::to_string(rec)?);
            buf.push('\n');
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, buf)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, date: &str) -> MailRecord {
        MailRecord {
            id: id.to_string(),
            uid: 0,
            from: "a@b.com".to_string(),
            to: vec!["me@c.com".to_string()],
            subject: format!("subject {id}"),
            date: date.to_string(),
            html: String::new(),
            text: String::new(),
            phishing: false,
            score: 0.0,
            attachments: Vec::new(),
            skipped_attachments: Vec::new(),
            deleted: false,
        }
    }

    fn store(dir: &std::path::Path, capacity: usize) -> MailStore {
        MailStore::new(dir.join("inbox_cache.jsonl"), capacity)
    }

    #[tokio::test]
    async fn append_evicts_oldest_by_arrival() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 3);
        for i in 0..5 {
            store
                .append(record(&format!("m{i}"), "2024-05-27T12:00:00Z"))
                .await
                .unwrap();
        }
        let all = store.read_all().await.unwrap();
        let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn eviction_ignores_deleted_flag() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 2);
        store.append(record("m0", "")).await.unwrap();
        store.append(record("m1", "")).await.unwrap();
        store.soft_delete("m1").await.unwrap();
        store.append(record("m2", "")).await.unwrap();
        let all = store.read_all().await.unwrap();
        let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
        // m0 leaves even though m1 is the soft-deleted one.
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn soft_delete_hides_from_list_but_not_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 10);
        store.append(record("m0", "2024-05-27T12:00:00Z")).await.unwrap();
        store.append(record("m1", "2024-05-28T12:00:00Z")).await.unwrap();

        assert!(store.soft_delete("m0").await.unwrap());
        let listed = store.list(None, 0, 100).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "m1");

        let fetched = store.get("m0").await.unwrap().unwrap();
        assert!(fetched.deleted);
        assert_eq!(store.read_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn soft_delete_of_unknown_id_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 10);
        store.append(record("m0", "")).await.unwrap();
        assert!(!store.soft_delete("nope").await.unwrap());
    }

    #[tokio::test]
    async fn list_sorts_by_date_and_paginates() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 10);
        store.append(record("new", "2024-05-28T12:00:00Z")).await.unwrap();
        store.append(record("older", "2024-05-26T12:00:00Z")).await.unwrap();
        store.append(record("dateless", "garbage")).await.unwrap();
        store.append(record("mid", "2024-05-27T12:00:00Z")).await.unwrap();

        let listed = store.list(None, 0, 100).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["dateless", "older", "mid", "new"]);

        let page = store.list(None, 1, 2).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["older", "mid"]);
    }

    #[tokio::test]
    async fn list_filters_by_phishing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 10);
        let mut bad = record("bad", "2024-05-27T12:00:00Z");
        bad.phishing = true;
        bad.score = 0.9;
        store.append(bad).await.unwrap();
        store.append(record("ok", "2024-05-28T12:00:00Z")).await.unwrap();

        let flagged = store.list(Some(true), 0, 100).await.unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].id, "bad");
        let clean = store.list(Some(false), 0, 100).await.unwrap();
        assert_eq!(clean.len(), 1);
        assert_eq!(clean[0].id, "ok");
    }

    #[tokio::test]
    async fn corrupt_lines_are_skipped_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox_cache.jsonl");
        let good = serde_json::to_string(&record("good", "")).unwrap();
        tokio::fs::write(
            &path,
            format!("{good}\nnot json at all\n{{\"uid\": 3}}\n"),
        )
        .await
        .unwrap();
        let store = MailStore::new(path, 10);
        let all = store.read_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "good");
    }

    #[tokio::test]
    async fn retention_keeps_newest_and_drops_dateless_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 10);
        store.append(record("dateless", "???")).await.unwrap();
        store.append(record("d1", "2024-05-25T12:00:00Z")).await.unwrap();
        store.append(record("d2", "2024-05-26T12:00:00Z")).await.unwrap();
        store.append(record("d3", "2024-05-27T12:00:00Z")).await.unwrap();

        let removed = store.evict_to_retention(365 * 100, 2).await.unwrap();
        assert_eq!(removed, 2);
        let all = store.read_all().await.unwrap();
        let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
        // Newest two survive, still in arrival order.
        assert_eq!(ids, vec!["d2", "d3"]);
    }

    #[tokio::test]
    async fn retention_age_cutoff_spares_dateless_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 10);
        store.append(record("ancient", "2001-01-01T00:00:00Z")).await.unwrap();
        store.append(record("dateless", "???")).await.unwrap();
        let recent = Utc::now().to_rfc3339();
        store.append(record("fresh", &recent)).await.unwrap();

        let removed = store.evict_to_retention(30, 10).await.unwrap();
        assert_eq!(removed, 1);
        let all = store.read_all().await.unwrap();
        let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["dateless", "fresh"]);
    }

    #[tokio::test]
    async fn concurrent_appends_and_deletes_keep_file_valid() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(MailStore::new(dir.path().join("c.jsonl"), 64));
        store.append(record("seed", "")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let s = store.clone();
            handles.push(tokio::spawn(async move {
                s.append(record(&format!("c{i}"), "")).await.unwrap();
            }));
        }
        for _ in 0..8 {
            let s = store.clone();
            handles.push(tokio::spawn(async move {
                let _ = s.soft_delete("seed").await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let all = store.read_all().await.unwrap();
        assert_eq!(all.len(), 17);
        let seed = all.iter().find(|r| r.id == "seed").unwrap();
        assert!(seed.deleted);
        // The persisted file itself parses line by line.
        let raw = tokio::fs::read_to_string(dir.path().join("c.jsonl")).await.unwrap();
        for line in raw.lines() {
            serde_json::from_str::<MailRecord>(line).unwrap();
        }
    }
}
