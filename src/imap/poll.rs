use anyhow::Result;
use async_imap::Session;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use std::fmt;

/// Select a folder and return every UID in it, ascending.
pub async fn list_uids<S>(session: &mut Session<S>, folder: &str) -> Result<Vec<u32>>
where
    S: AsyncRead + AsyncWrite + Unpin + fmt::Debug + Send,
{
    session.select(folder).await?;
    let uids = session.uid_search("ALL").await?;
    let mut all: Vec<u32> = uids.into_iter().collect();
    all.sort_unstable();
    Ok(all)
}

/// UIDs strictly newer than the watermark, ascending, capped to the newest
/// `limit`. Older excess is dropped, not queued: catch-up is bounded.
pub fn select_batch(uids: &[u32], watermark: Option<u32>, limit: usize) -> Vec<u32> {
    let mut newer: Vec<u32> = uids
        .iter()
        .copied()
        .filter(|uid| watermark.map_or(true, |w| *uid > w))
        .collect();
    newer.sort_unstable();
    if newer.len() > limit {
        newer.drain(..newer.len() - limit);
    }
    newer
}

/// Fetch the full raw message for one UID. `None` when the server returns
/// nothing for it.
pub async fn fetch_raw<S>(session: &mut Session<S>, uid: u32) -> Result<Option<Vec<u8>>>
where
    S: AsyncRead + AsyncWrite + Unpin + fmt::Debug + Send,
{
    let uid_str = uid.to_string();
    let mut fetches = session.uid_fetch(&uid_str, "BODY.PEEK[]").await?;
    let mut raw = None;
    while let Some(item) = fetches.next().await {
        let f = item?;
        if let Some(body) = f.body() {
            if !body.is_empty() {
                raw = Some(body.to_vec());
                break;
            }
        }
    }
    drop(fetches);
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_skips_uids_at_or_below_watermark() {
        let uids = [120, 121, 124, 125, 200];
        assert_eq!(select_batch(&uids, Some(123), 50), vec![124, 125, 200]);
    }

    #[test]
    fn batch_without_watermark_takes_everything() {
        let uids = [3, 1, 2];
        assert_eq!(select_batch(&uids, None, 50), vec![1, 2, 3]);
    }

    #[test]
    fn batch_keeps_only_the_newest_when_over_limit() {
        let uids: Vec<u32> = (1..=80).collect();
        let batch = select_batch(&uids, None, 50);
        assert_eq!(batch.len(), 50);
        assert_eq!(batch[0], 31);
        assert_eq!(*batch.last().unwrap(), 80);
    }

    #[test]
    fn empty_when_nothing_is_newer() {
        assert_eq!(select_batch(&[5, 6], Some(10), 50), Vec::<u32>::new());
    }
}
