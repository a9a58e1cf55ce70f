use tokio::sync::broadcast;

use crate::models::mail::MailRecord;

/// In-process fanout for "new mail" events. Publishing is fire-and-forget:
/// with no live subscribers the event is dropped, never buffered. Each
/// subscriber gets an independent feed starting at subscription time.
pub struct MailEvents {
    tx: broadcast::Sender<MailRecord>,
}

impl MailEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        MailEvents { tx }
    }

    pub fn publish(&self, record: MailRecord) {
        // send only fails when nobody is listening, which is fine.
        let _ = self.tx.send(record);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MailRecord> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for MailEvents {
    fn default() -> Self {
        Self::new()
    }
}
