//! Per-account high-water mark used for deduplication.

/// Tracks the largest post ID already admitted for one account.
///
/// Owned exclusively by one `FeedMonitor`; never shared, so no locking.
/// `None` means no prior posts were observed for the account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermark {
    last_seen_id: Option<u64>,
}

impl Watermark {
    /// Watermark with no prior posts; everything is admitted.
    pub fn empty() -> Self {
        Self { last_seen_id: None }
    }

    /// Seed from a known baseline.
    pub fn at(id: u64) -> Self {
        Self {
            last_seen_id: Some(id),
        }
    }

    /// True iff `id` is strictly above the last seen ID.
    pub fn admits(&self, id: u64) -> bool {
        match self.last_seen_id {
            Some(last) => id > last,
            None => true,
        }
    }

    /// Raise the mark to `max_id_in_batch`. Idempotent, never decreases.
    pub fn advance(&mut self, max_id_in_batch: u64) {
        self.last_seen_id = Some(match self.last_seen_id {
            Some(last) => last.max(max_id_in_batch),
            None => max_id_in_batch,
        });
    }

    pub fn last_seen_id(&self) -> Option<u64> {
        self.last_seen_id
    }
}
