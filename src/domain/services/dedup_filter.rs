use crate::domain::entities::Message;
use std::collections::HashSet;

/// Remembers which message ids have already been surfaced in this session.
///
/// Unbounded on purpose: it lives exactly as long as one signed-in session.
#[derive(Debug, Default)]
pub struct DedupFilter {
    seen: HashSet<String>,
}

impl DedupFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the message should be forwarded, recording its id.
    /// Messages without an id cannot be matched and are always forwarded.
    pub fn check_and_record(&mut self, message: &Message) -> bool {
        match message.dedup_key() {
            Some(key) => self.record(key),
            None => true,
        }
    }

    /// Record an id seen through a side channel. Returns `false` if it was
    /// already known.
    pub fn record(&mut self, key: &str) -> bool {
        self.seen.insert(key.to_string())
    }
}
