use crate::model::{DecodedImage, ImageId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

struct CacheEntry {
    image: Arc<DecodedImage>,
    created_at: Instant,
}

/// Decoded images keyed by identifier. Entries expire a fixed time after
/// they were stored; reading an entry does not extend its life.
pub struct DecodedCache {
    entries: HashMap<ImageId, CacheEntry>,
    ttl: Duration,
}

impl DecodedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, id: &ImageId, now: Instant) -> Option<Arc<DecodedImage>> {
        self.entries
            .get(id)
            .filter(|entry| !self.is_expired(entry, now))
            .map(|entry| Arc::clone(&entry.image))
    }

    pub fn insert(&mut self, id: ImageId, image: Arc<DecodedImage>, now: Instant) {
        self.entries.insert(
            id,
            CacheEntry {
                image,
                created_at: now,
            },
        );
    }

    /// Drop expired entries, returning how many went.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.created_at) < ttl);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.created_at) >= self.ttl
    }
}
