// Copyright (c) 2025, The Durabbit Authors
// MIT License
// All rights reserved.

//! # Publishing Cache
//!
//! A bounded, insertion-ordered store of publishes that could not reach the
//! broker. Entries are keyed by message id, expire a fixed TTL after
//! insertion, and the oldest entry is evicted when the cache is full. The
//! owning publisher channel serializes every access, so the cache itself
//! needs no internal locking.

use crate::publishing::Publishing;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

struct CachedPublishing {
    publishing: Publishing,
    inserted_at: Instant,
}

/// Bounded TTL store of failed publishes, deduplicated by message id.
pub(crate) struct PublishingCache {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<Uuid, CachedPublishing>,
    // Insertion order; ids of removed entries linger until skipped over.
    order: VecDeque<Uuid>,
}

impl PublishingCache {
    pub(crate) fn new(capacity: usize, ttl: Duration) -> PublishingCache {
        PublishingCache {
            capacity,
            ttl,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Inserts a record, overwriting any entry with the same message id.
    ///
    /// Overwriting keeps the original insertion position and insertion time.
    /// When the cache is full, the oldest remaining entry is evicted first;
    /// eviction is not an exhaustion, it is only logged.
    pub(crate) fn put(&mut self, publishing: Publishing) {
        let id = publishing.message_id;

        if let Some(existing) = self.entries.get_mut(&id) {
            existing.publishing = publishing;
            return;
        }

        while self.entries.len() >= self.capacity.max(1) {
            let Some(evicted) = self.evict_oldest() else {
                break;
            };
            debug!(
                component = "publishing_cache",
                message_id = evicted.to_string(),
                "cache full, evicted oldest entry"
            );
        }

        if self.capacity == 0 {
            return;
        }

        self.order.push_back(id);
        self.entries.insert(
            id,
            CachedPublishing {
                publishing,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Removes an entry by message id. Removing an absent id is a no-op.
    pub(crate) fn remove(&mut self, id: &Uuid) {
        self.entries.remove(id);
    }

    pub(crate) fn get_mut(&mut self, id: &Uuid) -> Option<&mut Publishing> {
        self.entries.get_mut(id).map(|entry| &mut entry.publishing)
    }

    /// Drops every entry whose TTL elapsed, measured from insertion time.
    pub(crate) fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| entry.inserted_at + ttl > now);
        self.order.retain(|id| self.entries.contains_key(id));
    }

    /// Message ids of the live entries, oldest insertion first.
    pub(crate) fn ids(&self) -> Vec<Uuid> {
        self.order
            .iter()
            .filter(|id| self.entries.contains_key(id))
            .copied()
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_oldest(&mut self) -> Option<Uuid> {
        while let Some(id) = self.order.pop_front() {
            if self.entries.remove(&id).is_some() {
                return Some(id);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JSON_CONTENT_TYPE;
    use crate::publishing::PublishingOptions;

    fn record(body: &[u8]) -> Publishing {
        Publishing::new(
            "ex",
            "rk",
            body.to_vec(),
            JSON_CONTENT_TYPE,
            &PublishingOptions::new(),
            3,
        )
    }

    #[test]
    fn put_then_remove_leaves_nothing() {
        let mut cache = PublishingCache::new(8, Duration::from_secs(60));
        let rec = record(b"a");
        let id = rec.message_id;

        cache.put(rec);
        assert_eq!(cache.len(), 1);

        cache.remove(&id);
        assert!(cache.is_empty());

        // Removing again is a no-op.
        cache.remove(&id);
        assert!(cache.is_empty());
    }

    #[test]
    fn put_twice_with_same_id_does_not_grow() {
        let mut cache = PublishingCache::new(8, Duration::from_secs(60));
        let rec = record(b"a");
        let dup = rec.clone();

        cache.put(rec);
        cache.put(dup);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn overwrite_keeps_insertion_position() {
        let mut cache = PublishingCache::new(8, Duration::from_secs(60));
        let first = record(b"a");
        let second = record(b"b");
        let first_id = first.message_id;
        let second_id = second.message_id;

        cache.put(first.clone());
        cache.put(second);
        let mut updated = first;
        updated.body = b"a2".to_vec();
        cache.put(updated);

        assert_eq!(cache.ids(), vec![first_id, second_id]);
    }

    #[test]
    fn full_cache_evicts_oldest() {
        let mut cache = PublishingCache::new(2, Duration::from_secs(60));
        let a = record(b"a");
        let b = record(b"b");
        let c = record(b"c");
        let (a_id, b_id, c_id) = (a.message_id, b.message_id, c.message_id);

        cache.put(a);
        cache.put(b);
        cache.put(c);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.ids(), vec![b_id, c_id]);
        assert!(cache.get_mut(&a_id).is_none());
    }

    #[test]
    fn prune_drops_expired_entries_only() {
        let mut cache = PublishingCache::new(8, Duration::from_millis(10));
        let rec = record(b"a");
        cache.put(rec);

        // Still live right now.
        cache.prune(Instant::now());
        assert_eq!(cache.len(), 1);

        cache.prune(Instant::now() + Duration::from_millis(20));
        assert!(cache.is_empty());
        assert!(cache.ids().is_empty());
    }

    #[test]
    fn ids_follow_insertion_order() {
        let mut cache = PublishingCache::new(8, Duration::from_secs(60));
        let records: Vec<Publishing> = (0..4).map(|i| record(&[i])).collect();
        let expected: Vec<Uuid> = records.iter().map(|rec| rec.message_id).collect();

        for rec in records {
            cache.put(rec);
        }

        assert_eq!(cache.ids(), expected);
    }
}
