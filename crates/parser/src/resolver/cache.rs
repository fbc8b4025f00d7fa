//! Least-recently-used cache with a time-to-live
//!
//! Callers pass the current `Instant` so expiry is testable without sleeping.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// One resolved external reference
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternalRefResult {
    /// Full URI, including any fragment
    pub uri: String,

    /// Content after fragment extraction
    pub content: Value,

    /// When the content was fetched
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Entry {
    result: ExternalRefResult,
    inserted: Instant,
    last_used: u64,
}

/// Bounded URI → content cache
#[derive(Debug)]
pub struct RefCache {
    entries: HashMap<String, Entry>,
    max_entries: usize,
    ttl: Duration,
    clock: u64,
}

impl RefCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            ttl,
            clock: 0,
        }
    }

    /// Fetch a live entry, refreshing its recency; expired entries are dropped
    pub fn get(&mut self, uri: &str, now: Instant) -> Option<ExternalRefResult> {
        let expired = match self.entries.get(uri) {
            Some(entry) => now.saturating_duration_since(entry.inserted) >= self.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(uri);
            return None;
        }
        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(uri).map(|entry| {
            entry.last_used = clock;
            entry.result.clone()
        })
    }

    /// Store a result, evicting the least recently used entry when full
    pub fn insert(&mut self, result: ExternalRefResult, now: Instant) {
        if !self.entries.contains_key(&result.uri) && self.entries.len() >= self.max_entries {
            self.evict_expired(now);
            if self.entries.len() >= self.max_entries {
                self.evict_lru();
            }
        }
        self.clock += 1;
        self.entries.insert(
            result.uri.clone(),
            Entry {
                result,
                inserted: now,
                last_used: self.clock,
            },
        );
    }

    fn evict_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.inserted) < ttl);
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(uri, _)| uri.clone());
        if let Some(uri) = oldest {
            self.entries.remove(&uri);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.entries.contains_key(uri)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
