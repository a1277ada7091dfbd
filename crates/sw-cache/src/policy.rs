//! Age and size based expiration of cached entries.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sw_core::ExpirationConfig;

/// Limits applied to one resource cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationPolicy {
    /// Maximum number of entries kept; oldest are evicted first.
    pub max_entries: Option<usize>,
    /// Maximum age of an entry, measured from when it was last stored.
    pub max_age: Option<Duration>,
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self::from(&ExpirationConfig::default())
    }
}

impl From<&ExpirationConfig> for ExpirationPolicy {
    fn from(config: &ExpirationConfig) -> Self {
        Self {
            max_entries: config.max_entries,
            max_age: config.max_age_secs.map(Duration::from_secs),
        }
    }
}

impl ExpirationPolicy {
    /// Policy that never evicts.
    pub fn unbounded() -> Self {
        Self {
            max_entries: None,
            max_age: None,
        }
    }

    /// Limit the number of entries.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Limit the age of entries.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Whether this policy can ever evict anything.
    pub fn is_enabled(&self) -> bool {
        self.max_entries.is_some() || self.max_age.is_some()
    }

    /// Whether an entry stored at `stored_at` is too old at `now` (both in
    /// milliseconds since the epoch).
    pub fn is_expired(&self, stored_at: i64, now: i64) -> bool {
        match self.max_age {
            Some(max_age) => {
                let max_age = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
                now.saturating_sub(stored_at) > max_age
            }
            None => false,
        }
    }
}

/// When a URL was last stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Milliseconds since the epoch.
    pub stored_at: i64,
    /// Order of the store within the ledger; breaks ties between entries
    /// stored in the same millisecond.
    pub seq: u64,
}

/// When each URL of a cache was last stored, persisted alongside the
/// metadata records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationLedger {
    entries: BTreeMap<String, LedgerEntry>,
    #[serde(default)]
    next_seq: u64,
}

impl ExpirationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `url` was stored at `now`.
    pub fn touch(&mut self, url: impl Into<String>, now: i64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(url.into(), LedgerEntry { stored_at: now, seq });
    }

    /// Start tracking `url` as stored at `now` unless it is tracked already.
    /// Returns whether it was added.
    pub fn track(&mut self, url: impl Into<String>, now: i64) -> bool {
        let url = url.into();
        if self.entries.contains_key(&url) {
            return false;
        }
        self.touch(url, now);
        true
    }

    /// Keep only the URLs for which `keep` returns true.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.entries.retain(|url, _| keep(url));
    }

    pub fn stored_at(&self, url: &str) -> Option<i64> {
        self.entries.get(url).map(|entry| entry.stored_at)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every URL the policy rejects at `now` and return them.
    ///
    /// Entries older than `max_age` go first; the remainder is then trimmed
    /// to `max_entries`, oldest first. Entries stored in the same
    /// millisecond leave in the order they were stored.
    pub fn evict(&mut self, policy: &ExpirationPolicy, now: i64) -> Vec<String> {
        let mut evicted: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| policy.is_expired(entry.stored_at, now))
            .map(|(url, _)| url.clone())
            .collect();
        for url in &evicted {
            self.entries.remove(url);
        }

        if let Some(max_entries) = policy.max_entries {
            if self.entries.len() > max_entries {
                let mut by_age: Vec<(&String, &LedgerEntry)> = self.entries.iter().collect();
                by_age.sort_by_key(|(_, entry)| (entry.stored_at, entry.seq));

                let excess = self.entries.len() - max_entries;
                let oldest: Vec<String> =
                    by_age.into_iter().take(excess).map(|(url, _)| url.clone()).collect();
                for url in &oldest {
                    self.entries.remove(url);
                }
                evicted.extend(oldest);
            }
        }

        evicted
    }
}
