// In-memory implementation of KvStore.
//
// Stands in for an external cache server. Entries optionally expire after a
// TTL, which is what eventually heals a missed eviction.

use crate::core::automod::{KvError, KvStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
struct StoredValue {
    value: String,
    stored_at: Instant,
}

pub struct InMemoryKvStore {
    entries: DashMap<String, StoredValue>,
    ttl: Option<Duration>,
}

impl InMemoryKvStore {
    /// Entries live until deleted.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            ttl: None,
        }
    }

    /// Entries are treated as missing once older than `ttl`.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Some(ttl),
        }
    }

    fn is_expired(&self, stored: &StoredValue) -> bool {
        self.ttl
            .map(|ttl| stored.stored_at.elapsed() >= ttl)
            .unwrap_or(false)
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let expired = match self.entries.get(key) {
            Some(entry) if !self.is_expired(&entry) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), KvError> {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value,
                stored_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.entries.remove(key);
        Ok(())
    }
}
