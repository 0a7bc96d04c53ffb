// Guild-keyed cache of compiled automod configs.
//
// Hit: hand out the cached `Arc` with no I/O.
// Miss: load from the store, compile, insert, return.
// Failed loads/compiles are never cached so the next message retries.
//
// Two concurrent misses for the same guild may both load and compile;
// the last insert wins. Both results are equivalent and immutable.

use super::automod_config::{AutomodConfig, CompileError, CompiledConfig};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed loading automod config: {0}")]
    Load(#[from] StoreError),

    #[error("Failed compiling automod config: {0}")]
    Compile(#[from] CompileError),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Persistent storage for raw automod configs.
#[async_trait]
pub trait AutomodConfigStore: Send + Sync {
    /// Load a guild's config. Guilds without a stored config get the default.
    async fn load(&self, guild_id: u64) -> Result<AutomodConfig, StoreError>;

    async fn save(&self, guild_id: u64, config: &AutomodConfig) -> Result<(), StoreError>;
}

/// Cache key for a guild's full compiled rule set.
pub fn rules_key(guild_id: u64) -> String {
    format!("automod_rules:{}", guild_id)
}

// ============================================================================
// CACHE
// ============================================================================

pub struct ConfigCache<S: AutomodConfigStore> {
    store: S,
    entries: DashMap<String, Arc<CompiledConfig>>,
}

impl<S: AutomodConfigStore> ConfigCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            entries: DashMap::new(),
        }
    }

    /// The backing store, for writers. Writing through it does not touch the
    /// cache; publish a rules-updated event afterwards.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the compiled config for a guild, loading and compiling on a miss.
    pub async fn get(&self, guild_id: u64) -> Result<Arc<CompiledConfig>, ConfigError> {
        let key = rules_key(guild_id);
        if let Some(cached) = self.entries.get(&key) {
            return Ok(Arc::clone(cached.value()));
        }

        let raw = self.store.load(guild_id).await?;
        let compiled = Arc::new(raw.compile()?);

        self.entries.insert(key, Arc::clone(&compiled));
        tracing::debug!(guild_id, "Compiled and cached automod config");

        Ok(compiled)
    }

    /// Drop the cached entry for a guild. No-op when absent.
    pub fn evict(&self, guild_id: u64) {
        self.entries.remove(&rules_key(guild_id));
    }

    #[cfg(test)]
    pub(crate) fn is_cached(&self, guild_id: u64) -> bool {
        self.entries.contains_key(&rules_key(guild_id))
    }
}
