// Topology snapshots (guild info, guild channel list) kept in a shared
// key/value store.
//
// Reads go kv -> guild state on a miss, then write back. Eviction is
// advisory: failures are logged at debug and otherwise ignored, a stale
// entry heals on the next eviction or when the store expires it.

use super::automod_models::{ChannelInfo, GuildInfo};
use super::guild_state::SharedGuildState;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("Key/value store unavailable: {0}")]
    Unavailable(String),
}

/// External key/value cache store. Values are JSON strings.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    async fn set(&self, key: &str, value: String) -> Result<(), KvError>;
    async fn delete(&self, key: &str) -> Result<(), KvError>;
}

pub fn guild_key(guild_id: u64) -> String {
    format!("guild:{}", guild_id)
}

pub fn guild_channels_key(guild_id: u64) -> String {
    format!("guild_channels:{}", guild_id)
}

pub struct TopologyCache<K: KvStore> {
    kv: K,
    state: Arc<SharedGuildState>,
}

impl<K: KvStore> TopologyCache<K> {
    pub fn new(kv: K, state: Arc<SharedGuildState>) -> Self {
        Self { kv, state }
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    /// Guild snapshot, `None` if the session doesn't know the guild.
    pub async fn guild(&self, guild_id: u64) -> Option<GuildInfo> {
        let key = guild_key(guild_id);
        if let Some(cached) = self.read_cached::<GuildInfo>(&key).await {
            return Some(cached);
        }

        let info = {
            let state = self.state.read().await;
            state.guild(guild_id).map(|g| g.info.clone())
        }?;

        self.write_cached(&key, &info).await;
        Some(info)
    }

    /// Channel list of a guild, `None` if the session doesn't know the guild.
    pub async fn guild_channels(&self, guild_id: u64) -> Option<Vec<ChannelInfo>> {
        let key = guild_channels_key(guild_id);
        if let Some(cached) = self.read_cached::<Vec<ChannelInfo>>(&key).await {
            return Some(cached);
        }

        let channels = {
            let state = self.state.read().await;
            state.guild(guild_id).map(|g| g.channel_list())
        }?;

        self.write_cached(&key, &channels).await;
        Some(channels)
    }

    /// Look a channel up through the cached channel list.
    pub async fn channel(&self, guild_id: u64, channel_id: u64) -> Option<ChannelInfo> {
        self.guild_channels(guild_id)
            .await?
            .into_iter()
            .find(|c| c.id == channel_id)
    }

    /// Drop both topology keys for a guild. Never fails.
    pub async fn evict_guild(&self, guild_id: u64) {
        for key in [guild_key(guild_id), guild_channels_key(guild_id)] {
            if let Err(e) = self.kv.delete(&key).await {
                tracing::debug!(guild_id, key = %key, "Topology eviction failed: {}", e);
            }
        }
    }

    async fn read_cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.kv.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(key, "Discarding unreadable topology entry: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, "Topology cache read failed: {}", e);
                None
            }
        }
    }

    async fn write_cached<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key, "Failed serializing topology entry: {}", e);
                return;
            }
        };
        if let Err(e) = self.kv.set(key, raw).await {
            tracing::warn!(key, "Topology cache write failed: {}", e);
        }
    }
}
