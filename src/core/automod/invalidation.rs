// Cache invalidation driven by platform lifecycle events and by the
// internal "rules updated" control signal.
//
// Lifecycle events only touch topology keys (they change rule inputs, not the
// config). Rules-updated only touches the compiled config entry.

use super::config_cache::{AutomodConfigStore, ConfigCache};
use super::topology_cache::{KvStore, TopologyCache};
use std::sync::Arc;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;

// Bounded so a stuck listener shows up as send errors instead of memory growth
const RULES_UPDATED_BUFFER: usize = 100;

/// Structural changes to a guild reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    GuildUpdated { guild_id: u64 },
    RoleCreated { guild_id: u64 },
    RoleUpdated { guild_id: u64 },
    RoleDeleted { guild_id: u64 },
    ChannelCreated { guild_id: u64 },
    ChannelUpdated { guild_id: u64 },
    ChannelDeleted { guild_id: u64 },
}

impl LifecycleEvent {
    pub fn guild_id(&self) -> u64 {
        match *self {
            LifecycleEvent::GuildUpdated { guild_id }
            | LifecycleEvent::RoleCreated { guild_id }
            | LifecycleEvent::RoleUpdated { guild_id }
            | LifecycleEvent::RoleDeleted { guild_id }
            | LifecycleEvent::ChannelCreated { guild_id }
            | LifecycleEvent::ChannelUpdated { guild_id }
            | LifecycleEvent::ChannelDeleted { guild_id } => guild_id,
        }
    }
}

/// Control signal: a guild's stored rules changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RulesUpdated {
    pub guild_id: u64,
}

/// Create the rules-updated channel. Writers keep the sender.
pub fn rules_updated_channel() -> (Sender<RulesUpdated>, Receiver<RulesUpdated>) {
    mpsc::channel(RULES_UPDATED_BUFFER)
}

pub struct InvalidationListener<S: AutomodConfigStore, K: KvStore> {
    configs: Arc<ConfigCache<S>>,
    topology: Arc<TopologyCache<K>>,
}

impl<S, K> InvalidationListener<S, K>
where
    S: AutomodConfigStore + 'static,
    K: KvStore + 'static,
{
    pub fn new(configs: Arc<ConfigCache<S>>, topology: Arc<TopologyCache<K>>) -> Self {
        Self { configs, topology }
    }

    /// Evict the guild's topology keys in the background. Callers are not
    /// expected to wait on the handle.
    pub fn on_lifecycle_event(&self, event: LifecycleEvent) -> JoinHandle<()> {
        let guild_id = event.guild_id();
        tracing::debug!(guild_id, ?event, "Invalidating guild topology cache");

        let topology = Arc::clone(&self.topology);
        tokio::spawn(async move {
            topology.evict_guild(guild_id).await;
        })
    }

    /// Drop the compiled rules so the next message reloads them.
    pub fn on_rules_updated(&self, event: RulesUpdated) {
        tracing::debug!(guild_id = event.guild_id, "Automod rules updated, evicting config");
        self.configs.evict(event.guild_id);
    }

    /// Drain the rules-updated channel until every sender is gone.
    pub async fn run(self: Arc<Self>, mut rx: Receiver<RulesUpdated>) {
        while let Some(event) = rx.recv().await {
            self.on_rules_updated(event);
        }
        tracing::info!("Rules-updated channel closed, invalidation listener stopping");
    }
}
