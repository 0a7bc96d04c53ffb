// Core automod module - rule evaluation, escalation, caches and invalidation.
// Following the same pattern as the other core modules: traits for every
// external collaborator, no Discord types.

pub mod automod_config;
pub mod automod_models;
pub mod automod_service;
pub mod config_cache;
pub mod dispatcher;
pub mod escalation;
pub mod guild_state;
pub mod invalidation;
pub mod rules;
pub mod topology_cache;
pub mod violations;

pub use automod_config::*;
pub use automod_models::*;
pub use automod_service::*;
pub use config_cache::{AutomodConfigStore, ConfigCache, ConfigError, StoreError};
pub use dispatcher::{ChatSession, DispatchOutcome, ModerationActions, PlatformError};
pub use guild_state::SharedGuildState;
pub use invalidation::{rules_updated_channel, InvalidationListener, LifecycleEvent, RulesUpdated};
pub use topology_cache::{KvError, KvStore, TopologyCache};
pub use violations::InMemoryViolationTracker;
