// Discord layer - commands, event adapters and platform actions.

#[path = "automod/mod.rs"]
pub mod automod;

use crate::core::automod::{AutomodService, InvalidationListener, SharedGuildState};
use crate::infra::automod::{InMemoryKvStore, SqliteAutomodStore};
use std::sync::Arc;

pub type Error = Box<dyn std::error::Error + Send + Sync>;

pub type Automod = AutomodService<SqliteAutomodStore, InMemoryKvStore, automod::SerenityPlatform>;

/// Shared data available to every command and event handler.
pub struct Data {
    pub automod: Arc<Automod>,
    pub invalidation: Arc<InvalidationListener<SqliteAutomodStore, InMemoryKvStore>>,
    pub guild_state: Arc<SharedGuildState>,
}
