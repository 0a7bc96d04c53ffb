// Automod service - the per-message pipeline.
//
// This service handles:
// - Resolving channel, guild and member for an inbound message
// - Fetching the compiled guild config (compile on miss)
// - Running the escalation loop under the guild-state read lock
// - Dispatching the single resulting punishment
// - Config edits from the control surface (save + rules-updated signal)
//
// NO Discord dependencies here - just pure domain logic.

use super::automod_config::{AutomodConfig, CompileError};
use super::automod_models::{AutomodMessage, ChannelInfo, GuildInfo, MemberInfo};
use super::config_cache::{AutomodConfigStore, ConfigCache, ConfigError, StoreError};
use super::dispatcher::{
    ChatSession, DispatchError, DispatchOutcome, ModerationActions, PunishmentDispatcher,
};
use super::escalation::{evaluate, Escalation};
use super::guild_state::SharedGuildState;
use super::invalidation::RulesUpdated;
use super::rules::{Rule, RuleContext};
use super::topology_cache::{KvStore, TopologyCache};
use super::violations::ViolationTracker;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::Sender;
use tokio::sync::Mutex;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum AutomodError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Rejected automod config: {0}")]
    InvalidConfig(#[from] CompileError),

    #[error("Failed finding guild member {user_id} in guild {guild_id}")]
    MemberNotFound { guild_id: u64, user_id: u64 },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// How a message left the pipeline when nothing went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// DM, bot author, or channel/guild unknown
    NotApplicable,
    /// Automod is off for the guild
    Disabled,
    Dispatched(DispatchOutcome),
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct AutomodService<S, K, P>
where
    S: AutomodConfigStore,
    K: KvStore,
    P: ChatSession + ModerationActions,
{
    configs: Arc<ConfigCache<S>>,
    topology: Arc<TopologyCache<K>>,
    state: Arc<SharedGuildState>,
    violations: Arc<dyn ViolationTracker>,
    dispatcher: PunishmentDispatcher<P>,
    rules_updated: Sender<RulesUpdated>,
    // One edit at a time per guild, so load-edit-save never loses a write
    edit_locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl<S, K, P> AutomodService<S, K, P>
where
    S: AutomodConfigStore,
    K: KvStore,
    P: ChatSession + ModerationActions,
{
    pub fn new(
        configs: Arc<ConfigCache<S>>,
        topology: Arc<TopologyCache<K>>,
        state: Arc<SharedGuildState>,
        violations: Arc<dyn ViolationTracker>,
        platform: Arc<P>,
        rules_updated: Sender<RulesUpdated>,
    ) -> Self {
        Self {
            configs,
            topology,
            state,
            violations,
            dispatcher: PunishmentDispatcher::new(platform),
            rules_updated,
            edit_locks: DashMap::new(),
        }
    }

    /// Run automod on one inbound message.
    pub async fn on_message(
        &self,
        message: &AutomodMessage,
    ) -> Result<MessageOutcome, AutomodError> {
        if message.author_bot {
            return Ok(MessageOutcome::NotApplicable);
        }

        // DMs carry no guild
        let Some(guild_id) = message.guild_id else {
            return Ok(MessageOutcome::NotApplicable);
        };

        let Some(channel) = self.topology.channel(guild_id, message.channel_id).await else {
            return Ok(MessageOutcome::NotApplicable);
        };
        if channel.is_private {
            return Ok(MessageOutcome::NotApplicable);
        }

        let Some(guild) = self.topology.guild(channel.guild_id).await else {
            return Ok(MessageOutcome::NotApplicable);
        };

        let config = self.configs.get(guild.id).await?;
        if !config.enabled {
            tracing::debug!(guild_id = guild.id, "Automod is disabled");
            return Ok(MessageOutcome::Disabled);
        }

        let outcome = self
            .evaluate_and_dispatch(&config.rules(), message, &channel, &guild)
            .await?;
        Ok(MessageOutcome::Dispatched(outcome))
    }

    /// Evaluate `rules` while holding the guild-state read lock, release it,
    /// then dispatch.
    async fn evaluate_and_dispatch(
        &self,
        rules: &[&dyn Rule],
        message: &AutomodMessage,
        channel: &ChannelInfo,
        guild: &GuildInfo,
    ) -> Result<DispatchOutcome, AutomodError> {
        let (member, escalation): (MemberInfo, Escalation) = {
            let state = self.state.read().await;

            let member = state
                .member(guild.id, message.author_id)
                .cloned()
                .ok_or(AutomodError::MemberNotFound {
                    guild_id: guild.id,
                    user_id: message.author_id,
                })?;

            let ctx = RuleContext {
                state: &*state,
                violations: self.violations.as_ref(),
                now: Utc::now(),
            };
            let escalation = evaluate(rules, message, channel, &member, &ctx);
            (member, escalation)
        };

        if escalation.should_delete {
            tracing::info!(
                guild_id = guild.id,
                channel_id = channel.id,
                user_id = member.user_id,
                punishment = %escalation.punishment,
                violations = escalation.violations.len(),
                "Automod violation"
            );
        }

        Ok(self
            .dispatcher
            .dispatch(&escalation, message, channel, guild, &member)
            .await?)
    }

    /// The stored (uncompiled) config for a guild.
    pub async fn stored_config(&self, guild_id: u64) -> Result<AutomodConfig, AutomodError> {
        Ok(self.configs.store().load(guild_id).await?)
    }

    /// Load, edit, validate and save a guild's config, then announce the
    /// change. The cache is left to the rules-updated listener.
    pub async fn update_config<F>(&self, guild_id: u64, edit: F) -> Result<AutomodConfig, AutomodError>
    where
        F: FnOnce(&mut AutomodConfig) + Send,
    {
        let lock = self.edit_locks.entry(guild_id).or_default().clone();
        let _guard = lock.lock().await;

        let mut config = self.configs.store().load(guild_id).await?;
        edit(&mut config);

        // Refuse to store something that would fail every future load
        config.clone().compile()?;

        self.configs.store().save(guild_id, &config).await?;

        if let Err(e) = self.rules_updated.send(RulesUpdated { guild_id }).await {
            tracing::warn!(guild_id, "Failed publishing rules-updated event: {}", e);
        }

        Ok(config)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::automod::automod_config::RuleSettings;
    use crate::core::automod::automod_models::{Punishment, RuleKind, RuleOutcome};
    use crate::core::automod::config_cache::tests::MockConfigStore;
    use crate::core::automod::dispatcher::tests::RecordingPlatform;
    use crate::core::automod::escalation::tests::{channel, member, message, StubRule};
    use crate::core::automod::invalidation::{
        rules_updated_channel, InvalidationListener, LifecycleEvent,
    };
    use crate::core::automod::rules::RuleError;
    use crate::core::automod::topology_cache::tests::{seeded_state, MockKvStore};
    use crate::core::automod::violations::InMemoryViolationTracker;
    use std::sync::Mutex;
    use tokio::sync::mpsc::Receiver;

    type TestService = AutomodService<MockConfigStore, MockKvStore, RecordingPlatform>;

    struct Harness {
        service: TestService,
        configs: Arc<ConfigCache<MockConfigStore>>,
        topology: Arc<TopologyCache<MockKvStore>>,
        platform: Arc<RecordingPlatform>,
        state: Arc<SharedGuildState>,
        rx: Receiver<RulesUpdated>,
    }

    async fn harness(config: AutomodConfig) -> Harness {
        let state = seeded_state().await;
        state.write().await.upsert_member(member());

        let configs = Arc::new(ConfigCache::new(MockConfigStore::with(1, config)));
        let topology = Arc::new(TopologyCache::new(
            MockKvStore::default(),
            Arc::clone(&state),
        ));
        let platform = Arc::new(RecordingPlatform::default());
        let (tx, rx) = rules_updated_channel();

        let service = AutomodService::new(
            Arc::clone(&configs),
            Arc::clone(&topology),
            Arc::clone(&state),
            Arc::new(InMemoryViolationTracker::new()),
            Arc::clone(&platform),
            tx,
        );

        Harness {
            service,
            configs,
            topology,
            platform,
            state,
            rx,
        }
    }

    fn links_enabled(enabled: bool) -> AutomodConfig {
        let mut config = AutomodConfig {
            enabled,
            ..Default::default()
        };
        config.links.settings = RuleSettings {
            enabled: true,
            ..Default::default()
        };
        config
    }

    fn with_content(content: &str) -> AutomodMessage {
        let mut msg = message();
        msg.content = content.to_string();
        msg
    }

    #[tokio::test]
    async fn test_link_is_deleted_and_user_notified() {
        let h = harness(links_enabled(true)).await;

        let outcome = h
            .service
            .on_message(&with_content("https://example.com"))
            .await
            .unwrap();

        assert_eq!(outcome, MessageOutcome::Dispatched(DispatchOutcome::Notified));
        let calls = h.platform.calls();
        assert_eq!(calls[0], "delete 10 500");
        assert!(calls[1].contains("Sending links"));
    }

    #[tokio::test]
    async fn test_clean_message_is_left_alone() {
        let h = harness(links_enabled(true)).await;

        let outcome = h.service.on_message(&with_content("hello")).await.unwrap();
        assert_eq!(outcome, MessageOutcome::Dispatched(DispatchOutcome::Skipped));
        assert!(h.platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_guild_never_evaluates() {
        let h = harness(links_enabled(false)).await;

        let outcome = h
            .service
            .on_message(&with_content("https://example.com"))
            .await
            .unwrap();

        assert_eq!(outcome, MessageOutcome::Disabled);
        assert!(h.platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_misses_are_dropped_silently() {
        let h = harness(links_enabled(true)).await;

        let mut dm = with_content("https://example.com");
        dm.guild_id = None;
        assert_eq!(h.service.on_message(&dm).await.unwrap(), MessageOutcome::NotApplicable);

        let mut unknown_channel = with_content("https://example.com");
        unknown_channel.channel_id = 999;
        assert_eq!(
            h.service.on_message(&unknown_channel).await.unwrap(),
            MessageOutcome::NotApplicable
        );

        let mut unknown_guild = with_content("https://example.com");
        unknown_guild.guild_id = Some(2);
        assert_eq!(
            h.service.on_message(&unknown_guild).await.unwrap(),
            MessageOutcome::NotApplicable
        );

        let mut bot = with_content("https://example.com");
        bot.author_bot = true;
        assert_eq!(h.service.on_message(&bot).await.unwrap(), MessageOutcome::NotApplicable);

        assert!(h.platform.calls().is_empty());
        // Nothing even asked for the config
        assert_eq!(h.configs.store().load_count(), 0);
    }

    #[tokio::test]
    async fn test_private_channel_is_dropped() {
        let h = harness(links_enabled(true)).await;
        h.state.write().await.upsert_channel(ChannelInfo {
            id: 20,
            guild_id: 1,
            name: "group".to_string(),
            is_private: true,
        });

        let mut msg = with_content("https://example.com");
        msg.channel_id = 20;
        assert_eq!(h.service.on_message(&msg).await.unwrap(), MessageOutcome::NotApplicable);
    }

    #[tokio::test]
    async fn test_thread_is_moderated_once_mirrored() {
        let h = harness(links_enabled(true)).await;
        let listener = InvalidationListener::new(Arc::clone(&h.configs), Arc::clone(&h.topology));

        // Warm the channel list before the thread exists
        h.service.on_message(&with_content("hello")).await.unwrap();

        h.state.write().await.upsert_channel(ChannelInfo {
            id: 30,
            guild_id: 1,
            name: "help-thread".to_string(),
            is_private: false,
        });
        listener
            .on_lifecycle_event(LifecycleEvent::ChannelCreated { guild_id: 1 })
            .await
            .unwrap();

        let mut msg = with_content("https://example.com");
        msg.channel_id = 30;
        assert_eq!(
            h.service.on_message(&msg).await.unwrap(),
            MessageOutcome::Dispatched(DispatchOutcome::Notified)
        );
        assert_eq!(h.platform.calls()[0], "delete 30 500");

        // Thread archived and deleted: back to a silent drop
        h.state.write().await.remove_channel(1, 30);
        listener
            .on_lifecycle_event(LifecycleEvent::ChannelDeleted { guild_id: 1 })
            .await
            .unwrap();
        assert_eq!(h.service.on_message(&msg).await.unwrap(), MessageOutcome::NotApplicable);
    }

    #[tokio::test]
    async fn test_unknown_member_is_an_error() {
        let h = harness(links_enabled(true)).await;
        let mut msg = with_content("https://example.com");
        msg.author_id = 12345;

        let err = h.service.on_message(&msg).await.unwrap_err();
        assert!(matches!(
            err,
            AutomodError::MemberNotFound {
                guild_id: 1,
                user_id: 12345
            }
        ));
        assert!(h.platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_config_failure_is_reported_and_retried() {
        let h = harness(links_enabled(true)).await;
        *h.configs.store().fail.lock().unwrap() = true;

        let err = h.service.on_message(&with_content("x")).await.unwrap_err();
        assert!(matches!(err, AutomodError::Config(ConfigError::Load(_))));

        *h.configs.store().fail.lock().unwrap() = false;
        assert!(h.service.on_message(&with_content("x")).await.is_ok());
        assert_eq!(h.configs.store().load_count(), 2);
    }

    #[tokio::test]
    async fn test_words_mute_and_sites_kick_dispatches_kick() {
        let h = harness(links_enabled(true)).await;
        let words = StubRule::violating(RuleKind::Words, Punishment::Mute, "Using banned words")
            .muting(10);
        let sites = StubRule::violating(RuleKind::Sites, Punishment::Kick, "Sending banned sites");
        let guild = GuildInfo {
            id: 1,
            name: "Test".to_string(),
        };

        let outcome = h
            .service
            .evaluate_and_dispatch(&[&words, &sites], &message(), &channel(), &guild)
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Kicked);
        let calls = h.platform.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[1],
            "kick 1 100 Automod Using banned words\nSending banned sites"
        );
        assert!(calls.iter().all(|c| !c.starts_with("mute")));
    }

    #[tokio::test]
    async fn test_failed_invite_check_is_skipped() {
        let h = harness(links_enabled(true)).await;
        let spam = StubRule::clean(RuleKind::Spam);
        let invite = StubRule::new(RuleKind::Invite, Err("boom".to_string()));
        let words = StubRule::violating(RuleKind::Words, Punishment::None, "Using banned words");
        let guild = GuildInfo {
            id: 1,
            name: "Test".to_string(),
        };

        h.service
            .evaluate_and_dispatch(&[&spam, &invite, &words], &message(), &channel(), &guild)
            .await
            .unwrap();

        let dm = &h.platform.calls()[1];
        assert!(dm.contains("Using banned words"));
        assert!(!dm.contains("boom"));
    }

    #[tokio::test]
    async fn test_read_lock_released_before_dispatch() {
        let h = harness(links_enabled(true)).await;
        assert!(h.platform.watched_state.set(Arc::clone(&h.state)).is_ok());

        h.service
            .on_message(&with_content("https://example.com"))
            .await
            .unwrap();

        let calls = h.platform.calls();
        assert_eq!(calls[0], "state writable true");
        assert_eq!(calls[1], "delete 10 500");
    }

    /// Tries to take the write side from inside `check`.
    struct WriterCheckingRule {
        kind: RuleKind,
        state: Arc<SharedGuildState>,
        writer_blocked: Mutex<Vec<bool>>,
    }

    impl Rule for WriterCheckingRule {
        fn kind(&self) -> RuleKind {
            self.kind
        }

        fn should_ignore(&self, _message: &AutomodMessage, _member: &MemberInfo) -> bool {
            false
        }

        fn check(
            &self,
            _message: &AutomodMessage,
            _channel: &ChannelInfo,
            _ctx: &RuleContext<'_>,
        ) -> Result<RuleOutcome, RuleError> {
            let blocked = self.state.try_write_for_test().is_none();
            self.writer_blocked.lock().unwrap().push(blocked);
            Ok(RuleOutcome::clean())
        }

        fn mute_duration(&self) -> u32 {
            0
        }
    }

    #[tokio::test]
    async fn test_writers_blocked_for_whole_rule_loop() {
        let h = harness(links_enabled(true)).await;
        let rules: Vec<WriterCheckingRule> = [RuleKind::Spam, RuleKind::Invite, RuleKind::Sites]
            .into_iter()
            .map(|kind| WriterCheckingRule {
                kind,
                state: Arc::clone(&h.state),
                writer_blocked: Mutex::new(Vec::new()),
            })
            .collect();
        let refs: Vec<&dyn Rule> = rules.iter().map(|r| r as &dyn Rule).collect();
        let guild = GuildInfo {
            id: 1,
            name: "Test".to_string(),
        };

        let outcome = h
            .service
            .evaluate_and_dispatch(&refs, &message(), &channel(), &guild)
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Skipped);
        for rule in &rules {
            assert_eq!(*rule.writer_blocked.lock().unwrap(), vec![true]);
        }
        // And free again once the loop is done
        assert!(h.state.try_write_for_test().is_some());
    }

    #[tokio::test]
    async fn test_update_config_saves_and_signals() {
        let mut h = harness(links_enabled(false)).await;
        h.configs.get(1).await.unwrap();

        let saved = h
            .service
            .update_config(1, |c| c.enabled = true)
            .await
            .unwrap();
        assert!(saved.enabled);
        assert_eq!(h.rx.recv().await, Some(RulesUpdated { guild_id: 1 }));

        // Cache is untouched until the listener handles the signal
        assert!(!h.configs.get(1).await.unwrap().enabled);

        let listener = InvalidationListener::new(Arc::clone(&h.configs), Arc::clone(&h.topology));
        listener.on_rules_updated(RulesUpdated { guild_id: 1 });
        assert!(h.configs.get(1).await.unwrap().enabled);
    }

    #[tokio::test]
    async fn test_concurrent_updates_keep_both_edits() {
        let mut h = harness(links_enabled(false)).await;

        let (first, second) = tokio::join!(
            h.service
                .update_config(1, |c| c.words.banned_words = vec!["foo".to_string()]),
            h.service.update_config(1, |c| c.enabled = true),
        );
        first.unwrap();
        second.unwrap();

        let stored = h.service.stored_config(1).await.unwrap();
        assert!(stored.enabled);
        assert_eq!(stored.words.banned_words, vec!["foo".to_string()]);
        assert_eq!(h.rx.recv().await, Some(RulesUpdated { guild_id: 1 }));
        assert_eq!(h.rx.recv().await, Some(RulesUpdated { guild_id: 1 }));
    }

    #[tokio::test]
    async fn test_update_config_rejects_invalid_lists() {
        let mut h = harness(links_enabled(true)).await;

        let err = h
            .service
            .update_config(1, |c| c.sites.banned_sites = vec!["bad site".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(err, AutomodError::InvalidConfig(_)));
        assert!(h.rx.try_recv().is_err());
        assert!(h.service.stored_config(1).await.unwrap().sites.banned_sites.is_empty());
    }
}
