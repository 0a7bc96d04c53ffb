// Turns an escalation result into at most one punishment.
//
// The collaborator traits here are the only way the core reaches the chat
// platform. The Discord layer implements them over serenity's Http.

use super::automod_models::{AutomodMessage, ChannelInfo, GuildInfo, MemberInfo, Punishment};
use super::escalation::Escalation;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Audit-log reason attached to every automod action.
pub const AUTOMOD_REASON: &str = "Automod";

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Platform request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed notifying user: {0}")]
    Notify(#[source] PlatformError),

    #[error("Failed applying {punishment}: {source}")]
    Punish {
        punishment: Punishment,
        #[source]
        source: PlatformError,
    },
}

// ============================================================================
// COLLABORATOR TRAITS (PORTS)
// ============================================================================

/// Message-level platform operations.
#[async_trait]
pub trait ChatSession: Send + Sync {
    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), PlatformError>;

    async fn send_direct_message(&self, user_id: u64, text: &str) -> Result<(), PlatformError>;
}

/// Member-level moderation actions.
#[async_trait]
pub trait ModerationActions: Send + Sync {
    async fn mute(
        &self,
        guild_id: u64,
        channel_id: u64,
        reason: &str,
        detail: &str,
        member: &MemberInfo,
        duration_minutes: u32,
    ) -> Result<(), PlatformError>;

    async fn kick(
        &self,
        guild_id: u64,
        channel_id: u64,
        reason: &str,
        detail: &str,
        user_id: u64,
    ) -> Result<(), PlatformError>;

    async fn ban(
        &self,
        guild_id: u64,
        channel_id: u64,
        reason: &str,
        detail: &str,
        user_id: u64,
    ) -> Result<(), PlatformError>;
}

/// What the dispatcher ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No rule asked for deletion
    Skipped,
    Notified,
    Muted,
    Kicked,
    Banned,
}

// ============================================================================
// DISPATCHER
// ============================================================================

pub struct PunishmentDispatcher<P: ChatSession + ModerationActions> {
    platform: Arc<P>,
}

impl<P: ChatSession + ModerationActions> PunishmentDispatcher<P> {
    pub fn new(platform: Arc<P>) -> Self {
        Self { platform }
    }

    /// Delete the message and apply the single escalated punishment.
    ///
    /// A failed delete is logged and does not stop the punishment. Nothing is
    /// retried or rolled back.
    pub async fn dispatch(
        &self,
        escalation: &Escalation,
        message: &AutomodMessage,
        channel: &ChannelInfo,
        guild: &GuildInfo,
        member: &MemberInfo,
    ) -> Result<DispatchOutcome, DispatchError> {
        if !escalation.should_delete {
            return Ok(DispatchOutcome::Skipped);
        }

        if let Err(e) = self.platform.delete_message(channel.id, message.id).await {
            tracing::warn!(
                guild_id = guild.id,
                channel_id = channel.id,
                message_id = message.id,
                "Failed deleting violating message: {}",
                e
            );
        }

        let detail = escalation.combined_message();

        match escalation.punishment {
            Punishment::None => {
                let notice = format!(
                    "**Automoderator for {}, Rule violations:**\n{}\nRepeating this offence may cause you a kick, mute or ban.",
                    guild.name, detail
                );
                self.platform
                    .send_direct_message(member.user_id, &notice)
                    .await
                    .map_err(DispatchError::Notify)?;
                Ok(DispatchOutcome::Notified)
            }
            Punishment::Mute => {
                let notice = format!(
                    "**Automoderator for {}: You have been muted**\n**Rule violations:**\n{}",
                    guild.name, detail
                );
                // The mute goes ahead even if the user has DMs closed
                if let Err(e) = self
                    .platform
                    .send_direct_message(member.user_id, &notice)
                    .await
                {
                    tracing::warn!(
                        guild_id = guild.id,
                        user_id = member.user_id,
                        "Failed sending mute notice: {}",
                        e
                    );
                }

                self.platform
                    .mute(
                        guild.id,
                        channel.id,
                        AUTOMOD_REASON,
                        &detail,
                        member,
                        escalation.mute_duration,
                    )
                    .await
                    .map_err(|source| DispatchError::Punish {
                        punishment: Punishment::Mute,
                        source,
                    })?;
                Ok(DispatchOutcome::Muted)
            }
            Punishment::Kick => {
                self.platform
                    .kick(guild.id, channel.id, AUTOMOD_REASON, &detail, member.user_id)
                    .await
                    .map_err(|source| DispatchError::Punish {
                        punishment: Punishment::Kick,
                        source,
                    })?;
                Ok(DispatchOutcome::Kicked)
            }
            Punishment::Ban => {
                self.platform
                    .ban(guild.id, channel.id, AUTOMOD_REASON, &detail, member.user_id)
                    .await
                    .map_err(|source| DispatchError::Punish {
                        punishment: Punishment::Ban,
                        source,
                    })?;
                Ok(DispatchOutcome::Banned)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::automod::escalation::tests::{channel, member, message};
    use crate::core::automod::guild_state::SharedGuildState;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Mutex, OnceLock};

    /// Records every platform call; individual calls can be made to fail.
    #[derive(Default)]
    pub(crate) struct RecordingPlatform {
        pub calls: Mutex<Vec<String>>,
        pub fail_delete: AtomicBool,
        pub fail_dm: AtomicBool,
        pub fail_action: AtomicBool,
        /// When set, each delete also records whether a writer could take
        /// the guild state at that moment.
        pub watched_state: OnceLock<Arc<SharedGuildState>>,
    }

    impl RecordingPlatform {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String, fail: &AtomicBool) -> Result<(), PlatformError> {
            self.calls.lock().unwrap().push(call);
            if fail.load(Ordering::SeqCst) {
                Err(PlatformError::Request("refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ChatSession for RecordingPlatform {
        async fn delete_message(
            &self,
            channel_id: u64,
            message_id: u64,
        ) -> Result<(), PlatformError> {
            if let Some(state) = self.watched_state.get() {
                let writable = state.try_write_for_test().is_some();
                self.calls
                    .lock()
                    .unwrap()
                    .push(format!("state writable {}", writable));
            }
            self.record(format!("delete {} {}", channel_id, message_id), &self.fail_delete)
        }

        async fn send_direct_message(&self, user_id: u64, text: &str) -> Result<(), PlatformError> {
            self.record(format!("dm {} {}", user_id, text), &self.fail_dm)
        }
    }

    #[async_trait]
    impl ModerationActions for RecordingPlatform {
        async fn mute(
            &self,
            guild_id: u64,
            _channel_id: u64,
            reason: &str,
            detail: &str,
            member: &MemberInfo,
            duration_minutes: u32,
        ) -> Result<(), PlatformError> {
            self.record(
                format!(
                    "mute {} {} {} {} {}",
                    guild_id, member.user_id, duration_minutes, reason, detail
                ),
                &self.fail_action,
            )
        }

        async fn kick(
            &self,
            guild_id: u64,
            _channel_id: u64,
            reason: &str,
            detail: &str,
            user_id: u64,
        ) -> Result<(), PlatformError> {
            self.record(
                format!("kick {} {} {} {}", guild_id, user_id, reason, detail),
                &self.fail_action,
            )
        }

        async fn ban(
            &self,
            guild_id: u64,
            _channel_id: u64,
            reason: &str,
            detail: &str,
            user_id: u64,
        ) -> Result<(), PlatformError> {
            self.record(
                format!("ban {} {} {} {}", guild_id, user_id, reason, detail),
                &self.fail_action,
            )
        }
    }

    fn guild() -> GuildInfo {
        GuildInfo {
            id: 1,
            name: "Test".to_string(),
        }
    }

    fn escalation(punishment: Punishment, lines: &[&str]) -> Escalation {
        Escalation {
            should_delete: true,
            punishment,
            mute_duration: 10,
            violations: lines.iter().map(|l| l.to_string()).collect(),
            failures: vec![],
        }
    }

    async fn dispatch(
        platform: &Arc<RecordingPlatform>,
        escalation: &Escalation,
    ) -> Result<DispatchOutcome, DispatchError> {
        PunishmentDispatcher::new(Arc::clone(platform))
            .dispatch(escalation, &message(), &channel(), &guild(), &member())
            .await
    }

    #[tokio::test]
    async fn test_no_delete_means_no_action() {
        let platform = Arc::new(RecordingPlatform::default());
        let escalation = Escalation {
            should_delete: false,
            punishment: Punishment::Ban,
            ..Default::default()
        };

        let outcome = dispatch(&platform, &escalation).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Skipped);
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_none_deletes_and_notifies_only() {
        let platform = Arc::new(RecordingPlatform::default());

        let outcome = dispatch(&platform, &escalation(Punishment::None, &["Sending links"]))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Notified);

        let calls = platform.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], "delete 10 500");
        assert!(calls[1].starts_with("dm 100 **Automoderator for Test, Rule violations:**"));
        assert!(calls[1].contains("Sending links"));
        assert!(calls[1].contains("Repeating this offence"));
    }

    #[tokio::test]
    async fn test_mute_notifies_then_mutes() {
        let platform = Arc::new(RecordingPlatform::default());

        let outcome = dispatch(&platform, &escalation(Punishment::Mute, &["a", "b"]))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Muted);

        let calls = platform.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[1].contains("You have been muted"));
        assert_eq!(calls[2], "mute 1 100 10 Automod a\nb");
    }

    #[tokio::test]
    async fn test_kick_and_ban_send_no_notice() {
        let platform = Arc::new(RecordingPlatform::default());
        dispatch(&platform, &escalation(Punishment::Kick, &["x"]))
            .await
            .unwrap();
        assert_eq!(platform.calls(), vec!["delete 10 500", "kick 1 100 Automod x"]);

        let platform = Arc::new(RecordingPlatform::default());
        dispatch(&platform, &escalation(Punishment::Ban, &["x"]))
            .await
            .unwrap();
        assert_eq!(platform.calls(), vec!["delete 10 500", "ban 1 100 Automod x"]);
    }

    #[tokio::test]
    async fn test_failed_delete_still_punishes() {
        let platform = Arc::new(RecordingPlatform::default());
        platform.fail_delete.store(true, Ordering::SeqCst);

        let outcome = dispatch(&platform, &escalation(Punishment::Kick, &["x"]))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Kicked);
        assert_eq!(platform.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_action_failure_is_reported() {
        let platform = Arc::new(RecordingPlatform::default());
        platform.fail_action.store(true, Ordering::SeqCst);

        let err = dispatch(&platform, &escalation(Punishment::Ban, &["x"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Punish {
                punishment: Punishment::Ban,
                ..
            }
        ));
        // Delete was issued and is not rolled back
        assert_eq!(platform.calls()[0], "delete 10 500");
    }

    #[tokio::test]
    async fn test_closed_dms_do_not_block_mute() {
        let platform = Arc::new(RecordingPlatform::default());
        platform.fail_dm.store(true, Ordering::SeqCst);

        let outcome = dispatch(&platform, &escalation(Punishment::Mute, &["x"]))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Muted);

        let platform = Arc::new(RecordingPlatform::default());
        platform.fail_dm.store(true, Ordering::SeqCst);
        let err = dispatch(&platform, &escalation(Punishment::None, &["x"]))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Notify(_)));
    }
}
