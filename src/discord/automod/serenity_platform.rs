// Discord implementation of the automod platform ports.
//
// Translates the core's plain ids into serenity calls over Http.

use crate::core::automod::{ChatSession, MemberInfo, ModerationActions, PlatformError};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

// Discord rejects audit-log reasons longer than this
const MAX_AUDIT_REASON_CHARS: usize = 512;
// Discord caps communication timeouts at 28 days
const MAX_TIMEOUT_MINUTES: u32 = 28 * 24 * 60;

pub struct SerenityPlatform {
    http: Arc<serenity::Http>,
}

impl SerenityPlatform {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

fn to_platform_error(e: serenity::Error) -> PlatformError {
    PlatformError::Request(e.to_string())
}

/// "Automod: <violations>" squeezed onto one line and into the audit limit.
fn audit_reason(reason: &str, detail: &str) -> String {
    let full = format!("{}: {}", reason, detail.replace('\n', "; "));
    full.chars().take(MAX_AUDIT_REASON_CHARS).collect()
}

/// Clamp a rule's mute duration into what a timeout can express.
fn timeout_minutes(duration_minutes: u32) -> u32 {
    duration_minutes.clamp(1, MAX_TIMEOUT_MINUTES)
}

#[async_trait]
impl ChatSession for SerenityPlatform {
    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), PlatformError> {
        serenity::ChannelId::new(channel_id)
            .delete_message(&self.http, serenity::MessageId::new(message_id))
            .await
            .map_err(to_platform_error)
    }

    async fn send_direct_message(&self, user_id: u64, text: &str) -> Result<(), PlatformError> {
        let dm = serenity::UserId::new(user_id)
            .create_dm_channel(&self.http)
            .await
            .map_err(to_platform_error)?;

        dm.id
            .say(&self.http, text)
            .await
            .map(|_| ())
            .map_err(to_platform_error)
    }
}

#[async_trait]
impl ModerationActions for SerenityPlatform {
    async fn mute(
        &self,
        guild_id: u64,
        channel_id: u64,
        reason: &str,
        detail: &str,
        member: &MemberInfo,
        duration_minutes: u32,
    ) -> Result<(), PlatformError> {
        let minutes = timeout_minutes(duration_minutes);
        let until = serenity::Timestamp::from_unix_timestamp(
            chrono::Utc::now().timestamp() + i64::from(minutes) * 60,
        )
        .map_err(|e| PlatformError::Request(format!("Invalid timeout timestamp: {}", e)))?;

        serenity::GuildId::new(guild_id)
            .edit_member(
                &self.http,
                serenity::UserId::new(member.user_id),
                serenity::EditMember::new()
                    .disable_communication_until_datetime(until)
                    .audit_log_reason(&audit_reason(reason, detail)),
            )
            .await
            .map_err(to_platform_error)?;

        tracing::info!(
            guild_id,
            channel_id,
            user_id = member.user_id,
            minutes,
            "Automod muted user"
        );
        Ok(())
    }

    async fn kick(
        &self,
        guild_id: u64,
        channel_id: u64,
        reason: &str,
        detail: &str,
        user_id: u64,
    ) -> Result<(), PlatformError> {
        serenity::GuildId::new(guild_id)
            .kick_with_reason(
                &self.http,
                serenity::UserId::new(user_id),
                &audit_reason(reason, detail),
            )
            .await
            .map_err(to_platform_error)?;

        tracing::info!(guild_id, channel_id, user_id, "Automod kicked user");
        Ok(())
    }

    async fn ban(
        &self,
        guild_id: u64,
        channel_id: u64,
        reason: &str,
        detail: &str,
        user_id: u64,
    ) -> Result<(), PlatformError> {
        // Keep the message history; the violating message is already gone
        serenity::GuildId::new(guild_id)
            .ban_with_reason(
                &self.http,
                serenity::UserId::new(user_id),
                0,
                &audit_reason(reason, detail),
            )
            .await
            .map_err(to_platform_error)?;

        tracing::info!(guild_id, channel_id, user_id, "Automod banned user");
        Ok(())
    }
}
