// Gateway event adapters for automod.
//
// Two jobs:
// 1. Mirror guild/channel/member changes into the shared guild state
// 2. Feed messages and lifecycle events into the core
//
// This layer is THIN - translation only.

use crate::core::automod::{
    AutomodError, AutomodMessage, ChannelInfo, GuildInfo, LifecycleEvent, MemberInfo,
    MessageOutcome,
};
use crate::discord::Data;
use poise::serenity_prelude as serenity;

fn channel_info(channel: &serenity::GuildChannel) -> ChannelInfo {
    ChannelInfo {
        id: channel.id.get(),
        guild_id: channel.guild_id.get(),
        name: channel.name.clone(),
        is_private: false,
    }
}

fn member_info(member: &serenity::Member) -> MemberInfo {
    MemberInfo {
        user_id: member.user.id.get(),
        guild_id: member.guild_id.get(),
        roles: member.roles.iter().map(|r| r.get()).collect(),
        nick: member.nick.clone(),
    }
}

pub fn automod_message(msg: &serenity::Message) -> AutomodMessage {
    AutomodMessage {
        id: msg.id.get(),
        guild_id: msg.guild_id.map(|g| g.get()),
        channel_id: msg.channel_id.get(),
        author_id: msg.author.id.get(),
        author_bot: msg.author.bot,
        content: msg.content.clone(),
        mention_count: (msg.mentions.len() + msg.mention_roles.len()) as u32,
        timestamp: chrono::DateTime::from_timestamp(msg.timestamp.unix_timestamp(), 0)
            .unwrap_or_else(chrono::Utc::now),
    }
}

/// Record the message, then run automod on it.
pub async fn handle_message(data: &Data, msg: &serenity::Message) {
    let message = automod_message(msg);

    {
        let mut state = data.guild_state.write().await;
        // The partial member on the message is the freshest copy we get
        if let (Some(guild_id), Some(partial)) = (msg.guild_id, msg.member.as_ref()) {
            state.upsert_member(MemberInfo {
                user_id: msg.author.id.get(),
                guild_id: guild_id.get(),
                roles: partial.roles.iter().map(|r| r.get()).collect(),
                nick: partial.nick.clone(),
            });
        }
        state.record_message(&message);
    }

    match data.automod.on_message(&message).await {
        Ok(MessageOutcome::Dispatched(outcome)) => {
            tracing::debug!(message_id = message.id, ?outcome, "Automod finished");
        }
        Ok(MessageOutcome::Disabled) | Ok(MessageOutcome::NotApplicable) => {}
        Err(AutomodError::MemberNotFound { guild_id, user_id }) => {
            tracing::error!(guild_id, user_id, "Failed finding guild member");
        }
        Err(e) => {
            tracing::error!(
                message_id = message.id,
                channel_id = message.channel_id,
                "Automod failed: {}",
                e
            );
        }
    }
}

/// Full guild payload: replace everything we know about it.
pub async fn handle_guild_create(data: &Data, guild: &serenity::Guild) {
    {
        let mut state = data.guild_state.write().await;
        state.remove_guild(guild.id.get());
        state.upsert_guild(GuildInfo {
            id: guild.id.get(),
            name: guild.name.clone(),
        });
        // Active threads are moderated like any other channel
        for channel in guild.channels.values().chain(guild.threads.iter()) {
            state.upsert_channel(channel_info(channel));
        }
        for member in guild.members.values() {
            state.upsert_member(member_info(member));
        }
    }

    // Reconnects and re-joins must not keep serving the old channel list
    data.invalidation
        .on_lifecycle_event(LifecycleEvent::GuildUpdated {
            guild_id: guild.id.get(),
        });
}

pub async fn handle_guild_update(data: &Data, guild: &serenity::PartialGuild) {
    data.guild_state.write().await.upsert_guild(GuildInfo {
        id: guild.id.get(),
        name: guild.name.clone(),
    });
    data.invalidation
        .on_lifecycle_event(LifecycleEvent::GuildUpdated {
            guild_id: guild.id.get(),
        });
}

pub async fn handle_guild_delete(data: &Data, guild_id: serenity::GuildId) {
    data.guild_state.write().await.remove_guild(guild_id.get());
}

pub fn handle_role_create(data: &Data, role: &serenity::Role) {
    data.invalidation.on_lifecycle_event(LifecycleEvent::RoleCreated {
        guild_id: role.guild_id.get(),
    });
}

pub fn handle_role_update(data: &Data, role: &serenity::Role) {
    data.invalidation.on_lifecycle_event(LifecycleEvent::RoleUpdated {
        guild_id: role.guild_id.get(),
    });
}

pub async fn handle_role_delete(data: &Data, guild_id: serenity::GuildId, role_id: serenity::RoleId) {
    data.guild_state
        .write()
        .await
        .remove_role(guild_id.get(), role_id.get());
    data.invalidation.on_lifecycle_event(LifecycleEvent::RoleDeleted {
        guild_id: guild_id.get(),
    });
}

pub async fn handle_channel_create(data: &Data, channel: &serenity::GuildChannel) {
    data.guild_state
        .write()
        .await
        .upsert_channel(channel_info(channel));
    data.invalidation.on_lifecycle_event(LifecycleEvent::ChannelCreated {
        guild_id: channel.guild_id.get(),
    });
}

pub async fn handle_channel_update(data: &Data, channel: &serenity::GuildChannel) {
    data.guild_state
        .write()
        .await
        .upsert_channel(channel_info(channel));
    data.invalidation.on_lifecycle_event(LifecycleEvent::ChannelUpdated {
        guild_id: channel.guild_id.get(),
    });
}

pub async fn handle_channel_delete(data: &Data, channel: &serenity::GuildChannel) {
    data.guild_state
        .write()
        .await
        .remove_channel(channel.guild_id.get(), channel.id.get());
    data.invalidation.on_lifecycle_event(LifecycleEvent::ChannelDeleted {
        guild_id: channel.guild_id.get(),
    });
}

pub async fn handle_thread_create(data: &Data, thread: &serenity::GuildChannel) {
    handle_channel_create(data, thread).await;
}

pub async fn handle_thread_update(data: &Data, thread: &serenity::GuildChannel) {
    handle_channel_update(data, thread).await;
}

pub async fn handle_thread_delete(data: &Data, thread: &serenity::PartialGuildChannel) {
    data.guild_state
        .write()
        .await
        .remove_channel(thread.guild_id.get(), thread.id.get());
    data.invalidation.on_lifecycle_event(LifecycleEvent::ChannelDeleted {
        guild_id: thread.guild_id.get(),
    });
}

/// Sent when we gain access to a channel: the threads that are active in it.
pub async fn handle_thread_list_sync(data: &Data, sync: &serenity::ThreadListSyncEvent) {
    {
        let mut state = data.guild_state.write().await;
        for thread in &sync.threads {
            state.upsert_channel(channel_info(thread));
        }
    }
    data.invalidation.on_lifecycle_event(LifecycleEvent::ChannelCreated {
        guild_id: sync.guild_id.get(),
    });
}

pub async fn handle_member_add(data: &Data, member: &serenity::Member) {
    data.guild_state.write().await.upsert_member(member_info(member));
}

pub async fn handle_member_update(data: &Data, event: &serenity::GuildMemberUpdateEvent) {
    data.guild_state.write().await.upsert_member(MemberInfo {
        user_id: event.user.id.get(),
        guild_id: event.guild_id.get(),
        roles: event.roles.iter().map(|r| r.get()).collect(),
        nick: event.nick.clone(),
    });
}

pub async fn handle_member_remove(data: &Data, guild_id: serenity::GuildId, user: &serenity::User) {
    data.guild_state
        .write()
        .await
        .remove_member(guild_id.get(), user.id.get());
}
