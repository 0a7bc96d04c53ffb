// In-memory guild/member/channel state shared across the process.
//
// The Discord layer is the only writer (it mirrors gateway events in here).
// Automod takes the read side for the length of one rule loop and never
// holds it across an await on external I/O.

use super::automod_models::{AutomodMessage, ChannelInfo, GuildInfo, MemberInfo};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

// Per-channel history cap. Enough for any sane spam window.
const MAX_RECENT_MESSAGES: usize = 100;

/// A message kept in the per-channel history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentMessage {
    pub id: u64,
    pub author_id: u64,
    pub timestamp: DateTime<Utc>,
}

/// Everything we mirror for a single guild.
#[derive(Debug, Clone)]
pub struct GuildSnapshot {
    pub info: GuildInfo,
    pub channels: HashMap<u64, ChannelInfo>,
    pub members: HashMap<u64, MemberInfo>,
    recent_messages: HashMap<u64, VecDeque<RecentMessage>>,
}

impl GuildSnapshot {
    pub fn new(info: GuildInfo) -> Self {
        Self {
            info,
            channels: HashMap::new(),
            members: HashMap::new(),
            recent_messages: HashMap::new(),
        }
    }

    /// Channels sorted by id so cached lists are stable.
    pub fn channel_list(&self) -> Vec<ChannelInfo> {
        let mut channels: Vec<ChannelInfo> = self.channels.values().cloned().collect();
        channels.sort_by_key(|c| c.id);
        channels
    }

    /// Recent messages in a channel, oldest first.
    pub fn recent_messages(&self, channel_id: u64) -> impl Iterator<Item = &RecentMessage> {
        self.recent_messages
            .get(&channel_id)
            .into_iter()
            .flat_map(|history| history.iter())
    }
}

/// The state behind the lock.
#[derive(Debug, Default)]
pub struct GuildStates {
    guilds: HashMap<u64, GuildSnapshot>,
}

impl GuildStates {
    pub fn guild(&self, guild_id: u64) -> Option<&GuildSnapshot> {
        self.guilds.get(&guild_id)
    }

    pub fn channel(&self, guild_id: u64, channel_id: u64) -> Option<&ChannelInfo> {
        self.guilds
            .get(&guild_id)
            .and_then(|g| g.channels.get(&channel_id))
    }

    pub fn member(&self, guild_id: u64, user_id: u64) -> Option<&MemberInfo> {
        self.guilds
            .get(&guild_id)
            .and_then(|g| g.members.get(&user_id))
    }

    /// Insert a guild or refresh its name, keeping channels and members.
    pub fn upsert_guild(&mut self, info: GuildInfo) {
        match self.guilds.get_mut(&info.id) {
            Some(existing) => existing.info = info,
            None => {
                self.guilds.insert(info.id, GuildSnapshot::new(info));
            }
        }
    }

    pub fn remove_guild(&mut self, guild_id: u64) {
        self.guilds.remove(&guild_id);
    }

    pub fn upsert_channel(&mut self, channel: ChannelInfo) {
        if let Some(guild) = self.guilds.get_mut(&channel.guild_id) {
            guild.channels.insert(channel.id, channel);
        }
    }

    pub fn remove_channel(&mut self, guild_id: u64, channel_id: u64) {
        if let Some(guild) = self.guilds.get_mut(&guild_id) {
            guild.channels.remove(&channel_id);
            guild.recent_messages.remove(&channel_id);
        }
    }

    pub fn upsert_member(&mut self, member: MemberInfo) {
        if let Some(guild) = self.guilds.get_mut(&member.guild_id) {
            guild.members.insert(member.user_id, member);
        }
    }

    pub fn remove_member(&mut self, guild_id: u64, user_id: u64) {
        if let Some(guild) = self.guilds.get_mut(&guild_id) {
            guild.members.remove(&user_id);
        }
    }

    /// A deleted role disappears from every member that held it.
    pub fn remove_role(&mut self, guild_id: u64, role_id: u64) {
        if let Some(guild) = self.guilds.get_mut(&guild_id) {
            for member in guild.members.values_mut() {
                member.roles.retain(|r| *r != role_id);
            }
        }
    }

    /// Append a guild message to its channel history.
    pub fn record_message(&mut self, message: &AutomodMessage) {
        let Some(guild_id) = message.guild_id else {
            return;
        };
        let Some(guild) = self.guilds.get_mut(&guild_id) else {
            return;
        };

        let history = guild
            .recent_messages
            .entry(message.channel_id)
            .or_default();
        history.push_back(RecentMessage {
            id: message.id,
            author_id: message.author_id,
            timestamp: message.timestamp,
        });
        while history.len() > MAX_RECENT_MESSAGES {
            history.pop_front();
        }
    }
}

/// Process-wide handle to the guild state.
#[derive(Debug, Default)]
pub struct SharedGuildState {
    inner: RwLock<GuildStates>,
}

impl SharedGuildState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared read access. Drop the guard before any external I/O.
    pub async fn read(&self) -> RwLockReadGuard<'_, GuildStates> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, GuildStates> {
        self.inner.write().await
    }

    #[cfg(test)]
    pub(crate) fn try_write_for_test(&self) -> Option<RwLockWriteGuard<'_, GuildStates>> {
        self.inner.try_write().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: u64, channel_id: u64, author_id: u64) -> AutomodMessage {
        AutomodMessage {
            id,
            guild_id: Some(1),
            channel_id,
            author_id,
            author_bot: false,
            content: "hi".to_string(),
            mention_count: 0,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_guild_channel_member_lookup() {
        let state = SharedGuildState::new();
        {
            let mut w = state.write().await;
            w.upsert_guild(GuildInfo {
                id: 1,
                name: "Test".to_string(),
            });
            w.upsert_channel(ChannelInfo {
                id: 10,
                guild_id: 1,
                name: "general".to_string(),
                is_private: false,
            });
            w.upsert_member(MemberInfo {
                user_id: 100,
                guild_id: 1,
                roles: vec![5, 6],
                nick: None,
            });
        }

        let r = state.read().await;
        assert_eq!(r.guild(1).map(|g| g.info.name.as_str()), Some("Test"));
        assert!(r.channel(1, 10).is_some());
        assert!(r.channel(1, 11).is_none());
        assert_eq!(r.member(1, 100).map(|m| m.roles.len()), Some(2));
    }

    #[tokio::test]
    async fn test_upsert_guild_keeps_channels() {
        let state = SharedGuildState::new();
        let mut w = state.write().await;
        w.upsert_guild(GuildInfo {
            id: 1,
            name: "Old".to_string(),
        });
        w.upsert_channel(ChannelInfo {
            id: 10,
            guild_id: 1,
            name: "general".to_string(),
            is_private: false,
        });
        w.upsert_guild(GuildInfo {
            id: 1,
            name: "New".to_string(),
        });

        let guild = w.guild(1).unwrap();
        assert_eq!(guild.info.name, "New");
        assert_eq!(guild.channel_list().len(), 1);
    }

    #[tokio::test]
    async fn test_role_removal_and_history_cap() {
        let state = SharedGuildState::new();
        let mut w = state.write().await;
        w.upsert_guild(GuildInfo {
            id: 1,
            name: "Test".to_string(),
        });
        w.upsert_member(MemberInfo {
            user_id: 100,
            guild_id: 1,
            roles: vec![5, 6],
            nick: None,
        });
        w.remove_role(1, 5);
        assert_eq!(w.member(1, 100).unwrap().roles, vec![6]);

        for i in 0..(MAX_RECENT_MESSAGES as u64 + 5) {
            w.record_message(&message(i, 10, 100));
        }
        let history: Vec<_> = w.guild(1).unwrap().recent_messages(10).collect();
        assert_eq!(history.len(), MAX_RECENT_MESSAGES);
        assert_eq!(history[0].id, 5);
    }
}
