// Automod domain models - data structures shared by the rule loop,
// the caches and the dispatcher.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts serenity events into these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Punishment severity. The derive order is the escalation order:
/// `None < Mute < Kick < Ban`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Punishment {
    /// Delete and notify only
    None,
    Mute,
    Kick,
    Ban,
}

impl Default for Punishment {
    fn default() -> Self {
        Punishment::None
    }
}

impl std::fmt::Display for Punishment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Punishment::None => write!(f, "None"),
            Punishment::Mute => write!(f, "Mute"),
            Punishment::Kick => write!(f, "Kick"),
            Punishment::Ban => write!(f, "Ban"),
        }
    }
}

/// The six rule categories, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleKind {
    Spam,
    Invite,
    Mention,
    Links,
    Words,
    Sites,
}

impl RuleKind {
    /// Every kind in the order the escalation loop visits them.
    pub const ORDERED: [RuleKind; 6] = [
        RuleKind::Spam,
        RuleKind::Invite,
        RuleKind::Mention,
        RuleKind::Links,
        RuleKind::Words,
        RuleKind::Sites,
    ];
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleKind::Spam => write!(f, "Spam"),
            RuleKind::Invite => write!(f, "Invite"),
            RuleKind::Mention => write!(f, "Mention"),
            RuleKind::Links => write!(f, "Links"),
            RuleKind::Words => write!(f, "Words"),
            RuleKind::Sites => write!(f, "Sites"),
        }
    }
}

/// An inbound chat message. Read-only to automod.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomodMessage {
    pub id: u64,
    /// `None` for direct messages
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub author_id: u64,
    pub author_bot: bool,
    pub content: String,
    /// User + role mentions
    pub mention_count: u32,
    pub timestamp: DateTime<Utc>,
}

/// A channel as seen by automod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: u64,
    pub guild_id: u64,
    pub name: String,
    /// Private (DM/group) channels are never moderated
    pub is_private: bool,
}

/// A guild as seen by automod. Never mutated by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildInfo {
    pub id: u64,
    pub name: String,
}

/// The acting user's membership record in one guild.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemberInfo {
    pub user_id: u64,
    pub guild_id: u64,
    pub roles: Vec<u64>,
    pub nick: Option<String>,
}

impl MemberInfo {
    pub fn has_role(&self, role_id: u64) -> bool {
        self.roles.contains(&role_id)
    }
}

/// What a single rule reports when it has looked at a message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleOutcome {
    /// The rule wants the message deleted. Without this flag nothing
    /// else in the outcome counts as a violation.
    pub delete: bool,
    pub punishment: Punishment,
    /// Human-readable violation line
    pub message: String,
}

impl RuleOutcome {
    /// The rule found nothing.
    pub fn clean() -> Self {
        Self::default()
    }

    /// The rule found a violation.
    pub fn violation(punishment: Punishment, message: impl Into<String>) -> Self {
        Self {
            delete: true,
            punishment,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_punishment_severity_order() {
        assert!(Punishment::None < Punishment::Mute);
        assert!(Punishment::Mute < Punishment::Kick);
        assert!(Punishment::Kick < Punishment::Ban);
        assert_eq!(
            [Punishment::Kick, Punishment::Mute, Punishment::Ban]
                .into_iter()
                .max(),
            Some(Punishment::Ban)
        );
    }

    #[test]
    fn test_violation_sets_delete() {
        let outcome = RuleOutcome::violation(Punishment::None, "Sending links");
        assert!(outcome.delete);
        assert_eq!(outcome.punishment, Punishment::None);
        assert!(!RuleOutcome::clean().delete);
    }
}
