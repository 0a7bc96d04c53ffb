// The rule evaluators.
//
// Each rule holds only its own slice of the guild config (plus whatever was
// compiled from it) and is never mutated after compilation. State a rule
// needs to look at (channel history, violation counters) comes in through
// `RuleContext`.

use super::automod_config::{
    normalize_host, InviteConfig, LinksConfig, MentionConfig, RuleSettings, SitesConfig,
    SpamConfig, WordsConfig,
};
use super::automod_models::{AutomodMessage, ChannelInfo, MemberInfo, RuleKind, RuleOutcome};
use super::guild_state::GuildStates;
use super::violations::ViolationTracker;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;

static INVITE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:discord\.gg|discord(?:app)?\.com/invite)/[a-z0-9-]+")
        .expect("invite pattern is valid")
});

static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bhttps?://[^\s<>]+").expect("link pattern is valid")
});

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("No state for guild {0}")]
    MissingGuildState(u64),

    #[error("Rule check failed: {0}")]
    Other(String),
}

/// What a rule may read while it runs. Borrowed from the guild-state read
/// guard, so checks are synchronous.
pub struct RuleContext<'a> {
    pub state: &'a GuildStates,
    pub violations: &'a dyn ViolationTracker,
    pub now: DateTime<Utc>,
}

/// A single automod rule.
pub trait Rule: Send + Sync {
    fn kind(&self) -> RuleKind;

    /// True when this rule must not look at the message at all.
    fn should_ignore(&self, message: &AutomodMessage, member: &MemberInfo) -> bool;

    /// Inspect the message. Only an outcome with `delete` set is a violation.
    fn check(
        &self,
        message: &AutomodMessage,
        channel: &ChannelInfo,
        ctx: &RuleContext<'_>,
    ) -> Result<RuleOutcome, RuleError>;

    /// Minutes to mute for when this rule sets a `Mute`.
    fn mute_duration(&self) -> u32;
}

impl RuleSettings {
    fn ignores(&self, message: &AutomodMessage, member: &MemberInfo) -> bool {
        if !self.enabled {
            return true;
        }
        if let Some(role) = self.ignore_role {
            if member.has_role(role) {
                return true;
            }
        }
        self.ignore_channels.contains(&message.channel_id)
    }

    /// Count the violation and build the outcome for the reached rung.
    fn violation(
        &self,
        kind: RuleKind,
        message: &AutomodMessage,
        channel: &ChannelInfo,
        ctx: &RuleContext<'_>,
        text: String,
    ) -> RuleOutcome {
        let count = ctx.violations.push(
            channel.guild_id,
            message.author_id,
            kind,
            ctx.now,
            Duration::minutes(i64::from(self.violations_expire_minutes)),
        );
        RuleOutcome::violation(self.punishment_for(count), text)
    }
}

// ============================================================================
// SPAM
// ============================================================================

#[derive(Debug)]
pub struct SpamRule {
    config: SpamConfig,
}

impl SpamRule {
    pub fn new(config: SpamConfig) -> Self {
        Self { config }
    }
}

impl Rule for SpamRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Spam
    }

    fn should_ignore(&self, message: &AutomodMessage, member: &MemberInfo) -> bool {
        self.config.settings.ignores(message, member)
    }

    fn check(
        &self,
        message: &AutomodMessage,
        channel: &ChannelInfo,
        ctx: &RuleContext<'_>,
    ) -> Result<RuleOutcome, RuleError> {
        if self.config.max_messages == 0 {
            return Ok(RuleOutcome::clean());
        }

        let guild = ctx
            .state
            .guild(channel.guild_id)
            .ok_or(RuleError::MissingGuildState(channel.guild_id))?;

        let window_start = ctx.now - Duration::seconds(i64::from(self.config.within_seconds));
        let recent = guild
            .recent_messages(channel.id)
            .filter(|m| m.author_id == message.author_id && m.timestamp > window_start)
            .count();

        if recent < self.config.max_messages as usize {
            return Ok(RuleOutcome::clean());
        }

        Ok(self.config.settings.violation(
            self.kind(),
            message,
            channel,
            ctx,
            format!(
                "Sending messages too fast ({} within {}s)",
                recent, self.config.within_seconds
            ),
        ))
    }

    fn mute_duration(&self) -> u32 {
        self.config.settings.mute_duration_minutes
    }
}

// ============================================================================
// INVITE
// ============================================================================

#[derive(Debug)]
pub struct InviteRule {
    config: InviteConfig,
}

impl InviteRule {
    pub fn new(config: InviteConfig) -> Self {
        Self { config }
    }
}

impl Rule for InviteRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Invite
    }

    fn should_ignore(&self, message: &AutomodMessage, member: &MemberInfo) -> bool {
        self.config.settings.ignores(message, member)
    }

    fn check(
        &self,
        message: &AutomodMessage,
        channel: &ChannelInfo,
        ctx: &RuleContext<'_>,
    ) -> Result<RuleOutcome, RuleError> {
        if !INVITE_PATTERN.is_match(&message.content) {
            return Ok(RuleOutcome::clean());
        }

        Ok(self.config.settings.violation(
            self.kind(),
            message,
            channel,
            ctx,
            "Sending server invites".to_string(),
        ))
    }

    fn mute_duration(&self) -> u32 {
        self.config.settings.mute_duration_minutes
    }
}

// ============================================================================
// MENTION
// ============================================================================

#[derive(Debug)]
pub struct MentionRule {
    config: MentionConfig,
}

impl MentionRule {
    pub fn new(config: MentionConfig) -> Self {
        Self { config }
    }
}

impl Rule for MentionRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Mention
    }

    fn should_ignore(&self, message: &AutomodMessage, member: &MemberInfo) -> bool {
        self.config.settings.ignores(message, member)
    }

    fn check(
        &self,
        message: &AutomodMessage,
        channel: &ChannelInfo,
        ctx: &RuleContext<'_>,
    ) -> Result<RuleOutcome, RuleError> {
        if message.mention_count <= self.config.max_mentions {
            return Ok(RuleOutcome::clean());
        }

        Ok(self.config.settings.violation(
            self.kind(),
            message,
            channel,
            ctx,
            format!(
                "Sending too many mentions ({} > {})",
                message.mention_count, self.config.max_mentions
            ),
        ))
    }

    fn mute_duration(&self) -> u32 {
        self.config.settings.mute_duration_minutes
    }
}

// ============================================================================
// LINKS
// ============================================================================

#[derive(Debug)]
pub struct LinksRule {
    config: LinksConfig,
}

impl LinksRule {
    pub fn new(config: LinksConfig) -> Self {
        Self { config }
    }
}

impl Rule for LinksRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Links
    }

    fn should_ignore(&self, message: &AutomodMessage, member: &MemberInfo) -> bool {
        self.config.settings.ignores(message, member)
    }

    fn check(
        &self,
        message: &AutomodMessage,
        channel: &ChannelInfo,
        ctx: &RuleContext<'_>,
    ) -> Result<RuleOutcome, RuleError> {
        if !LINK_PATTERN.is_match(&message.content) {
            return Ok(RuleOutcome::clean());
        }

        Ok(self.config.settings.violation(
            self.kind(),
            message,
            channel,
            ctx,
            "Sending links".to_string(),
        ))
    }

    fn mute_duration(&self) -> u32 {
        self.config.settings.mute_duration_minutes
    }
}

// ============================================================================
// WORDS
// ============================================================================

#[derive(Debug)]
pub struct WordsRule {
    config: WordsConfig,
    matcher: Option<Regex>,
}

impl WordsRule {
    pub fn new(config: WordsConfig, matcher: Option<Regex>) -> Self {
        Self { config, matcher }
    }

    /// The compiled banned-word matcher, if the list is non-empty.
    pub fn matcher(&self) -> Option<&Regex> {
        self.matcher.as_ref()
    }
}

impl Rule for WordsRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Words
    }

    fn should_ignore(&self, message: &AutomodMessage, member: &MemberInfo) -> bool {
        self.config.settings.ignores(message, member)
    }

    fn check(
        &self,
        message: &AutomodMessage,
        channel: &ChannelInfo,
        ctx: &RuleContext<'_>,
    ) -> Result<RuleOutcome, RuleError> {
        let Some(found) = self.matcher.as_ref().and_then(|m| m.find(&message.content)) else {
            return Ok(RuleOutcome::clean());
        };

        Ok(self.config.settings.violation(
            self.kind(),
            message,
            channel,
            ctx,
            format!("Using banned words ({})", found.as_str()),
        ))
    }

    fn mute_duration(&self) -> u32 {
        self.config.settings.mute_duration_minutes
    }
}

// ============================================================================
// SITES
// ============================================================================

#[derive(Debug)]
pub struct SitesRule {
    config: SitesConfig,
    banned_hosts: HashSet<String>,
}

impl SitesRule {
    pub fn new(config: SitesConfig, banned_hosts: HashSet<String>) -> Self {
        Self {
            config,
            banned_hosts,
        }
    }

    /// A host is banned when it or any parent domain is on the list.
    pub fn is_banned_host(&self, host: &str) -> bool {
        let mut candidate = host;
        loop {
            if self.banned_hosts.contains(candidate) {
                return true;
            }
            match candidate.split_once('.') {
                Some((_, parent)) if parent.contains('.') => candidate = parent,
                _ => return false,
            }
        }
    }
}

impl Rule for SitesRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Sites
    }

    fn should_ignore(&self, message: &AutomodMessage, member: &MemberInfo) -> bool {
        self.config.settings.ignores(message, member)
    }

    fn check(
        &self,
        message: &AutomodMessage,
        channel: &ChannelInfo,
        ctx: &RuleContext<'_>,
    ) -> Result<RuleOutcome, RuleError> {
        if self.banned_hosts.is_empty() {
            return Ok(RuleOutcome::clean());
        }

        let banned = LINK_PATTERN
            .find_iter(&message.content)
            .map(|m| normalize_host(m.as_str()))
            .find(|host| self.is_banned_host(host));

        let Some(host) = banned else {
            return Ok(RuleOutcome::clean());
        };

        Ok(self.config.settings.violation(
            self.kind(),
            message,
            channel,
            ctx,
            format!("Sending banned sites ({})", host),
        ))
    }

    fn mute_duration(&self) -> u32 {
        self.config.settings.mute_duration_minutes
    }
}
