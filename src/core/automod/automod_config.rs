// Per-guild automod configuration and its one-time compilation.
//
// `AutomodConfig` is what the store persists. `CompiledConfig` is what the
// cache hands out: the same settings with the list-based matchers built.
// A compiled config is never mutated; a reload replaces it wholesale.

use super::automod_models::{Punishment, RuleKind};
use super::rules::{
    InviteRule, LinksRule, MentionRule, Rule, SitesRule, SpamRule, WordsRule,
};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Invalid banned word list: {0}")]
    WordList(String),

    #[error("Invalid banned site: {0:?}")]
    InvalidSite(String),
}

/// Settings every rule slot carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSettings {
    pub enabled: bool,
    /// How long a violation counts towards the punishment ladder
    pub violations_expire_minutes: u32,
    /// Violations before a mute (0 = never)
    pub mute_after: u32,
    pub mute_duration_minutes: u32,
    /// Violations before a kick (0 = never)
    pub kick_after: u32,
    /// Violations before a ban (0 = never)
    pub ban_after: u32,
    /// Members with this role are never checked
    pub ignore_role: Option<u64>,
    pub ignore_channels: Vec<u64>,
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            violations_expire_minutes: 60,
            mute_after: 0,
            mute_duration_minutes: 10,
            kick_after: 0,
            ban_after: 0,
            ignore_role: None,
            ignore_channels: Vec::new(),
        }
    }
}

impl RuleSettings {
    /// Pick the highest rung reached by `violations`.
    pub fn punishment_for(&self, violations: u32) -> Punishment {
        if self.ban_after > 0 && violations >= self.ban_after {
            Punishment::Ban
        } else if self.kick_after > 0 && violations >= self.kick_after {
            Punishment::Kick
        } else if self.mute_after > 0 && violations >= self.mute_after {
            Punishment::Mute
        } else {
            Punishment::None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpamConfig {
    #[serde(flatten)]
    pub settings: RuleSettings,
    pub max_messages: u32,
    pub within_seconds: u32,
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            settings: RuleSettings::default(),
            max_messages: 5,
            within_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InviteConfig {
    #[serde(flatten)]
    pub settings: RuleSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MentionConfig {
    #[serde(flatten)]
    pub settings: RuleSettings,
    pub max_mentions: u32,
}

impl Default for MentionConfig {
    fn default() -> Self {
        Self {
            settings: RuleSettings::default(),
            max_mentions: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinksConfig {
    #[serde(flatten)]
    pub settings: RuleSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordsConfig {
    #[serde(flatten)]
    pub settings: RuleSettings,
    pub banned_words: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SitesConfig {
    #[serde(flatten)]
    pub settings: RuleSettings,
    pub banned_sites: Vec<String>,
}

/// Raw per-guild automod configuration as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomodConfig {
    pub enabled: bool,
    pub spam: SpamConfig,
    pub invite: InviteConfig,
    pub mention: MentionConfig,
    pub links: LinksConfig,
    pub words: WordsConfig,
    pub sites: SitesConfig,
}

impl AutomodConfig {
    /// Build the list matchers and the rule evaluators.
    pub fn compile(self) -> Result<CompiledConfig, CompileError> {
        let words = compile_words(&self.words.banned_words)?;
        let sites = compile_sites(&self.sites.banned_sites)?;

        Ok(CompiledConfig {
            enabled: self.enabled,
            spam: SpamRule::new(self.spam),
            invite: InviteRule::new(self.invite),
            mention: MentionRule::new(self.mention),
            links: LinksRule::new(self.links),
            words: WordsRule::new(self.words, words),
            sites: SitesRule::new(self.sites, sites),
        })
    }

    /// The common settings of one rule slot.
    pub fn settings(&self, kind: RuleKind) -> &RuleSettings {
        match kind {
            RuleKind::Spam => &self.spam.settings,
            RuleKind::Invite => &self.invite.settings,
            RuleKind::Mention => &self.mention.settings,
            RuleKind::Links => &self.links.settings,
            RuleKind::Words => &self.words.settings,
            RuleKind::Sites => &self.sites.settings,
        }
    }

    pub fn settings_mut(&mut self, kind: RuleKind) -> &mut RuleSettings {
        match kind {
            RuleKind::Spam => &mut self.spam.settings,
            RuleKind::Invite => &mut self.invite.settings,
            RuleKind::Mention => &mut self.mention.settings,
            RuleKind::Links => &mut self.links.settings,
            RuleKind::Words => &mut self.words.settings,
            RuleKind::Sites => &mut self.sites.settings,
        }
    }
}

/// A fully compiled guild configuration.
#[derive(Debug)]
pub struct CompiledConfig {
    pub enabled: bool,
    pub spam: SpamRule,
    pub invite: InviteRule,
    pub mention: MentionRule,
    pub links: LinksRule,
    pub words: WordsRule,
    pub sites: SitesRule,
}

impl CompiledConfig {
    /// The rule set in evaluation order.
    pub fn rules(&self) -> [&dyn Rule; 6] {
        [
            &self.spam,
            &self.invite,
            &self.mention,
            &self.links,
            &self.words,
            &self.sites,
        ]
    }
}

/// One case-insensitive alternation. `None` for an empty list.
fn compile_words(words: &[String]) -> Result<Option<Regex>, CompileError> {
    let alternatives: Vec<String> = words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .map(word_pattern)
        .collect();

    if alternatives.is_empty() {
        return Ok(None);
    }

    let pattern = format!("(?:{})", alternatives.join("|"));
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map(Some)
        .map_err(|e| CompileError::WordList(e.to_string()))
}

/// Escape a word, anchoring `\b` only on sides that are word characters.
/// A boundary next to `:)` or `c++` would never match.
fn word_pattern(word: &str) -> String {
    let is_word_char = |c: char| c.is_alphanumeric() || c == '_';
    let mut pattern = String::new();
    if word.starts_with(is_word_char) {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&regex::escape(word));
    if word.ends_with(is_word_char) {
        pattern.push_str(r"\b");
    }
    pattern
}

/// Lowercased bare hosts: no scheme, no `www.`, no path.
fn compile_sites(sites: &[String]) -> Result<HashSet<String>, CompileError> {
    let mut compiled = HashSet::new();
    for raw in sites {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.contains(char::is_whitespace) {
            return Err(CompileError::InvalidSite(raw.clone()));
        }
        let host = normalize_host(trimmed);
        if host.is_empty() || !host.contains('.') {
            return Err(CompileError::InvalidSite(raw.clone()));
        }
        compiled.insert(host);
    }
    Ok(compiled)
}

/// Reduce a URL or domain to its lowercased host.
pub(crate) fn normalize_host(input: &str) -> String {
    let lower = input.to_lowercase();
    let without_scheme = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);
    let host = without_scheme
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or_default();
    // Drop credentials, then stop at the first non-hostname character
    // (port, markdown brackets, trailing punctuation)
    let host = host.rsplit('@').next().unwrap_or_default();
    let end = host
        .find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '.'))
        .unwrap_or(host.len());
    host[..end]
        .trim_start_matches("www.")
        .trim_end_matches('.')
        .to_string()
}
