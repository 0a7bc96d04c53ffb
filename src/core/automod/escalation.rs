// The escalation loop: run every rule against one message and fold the
// outcomes into a single delete decision and a single punishment.
//
// Pure decision logic. Nothing here talks to Discord.

use super::automod_models::{AutomodMessage, ChannelInfo, MemberInfo, Punishment, RuleKind};
use super::rules::{Rule, RuleContext};

/// The folded result of one rule loop.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Escalation {
    /// At least one rule asked for deletion
    pub should_delete: bool,
    /// Highest punishment among violating rules
    pub punishment: Punishment,
    /// Mute minutes of the rule that set `punishment`
    pub mute_duration: u32,
    /// One line per violating rule, in evaluation order
    pub violations: Vec<String>,
    /// Rules whose check failed, with the error text
    pub failures: Vec<(RuleKind, String)>,
}

impl Escalation {
    pub fn combined_message(&self) -> String {
        self.violations.join("\n")
    }
}

/// Evaluate `rules` in order.
///
/// Ignored rules contribute nothing. A failing check is logged and skipped.
/// An outcome without `delete` is not a violation, whatever else it carries.
/// Only a strictly higher punishment replaces the running maximum, so on a
/// tie the earlier rule's mute duration sticks.
pub fn evaluate(
    rules: &[&dyn Rule],
    message: &AutomodMessage,
    channel: &ChannelInfo,
    member: &MemberInfo,
    ctx: &RuleContext<'_>,
) -> Escalation {
    let mut result = Escalation::default();

    for rule in rules {
        if rule.should_ignore(message, member) {
            continue;
        }

        let outcome = match rule.check(message, channel, ctx) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    guild_id = channel.guild_id,
                    channel_id = channel.id,
                    rule = %rule.kind(),
                    "Failed checking automod rule: {}",
                    e
                );
                result.failures.push((rule.kind(), e.to_string()));
                continue;
            }
        };

        if !outcome.delete {
            continue;
        }

        result.should_delete = true;
        result.violations.push(outcome.message);

        if outcome.punishment > result.punishment {
            result.punishment = outcome.punishment;
            result.mute_duration = rule.mute_duration();
        }
    }

    result
}
