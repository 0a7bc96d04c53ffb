// Automod slash commands for configuration.
//
// Every edit goes through the service, which saves it and publishes a
// rules-updated event. Commands never touch the config cache.

use crate::core::automod::{AutomodConfig, RuleKind, RuleSettings};
use crate::discord::{Data, Error};
use poise::serenity_prelude as serenity;

type Context<'a> = poise::Context<'a, Data, Error>;

/// Automod configuration commands.
#[poise::command(
    slash_command,
    subcommands(
        "status",
        "enable",
        "disable",
        "words",
        "sites",
        "rule",
        "ignore_role",
        "ignore_channel"
    ),
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn automod(_ctx: Context<'_>) -> Result<(), Error> {
    // Parent command - shows help
    Ok(())
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum RuleChoice {
    Spam,
    Invite,
    Mention,
    Links,
    Words,
    Sites,
}

impl From<RuleChoice> for RuleKind {
    fn from(value: RuleChoice) -> Self {
        match value {
            RuleChoice::Spam => RuleKind::Spam,
            RuleChoice::Invite => RuleKind::Invite,
            RuleChoice::Mention => RuleKind::Mention,
            RuleChoice::Links => RuleKind::Links,
            RuleChoice::Words => RuleKind::Words,
            RuleChoice::Sites => RuleKind::Sites,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum RuleSetting {
    #[name = "Enabled (0 = off)"]
    Enabled,
    #[name = "Mute after (violations)"]
    MuteAfter,
    #[name = "Mute duration (minutes)"]
    MuteMinutes,
    #[name = "Kick after (violations)"]
    KickAfter,
    #[name = "Ban after (violations)"]
    BanAfter,
    #[name = "Violations expire (minutes)"]
    ExpireMinutes,
    #[name = "Max messages (spam)"]
    MaxMessages,
    #[name = "Within seconds (spam)"]
    WithinSeconds,
    #[name = "Max mentions (mention)"]
    MaxMentions,
}

/// Rule-specific thresholds only exist on their own rule.
fn setting_applies(kind: RuleKind, setting: RuleSetting) -> bool {
    match setting {
        RuleSetting::MaxMessages | RuleSetting::WithinSeconds => kind == RuleKind::Spam,
        RuleSetting::MaxMentions => kind == RuleKind::Mention,
        _ => true,
    }
}

/// Write one value into a rule slot. Settings that don't apply are ignored.
fn apply_rule_setting(config: &mut AutomodConfig, kind: RuleKind, setting: RuleSetting, value: u32) {
    match setting {
        RuleSetting::MaxMessages if kind == RuleKind::Spam => config.spam.max_messages = value,
        RuleSetting::WithinSeconds if kind == RuleKind::Spam => config.spam.within_seconds = value,
        RuleSetting::MaxMentions if kind == RuleKind::Mention => config.mention.max_mentions = value,
        RuleSetting::MaxMessages | RuleSetting::WithinSeconds | RuleSetting::MaxMentions => {}
        _ => {
            let settings = config.settings_mut(kind);
            match setting {
                RuleSetting::Enabled => settings.enabled = value != 0,
                RuleSetting::MuteAfter => settings.mute_after = value,
                RuleSetting::MuteMinutes => settings.mute_duration_minutes = value,
                RuleSetting::KickAfter => settings.kick_after = value,
                RuleSetting::BanAfter => settings.ban_after = value,
                RuleSetting::ExpireMinutes => settings.violations_expire_minutes = value,
                _ => {}
            }
        }
    }
}

/// Add the channel if missing, remove it otherwise. True when now ignored.
fn toggle_channel(channels: &mut Vec<u64>, channel_id: u64) -> bool {
    if let Some(pos) = channels.iter().position(|c| *c == channel_id) {
        channels.remove(pos);
        false
    } else {
        channels.push(channel_id);
        true
    }
}

fn rule_line(kind: RuleKind, settings: &RuleSettings) -> String {
    let state = if settings.enabled { "✅" } else { "❌" };
    let mut rungs = Vec::new();
    if settings.mute_after > 0 {
        rungs.push(format!(
            "mute@{} ({}m)",
            settings.mute_after, settings.mute_duration_minutes
        ));
    }
    if settings.kick_after > 0 {
        rungs.push(format!("kick@{}", settings.kick_after));
    }
    if settings.ban_after > 0 {
        rungs.push(format!("ban@{}", settings.ban_after));
    }
    if rungs.is_empty() {
        format!("{} **{}** - delete + notify", state, kind)
    } else {
        format!("{} **{}** - {}", state, kind, rungs.join(", "))
    }
}

/// Split a comma separated list, dropping blanks.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Show current automod status and rules.
#[poise::command(slash_command, guild_only)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;

    let config = ctx
        .data()
        .automod
        .stored_config(guild_id.get())
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    let rules: Vec<String> = RuleKind::ORDERED
        .iter()
        .map(|kind| rule_line(*kind, config.settings(*kind)))
        .collect();

    let embed = serenity::CreateEmbed::new()
        .title("🛡️ Automod Status")
        .color(if config.enabled { 0x00FF00 } else { 0xFF0000 })
        .field(
            "Status",
            if config.enabled { "✅ Enabled" } else { "❌ Disabled" },
            false,
        )
        .field("Rules", rules.join("\n"), false)
        .field(
            "Banned words",
            config.words.banned_words.len().to_string(),
            true,
        )
        .field(
            "Banned sites",
            config.sites.banned_sites.len().to_string(),
            true,
        );

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Enable automod.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn enable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;

    ctx.data()
        .automod
        .update_config(guild_id.get(), |c| c.enabled = true)
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    ctx.say("✅ Automod has been **enabled**.").await?;
    Ok(())
}

/// Disable automod.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn disable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;

    ctx.data()
        .automod
        .update_config(guild_id.get(), |c| c.enabled = false)
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    ctx.say("❌ Automod has been **disabled**.").await?;
    Ok(())
}

/// Replace the banned word list and enable the word rule.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn words(
    ctx: Context<'_>,
    #[description = "Comma separated words (empty to clear)"] list: Option<String>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;
    let words = parse_list(list.as_deref().unwrap_or_default());
    let count = words.len();

    let result = ctx
        .data()
        .automod
        .update_config(guild_id.get(), move |c| {
            c.words.settings.enabled = !words.is_empty();
            c.words.banned_words = words;
        })
        .await;

    match result {
        Ok(_) => ctx.say(format!("✅ Banned word list set ({} words).", count)).await?,
        Err(e) => ctx.say(format!("❌ {}", e)).await?,
    };
    Ok(())
}

/// Replace the banned site list and enable the site rule.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn sites(
    ctx: Context<'_>,
    #[description = "Comma separated domains (empty to clear)"] list: Option<String>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;
    let sites = parse_list(list.as_deref().unwrap_or_default());
    let count = sites.len();

    let result = ctx
        .data()
        .automod
        .update_config(guild_id.get(), move |c| {
            c.sites.settings.enabled = !sites.is_empty();
            c.sites.banned_sites = sites;
        })
        .await;

    match result {
        Ok(_) => ctx.say(format!("✅ Banned site list set ({} sites).", count)).await?,
        Err(e) => ctx.say(format!("❌ {}", e)).await?,
    };
    Ok(())
}

/// Change one setting of one rule.
///
/// **Command syntax:** `/automod rule Words "Kick after (violations)" 3`
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn rule(
    ctx: Context<'_>,
    #[description = "Rule to change"] kind: RuleChoice,
    #[description = "Setting to change"] setting: RuleSetting,
    #[description = "New value (0 disables a rung)"] value: u32,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;
    let kind = RuleKind::from(kind);

    if !setting_applies(kind, setting) {
        ctx.say(format!("❌ {} has no such setting.", kind)).await?;
        return Ok(());
    }

    let result = ctx
        .data()
        .automod
        .update_config(guild_id.get(), move |c| {
            apply_rule_setting(c, kind, setting, value)
        })
        .await;

    match result {
        Ok(config) => {
            ctx.say(format!("✅ {}", rule_line(kind, config.settings(kind))))
                .await?
        }
        Err(e) => ctx.say(format!("❌ {}", e)).await?,
    };
    Ok(())
}

/// Set (or clear) the role whose members a rule skips.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn ignore_role(
    ctx: Context<'_>,
    #[description = "Rule to change"] kind: RuleChoice,
    #[description = "Role to ignore (leave empty to clear)"] role: Option<serenity::Role>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;
    let kind = RuleKind::from(kind);
    let role_id = role.as_ref().map(|r| r.id.get());

    ctx.data()
        .automod
        .update_config(guild_id.get(), move |c| {
            c.settings_mut(kind).ignore_role = role_id
        })
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    match role {
        Some(role) => ctx.say(format!("✅ {} now ignores {}.", kind, role.name)).await?,
        None => ctx.say(format!("✅ {} no longer ignores a role.", kind)).await?,
    };
    Ok(())
}

/// Toggle whether a rule skips a channel.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn ignore_channel(
    ctx: Context<'_>,
    #[description = "Rule to change"] kind: RuleChoice,
    #[description = "Channel to toggle"] channel: serenity::Channel,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;
    let kind = RuleKind::from(kind);
    let channel_id = channel.id().get();

    let config = ctx
        .data()
        .automod
        .update_config(guild_id.get(), move |c| {
            toggle_channel(&mut c.settings_mut(kind).ignore_channels, channel_id);
        })
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    if config.settings(kind).ignore_channels.contains(&channel_id) {
        ctx.say(format!("✅ {} now ignores <#{}>.", kind, channel_id)).await?;
    } else {
        ctx.say(format!("✅ {} checks <#{}> again.", kind, channel_id)).await?;
    }
    Ok(())
}
