// This is the entry point of the automod bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (databases, caches)
// - `discord/` = Discord-specific adapters (commands, events, actions)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands and event handlers

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::automod::{
    rules_updated_channel, AutomodService, ConfigCache, InMemoryViolationTracker,
    InvalidationListener, SharedGuildState, TopologyCache,
};
use crate::discord::automod::events as automod_events;
use crate::discord::automod::SerenityPlatform;
use crate::discord::{Data, Error};
use crate::infra::automod::{InMemoryKvStore, SqliteAutomodStore};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;

// Upper bound on how long a missed topology eviction can linger
const DEFAULT_TOPOLOGY_TTL_SECS: u64 = 300;

// How often expired violation counters are dropped
const VIOLATION_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Event handler for non-command Discord events.
/// Messages go to automod; everything else keeps the guild state in sync.
async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            automod_events::handle_message(data, new_message).await;
        }
        serenity::FullEvent::GuildCreate { guild, .. } => {
            automod_events::handle_guild_create(data, guild).await;
        }
        serenity::FullEvent::GuildUpdate { new_data, .. } => {
            automod_events::handle_guild_update(data, new_data).await;
        }
        serenity::FullEvent::GuildDelete { incomplete, .. } => {
            automod_events::handle_guild_delete(data, incomplete.id).await;
        }
        serenity::FullEvent::GuildRoleCreate { new } => {
            automod_events::handle_role_create(data, new);
        }
        serenity::FullEvent::GuildRoleUpdate { new, .. } => {
            automod_events::handle_role_update(data, new);
        }
        serenity::FullEvent::GuildRoleDelete {
            guild_id,
            removed_role_id,
            ..
        } => {
            automod_events::handle_role_delete(data, *guild_id, *removed_role_id).await;
        }
        serenity::FullEvent::ChannelCreate { channel } => {
            automod_events::handle_channel_create(data, channel).await;
        }
        serenity::FullEvent::ChannelUpdate { new, .. } => {
            automod_events::handle_channel_update(data, new).await;
        }
        serenity::FullEvent::ChannelDelete { channel, .. } => {
            automod_events::handle_channel_delete(data, channel).await;
        }
        serenity::FullEvent::ThreadCreate { thread } => {
            automod_events::handle_thread_create(data, thread).await;
        }
        serenity::FullEvent::ThreadUpdate { new, .. } => {
            automod_events::handle_thread_update(data, new).await;
        }
        serenity::FullEvent::ThreadDelete { thread, .. } => {
            automod_events::handle_thread_delete(data, thread).await;
        }
        serenity::FullEvent::ThreadListSync { thread_list_sync } => {
            automod_events::handle_thread_list_sync(data, thread_list_sync).await;
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            automod_events::handle_member_add(data, new_member).await;
        }
        serenity::FullEvent::GuildMemberUpdate { event, .. } => {
            automod_events::handle_member_update(data, event).await;
        }
        serenity::FullEvent::GuildMemberRemoval { guild_id, user, .. } => {
            automod_events::handle_member_remove(data, *guild_id, user).await;
        }

        _ => {}
    }

    Ok(())
}

/// Periodically drop violation counters nobody has triggered lately.
async fn sweep_violations(violations: Arc<InMemoryViolationTracker>) {
    let mut interval = tokio::time::interval(VIOLATION_SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        let removed = violations.sweep(chrono::Utc::now());
        if removed > 0 {
            tracing::debug!(removed, "Swept expired violation counters");
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Get Discord bot token from environment
    let token = std::env::var("DISCORD_TOKEN").expect(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    );

    // Keep runtime databases in a dedicated folder so the repo root stays tidy.
    let data_dir = std::env::var("AUTOMOD_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    std::fs::create_dir_all(&data_dir).expect("Failed to create data directory for SQLite files");
    let automod_db_path = format!("{}/automod.db", data_dir);

    let topology_ttl = std::env::var("AUTOMOD_TOPOLOGY_TTL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_TOPOLOGY_TTL_SECS);

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Create our services with their dependencies.
    // This is the "composition root" where we wire everything together.

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect(&format!("sqlite://{}?mode=rwc", automod_db_path))
        .await
        .expect("Failed to connect to automod DB");
    let config_store = SqliteAutomodStore::new(pool);
    config_store
        .migrate()
        .await
        .expect("Failed to migrate automod DB");

    let guild_state = Arc::new(SharedGuildState::new());
    let configs = Arc::new(ConfigCache::new(config_store));
    let topology = Arc::new(TopologyCache::new(
        InMemoryKvStore::with_ttl(Duration::from_secs(topology_ttl)),
        Arc::clone(&guild_state),
    ));

    // Actions go straight over HTTP so the platform exists before the client
    let http = Arc::new(serenity::Http::new(&token));
    let platform = Arc::new(SerenityPlatform::new(http));

    // Config edits announce themselves here; the listener evicts the cache
    let (rules_updated_tx, rules_updated_rx) = rules_updated_channel();

    let violations = Arc::new(InMemoryViolationTracker::new());
    tokio::spawn(sweep_violations(Arc::clone(&violations)));

    let automod = Arc::new(AutomodService::new(
        Arc::clone(&configs),
        Arc::clone(&topology),
        Arc::clone(&guild_state),
        violations,
        platform,
        rules_updated_tx,
    ));

    let invalidation = Arc::new(InvalidationListener::new(
        Arc::clone(&configs),
        Arc::clone(&topology),
    ));
    tokio::spawn(Arc::clone(&invalidation).run(rules_updated_rx));

    // Create the data structure that will be shared across all commands
    let data = Data {
        automod,
        invalidation,
        guild_state,
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================
    // Configure the poise framework with our commands and settings.

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![discord::automod::commands::automod()],
            // Event handler for messages and guild changes
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                tracing::info!("Bot is starting up...");

                // Register slash commands globally (can take up to an hour to propagate)
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                tracing::info!("Commands registered, bot is ready");
                Ok(data)
            })
        })
        .build();

    // Create the client and start the bot
    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .expect("Error creating client");

    client.start().await.expect("Error running bot");
}
