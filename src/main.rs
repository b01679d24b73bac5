use std::sync::Arc;

use anyhow::{Context as AnyhowContext, Result};
use serenity::{
    all::{
        Command as AppCommand, Context as SerenityContext, GatewayIntents, Guild, Interaction,
        Permissions, Ready, VoiceState,
    },
    async_trait,
};
use songbird::{Config as VoiceConfig, Songbird, driver::MixMode, serenity::SerenityInit};
use tracing::{debug, error, info, warn};

mod audio;
mod bridge;
mod commands;
mod database;
mod env;
mod error;
mod library;
mod metrics;
mod player;
mod settings;
mod state;
#[cfg(test)]
mod test_utils;
mod voice_manager;
mod web;

use crate::{
    database::Database,
    env::BotConfig,
    metrics::METRICS,
    player::{AudioClient, SongbirdPlayer},
    state::AppState,
};

struct Handler {
    state: AppState,
}

#[async_trait]
impl serenity::prelude::EventHandler for Handler {
    async fn ready(&self, ctx: SerenityContext, ready: Ready) {
        info!("Logged in as {}", ready.user.name);

        // Log an invite URL with minimal required voice permissions
        let perms = Permissions::CONNECT | Permissions::SPEAK;
        if let Ok(app) = ctx.http.get_current_application_info().await {
            let invite = format!(
                "https://discord.com/api/oauth2/authorize?client_id={}&permissions={}&scope=bot%20applications.commands",
                app.id,
                perms.bits()
            );
            info!(
                "Invite this bot: {} (app_id={}, user_id={})",
                invite, app.id, ready.user.id
            );
        }

        let defs = commands::definitions();
        let count = defs.len();
        let registered = match self.state.config.dev_guild {
            Some(guild) => guild.set_commands(&ctx.http, defs).await.map(|_| ()),
            None => AppCommand::set_global_commands(&ctx.http, defs).await.map(|_| ()),
        };
        match registered {
            Ok(()) => info!(count, dev_guild = ?self.state.config.dev_guild, "registered slash commands"),
            Err(e) => error!("failed to register slash commands: {e:?}"),
        }
        METRICS.set_ready(true);
    }

    async fn guild_create(&self, _ctx: SerenityContext, guild: Guild, _is_new: Option<bool>) {
        match self.state.settings.register_guild(guild.id.get()).await {
            Ok(true) => info!(guild = %guild.id, "registered guild {}", guild.name),
            Ok(false) => {}
            Err(e) => warn!(guild = %guild.id, "could not register guild: {e}"),
        }
    }

    async fn voice_state_update(&self, ctx: SerenityContext, _old: Option<VoiceState>, new: VoiceState) {
        let Some(guild) = new.guild_id else {
            return;
        };
        let audio: &dyn AudioClient = self.state.audio.as_ref();

        if new.user_id == ctx.cache.current_user().id && new.channel_id.is_none() {
            if let Err(e) = audio.disconnect(guild).await {
                debug!(guild = %guild, "cleanup after forced disconnect: {e}");
            }
            self.state.presence.forget(guild);
            info!(guild = %guild, "bot was removed from voice");
            return;
        }

        if let Some(listeners) = voice_manager::listeners_from_cache(&ctx, audio, guild).await {
            self.state.presence.update(audio, guild, listeners).await;
        }
    }

    async fn interaction_create(&self, ctx: SerenityContext, interaction: Interaction) {
        match interaction {
            Interaction::Command(cmd) => commands::dispatch(&ctx, &cmd, &self.state).await,
            Interaction::Autocomplete(cmd) => commands::autocomplete(&ctx, &cmd, &self.state).await,
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = BotConfig::from_env()?;
    let db = Database::open(&config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;
    info!("Download cache dir: {}", config.audio.download_dir.display());

    let intents = GatewayIntents::non_privileged() | GatewayIntents::GUILD_VOICE_STATES;
    // Tune Songbird to reduce chance of audio hiccups under load.
    // - preallocated_tracks: avoid runtime allocations when queueing
    // - use_softclip(false): small perf win; per-member volume is applied per track
    let voice_cfg = VoiceConfig::default()
        .preallocated_tracks(2)
        .use_softclip(false)
        .mix_mode(if config.audio.mono {
            MixMode::Mono
        } else {
            MixMode::Stereo
        });
    let songbird = Songbird::serenity_from_config(voice_cfg);

    let audio: Arc<dyn AudioClient> = Arc::new(SongbirdPlayer::new(songbird.clone(), config.audio.clone()));
    let token = config.token.clone();
    let http_bind = config.http_bind.clone();
    let download_dir = config.audio.download_dir.clone();
    let state = AppState::new(db, audio, config);

    voice_manager::spawn_idle_sweeper(state.audio.clone(), state.settings.clone());
    metrics::spawn_download_size_scanner(download_dir);
    if http_bind.is_some() {
        tokio::spawn(async move {
            if let Err(e) = web::run_http(http_bind).await {
                error!("HTTP server stopped: {e}");
            }
        });
    }

    let mut client = serenity::Client::builder(token, intents)
        .event_handler(Handler { state })
        .register_songbird_with(songbird)
        .await?;

    if let Err(why) = client.start_autosharded().await {
        error!("Client error: {why:?}");
    }
    Ok(())
}
