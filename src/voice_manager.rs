use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use anyhow::{Result, anyhow};
use serenity::all::{ChannelId, Context as SerenityContext, GuildId, UserId};
use songbird::Songbird;
use tracing::{debug, error, info, warn};

use crate::{player::AudioClient, settings::Settings};

const JOIN_ATTEMPTS: u32 = 5;
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// How long a connected guild may sit with nothing queued before the bot leaves.
pub const IDLE_GRACE: Duration = Duration::from_secs(5 * 60);

/// Joins `channel_id`, retrying with exponential backoff.
///
/// Returns `true` when a new call was created and `false` when an existing
/// call was reused or moved.
pub async fn join_voice_channel(manager: &Songbird, guild_id: GuildId, channel_id: ChannelId) -> Result<bool> {
    let existing = match manager.get(guild_id) {
        Some(call_lock) => call_lock.lock().await.current_channel(),
        None => None,
    };
    if existing.map(|c| c.0.get()) == Some(channel_id.get()) {
        debug!(guild = %guild_id, "already in channel {channel_id}, reusing connection");
        return Ok(false);
    }

    let mut attempts = 0;
    loop {
        info!(
            "Attempting to join voice channel {} in guild {} (attempt {}/{})",
            channel_id,
            guild_id,
            attempts + 1,
            JOIN_ATTEMPTS
        );

        match manager.join(guild_id, channel_id).await {
            Ok(_call_lock) => {
                info!("Joined voice channel after {} attempt(s)", attempts + 1);
                return Ok(existing.is_none());
            }
            Err(e) => {
                attempts += 1;
                if attempts >= JOIN_ATTEMPTS {
                    return Err(anyhow!(
                        "failed to join voice channel after {JOIN_ATTEMPTS} attempts: {e}. Check network reachability and the bot's Connect/Speak permissions."
                    ));
                }

                let delay_ms = backoff_ms(attempts);
                warn!(
                    "Voice channel join attempt {} failed: {}. Retrying in {}ms...",
                    attempts, e, delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// 1s, 2s, 4s, then capped at 5s.
fn backoff_ms(attempt: u32) -> u64 {
    std::cmp::min(5000, 1000 * 2_u64.pow(attempt.saturating_sub(1)))
}

/// Humans (non-bots) currently in `channel`.
pub fn listeners<I>(states: I, channel: ChannelId) -> usize
where
    I: IntoIterator<Item = (Option<ChannelId>, bool)>,
{
    states
        .into_iter()
        .filter(|(c, is_bot)| *c == Some(channel) && !is_bot)
        .count()
}

/// Pauses playback while the bot's channel is empty and resumes it when
/// someone comes back. Only playback paused here is resumed here.
#[derive(Debug, Default, Clone)]
pub struct Presence {
    auto_paused: Arc<Mutex<HashSet<GuildId>>>,
}

impl Presence {
    fn paused(&self) -> std::sync::MutexGuard<'_, HashSet<GuildId>> {
        self.auto_paused.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Reacts to a changed listener count in the bot's channel.
    pub async fn update(&self, audio: &dyn AudioClient, guild: GuildId, listeners: usize) {
        if listeners == 0 {
            if audio.is_playing(guild).await && audio.pause(guild, true).await.is_ok() {
                info!(guild = %guild, "everyone left, pausing");
                self.paused().insert(guild);
            }
            return;
        }
        let was_auto_paused = self.paused().remove(&guild);
        if was_auto_paused {
            match audio.pause(guild, false).await {
                Ok(()) => info!(guild = %guild, "listener back, resuming"),
                Err(e) => debug!(guild = %guild, "nothing to resume: {e}"),
            }
        }
    }

    pub fn forget(&self, guild: GuildId) {
        self.paused().remove(&guild);
    }
}

/// Counts the humans sharing the bot's voice channel, from the gateway cache.
pub async fn listeners_from_cache(ctx: &SerenityContext, audio: &dyn AudioClient, guild: GuildId) -> Option<usize> {
    let channel = audio.voice_channel(guild).await?;
    let bot: UserId = ctx.cache.current_user().id;
    let g = ctx.cache.guild(guild)?;
    let states = g.voice_states.values().filter(|vs| vs.user_id != bot).map(|vs| {
        let is_bot = vs
            .member
            .as_ref()
            .map(|m| m.user.bot)
            .or_else(|| g.members.get(&vs.user_id).map(|m| m.user.bot))
            .unwrap_or(false);
        (vs.channel_id, is_bot)
    });
    Some(listeners(states, channel))
}

/// One pass of the idle sweeper. Returns the guilds that were left.
///
/// `idle` carries the first time each guild was seen idle across passes.
pub async fn sweep(
    audio: &dyn AudioClient,
    guilds: &[GuildId],
    always_online: &HashSet<u64>,
    idle: &mut HashMap<GuildId, Instant>,
    now: Instant,
) -> Vec<GuildId> {
    idle.retain(|g, _| guilds.contains(g));
    let mut left = Vec::new();
    for &guild in guilds {
        if always_online.contains(&guild.get()) {
            idle.remove(&guild);
            continue;
        }
        let busy = audio.is_playing(guild).await
            || audio.snapshot(guild).await.map(|q| !q.is_empty()).unwrap_or(false);
        if busy {
            idle.remove(&guild);
            continue;
        }
        let since = *idle.entry(guild).or_insert(now);
        if now.duration_since(since) >= IDLE_GRACE {
            match audio.disconnect(guild).await {
                Ok(()) => info!(guild = %guild, "left voice after being idle"),
                Err(e) => debug!(guild = %guild, "idle disconnect: {e}"),
            }
            idle.remove(&guild);
            left.push(guild);
        }
    }
    left
}

/// Periodically leaves idle voice calls, except in always-online guilds.
pub fn spawn_idle_sweeper(audio: Arc<dyn AudioClient>, settings: Settings) {
    tokio::spawn(async move {
        let mut idle = HashMap::new();
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let always_online: HashSet<u64> = match settings.always_online_guilds().await {
                Ok(ids) => ids.into_iter().collect(),
                Err(e) => {
                    error!("Failed to read always-online guilds: {}", e);
                    continue;
                }
            };
            let guilds = audio.connected_guilds();
            sweep(audio.as_ref(), &guilds, &always_online, &mut idle, Instant::now()).await;
        }
    });
}
