//! The audio client seam.
//!
//! [`AudioClient`] is everything the playlist and playback code needs from the
//! voice side. [`SongbirdPlayer`] implements it on top of songbird's builtin
//! queue with yt-dlp for lookup and download.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use futures_util::{StreamExt, stream};
use rand::seq::SliceRandom;
use serenity::{
    all::{ChannelId, GuildId},
    async_trait,
};
use songbird::{
    Event, EventContext, Songbird, TrackEvent,
    driver::Bitrate,
    input::Input,
    tracks::{PlayMode, TrackHandle},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    audio,
    database::{
        models::{Member, member::MAX_VOLUME},
        types::{AutoplayMode, LoopMode},
    },
    env::AudioConfig,
    error::AudioError,
    metrics::METRICS,
    voice_manager,
};

/// A resolved, playable song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playable {
    pub title: String,
    pub url: String,
    pub artist: Option<String>,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchResult {
    Track(Playable),
    Playlist { name: String, tracks: Vec<Playable> },
    Empty,
}

impl SearchResult {
    pub fn first(self) -> Option<Playable> {
        match self {
            Self::Track(t) => Some(t),
            Self::Playlist { tracks, .. } => tracks.into_iter().next(),
            Self::Empty => None,
        }
    }

    pub fn into_tracks(self) -> Vec<Playable> {
        match self {
            Self::Track(t) => vec![t],
            Self::Playlist { tracks, .. } => tracks,
            Self::Empty => Vec::new(),
        }
    }
}

/// The current track plus everything waiting behind it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveQueue {
    pub current: Option<Playable>,
    pub upcoming: Vec<Playable>,
}

impl LiveQueue {
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.upcoming.is_empty()
    }

    /// Play order: current first, then the queue.
    pub fn into_ordered(self) -> Vec<Playable> {
        self.current.into_iter().chain(self.upcoming).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub volume: i32,
    pub autoplay: AutoplayMode,
    pub loop_mode: LoopMode,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Member::with_defaults(0))
    }
}

impl From<&Member> for SessionSettings {
    fn from(m: &Member) -> Self {
        Self {
            volume: m.volume,
            autoplay: m.autoplay,
            loop_mode: m.loop_mode,
        }
    }
}

/// Member volume is a percentage; songbird wants a gain where 1.0 is unity.
pub fn track_volume(volume: i32) -> f32 {
    volume.clamp(0, MAX_VOLUME) as f32 / 100.0
}

#[async_trait]
pub trait AudioClient: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchResult, AudioError>;

    /// Appends in order; returns how many made it into the queue.
    async fn put(&self, guild: GuildId, tracks: Vec<Playable>) -> Result<usize, AudioError>;

    /// Inserts behind the current track; `index` 0 means "next up".
    async fn put_at(&self, guild: GuildId, index: usize, track: Playable) -> Result<(), AudioError>;

    async fn snapshot(&self, guild: GuildId) -> Result<LiveQueue, AudioError>;

    /// Starts the head of the queue at `volume` if nothing is audible yet.
    async fn play_next(&self, guild: GuildId, volume: i32) -> Result<Option<Playable>, AudioError>;

    async fn pause(&self, guild: GuildId, paused: bool) -> Result<(), AudioError>;
    async fn seek(&self, guild: GuildId, position: Duration) -> Result<(), AudioError>;
    /// Returns the number of tracks left after the skipped one.
    async fn skip(&self, guild: GuildId) -> Result<usize, AudioError>;
    async fn stop(&self, guild: GuildId) -> Result<(), AudioError>;
    async fn shuffle(&self, guild: GuildId) -> Result<usize, AudioError>;
    async fn clear(&self, guild: GuildId) -> Result<usize, AudioError>;

    async fn set_volume(&self, guild: GuildId, volume: i32) -> Result<(), AudioError>;
    async fn set_autoplay(&self, guild: GuildId, mode: AutoplayMode) -> Result<(), AudioError>;
    async fn set_loop(&self, guild: GuildId, mode: LoopMode) -> Result<(), AudioError>;
    async fn settings(&self, guild: GuildId) -> SessionSettings;

    async fn apply_settings(&self, guild: GuildId, settings: SessionSettings) -> Result<(), AudioError> {
        self.set_volume(guild, settings.volume).await?;
        self.set_autoplay(guild, settings.autoplay).await?;
        self.set_loop(guild, settings.loop_mode).await
    }

    async fn connect(&self, guild: GuildId, channel: ChannelId) -> Result<(), AudioError>;
    async fn disconnect(&self, guild: GuildId) -> Result<(), AudioError>;
    async fn is_playing(&self, guild: GuildId) -> bool;
    async fn voice_channel(&self, guild: GuildId) -> Option<ChannelId>;
    fn connected_guilds(&self) -> Vec<GuildId>;
}

#[derive(Debug, Default)]
struct Session {
    /// Metadata for every track songbird holds for this guild, by track uuid.
    tracks: HashMap<Uuid, Playable>,
    settings: SessionSettings,
}

/// songbird-backed [`AudioClient`].
#[derive(Clone)]
pub struct SongbirdPlayer {
    songbird: Arc<Songbird>,
    config: Arc<AudioConfig>,
    sessions: Arc<Mutex<HashMap<GuildId, Session>>>,
}

impl SongbirdPlayer {
    pub fn new(songbird: Arc<Songbird>, config: AudioConfig) -> Self {
        Self {
            songbird,
            config: Arc::new(config),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<GuildId, Session>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_session<R>(&self, guild: GuildId, f: impl FnOnce(&mut Session) -> R) -> R {
        f(self.sessions().entry(guild).or_default())
    }

    fn call(&self, guild: GuildId) -> Result<Arc<serenity::prelude::Mutex<songbird::Call>>, AudioError> {
        self.songbird.get(guild).ok_or(AudioError::NotConnected)
    }

    async fn handles(&self, guild: GuildId) -> Result<Vec<TrackHandle>, AudioError> {
        let call_lock = self.call(guild)?;
        let call = call_lock.lock().await;
        Ok(call.queue().current_queue())
    }

    async fn enqueue(&self, guild: GuildId, track: Playable, path: PathBuf) -> Result<TrackHandle, AudioError> {
        let call_lock = self.call(guild)?;
        let settings = self.with_session(guild, |s| s.settings);
        let source: Input = songbird::input::File::new(path).into();

        let mut call = call_lock.lock().await;
        call.set_bitrate(Bitrate::BitsPerSecond(self.config.bitrate as i32));
        let handle = call.enqueue_input(source).await;
        drop(call);

        let _ = handle.set_volume(track_volume(settings.volume));
        if settings.loop_mode == LoopMode::Single {
            let _ = handle.enable_loop();
        }
        debug!(guild = %guild, title = %track.title, "enqueued");
        self.with_session(guild, |s| s.tracks.insert(handle.uuid(), track));
        let _ = handle.add_event(
            Event::Track(TrackEvent::End),
            TrackEndNotifier {
                guild,
                player: self.clone(),
            },
        );
        METRICS.inc_queue(1);
        Ok(handle)
    }

    /// Drops metadata for `uuids`, so their end events do not loop them.
    fn forget(&self, guild: GuildId, uuids: impl IntoIterator<Item = Uuid>) -> usize {
        let removed = self.with_session(guild, |s| {
            uuids
                .into_iter()
                .filter(|u| s.tracks.remove(u).is_some())
                .count()
        });
        METRICS.dec_queue(removed);
        removed
    }
}

#[async_trait]
impl AudioClient for SongbirdPlayer {
    async fn search(&self, query: &str) -> Result<SearchResult, AudioError> {
        audio::probe(query)
            .await
            .map_err(|e| AudioError::Search(e.to_string()))
    }

    async fn put(&self, guild: GuildId, tracks: Vec<Playable>) -> Result<usize, AudioError> {
        self.call(guild)?;
        let wanted = tracks.len();
        let base = self.config.download_dir.clone();
        // Downloads overlap, enqueueing stays in input order.
        let mut downloads = stream::iter(tracks.into_iter().map(|track| {
            let base = base.clone();
            async move {
                let path = audio::download_mp3(&base, &track.url).await;
                (track, path)
            }
        }))
        .buffered(3);

        let mut queued = 0;
        let mut last_error = None;
        while let Some((track, path)) = downloads.next().await {
            match path {
                Ok(path) => {
                    self.enqueue(guild, track, path).await?;
                    queued += 1;
                }
                Err(e) => {
                    warn!(url = %track.url, "download failed: {e:#}");
                    last_error = Some(e.to_string());
                }
            }
        }
        match last_error {
            Some(e) if queued == 0 && wanted > 0 => Err(AudioError::Download(e)),
            _ => Ok(queued),
        }
    }

    async fn put_at(&self, guild: GuildId, index: usize, track: Playable) -> Result<(), AudioError> {
        self.call(guild)?;
        let path = audio::download_mp3(&self.config.download_dir, &track.url)
            .await
            .map_err(|e| AudioError::Download(e.to_string()))?;
        let handle = self.enqueue(guild, track, path).await?;
        let uuid = handle.uuid();
        let call_lock = self.call(guild)?;
        let call = call_lock.lock().await;
        call.queue().modify_queue(|q| {
            if let Some(item) = q
                .iter()
                .position(|t| t.handle().uuid() == uuid)
                .and_then(|pos| q.remove(pos))
            {
                let target = (index + 1).min(q.len());
                q.insert(target, item);
            }
        });
        Ok(())
    }

    async fn snapshot(&self, guild: GuildId) -> Result<LiveQueue, AudioError> {
        let handles = self.handles(guild).await?;
        Ok(self.with_session(guild, |s| {
            let mut metas = handles.iter().map(|h| s.tracks.get(&h.uuid()).cloned());
            let current = metas.next().flatten();
            LiveQueue {
                current,
                upcoming: metas.flatten().collect(),
            }
        }))
    }

    async fn play_next(&self, guild: GuildId, volume: i32) -> Result<Option<Playable>, AudioError> {
        let call_lock = self.call(guild)?;
        let call = call_lock.lock().await;
        let queue = call.queue();
        let Some(current) = queue.current() else {
            return Ok(None);
        };
        current.set_volume(track_volume(volume))?;
        queue.resume()?;
        drop(call);
        Ok(self.with_session(guild, |s| s.tracks.get(&current.uuid()).cloned()))
    }

    async fn pause(&self, guild: GuildId, paused: bool) -> Result<(), AudioError> {
        let call_lock = self.call(guild)?;
        let call = call_lock.lock().await;
        let queue = call.queue();
        if queue.is_empty() {
            return Err(AudioError::NothingPlaying);
        }
        if paused {
            queue.pause()?;
        } else {
            queue.resume()?;
        }
        Ok(())
    }

    async fn seek(&self, guild: GuildId, position: Duration) -> Result<(), AudioError> {
        let current = {
            let call_lock = self.call(guild)?;
            let call = call_lock.lock().await;
            call.queue().current().ok_or(AudioError::NothingPlaying)?
        };
        current.seek_async(position).await?;
        Ok(())
    }

    async fn skip(&self, guild: GuildId) -> Result<usize, AudioError> {
        let call_lock = self.call(guild)?;
        let call = call_lock.lock().await;
        let queue = call.queue();
        if queue.is_empty() {
            return Err(AudioError::NothingPlaying);
        }
        let remaining = queue.len().saturating_sub(1);
        queue.skip()?;
        Ok(remaining)
    }

    async fn stop(&self, guild: GuildId) -> Result<(), AudioError> {
        let handles = self.handles(guild).await?;
        self.forget(guild, handles.iter().map(|h| h.uuid()));
        let call_lock = self.call(guild)?;
        let call = call_lock.lock().await;
        call.queue().stop();
        Ok(())
    }

    async fn shuffle(&self, guild: GuildId) -> Result<usize, AudioError> {
        let call_lock = self.call(guild)?;
        let call = call_lock.lock().await;
        Ok(call.queue().modify_queue(|q| {
            if q.len() > 2 {
                q.make_contiguous()[1..].shuffle(&mut rand::thread_rng());
            }
            q.len().saturating_sub(1)
        }))
    }

    async fn clear(&self, guild: GuildId) -> Result<usize, AudioError> {
        let call_lock = self.call(guild)?;
        let call = call_lock.lock().await;
        let dropped: Vec<TrackHandle> = call.queue().modify_queue(|q| {
            if q.len() > 1 {
                q.drain(1..).map(|t| t.handle()).collect()
            } else {
                Vec::new()
            }
        });
        drop(call);
        self.forget(guild, dropped.iter().map(|h| h.uuid()));
        for handle in &dropped {
            let _ = handle.stop();
        }
        Ok(dropped.len())
    }

    async fn set_volume(&self, guild: GuildId, volume: i32) -> Result<(), AudioError> {
        self.with_session(guild, |s| s.settings.volume = volume);
        if let Ok(handles) = self.handles(guild).await {
            for h in handles {
                let _ = h.set_volume(track_volume(volume));
            }
        }
        Ok(())
    }

    async fn set_autoplay(&self, guild: GuildId, mode: AutoplayMode) -> Result<(), AudioError> {
        // No recommendation source behind songbird; the mode is kept for the session only.
        self.with_session(guild, |s| s.settings.autoplay = mode);
        Ok(())
    }

    async fn set_loop(&self, guild: GuildId, mode: LoopMode) -> Result<(), AudioError> {
        self.with_session(guild, |s| s.settings.loop_mode = mode);
        if let Ok(handles) = self.handles(guild).await {
            for h in handles {
                let _ = if mode == LoopMode::Single {
                    h.enable_loop()
                } else {
                    h.disable_loop()
                };
            }
        }
        Ok(())
    }

    async fn settings(&self, guild: GuildId) -> SessionSettings {
        self.with_session(guild, |s| s.settings)
    }

    async fn connect(&self, guild: GuildId, channel: ChannelId) -> Result<(), AudioError> {
        let joined = voice_manager::join_voice_channel(&self.songbird, guild, channel)
            .await
            .map_err(|e| AudioError::Join(e.to_string()))?;
        if joined {
            METRICS.inc_connections();
        }
        self.with_session(guild, |_| ());
        Ok(())
    }

    async fn disconnect(&self, guild: GuildId) -> Result<(), AudioError> {
        if self.songbird.get(guild).is_none() {
            self.sessions().remove(&guild);
            return Err(AudioError::NotConnected);
        }
        let _ = self.stop(guild).await;
        self.songbird
            .remove(guild)
            .await
            .map_err(|e| AudioError::Join(e.to_string()))?;
        self.sessions().remove(&guild);
        METRICS.dec_connections();
        info!(guild = %guild, "left voice");
        Ok(())
    }

    async fn is_playing(&self, guild: GuildId) -> bool {
        let Ok(call_lock) = self.call(guild) else {
            return false;
        };
        let current = call_lock.lock().await.queue().current();
        match current {
            Some(h) => matches!(h.get_info().await, Ok(state) if state.playing == PlayMode::Play),
            None => false,
        }
    }

    async fn voice_channel(&self, guild: GuildId) -> Option<ChannelId> {
        let call_lock = self.songbird.get(guild)?;
        let channel = call_lock.lock().await.current_channel()?;
        Some(ChannelId::new(channel.0.get()))
    }

    fn connected_guilds(&self) -> Vec<GuildId> {
        let known: Vec<GuildId> = self.sessions().keys().copied().collect();
        known
            .into_iter()
            .filter(|g| self.songbird.get(*g).is_some())
            .collect()
    }
}

/// Clears a finished track's metadata and requeues it under loop-all.
struct TrackEndNotifier {
    guild: GuildId,
    player: SongbirdPlayer,
}

#[async_trait]
impl songbird::EventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let EventContext::Track(ended) = ctx else {
            return None;
        };
        for (_, handle) in ended.iter() {
            let uuid = handle.uuid();
            let (finished, loop_mode) = self.player.with_session(self.guild, |s| {
                (s.tracks.remove(&uuid), s.settings.loop_mode)
            });
            let Some(finished) = finished else {
                continue;
            };
            METRICS.dec_queue(1);
            if loop_mode == LoopMode::All {
                let player = self.player.clone();
                let guild = self.guild;
                tokio::spawn(async move {
                    if let Err(e) = player.put(guild, vec![finished]).await {
                        warn!(guild = %guild, "loop requeue failed: {e}");
                    }
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(title: &str) -> Playable {
        Playable {
            title: title.into(),
            url: format!("https://x/{title}"),
            artist: None,
            duration_ms: 0,
        }
    }

    fn player() -> SongbirdPlayer {
        SongbirdPlayer::new(
            Songbird::serenity(),
            AudioConfig {
                bitrate: 96_000,
                mono: false,
                download_dir: std::env::temp_dir(),
            },
        )
    }

    #[tokio::test]
    async fn settings_alone_do_not_make_a_guild_connected() {
        let player = player();
        let g = GuildId::new(7);
        player.set_volume(g, 80).await.unwrap();
        player.set_loop(g, LoopMode::All).await.unwrap();
        assert_eq!(player.settings(g).await.volume, 80);
        assert!(player.connected_guilds().is_empty());

        assert!(matches!(player.disconnect(g).await, Err(AudioError::NotConnected)));
        assert!(player.sessions().is_empty());
    }

    #[test]
    fn volume_maps_percent_to_gain() {
        assert_eq!(track_volume(100), 1.0);
        assert_eq!(track_volume(30), 0.3);
        assert_eq!(track_volume(-5), 0.0);
        assert_eq!(track_volume(5000), 10.0);
    }

    #[test]
    fn default_session_settings_match_new_members() {
        let s = SessionSettings::default();
        assert_eq!(s.volume, 30);
        assert_eq!(s.autoplay, AutoplayMode::Partial);
        assert_eq!(s.loop_mode, LoopMode::Normal);
    }

    #[test]
    fn live_queue_orders_current_first() {
        let q = LiveQueue {
            current: Some(song("a")),
            upcoming: vec![song("b"), song("c")],
        };
        let titles: Vec<String> = q.into_ordered().into_iter().map(|p| p.title).collect();
        assert_eq!(titles, ["a", "b", "c"]);
        assert!(LiveQueue::default().is_empty());
    }

    #[test]
    fn search_results_flatten() {
        let pl = SearchResult::Playlist {
            name: "p".into(),
            tracks: vec![song("a"), song("b")],
        };
        assert_eq!(pl.clone().first(), Some(song("a")));
        assert_eq!(pl.into_tracks().len(), 2);
        assert!(SearchResult::Empty.into_tracks().is_empty());
    }
}
