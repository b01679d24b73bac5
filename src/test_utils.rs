//! Shared helpers for unit tests.

use std::{collections::HashMap, sync::Mutex, time::Duration};

use serenity::{
    all::{ChannelId, GuildId},
    async_trait,
};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use crate::{
    database::{
        Database,
        types::{AutoplayMode, LoopMode},
    },
    error::AudioError,
    player::{AudioClient, LiveQueue, Playable, SearchResult, SessionSettings},
};

pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// A database file in its own temp directory.
///
/// A file rather than `:memory:` because every gateway call opens a fresh
/// connection, and in-memory stores vanish with their connection.
pub(crate) struct TestDb {
    _dir: TempDir,
    pub(crate) db: Database,
}

impl TestDb {
    pub(crate) async fn new() -> Self {
        init_test_tracing();
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("melodeck-test.db");
        let db = Database::open(&path.to_string_lossy())
            .await
            .expect("open test database");
        Self { _dir: dir, db }
    }
}

/// Scripted [`AudioClient`] that keeps its queue in memory.
#[derive(Default)]
pub(crate) struct FakeAudio {
    pub(crate) results: Mutex<HashMap<String, SearchResult>>,
    /// Queries that fail outright instead of returning a result.
    pub(crate) broken: Mutex<Vec<String>>,
    pub(crate) queue: Mutex<LiveQueue>,
    pub(crate) settings: Mutex<SessionSettings>,
    pub(crate) paused: Mutex<bool>,
    pub(crate) channel: Mutex<Option<ChannelId>>,
    pub(crate) skips: Mutex<usize>,
}

impl FakeAudio {
    pub(crate) fn song(title: &str, url: &str) -> Playable {
        Playable {
            title: title.to_string(),
            url: url.to_string(),
            artist: None,
            duration_ms: 180_000,
        }
    }

    pub(crate) fn with_result(self, query: &str, result: SearchResult) -> Self {
        self.results.lock().unwrap().insert(query.to_string(), result);
        self
    }

    /// Registers `songs` so that searching either their title or url finds them.
    pub(crate) fn knowing(self, songs: &[Playable]) -> Self {
        for s in songs {
            let mut results = self.results.lock().unwrap();
            results.insert(s.title.clone(), SearchResult::Track(s.clone()));
            results.insert(s.url.clone(), SearchResult::Track(s.clone()));
        }
        self
    }

    pub(crate) fn failing(self, query: &str) -> Self {
        self.broken.lock().unwrap().push(query.to_string());
        self
    }

    pub(crate) fn live(&self) -> LiveQueue {
        self.queue.lock().unwrap().clone()
    }

    pub(crate) fn set_live(&self, queue: LiveQueue) {
        *self.queue.lock().unwrap() = queue;
    }
}

#[async_trait]
impl AudioClient for FakeAudio {
    async fn search(&self, query: &str) -> Result<SearchResult, AudioError> {
        if self.broken.lock().unwrap().iter().any(|q| q == query) {
            return Err(AudioError::Search(format!("no route to {query}")));
        }
        Ok(self
            .results
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or(SearchResult::Empty))
    }

    async fn put(&self, _guild: GuildId, tracks: Vec<Playable>) -> Result<usize, AudioError> {
        let n = tracks.len();
        let mut q = self.queue.lock().unwrap();
        for t in tracks {
            if q.current.is_none() {
                q.current = Some(t);
            } else {
                q.upcoming.push(t);
            }
        }
        Ok(n)
    }

    async fn put_at(&self, _guild: GuildId, index: usize, track: Playable) -> Result<(), AudioError> {
        let mut q = self.queue.lock().unwrap();
        if q.current.is_none() {
            q.current = Some(track);
        } else {
            let at = index.min(q.upcoming.len());
            q.upcoming.insert(at, track);
        }
        Ok(())
    }

    async fn snapshot(&self, _guild: GuildId) -> Result<LiveQueue, AudioError> {
        Ok(self.live())
    }

    async fn play_next(&self, _guild: GuildId, volume: i32) -> Result<Option<Playable>, AudioError> {
        self.settings.lock().unwrap().volume = volume;
        *self.paused.lock().unwrap() = false;
        Ok(self.queue.lock().unwrap().current.clone())
    }

    async fn pause(&self, _guild: GuildId, paused: bool) -> Result<(), AudioError> {
        if self.live().is_empty() {
            return Err(AudioError::NothingPlaying);
        }
        *self.paused.lock().unwrap() = paused;
        Ok(())
    }

    async fn seek(&self, _guild: GuildId, _position: Duration) -> Result<(), AudioError> {
        if self.live().current.is_none() {
            return Err(AudioError::NothingPlaying);
        }
        Ok(())
    }

    async fn skip(&self, _guild: GuildId) -> Result<usize, AudioError> {
        let mut q = self.queue.lock().unwrap();
        if q.current.is_none() {
            return Err(AudioError::NothingPlaying);
        }
        *self.skips.lock().unwrap() += 1;
        q.current = if q.upcoming.is_empty() {
            None
        } else {
            Some(q.upcoming.remove(0))
        };
        Ok(q.upcoming.len() + usize::from(q.current.is_some()))
    }

    async fn stop(&self, _guild: GuildId) -> Result<(), AudioError> {
        *self.queue.lock().unwrap() = LiveQueue::default();
        Ok(())
    }

    async fn shuffle(&self, _guild: GuildId) -> Result<usize, AudioError> {
        let q = self.queue.lock().unwrap();
        Ok(q.upcoming.len())
    }

    async fn clear(&self, _guild: GuildId) -> Result<usize, AudioError> {
        let mut q = self.queue.lock().unwrap();
        let n = q.upcoming.len();
        q.upcoming.clear();
        Ok(n)
    }

    async fn set_volume(&self, _guild: GuildId, volume: i32) -> Result<(), AudioError> {
        self.settings.lock().unwrap().volume = volume;
        Ok(())
    }

    async fn set_autoplay(&self, _guild: GuildId, mode: AutoplayMode) -> Result<(), AudioError> {
        self.settings.lock().unwrap().autoplay = mode;
        Ok(())
    }

    async fn set_loop(&self, _guild: GuildId, mode: LoopMode) -> Result<(), AudioError> {
        self.settings.lock().unwrap().loop_mode = mode;
        Ok(())
    }

    async fn settings(&self, _guild: GuildId) -> SessionSettings {
        *self.settings.lock().unwrap()
    }

    async fn connect(&self, _guild: GuildId, channel: ChannelId) -> Result<(), AudioError> {
        *self.channel.lock().unwrap() = Some(channel);
        Ok(())
    }

    async fn disconnect(&self, _guild: GuildId) -> Result<(), AudioError> {
        self.channel.lock().unwrap().take().ok_or(AudioError::NotConnected)?;
        *self.queue.lock().unwrap() = LiveQueue::default();
        Ok(())
    }

    async fn is_playing(&self, _guild: GuildId) -> bool {
        self.live().current.is_some() && !*self.paused.lock().unwrap()
    }

    async fn voice_channel(&self, _guild: GuildId) -> Option<ChannelId> {
        *self.channel.lock().unwrap()
    }

    fn connected_guilds(&self) -> Vec<GuildId> {
        Vec::new()
    }
}
