//! Moves songs between stored playlists and the live voice queue.

use std::sync::Arc;

use futures_util::{StreamExt, stream};
use rand::seq::SliceRandom;
use serenity::all::{ChannelId, GuildId};
use tracing::{info, instrument, warn};

use crate::{
    database::{
        models::{Member, Track},
        types::{AutoplayMode, LoopMode},
    },
    error::{AudioError, LibraryError},
    library::Library,
    metrics::METRICS,
    player::{AudioClient, Playable, SearchResult, SessionSettings},
    settings::Settings,
};

/// Searches in flight while hydrating a playlist.
const RESOLVE_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HydrateReport {
    pub queued: usize,
    pub failed: usize,
}

/// Where a searched song lands in the live queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    End,
    /// Right behind the current track.
    Next,
    /// Right behind the current track, which is then skipped.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Queued {
    Track { track: Playable, started: bool },
    Playlist { name: String, count: usize, started: bool },
}

#[derive(Clone)]
pub struct Bridge {
    library: Library,
    settings: Settings,
    audio: Arc<dyn AudioClient>,
}

impl Bridge {
    pub fn new(library: Library, settings: Settings, audio: Arc<dyn AudioClient>) -> Self {
        Self {
            library,
            settings,
            audio,
        }
    }

    /// Replaces `name`'s tracks with the live queue, current track first.
    /// The playlist is created when it does not exist yet.
    #[instrument(skip(self))]
    pub async fn snapshot(&self, owner: u64, name: &str, guild: GuildId) -> Result<Vec<Track>, LibraryError> {
        let live = self.audio.snapshot(guild).await?;
        if live.is_empty() {
            return Err(LibraryError::Audio(AudioError::NothingPlaying));
        }
        self.library.create_or_ignore(owner, name).await?;
        let rows = self
            .library
            .replace_tracks(owner, name, live.into_ordered())
            .await?;
        info!(tracks = rows.len(), "live queue saved");
        Ok(rows)
    }

    /// Joins `channel` unless the bot already sits in a voice channel here.
    pub async fn ensure_connected(&self, guild: GuildId, channel: Option<ChannelId>) -> Result<(), LibraryError> {
        if self.audio.voice_channel(guild).await.is_some() {
            return Ok(());
        }
        let channel = channel.ok_or(AudioError::NoVoiceChannel)?;
        self.audio.connect(guild, channel).await?;
        Ok(())
    }

    /// Applies `user`'s stored settings to the session. An unreachable store
    /// plays with defaults.
    pub async fn seed_session(&self, guild: GuildId, user: u64) -> Result<SessionSettings, LibraryError> {
        let member: Member = self.settings.member_or_default(user).await;
        let seeded = SessionSettings::from(&member);
        self.audio.apply_settings(guild, seeded).await?;
        Ok(seeded)
    }

    /// Seeds the session when the queue was idle, then starts the head.
    async fn start(&self, guild: GuildId, user: u64, was_idle: bool) -> Result<bool, LibraryError> {
        let volume = if was_idle {
            self.seed_session(guild, user).await?.volume
        } else {
            self.audio.settings(guild).await.volume
        };
        let started = self.audio.play_next(guild, volume).await?;
        Ok(was_idle && started.is_some())
    }

    /// Resolves `owner`'s playlist track by track and appends it to the live
    /// queue in stored order. Songs that no longer resolve are skipped and counted.
    #[instrument(skip(self))]
    pub async fn hydrate(
        &self,
        owner: u64,
        user: u64,
        name: &str,
        guild: GuildId,
        channel: Option<ChannelId>,
        shuffled: bool,
    ) -> Result<HydrateReport, LibraryError> {
        let view = self.library.view(owner, user, name).await?;
        if view.tracks.is_empty() {
            return Err(LibraryError::invalid(format!(
                "Playlist '{}' is empty.",
                view.playlist.name
            )));
        }
        self.ensure_connected(guild, channel).await?;

        let mut tracks = view.tracks;
        if shuffled {
            tracks.shuffle(&mut rand::thread_rng());
        }
        let total = tracks.len();

        let audio = self.audio.clone();
        let resolved: Vec<Playable> = stream::iter(tracks.into_iter().map(|track| {
            let audio = audio.clone();
            async move {
                match audio.search(&track.url).await {
                    Ok(SearchResult::Track(found)) => Some(found),
                    Ok(other) => other.first(),
                    Err(e) => {
                        warn!(url = %track.url, "could not resolve stored track: {e}");
                        None
                    }
                }
            }
        }))
        .buffered(RESOLVE_CONCURRENCY)
        .filter_map(|found| async move { found })
        .collect()
        .await;

        let was_idle = self.audio.snapshot(guild).await?.is_empty();
        let queued = if resolved.is_empty() {
            0
        } else {
            self.audio.put(guild, resolved).await?
        };
        let report = HydrateReport {
            queued,
            failed: total - queued,
        };
        METRICS.add_hydrate_failures(report.failed);
        if queued > 0 {
            self.start(guild, user, was_idle).await?;
        }
        info!(queued = report.queued, failed = report.failed, "playlist hydrated");
        Ok(report)
    }

    /// Searches `query` and queues the result at `placement`.
    #[instrument(skip(self))]
    pub async fn play_query(
        &self,
        guild: GuildId,
        user: u64,
        channel: Option<ChannelId>,
        query: &str,
        placement: Placement,
    ) -> Result<Queued, LibraryError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(LibraryError::invalid("Give a song title or URL to play."));
        }
        let found = self.audio.search(query).await?;
        let (track, playlist) = match found {
            SearchResult::Empty => {
                return Err(LibraryError::not_found(format!(
                    "No tracks found for `{query}`."
                )));
            }
            SearchResult::Playlist { .. } if placement != Placement::End => {
                return Err(LibraryError::invalid(
                    "Playlists can only be added to the end of the queue.",
                ));
            }
            SearchResult::Track(track) => (Some(track), None),
            SearchResult::Playlist { name, tracks } => (None, Some((name, tracks))),
        };

        self.ensure_connected(guild, channel).await?;
        let was_idle = self.audio.snapshot(guild).await?.is_empty();

        if let Some((name, tracks)) = playlist {
            let count = self.audio.put(guild, tracks).await?;
            let started = self.start(guild, user, was_idle).await?;
            return Ok(Queued::Playlist {
                name,
                count,
                started,
            });
        }
        let Some(track) = track else {
            return Err(LibraryError::not_found("Nothing to play."));
        };

        match placement {
            Placement::End => {
                self.audio.put(guild, vec![track.clone()]).await?;
            }
            Placement::Next | Placement::Skip => {
                self.audio.put_at(guild, 0, track.clone()).await?;
            }
        }
        if placement == Placement::Skip && !was_idle {
            self.audio.skip(guild).await?;
        }
        let started = self.start(guild, user, was_idle).await?;
        Ok(Queued::Track {
            track,
            started: started || (placement == Placement::Skip && !was_idle),
        })
    }

    /// Stores `user`'s volume and applies it to a live session, if any.
    pub async fn set_volume(&self, guild: GuildId, user: u64, volume: i32) -> Result<Member, LibraryError> {
        let member = self.settings.set_volume(user, volume).await?;
        self.audio.set_volume(guild, member.volume).await?;
        Ok(member)
    }

    pub async fn set_autoplay(&self, guild: GuildId, user: u64, mode: AutoplayMode) -> Result<Member, LibraryError> {
        let member = self.settings.set_autoplay(user, mode).await?;
        self.audio.set_autoplay(guild, member.autoplay).await?;
        Ok(member)
    }

    pub async fn set_loop(&self, guild: GuildId, user: u64, mode: LoopMode) -> Result<Member, LibraryError> {
        let member = self.settings.set_loop(user, mode).await?;
        self.audio.set_loop(guild, member.loop_mode).await?;
        Ok(member)
    }
}
