//! Playlist and track lifecycle: ownership, unique names, dense positions,
//! export and import.

use std::sync::Arc;

use diesel::SqliteConnection;
use tracing::{info, instrument};

use crate::{
    database::{
        Database, DbError,
        models::{NewPlaylist, NewTrack, Playlist, PlaylistUpdate, Track},
    },
    error::LibraryError,
    metrics::METRICS,
    player::{AudioClient, Playable, SearchResult},
    settings::sql_id,
};

pub mod ordering;
pub mod transfer;

pub use ordering::MoveMode;
pub use transfer::Delivery;

const MAX_NAME_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 500;
const AUTOCOMPLETE_LIMIT: usize = 25;

/// A playlist with its tracks in position order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistView {
    pub playlist: Playlist,
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistSummary {
    pub playlist: Playlist,
    pub track_count: i64,
}

impl From<&Playable> for NewTrack {
    fn from(p: &Playable) -> Self {
        Self {
            title: p.title.clone(),
            url: p.url.clone(),
            artist: p.artist.clone(),
            duration: p.duration_ms,
        }
    }
}

impl From<&Track> for Playable {
    fn from(t: &Track) -> Self {
        Self {
            title: t.title.clone(),
            url: t.url.clone(),
            artist: t.artist.clone(),
            duration_ms: t.duration,
        }
    }
}

fn clean_name(name: &str) -> Result<String, LibraryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LibraryError::invalid("Playlist name cannot be empty."));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(LibraryError::invalid(format!(
            "Playlist name cannot be longer than {MAX_NAME_LEN} characters."
        )));
    }
    Ok(name.to_string())
}

/// Blank descriptions are stored as none.
fn clean_description(description: Option<String>) -> Result<Option<String>, LibraryError> {
    let Some(description) = description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(LibraryError::invalid(format!(
            "Description cannot be longer than {MAX_DESCRIPTION_LEN} characters."
        )));
    }
    Ok(Some(description))
}

fn name_taken(name: &str) -> LibraryError {
    LibraryError::UniquenessViolation(format!("You already have a playlist named '{name}'."))
}

fn missing(name: &str) -> LibraryError {
    LibraryError::not_found(format!("Playlist '{name}' not found."))
}

/// Turns a unique-index failure on insert into the domain error.
fn insert_error(e: DbError, name: &str) -> LibraryError {
    if e.is_unique_violation() {
        name_taken(name)
    } else {
        e.into()
    }
}

/// Looks up one of `owner`'s playlists for a mutation.
fn owned(conn: &mut SqliteConnection, owner: i64, name: &str) -> Result<Playlist, LibraryError> {
    let playlist = Playlist::get_by_name_owner(conn, owner, name.trim())?.ok_or_else(|| missing(name))?;
    if playlist.owner_id != owner {
        return Err(LibraryError::OwnershipViolation(
            "Only the owner can change this playlist.".to_string(),
        ));
    }
    if playlist.locked {
        return Err(LibraryError::invalid(format!(
            "Playlist '{}' is locked.",
            playlist.name
        )));
    }
    Ok(playlist)
}

/// Looks up `owner`'s playlist on behalf of `viewer`, honouring visibility.
fn visible(
    conn: &mut SqliteConnection,
    owner: i64,
    viewer: i64,
    name: &str,
) -> Result<Playlist, LibraryError> {
    let playlist = Playlist::get_by_name_owner(conn, owner, name.trim())?.ok_or_else(|| missing(name))?;
    if owner != viewer && !playlist.public {
        return Err(LibraryError::OwnershipViolation(format!(
            "Playlist '{}' is private.",
            playlist.name
        )));
    }
    Ok(playlist)
}

fn one_based(index: i64, len: usize) -> Result<usize, LibraryError> {
    if index < 1 || index as u64 > len as u64 {
        return Err(LibraryError::invalid(if len == 0 {
            "The playlist is empty.".to_string()
        } else {
            format!("Index must be between 1 and {len}.")
        }));
    }
    Ok(index as usize - 1)
}

/// Replaces every track of `playlist_id` with `songs` at positions `0..n`.
fn rewrite_tracks(
    conn: &mut SqliteConnection,
    playlist_id: crate::database::types::RecordId,
    songs: Vec<NewTrack>,
) -> Result<Vec<Track>, LibraryError> {
    Track::delete_by_playlist(conn, playlist_id)?;
    let rows: Vec<Track> = songs
        .into_iter()
        .enumerate()
        .map(|(i, song)| song.into_row(playlist_id, i as i32))
        .collect();
    Track::insert_all(conn, &rows)?;
    Playlist::touch(conn, playlist_id)?;
    Ok(rows)
}

/// Playlist operations for one bot instance.
#[derive(Clone)]
pub struct Library {
    db: Database,
    audio: Arc<dyn AudioClient>,
}

impl Library {
    pub fn new(db: Database, audio: Arc<dyn AudioClient>) -> Self {
        Self { db, audio }
    }

    #[instrument(skip(self, description))]
    pub async fn create(
        &self,
        owner: u64,
        name: &str,
        description: Option<String>,
        public: bool,
    ) -> Result<Playlist, LibraryError> {
        let name = clean_name(name)?;
        let new = NewPlaylist::new(sql_id(owner), name.clone())
            .description(clean_description(description)?)
            .public(public);
        let playlist = self
            .db
            .transaction(move |conn| {
                if Playlist::name_exists(conn, new.owner_id, &new.name)? {
                    return Err(name_taken(&new.name));
                }
                Playlist::create(conn, new).map_err(|e| insert_error(e, &name))
            })
            .await?;
        METRICS.inc_playlist_writes();
        info!(playlist = %playlist.playlist_id, "playlist created");
        Ok(playlist)
    }

    /// Creates the playlist, or hands back the existing one untouched.
    pub async fn create_or_ignore(&self, owner: u64, name: &str) -> Result<(Playlist, bool), LibraryError> {
        let new = NewPlaylist::new(sql_id(owner), clean_name(name)?);
        self.db
            .transaction(move |conn| Playlist::create_or_ignore(conn, new).map_err(LibraryError::from))
            .await
    }

    #[instrument(skip(self))]
    pub async fn rename(&self, owner: u64, name: &str, new_name: &str) -> Result<Playlist, LibraryError> {
        let current = name.trim().to_string();
        let new_name = clean_name(new_name)?;
        if current == new_name {
            return Err(LibraryError::invalid(
                "The new name is the same as the current one.",
            ));
        }
        let owner = sql_id(owner);
        self.db
            .transaction(move |conn| {
                let playlist = owned(conn, owner, &current)?;
                if Playlist::name_exists(conn, owner, &new_name)? {
                    return Err(name_taken(&new_name));
                }
                Playlist::update(
                    conn,
                    playlist.playlist_id,
                    PlaylistUpdate {
                        name: Some(new_name.clone()),
                        ..Default::default()
                    },
                )
                .map_err(|e| insert_error(e, &new_name))?;
                Playlist::get(conn, playlist.playlist_id)?.ok_or_else(|| missing(&new_name))
            })
            .await
    }

    /// Changes description and visibility. `description: Some(None)` clears it.
    pub async fn update_details(
        &self,
        owner: u64,
        name: &str,
        description: Option<Option<String>>,
        public: Option<bool>,
    ) -> Result<Playlist, LibraryError> {
        if description.is_none() && public.is_none() {
            return Err(LibraryError::invalid("Nothing to change."));
        }
        let description = description.map(clean_description).transpose()?;
        let name = name.trim().to_string();
        let owner = sql_id(owner);
        self.db
            .transaction(move |conn| {
                let playlist = owned(conn, owner, &name)?;
                Playlist::update(
                    conn,
                    playlist.playlist_id,
                    PlaylistUpdate {
                        description,
                        public,
                        ..Default::default()
                    },
                )?;
                Playlist::get(conn, playlist.playlist_id)?.ok_or_else(|| missing(&name))
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, owner: u64, name: &str) -> Result<Playlist, LibraryError> {
        let name = name.trim().to_string();
        let owner = sql_id(owner);
        let deleted = self
            .db
            .transaction(move |conn| {
                let playlist = owned(conn, owner, &name)?;
                Track::delete_by_playlist(conn, playlist.playlist_id)?;
                Playlist::delete(conn, playlist.playlist_id)?;
                Ok::<_, LibraryError>(playlist)
            })
            .await?;
        METRICS.inc_playlist_writes();
        info!(playlist = %deleted.playlist_id, "playlist deleted");
        Ok(deleted)
    }

    /// `owner`'s playlists as `viewer` may see them: everything for the owner,
    /// public ones for anyone else.
    pub async fn list(&self, owner: u64, viewer: u64) -> Result<Vec<PlaylistSummary>, LibraryError> {
        let (owner, viewer) = (sql_id(owner), sql_id(viewer));
        self.db
            .run(move |conn| {
                let mut out = Vec::new();
                for playlist in Playlist::list_by_owner(conn, owner)? {
                    if owner != viewer && !playlist.public {
                        continue;
                    }
                    let track_count = Track::count_by_playlist(conn, playlist.playlist_id)?;
                    out.push(PlaylistSummary {
                        playlist,
                        track_count,
                    });
                }
                Ok::<_, LibraryError>(out)
            })
            .await
    }

    pub async fn view(&self, owner: u64, viewer: u64, name: &str) -> Result<PlaylistView, LibraryError> {
        let (owner, viewer) = (sql_id(owner), sql_id(viewer));
        let name = name.to_string();
        self.db
            .run(move |conn| {
                let playlist = visible(conn, owner, viewer, &name)?;
                let tracks = Track::list_by_playlist(conn, playlist.playlist_id)?;
                Ok::<_, LibraryError>(PlaylistView { playlist, tracks })
            })
            .await
    }

    /// Resolves `query` (a URL or a title) and appends the result. A playlist
    /// result appends every entry in order.
    #[instrument(skip(self))]
    pub async fn add_track(&self, owner: u64, name: &str, query: &str) -> Result<Vec<Track>, LibraryError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(LibraryError::invalid("Give a song title or URL to add."));
        }
        // Fail fast on a bad playlist before paying for a search.
        let owner_id = sql_id(owner);
        let lookup = name.trim().to_string();
        self.db
            .run(move |conn| owned(conn, owner_id, &lookup).map(|_| ()))
            .await?;

        let songs = match self.audio.search(query).await? {
            SearchResult::Empty => {
                return Err(LibraryError::not_found(format!(
                    "No tracks found for `{query}`."
                )));
            }
            found => found.into_tracks(),
        };
        self.add_playables(owner, name, songs).await
    }

    /// Appends already resolved songs after the last position.
    pub async fn add_playables(
        &self,
        owner: u64,
        name: &str,
        songs: Vec<Playable>,
    ) -> Result<Vec<Track>, LibraryError> {
        let name = name.trim().to_string();
        let owner = sql_id(owner);
        let added = self
            .db
            .transaction(move |conn| {
                let playlist = owned(conn, owner, &name)?;
                let mut added = Vec::with_capacity(songs.len());
                for song in &songs {
                    added.push(Track::create(conn, playlist.playlist_id, song.into())?);
                }
                Playlist::touch(conn, playlist.playlist_id)?;
                Ok::<_, LibraryError>(added)
            })
            .await?;
        METRICS.inc_playlist_writes();
        Ok(added)
    }

    /// Removes the track at 1-based `index` and closes the gap.
    #[instrument(skip(self))]
    pub async fn remove_track(&self, owner: u64, name: &str, index: i64) -> Result<Track, LibraryError> {
        let name = name.trim().to_string();
        let owner = sql_id(owner);
        let removed = self
            .db
            .transaction(move |conn| {
                let playlist = owned(conn, owner, &name)?;
                let tracks = Track::list_by_playlist(conn, playlist.playlist_id)?;
                let at = one_based(index, tracks.len())?;
                let target = tracks[at].clone();
                Track::close_gap_after(conn, playlist.playlist_id, target.position)?;
                Track::delete(conn, target.track_id)?;
                Playlist::touch(conn, playlist.playlist_id)?;
                Ok::<_, LibraryError>(target)
            })
            .await?;
        METRICS.inc_playlist_writes();
        Ok(removed)
    }

    /// Moves the track at 1-based `from` before or after the track at `to`.
    /// Only rows whose position changes are written.
    #[instrument(skip(self))]
    pub async fn move_track(
        &self,
        owner: u64,
        name: &str,
        from: i64,
        to: i64,
        mode: MoveMode,
    ) -> Result<Vec<Track>, LibraryError> {
        let name = name.trim().to_string();
        let owner = sql_id(owner);
        let moved = self
            .db
            .transaction(move |conn| {
                let playlist = owned(conn, owner, &name)?;
                let mut tracks = Track::list_by_playlist(conn, playlist.playlist_id)?;
                let from = one_based(from, tracks.len())?;
                let to = one_based(to, tracks.len())?;
                if from == to {
                    return Ok::<_, LibraryError>(tracks);
                }
                ordering::reorder(&mut tracks, from, to, mode);
                for (i, track) in tracks.iter_mut().enumerate() {
                    let position = i as i32;
                    if track.position != position {
                        Track::set_position(conn, track.track_id, position)?;
                        track.position = position;
                    }
                }
                Playlist::touch(conn, playlist.playlist_id)?;
                Ok(tracks)
            })
            .await?;
        METRICS.inc_playlist_writes();
        Ok(moved)
    }

    pub async fn clear(&self, owner: u64, name: &str) -> Result<usize, LibraryError> {
        let name = name.trim().to_string();
        let owner = sql_id(owner);
        let cleared = self
            .db
            .transaction(move |conn| {
                let playlist = owned(conn, owner, &name)?;
                let n = Track::delete_by_playlist(conn, playlist.playlist_id)?;
                Playlist::touch(conn, playlist.playlist_id)?;
                Ok::<_, LibraryError>(n)
            })
            .await?;
        METRICS.inc_playlist_writes();
        Ok(cleared)
    }

    /// Overwrites the playlist with `songs`, in order, atomically.
    pub async fn replace_tracks(
        &self,
        owner: u64,
        name: &str,
        songs: Vec<Playable>,
    ) -> Result<Vec<Track>, LibraryError> {
        let name = name.trim().to_string();
        let owner = sql_id(owner);
        let rows = self
            .db
            .transaction(move |conn| {
                let playlist = owned(conn, owner, &name)?;
                rewrite_tracks(conn, playlist.playlist_id, songs.iter().map(NewTrack::from).collect())
            })
            .await?;
        METRICS.inc_playlist_writes();
        Ok(rows)
    }

    pub async fn export(&self, owner: u64, name: &str) -> Result<Delivery, LibraryError> {
        let view = self.view(owner, owner, name).await?;
        if view.tracks.is_empty() {
            return Err(LibraryError::invalid(format!(
                "Playlist '{}' is empty.",
                view.playlist.name
            )));
        }
        let code = transfer::encode(&transfer::PlaylistExport::new(&view.playlist, &view.tracks))?;
        Ok(Delivery::for_code(code))
    }

    /// Creates a new playlist from a code. `name` overrides the exported name.
    /// Nothing is written unless the whole payload is valid.
    #[instrument(skip(self, data))]
    pub async fn import(
        &self,
        owner: u64,
        data: &str,
        name: Option<&str>,
    ) -> Result<PlaylistView, LibraryError> {
        let export = transfer::decode(data)?;
        if export.songs.is_empty() {
            return Err(LibraryError::invalid("That playlist code has no songs."));
        }
        let name = clean_name(name.unwrap_or(&export.playlist_name))?;
        let new = NewPlaylist::new(sql_id(owner), name.clone());
        let songs: Vec<NewTrack> = export
            .songs
            .into_iter()
            .map(|s| NewTrack {
                title: s.title,
                url: s.url,
                artist: s.artist,
                duration: s.duration,
            })
            .collect();
        let view = self
            .db
            .transaction(move |conn| {
                if Playlist::name_exists(conn, new.owner_id, &new.name)? {
                    return Err(name_taken(&new.name));
                }
                let playlist = Playlist::create(conn, new).map_err(|e| insert_error(e, &name))?;
                let tracks = rewrite_tracks(conn, playlist.playlist_id, songs)?;
                Ok(PlaylistView { playlist, tracks })
            })
            .await?;
        METRICS.inc_playlist_writes();
        info!(playlist = %view.playlist.playlist_id, tracks = view.tracks.len(), "playlist imported");
        Ok(view)
    }

    /// Names of `owner`'s playlists starting with `prefix`, for autocomplete.
    pub async fn names_for(&self, owner: u64, prefix: &str) -> Result<Vec<String>, LibraryError> {
        let owner = sql_id(owner);
        let prefix = prefix.trim().to_lowercase();
        let playlists = self
            .db
            .run(move |conn| Playlist::list_by_owner(conn, owner))
            .await?;
        Ok(playlists
            .into_iter()
            .map(|p| p.name)
            .filter(|n| n.to_lowercase().starts_with(&prefix))
            .take(AUTOCOMPLETE_LIMIT)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeAudio, TestDb};

    struct Fixture {
        _t: TestDb,
        lib: Library,
    }

    async fn fixture(audio: FakeAudio) -> Fixture {
        let t = TestDb::new().await;
        let lib = Library::new(t.db.clone(), Arc::new(audio));
        Fixture { _t: t, lib }
    }

    fn songs() -> Vec<Playable> {
        vec![
            FakeAudio::song("Song A", "u1"),
            FakeAudio::song("Song B", "u2"),
            FakeAudio::song("Song C", "u3"),
            FakeAudio::song("Song D", "u4"),
        ]
    }

    async fn titles(lib: &Library, owner: u64, name: &str) -> Vec<(String, i32)> {
        lib.view(owner, owner, name)
            .await
            .unwrap()
            .tracks
            .into_iter()
            .map(|t| (t.title, t.position))
            .collect()
    }

    fn assert_dense(tracks: &[(String, i32)]) {
        let positions: Vec<i32> = tracks.iter().map(|(_, p)| *p).collect();
        assert_eq!(positions, (0..tracks.len() as i32).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn add_then_remove_first_shifts_the_rest_up() {
        let f = fixture(FakeAudio::default().knowing(&songs())).await;
        f.lib.create(42, "road-trip", None, true).await.unwrap();
        f.lib.add_track(42, "road-trip", "Song A").await.unwrap();
        f.lib.add_track(42, "road-trip", "u2").await.unwrap();

        let removed = f.lib.remove_track(42, "road-trip", 1).await.unwrap();
        assert_eq!(removed.title, "Song A");
        let rest = titles(&f.lib, 42, "road-trip").await;
        assert_eq!(rest, vec![("Song B".to_string(), 0)]);
        let url = &f.lib.view(42, 42, "road-trip").await.unwrap().tracks[0].url;
        assert_eq!(url, "u2");
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected_or_ignored() {
        let f = fixture(FakeAudio::default()).await;
        let first = f.lib.create(42, "road-trip", Some("orig".into()), true).await.unwrap();
        let err = f.lib.create(42, " road-trip ", None, false).await.unwrap_err();
        assert!(matches!(err, LibraryError::UniquenessViolation(_)));

        let (same, inserted) = f.lib.create_or_ignore(42, "road-trip").await.unwrap();
        assert!(!inserted);
        assert_eq!(same, first);
        assert_eq!(f.lib.list(42, 42).await.unwrap().len(), 1);

        // Another owner may reuse the name.
        assert!(f.lib.create(7, "road-trip", None, true).await.is_ok());
    }

    #[tokio::test]
    async fn empty_and_overlong_names_are_invalid() {
        let f = fixture(FakeAudio::default()).await;
        assert!(matches!(
            f.lib.create(1, "   ", None, true).await,
            Err(LibraryError::InvalidInput(_))
        ));
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(f.lib.create(1, &long, None, true).await.is_err());
    }

    #[tokio::test]
    async fn positions_stay_dense_through_mixed_edits() {
        let f = fixture(FakeAudio::default()).await;
        f.lib.create(1, "p", None, true).await.unwrap();
        f.lib.add_playables(1, "p", songs()).await.unwrap();

        f.lib.move_track(1, "p", 1, 3, MoveMode::After).await.unwrap();
        assert_dense(&titles(&f.lib, 1, "p").await);
        f.lib.remove_track(1, "p", 2).await.unwrap();
        assert_dense(&titles(&f.lib, 1, "p").await);
        f.lib.add_playables(1, "p", vec![FakeAudio::song("Song E", "u5")]).await.unwrap();
        f.lib.move_track(1, "p", 4, 1, MoveMode::Before).await.unwrap();

        let view = titles(&f.lib, 1, "p").await;
        assert_dense(&view);
        let order: Vec<&str> = view.iter().map(|(t, _)| t.as_str()).collect();
        // B C A D -> remove C -> B A D -> append E -> move E before B
        assert_eq!(order, ["Song E", "Song B", "Song A", "Song D"]);
    }

    #[tokio::test]
    async fn moves_are_symmetric_and_same_index_is_a_no_op() {
        let f = fixture(FakeAudio::default()).await;
        f.lib.create(1, "p", None, true).await.unwrap();
        f.lib.add_playables(1, "p", songs()).await.unwrap();

        let down = f.lib.move_track(1, "p", 1, 3, MoveMode::Before).await.unwrap();
        let order: Vec<&str> = down.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(order, ["Song B", "Song A", "Song C", "Song D"]);

        let up = f.lib.move_track(1, "p", 4, 1, MoveMode::After).await.unwrap();
        let order: Vec<&str> = up.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(order, ["Song B", "Song D", "Song A", "Song C"]);

        let before = titles(&f.lib, 1, "p").await;
        f.lib.move_track(1, "p", 2, 2, MoveMode::After).await.unwrap();
        assert_eq!(titles(&f.lib, 1, "p").await, before);
    }

    #[tokio::test]
    async fn out_of_range_indices_are_invalid() {
        let f = fixture(FakeAudio::default()).await;
        f.lib.create(1, "p", None, true).await.unwrap();
        assert!(matches!(
            f.lib.remove_track(1, "p", 1).await,
            Err(LibraryError::InvalidInput(_))
        ));
        f.lib.add_playables(1, "p", songs()).await.unwrap();
        assert!(f.lib.remove_track(1, "p", 0).await.is_err());
        assert!(f.lib.remove_track(1, "p", 5).await.is_err());
        assert!(f.lib.move_track(1, "p", 1, 9, MoveMode::Before).await.is_err());
    }

    #[tokio::test]
    async fn removing_the_last_track_keeps_an_empty_playlist() {
        let f = fixture(FakeAudio::default()).await;
        f.lib.create(1, "p", None, true).await.unwrap();
        f.lib.add_playables(1, "p", vec![FakeAudio::song("only", "u")]).await.unwrap();
        f.lib.remove_track(1, "p", 1).await.unwrap();
        let view = f.lib.view(1, 1, "p").await.unwrap();
        assert!(view.tracks.is_empty());
    }

    #[tokio::test]
    async fn playlist_search_results_add_every_track_in_order() {
        let audio = FakeAudio::default().with_result(
            "https://list",
            SearchResult::Playlist {
                name: "remote".into(),
                tracks: songs(),
            },
        );
        let f = fixture(audio).await;
        f.lib.create(1, "p", None, true).await.unwrap();
        let added = f.lib.add_track(1, "p", "https://list").await.unwrap();
        assert_eq!(added.len(), 4);
        let view = titles(&f.lib, 1, "p").await;
        assert_dense(&view);
        assert_eq!(view[3].0, "Song D");
    }

    #[tokio::test]
    async fn unresolvable_queries_add_nothing() {
        let f = fixture(FakeAudio::default().failing("boom")).await;
        f.lib.create(1, "p", None, true).await.unwrap();
        assert!(matches!(
            f.lib.add_track(1, "p", "nothing matches").await,
            Err(LibraryError::NotFound(_))
        ));
        assert!(matches!(
            f.lib.add_track(1, "p", "boom").await,
            Err(LibraryError::Audio(_))
        ));
        assert!(matches!(
            f.lib.add_track(1, "missing", "Song A").await,
            Err(LibraryError::NotFound(_))
        ));
        assert!(f.lib.view(1, 1, "p").await.unwrap().tracks.is_empty());
    }

    #[tokio::test]
    async fn rename_rules() {
        let f = fixture(FakeAudio::default()).await;
        let original = f.lib.create(1, "a", None, true).await.unwrap();
        f.lib.create(1, "b", None, true).await.unwrap();

        assert!(matches!(
            f.lib.rename(1, "a", "a").await,
            Err(LibraryError::InvalidInput(_))
        ));
        assert!(matches!(
            f.lib.rename(1, "a", "b").await,
            Err(LibraryError::UniquenessViolation(_))
        ));
        let renamed = f.lib.rename(1, "a", "c").await.unwrap();
        assert_eq!(renamed.playlist_id, original.playlist_id);
        assert_eq!(renamed.name, "c");
        assert!(renamed.updated_at >= original.updated_at);
        assert!(matches!(
            f.lib.rename(1, "a", "d").await,
            Err(LibraryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn only_owners_can_touch_and_private_lists_stay_private() {
        let f = fixture(FakeAudio::default()).await;
        f.lib.create(1, "mine", None, false).await.unwrap();
        f.lib.create(1, "shared", None, true).await.unwrap();
        f.lib.add_playables(1, "mine", songs()).await.unwrap();

        // Another member addressing the name finds nothing of theirs.
        assert!(matches!(
            f.lib.delete(2, "mine").await,
            Err(LibraryError::NotFound(_))
        ));
        assert!(matches!(
            f.lib.view(1, 2, "mine").await,
            Err(LibraryError::OwnershipViolation(_))
        ));
        assert!(f.lib.view(1, 2, "shared").await.is_ok());

        let seen: Vec<String> = f
            .lib
            .list(1, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.playlist.name)
            .collect();
        assert_eq!(seen, ["shared"]);
        let own = f.lib.list(1, 1).await.unwrap();
        assert_eq!(own.len(), 2);
        assert_eq!(own[0].track_count, 4);
    }

    #[tokio::test]
    async fn descriptions_are_bounded() {
        let f = fixture(FakeAudio::default()).await;
        let long = "d".repeat(MAX_DESCRIPTION_LEN + 1);
        assert!(matches!(
            f.lib.create(1, "p", Some(long.clone()), true).await,
            Err(LibraryError::InvalidInput(_))
        ));
        let p = f.lib.create(1, "p", Some("   ".into()), true).await.unwrap();
        assert_eq!(p.description, None);
        assert!(matches!(
            f.lib.update_details(1, "p", Some(Some(long)), None).await,
            Err(LibraryError::InvalidInput(_))
        ));
        assert!(matches!(
            f.lib.update_details(1, "p", None, None).await,
            Err(LibraryError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn details_update_and_delete_cascade() {
        let f = fixture(FakeAudio::default()).await;
        f.lib.create(1, "p", Some("old".into()), true).await.unwrap();
        f.lib.add_playables(1, "p", songs()).await.unwrap();
        let updated = f
            .lib
            .update_details(1, "p", Some(None), Some(false))
            .await
            .unwrap();
        assert_eq!(updated.description, None);
        assert!(!updated.public);

        let deleted = f.lib.delete(1, "p").await.unwrap();
        assert_eq!(deleted.playlist_id, updated.playlist_id);
        assert!(f.lib.view(1, 1, "p").await.is_err());
        assert_eq!(f.lib.clear(1, "p").await.unwrap_err().kind(), "not_found");
    }

    #[tokio::test]
    async fn export_then_import_reproduces_the_tracks() {
        let f = fixture(FakeAudio::default()).await;
        f.lib.create(42, "road-trip", None, true).await.unwrap();
        f.lib.add_playables(42, "road-trip", songs()).await.unwrap();

        let Delivery::Inline(message) = f.lib.export(42, "road-trip").await.unwrap() else {
            panic!("a short playlist should export inline");
        };
        let imported = f.lib.import(7, &message, None).await.unwrap();
        assert_eq!(imported.playlist.name, "road-trip");
        assert_eq!(imported.playlist.owner_id, 7);

        let pairs = |tracks: &[Track]| -> Vec<(String, String, i32)> {
            tracks
                .iter()
                .map(|t| (t.title.clone(), t.url.clone(), t.position))
                .collect()
        };
        let source = f.lib.view(42, 42, "road-trip").await.unwrap();
        assert_eq!(pairs(&imported.tracks), pairs(&source.tracks));

        // Importing again under the same name collides.
        assert!(matches!(
            f.lib.import(7, &message, None).await,
            Err(LibraryError::UniquenessViolation(_))
        ));
        let renamed = f.lib.import(7, &message, Some("copy")).await.unwrap();
        assert_eq!(renamed.tracks.len(), 4);
    }

    #[tokio::test]
    async fn corrupted_import_creates_nothing() {
        let f = fixture(FakeAudio::default()).await;
        f.lib.create(42, "road-trip", None, true).await.unwrap();
        f.lib.add_playables(42, "road-trip", songs()[..3].to_vec()).await.unwrap();
        let Delivery::Inline(message) = f.lib.export(42, "road-trip").await.unwrap() else {
            panic!("expected inline export");
        };
        let code = message.trim_matches('`').to_string();
        let mut bytes = code.into_bytes();
        let mid = bytes.len() / 2;
        bytes[mid] = if bytes[mid] == b'A' { b'B' } else { b'A' };
        let corrupted = String::from_utf8(bytes).unwrap();

        let err = f.lib.import(9, &corrupted, Some("copy")).await.unwrap_err();
        assert!(matches!(err, LibraryError::DecodeFailure(_)));
        assert!(f.lib.list(9, 9).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_playlists_do_not_export() {
        let f = fixture(FakeAudio::default()).await;
        f.lib.create(1, "p", None, true).await.unwrap();
        assert!(matches!(
            f.lib.export(1, "p").await,
            Err(LibraryError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn replace_overwrites_in_order() {
        let f = fixture(FakeAudio::default()).await;
        f.lib.create(1, "p", None, true).await.unwrap();
        f.lib.add_playables(1, "p", songs()).await.unwrap();
        f.lib
            .replace_tracks(1, "p", vec![FakeAudio::song("X", "ux"), FakeAudio::song("Y", "uy")])
            .await
            .unwrap();
        assert_eq!(
            titles(&f.lib, 1, "p").await,
            vec![("X".to_string(), 0), ("Y".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn autocomplete_matches_prefixes() {
        let f = fixture(FakeAudio::default()).await;
        for name in ["Road trip", "rock", "jazz"] {
            f.lib.create(1, name, None, true).await.unwrap();
        }
        assert_eq!(f.lib.names_for(1, "ro").await.unwrap(), ["Road trip", "rock"]);
        assert_eq!(f.lib.names_for(1, "").await.unwrap().len(), 3);
        assert!(f.lib.names_for(2, "").await.unwrap().is_empty());
    }
}
