use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;

use crate::database::{
    DbError, InsertMode, Record, SqlValue, gateway, schema::track, types::RecordId,
};

/// One song stored in a playlist. `position` is 0-based and dense.
#[derive(Queryable, QueryableByName, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = track)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Track {
    pub track_id: RecordId,
    pub playlist_id: RecordId,
    pub title: String,
    pub url: String,
    pub artist: Option<String>,
    /// Milliseconds.
    pub duration: i64,
    pub position: i32,
    pub added_at: NaiveDateTime,
}

impl Record for Track {
    const TABLE: &'static str = "track";
    const COLUMNS: &'static [&'static str] = &[
        "track_id",
        "playlist_id",
        "title",
        "url",
        "artist",
        "duration",
        "position",
        "added_at",
    ];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.track_id.into(),
            self.playlist_id.into(),
            self.title.as_str().into(),
            self.url.as_str().into(),
            self.artist.clone().into(),
            self.duration.into(),
            self.position.into(),
            self.added_at.into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrack {
    pub title: String,
    pub url: String,
    pub artist: Option<String>,
    pub duration: i64,
}

impl NewTrack {
    pub fn into_row(self, playlist_id: RecordId, position: i32) -> Track {
        Track {
            track_id: RecordId::new_v4(),
            playlist_id,
            title: self.title,
            url: self.url,
            artist: self.artist,
            duration: self.duration,
            position,
            added_at: Utc::now().naive_utc(),
        }
    }
}

impl Track {
    /// Appends after the current last position (0 for an empty playlist).
    pub fn create(
        conn: &mut SqliteConnection,
        playlist_id: RecordId,
        new: NewTrack,
    ) -> Result<Track, DbError> {
        let position = Self::max_position(conn, playlist_id)?.map_or(0, |max| max + 1);
        let row = new.into_row(playlist_id, position);
        gateway::insert_rows(conn, std::slice::from_ref(&row), InsertMode::Ignore)?;
        Ok(row)
    }

    /// Writes rows with the positions they already carry.
    pub fn insert_all(conn: &mut SqliteConnection, rows: &[Track]) -> Result<usize, DbError> {
        gateway::insert_rows(conn, rows, InsertMode::Normal)
    }

    pub fn get(conn: &mut SqliteConnection, id: RecordId) -> Result<Option<Track>, DbError> {
        gateway::get_one(conn, "track_id = ?", vec![id.into()])
    }

    pub fn list_by_playlist(
        conn: &mut SqliteConnection,
        playlist_id: RecordId,
    ) -> Result<Vec<Track>, DbError> {
        gateway::get_rows(
            conn,
            "playlist_id = ? ORDER BY position",
            vec![playlist_id.into()],
        )
    }

    pub fn count_by_playlist(conn: &mut SqliteConnection, playlist_id: RecordId) -> QueryResult<i64> {
        track::table
            .filter(track::playlist_id.eq(playlist_id))
            .count()
            .get_result(conn)
    }

    pub fn max_position(
        conn: &mut SqliteConnection,
        playlist_id: RecordId,
    ) -> QueryResult<Option<i32>> {
        track::table
            .filter(track::playlist_id.eq(playlist_id))
            .select(diesel::dsl::max(track::position))
            .first::<Option<i32>>(conn)
    }

    pub fn set_position(conn: &mut SqliteConnection, id: RecordId, position: i32) -> QueryResult<usize> {
        diesel::update(track::table.filter(track::track_id.eq(id)))
            .set(track::position.eq(position))
            .execute(conn)
    }

    /// Moves every track after `position` up by one slot.
    pub fn close_gap_after(
        conn: &mut SqliteConnection,
        playlist_id: RecordId,
        position: i32,
    ) -> QueryResult<usize> {
        diesel::update(track::table)
            .filter(track::playlist_id.eq(playlist_id))
            .filter(track::position.gt(position))
            .set(track::position.eq(track::position - 1))
            .execute(conn)
    }

    pub fn delete(conn: &mut SqliteConnection, id: RecordId) -> Result<usize, DbError> {
        gateway::delete_rows(conn, Self::TABLE, "track_id = ?", vec![id.into()])
    }

    pub fn delete_by_playlist(conn: &mut SqliteConnection, playlist_id: RecordId) -> Result<usize, DbError> {
        gateway::delete_rows(conn, Self::TABLE, "playlist_id = ?", vec![playlist_id.into()])
    }
}
