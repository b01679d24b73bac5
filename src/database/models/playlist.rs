use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;

use crate::database::{
    DbError, InsertMode, Record, SqlValue, gateway, schema::playlist, types::RecordId,
};

#[derive(Queryable, QueryableByName, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = playlist)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Playlist {
    pub playlist_id: RecordId,
    pub owner_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub public: bool,
    pub locked: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Record for Playlist {
    const TABLE: &'static str = "playlist";
    const COLUMNS: &'static [&'static str] = &[
        "playlist_id",
        "owner_id",
        "name",
        "description",
        "public",
        "locked",
        "created_at",
        "updated_at",
    ];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.playlist_id.into(),
            self.owner_id.into(),
            self.name.as_str().into(),
            self.description.clone().into(),
            self.public.into(),
            self.locked.into(),
            self.created_at.into(),
            self.updated_at.into(),
        ]
    }
}

/// Fields a caller chooses when creating a playlist.
#[derive(Debug, Clone)]
pub struct NewPlaylist {
    pub owner_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub public: bool,
    pub locked: bool,
    /// Fresh v4 id when `None`.
    pub id: Option<RecordId>,
}

impl NewPlaylist {
    pub fn new(owner_id: i64, name: impl Into<String>) -> Self {
        Self {
            owner_id,
            name: name.into(),
            description: None,
            public: true,
            locked: false,
            id: None,
        }
    }

    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    pub fn id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    fn into_row(self) -> Playlist {
        let now = Utc::now().naive_utc();
        Playlist {
            playlist_id: self.id.unwrap_or_else(RecordId::new_v4),
            owner_id: self.owner_id,
            name: self.name,
            description: self.description,
            public: self.public,
            locked: self.locked,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct PlaylistUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub public: Option<bool>,
    pub locked: Option<bool>,
}

impl PlaylistUpdate {
    fn into_fields(self) -> Vec<(&'static str, SqlValue)> {
        let mut fields = Vec::new();
        if let Some(name) = self.name {
            fields.push(("name", name.into()));
        }
        if let Some(description) = self.description {
            fields.push(("description", description.into()));
        }
        if let Some(public) = self.public {
            fields.push(("public", public.into()));
        }
        if let Some(locked) = self.locked {
            fields.push(("locked", locked.into()));
        }
        fields
    }
}

impl Playlist {
    pub fn create(conn: &mut SqliteConnection, new: NewPlaylist) -> Result<Playlist, DbError> {
        let row = new.into_row();
        gateway::insert_rows(conn, std::slice::from_ref(&row), InsertMode::Normal)?;
        Ok(row)
    }

    /// Creates the playlist unless `(owner, name)` is taken, in which case the
    /// existing row is returned untouched. The flag is `true` for a new row.
    pub fn create_or_ignore(
        conn: &mut SqliteConnection,
        new: NewPlaylist,
    ) -> Result<(Playlist, bool), DbError> {
        let owner_id = new.owner_id;
        let name = new.name.clone();
        let row = new.into_row();
        let inserted = gateway::insert_rows(conn, std::slice::from_ref(&row), InsertMode::Ignore)? > 0;
        if inserted {
            return Ok((row, true));
        }
        let existing = Self::get_by_name_owner(conn, owner_id, &name)?
            .ok_or(DbError::Query(diesel::result::Error::NotFound))?;
        Ok((existing, false))
    }

    pub fn get(conn: &mut SqliteConnection, id: RecordId) -> Result<Option<Playlist>, DbError> {
        gateway::get_one(conn, "playlist_id = ?", vec![id.into()])
    }

    pub fn get_by_name_owner(
        conn: &mut SqliteConnection,
        owner_id: i64,
        name: &str,
    ) -> Result<Option<Playlist>, DbError> {
        gateway::get_one(
            conn,
            "owner_id = ? AND name = ?",
            vec![owner_id.into(), name.into()],
        )
    }

    pub fn list_by_owner(conn: &mut SqliteConnection, owner_id: i64) -> Result<Vec<Playlist>, DbError> {
        gateway::get_rows(conn, "owner_id = ? ORDER BY name", vec![owner_id.into()])
    }

    pub fn name_exists(conn: &mut SqliteConnection, owner_id: i64, name: &str) -> QueryResult<bool> {
        diesel::select(diesel::dsl::exists(
            playlist::table
                .filter(playlist::owner_id.eq(owner_id))
                .filter(playlist::name.eq(name)),
        ))
        .get_result(conn)
    }

    /// Applies `changes` and bumps `updated_at` when anything was written.
    pub fn update(
        conn: &mut SqliteConnection,
        id: RecordId,
        changes: PlaylistUpdate,
    ) -> Result<usize, DbError> {
        let mut fields = changes.into_fields();
        if fields.is_empty() {
            return Ok(0);
        }
        fields.push(("updated_at", Utc::now().naive_utc().into()));
        gateway::update_rows(conn, Self::TABLE, fields, "playlist_id = ?", vec![id.into()])
    }

    pub fn touch(conn: &mut SqliteConnection, id: RecordId) -> QueryResult<usize> {
        diesel::update(playlist::table.filter(playlist::playlist_id.eq(id)))
            .set(playlist::updated_at.eq(Utc::now().naive_utc()))
            .execute(conn)
    }

    pub fn delete(conn: &mut SqliteConnection, id: RecordId) -> Result<usize, DbError> {
        gateway::delete_rows(conn, Self::TABLE, "playlist_id = ?", vec![id.into()])
    }
}
