use diesel::prelude::*;

use crate::database::{
    DbError, InsertMode, Record, SqlValue, gateway,
    schema::guild,
};

#[derive(Queryable, QueryableByName, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = guild)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Guild {
    pub guild_id: i64,
    pub twenty_four_online: bool,
    pub music_channel_id: Option<i64>,
}

impl Record for Guild {
    const TABLE: &'static str = "guild";
    const COLUMNS: &'static [&'static str] = &["guild_id", "twenty_four_online", "music_channel_id"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.guild_id.into(),
            self.twenty_four_online.into(),
            self.music_channel_id.into(),
        ]
    }
}

/// Partial update; `None` leaves a column untouched.
#[derive(Debug, Default, Clone)]
pub struct GuildUpdate {
    pub twenty_four_online: Option<bool>,
    /// `Some(None)` clears the channel.
    pub music_channel_id: Option<Option<i64>>,
}

impl GuildUpdate {
    fn into_fields(self) -> Vec<(&'static str, SqlValue)> {
        let mut fields = Vec::new();
        if let Some(online) = self.twenty_four_online {
            fields.push(("twenty_four_online", online.into()));
        }
        if let Some(channel) = self.music_channel_id {
            fields.push(("music_channel_id", channel.into()));
        }
        fields
    }
}

impl Guild {
    pub fn new(guild_id: i64) -> Self {
        Self {
            guild_id,
            twenty_four_online: false,
            music_channel_id: None,
        }
    }

    pub fn create(conn: &mut SqliteConnection, guild_id: i64) -> Result<Guild, DbError> {
        let row = Self::new(guild_id);
        gateway::insert_rows(conn, std::slice::from_ref(&row), InsertMode::Normal)?;
        Ok(row)
    }

    /// Returns `true` when a new row was written.
    pub fn create_or_ignore(conn: &mut SqliteConnection, guild_id: i64) -> Result<bool, DbError> {
        Ok(gateway::insert_rows(conn, &[Self::new(guild_id)], InsertMode::Ignore)? > 0)
    }

    pub fn get(conn: &mut SqliteConnection, guild_id: i64) -> Result<Option<Guild>, DbError> {
        gateway::get_one(conn, "guild_id = ?", vec![guild_id.into()])
    }

    pub fn ensure(conn: &mut SqliteConnection, guild_id: i64) -> Result<Guild, DbError> {
        Self::create_or_ignore(conn, guild_id)?;
        Self::get(conn, guild_id)?.ok_or(DbError::Query(diesel::result::Error::NotFound))
    }

    pub fn update(
        conn: &mut SqliteConnection,
        guild_id: i64,
        changes: GuildUpdate,
    ) -> Result<usize, DbError> {
        gateway::update_rows(
            conn,
            Self::TABLE,
            changes.into_fields(),
            "guild_id = ?",
            vec![guild_id.into()],
        )
    }

    /// Writes the whole row, inserting it if the guild is new.
    pub fn save(conn: &mut SqliteConnection, row: &Guild) -> Result<usize, DbError> {
        gateway::insert_rows(
            conn,
            std::slice::from_ref(row),
            InsertMode::Upsert(&["guild_id"]),
        )
    }

    pub fn delete(conn: &mut SqliteConnection, guild_id: i64) -> Result<usize, DbError> {
        gateway::delete_rows(conn, Self::TABLE, "guild_id = ?", vec![guild_id.into()])
    }

    pub fn list_always_online(conn: &mut SqliteConnection) -> QueryResult<Vec<i64>> {
        guild::table
            .filter(guild::twenty_four_online.eq(true))
            .select(guild::guild_id)
            .load::<i64>(conn)
    }
}
