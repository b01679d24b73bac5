use diesel::prelude::*;

use crate::database::{
    DbError, InsertMode, Record, SqlValue, gateway,
    schema::member,
    types::{AutoplayMode, LoopMode},
};

pub const DEFAULT_VOLUME: i32 = 30;
pub const MAX_VOLUME: i32 = 1000;

/// Per-user playback settings.
#[derive(Queryable, QueryableByName, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = member)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Member {
    pub user_id: i64,
    pub volume: i32,
    pub filters: String,
    pub autoplay: AutoplayMode,
    pub loop_mode: LoopMode,
}

impl Record for Member {
    const TABLE: &'static str = "member";
    const COLUMNS: &'static [&'static str] = &["user_id", "volume", "filters", "autoplay", "loop_mode"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.user_id.into(),
            self.volume.into(),
            self.filters.as_str().into(),
            self.autoplay.as_str().into(),
            self.loop_mode.as_str().into(),
        ]
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemberUpdate {
    pub volume: Option<i32>,
    pub filters: Option<String>,
    pub autoplay: Option<AutoplayMode>,
    pub loop_mode: Option<LoopMode>,
}

impl MemberUpdate {
    fn into_fields(self) -> Vec<(&'static str, SqlValue)> {
        let mut fields = Vec::new();
        if let Some(volume) = self.volume {
            fields.push(("volume", volume.into()));
        }
        if let Some(filters) = self.filters {
            fields.push(("filters", filters.into()));
        }
        if let Some(autoplay) = self.autoplay {
            fields.push(("autoplay", autoplay.as_str().into()));
        }
        if let Some(loop_mode) = self.loop_mode {
            fields.push(("loop_mode", loop_mode.as_str().into()));
        }
        fields
    }
}

impl Member {
    /// Settings a user starts with before touching any command.
    pub fn with_defaults(user_id: i64) -> Self {
        Self {
            user_id,
            volume: DEFAULT_VOLUME,
            filters: String::new(),
            autoplay: AutoplayMode::Partial,
            loop_mode: LoopMode::Normal,
        }
    }

    pub fn create(conn: &mut SqliteConnection, row: &Member) -> Result<usize, DbError> {
        gateway::insert_rows(conn, std::slice::from_ref(row), InsertMode::Normal)
    }

    pub fn get(conn: &mut SqliteConnection, user_id: i64) -> Result<Option<Member>, DbError> {
        gateway::get_one(conn, "user_id = ?", vec![user_id.into()])
    }

    /// Reads the settings row, creating it with defaults on first contact.
    pub fn get_or_create(conn: &mut SqliteConnection, user_id: i64) -> Result<Member, DbError> {
        if let Some(found) = Self::get(conn, user_id)? {
            return Ok(found);
        }
        let fresh = Self::with_defaults(user_id);
        // Ignore so a concurrent first contact does not fail the command.
        gateway::insert_rows(conn, std::slice::from_ref(&fresh), InsertMode::Ignore)?;
        Ok(Self::get(conn, user_id)?.unwrap_or(fresh))
    }

    pub fn update(
        conn: &mut SqliteConnection,
        user_id: i64,
        changes: MemberUpdate,
    ) -> Result<usize, DbError> {
        gateway::update_rows(
            conn,
            Self::TABLE,
            changes.into_fields(),
            "user_id = ?",
            vec![user_id.into()],
        )
    }

    pub fn delete(conn: &mut SqliteConnection, user_id: i64) -> Result<usize, DbError> {
        gateway::delete_rows(conn, Self::TABLE, "user_id = ?", vec![user_id.into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestDb;

    #[tokio::test]
    async fn fields_round_trip_in_declared_order() {
        let t = TestDb::new().await;
        let row = Member {
            user_id: 42,
            volume: 850,
            filters: "nightcore;bass=2".into(),
            autoplay: AutoplayMode::Enabled,
            loop_mode: LoopMode::All,
        };
        let written = row.clone();
        let read = t
            .db
            .run(move |conn| {
                Member::create(conn, &written)?;
                Member::get(conn, 42)
            })
            .await
            .unwrap();
        assert_eq!(read, Some(row));
    }

    #[tokio::test]
    async fn first_contact_creates_defaults() {
        let t = TestDb::new().await;
        let (created, again) = t
            .db
            .run(|conn| {
                let created = Member::get_or_create(conn, 7)?;
                Member::update(
                    conn,
                    7,
                    MemberUpdate {
                        volume: Some(100),
                        ..Default::default()
                    },
                )?;
                let again = Member::get_or_create(conn, 7)?;
                Ok::<_, DbError>((created, again))
            })
            .await
            .unwrap();
        assert_eq!(created, Member::with_defaults(7));
        assert_eq!(created.volume, 30);
        assert_eq!(created.autoplay, AutoplayMode::Partial);
        assert_eq!(again.volume, 100);
    }

    #[tokio::test]
    async fn partial_update_leaves_other_settings() {
        let t = TestDb::new().await;
        let read = t
            .db
            .run(|conn| {
                Member::create(conn, &Member::with_defaults(3))?;
                Member::update(
                    conn,
                    3,
                    MemberUpdate {
                        loop_mode: Some(LoopMode::Single),
                        autoplay: Some(AutoplayMode::Disabled),
                        ..Default::default()
                    },
                )?;
                Member::get(conn, 3)
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.volume, DEFAULT_VOLUME);
        assert_eq!(read.loop_mode, LoopMode::Single);
        assert_eq!(read.autoplay, AutoplayMode::Disabled);
    }

    #[tokio::test]
    async fn volume_outside_range_is_rejected_by_the_store() {
        let t = TestDb::new().await;
        let result = t
            .db
            .run(|conn| {
                Member::create(conn, &Member::with_defaults(1))?;
                Member::update(
                    conn,
                    1,
                    MemberUpdate {
                        volume: Some(MAX_VOLUME + 1),
                        ..Default::default()
                    },
                )
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let t = TestDb::new().await;
        let gone = t
            .db
            .run(|conn| {
                Member::get_or_create(conn, 11)?;
                Member::delete(conn, 11)?;
                Member::get(conn, 11)
            })
            .await
            .unwrap();
        assert!(gone.is_none());
    }
}
