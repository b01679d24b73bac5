use std::sync::Arc;

use diesel::{
    connection::SimpleConnection,
    prelude::*,
    query_builder::{BoxedSqlQuery, SqlQuery},
    query_dsl::methods::LoadQuery,
    result::DatabaseErrorKind,
    sqlite::Sqlite,
};
use thiserror::Error;
use tracing::{debug, info, instrument};

pub mod gateway;
pub mod models;
pub mod schema;
pub mod types;

pub use gateway::{InsertMode, Record, SqlValue};

const CONNECTION_PRAGMAS: &str = "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;";

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS guild (
    guild_id BIGINT PRIMARY KEY NOT NULL,
    twenty_four_online BOOLEAN NOT NULL DEFAULT 0,
    music_channel_id BIGINT
);

CREATE TABLE IF NOT EXISTS member (
    user_id BIGINT PRIMARY KEY NOT NULL,
    volume INTEGER NOT NULL DEFAULT 30 CHECK (volume BETWEEN 0 AND 1000),
    filters TEXT NOT NULL DEFAULT '',
    autoplay TEXT NOT NULL DEFAULT 'partial' CHECK (autoplay IN ('enabled', 'disabled', 'partial')),
    loop_mode TEXT NOT NULL DEFAULT 'normal' CHECK (loop_mode IN ('normal', 'single', 'all'))
);

CREATE TABLE IF NOT EXISTS playlist (
    playlist_id TEXT PRIMARY KEY NOT NULL,
    owner_id BIGINT NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    public BOOLEAN NOT NULL DEFAULT 1,
    locked BOOLEAN NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (owner_id, name)
);

CREATE TABLE IF NOT EXISTS track (
    track_id TEXT PRIMARY KEY NOT NULL,
    playlist_id TEXT NOT NULL REFERENCES playlist (playlist_id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    url TEXT NOT NULL,
    artist TEXT,
    duration BIGINT NOT NULL DEFAULT 0,
    position INTEGER NOT NULL,
    added_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS track_playlist_position ON track (playlist_id, position);
"#;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("failed to open database at {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: ConnectionError,
    },
    #[error(transparent)]
    Query(#[from] diesel::result::Error),
    #[error("invalid statement: {0}")]
    Statement(String),
    #[error("database worker failed: {0}")]
    Worker(String),
}

impl DbError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            Self::Query(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _
            ))
        )
    }
}

fn establish_connection(url: &str) -> Result<SqliteConnection, DbError> {
    let mut conn = SqliteConnection::establish(url).map_err(|source| DbError::Connection {
        url: url.to_string(),
        source,
    })?;
    conn.batch_execute(CONNECTION_PRAGMAS)?;
    Ok(conn)
}

/// Handle on the embedded store.
///
/// Every call opens its own short-lived connection on the blocking pool, so
/// nothing is shared between concurrent callers. Use [`Database::transaction`]
/// when several statements must land together.
#[derive(Debug, Clone)]
pub struct Database {
    url: Arc<str>,
}

impl Database {
    /// Opens the store at `url` and makes sure every table exists.
    #[instrument]
    pub async fn open(url: &str) -> Result<Self, DbError> {
        let db = Self::new(url);
        db.run(|conn| {
            conn.batch_execute(SCHEMA_SQL)?;
            Ok::<_, DbError>(())
        })
        .await?;
        info!("Database ready at {}", url);
        Ok(db)
    }

    /// A handle that has not touched the file yet; the first call connects.
    pub fn new(url: &str) -> Self {
        Self { url: Arc::from(url) }
    }

    /// Runs `f` on a fresh connection without a surrounding transaction.
    pub async fn run<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DbError> + Send + 'static,
    {
        let url = self.url.clone();
        match tokio::task::spawn_blocking(move || -> Result<T, E> {
            let mut conn = establish_connection(&url)?;
            f(&mut conn)
        })
        .await
        {
            Ok(result) => result,
            Err(join) => Err(DbError::Worker(join.to_string()).into()),
        }
    }

    /// Runs `f` inside an immediate transaction; any error rolls back.
    pub async fn transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DbError> + From<diesel::result::Error> + Send + 'static,
    {
        self.run(move |conn| conn.immediate_transaction(f)).await
    }

    pub async fn execute(&self, sql: impl Into<String>, params: Vec<SqlValue>) -> Result<usize, DbError> {
        let sql = sql.into();
        debug!(%sql, "execute");
        self.run(move |conn| gateway::execute(conn, sql, params)).await
    }

    pub async fn query<R>(&self, sql: impl Into<String>, params: Vec<SqlValue>) -> Result<Vec<R>, DbError>
    where
        R: QueryableByName<Sqlite> + Send + 'static,
        BoxedSqlQuery<'static, Sqlite, SqlQuery>: LoadQuery<'static, SqliteConnection, R>,
    {
        let sql = sql.into();
        debug!(%sql, "query");
        self.run(move |conn| gateway::query(conn, sql, params)).await
    }

    /// Inserts every row atomically using the given conflict mode.
    pub async fn insert<R: Record + Clone>(&self, rows: &[R], mode: InsertMode) -> Result<usize, DbError> {
        let rows = rows.to_vec();
        self.transaction(move |conn| gateway::insert_rows(conn, &rows, mode))
            .await
    }

    pub async fn update(
        &self,
        table: &'static str,
        fields: Vec<(&'static str, SqlValue)>,
        where_clause: impl Into<String>,
        where_params: Vec<SqlValue>,
    ) -> Result<usize, DbError> {
        let where_clause = where_clause.into();
        self.run(move |conn| gateway::update_rows(conn, table, fields, &where_clause, where_params))
            .await
    }

    pub async fn delete(
        &self,
        table: &'static str,
        where_clause: impl Into<String>,
        where_params: Vec<SqlValue>,
    ) -> Result<usize, DbError> {
        let where_clause = where_clause.into();
        self.run(move |conn| gateway::delete_rows(conn, table, &where_clause, where_params))
            .await
    }

    pub async fn get<R>(&self, where_clause: impl Into<String>, where_params: Vec<SqlValue>) -> Result<Vec<R>, DbError>
    where
        R: Record,
        BoxedSqlQuery<'static, Sqlite, SqlQuery>: LoadQuery<'static, SqliteConnection, R>,
    {
        let where_clause = where_clause.into();
        self.run(move |conn| gateway::get_rows::<R>(conn, &where_clause, where_params))
            .await
    }

    pub async fn get_one<R>(
        &self,
        where_clause: impl Into<String>,
        where_params: Vec<SqlValue>,
    ) -> Result<Option<R>, DbError>
    where
        R: Record,
        BoxedSqlQuery<'static, Sqlite, SqlQuery>: LoadQuery<'static, SqliteConnection, R>,
    {
        let where_clause = where_clause.into();
        self.run(move |conn| gateway::get_one::<R>(conn, &where_clause, where_params))
            .await
    }
}
