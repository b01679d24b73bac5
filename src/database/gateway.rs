//! Table-agnostic statement builders executed over a single connection.
//!
//! Repositories describe their rows through [`Record`]; the functions here turn
//! that description into parametrized SQL so every entity shares one insert,
//! update, delete and select path.

use chrono::NaiveDateTime;
use diesel::{
    prelude::*,
    query_builder::{BoxedSqlQuery, SqlQuery},
    query_dsl::methods::LoadQuery,
    sql_types::{BigInt, Bool, Nullable, Text, Timestamp},
    sqlite::Sqlite,
};

use super::{DbError, types::RecordId};

/// A single bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Integer(i64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl From<RecordId> for SqlValue {
    fn from(value: RecordId) -> Self {
        Self::Text(value.to_string())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Conflict handling for [`insert_rows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    Normal,
    Ignore,
    Replace,
    /// `ON CONFLICT (cols) DO UPDATE` over every other column.
    Upsert(&'static [&'static str]),
}

/// A typed row that knows the table it lives in.
///
/// `COLUMNS` must list the columns in the order `values` yields them.
pub trait Record: QueryableByName<Sqlite> + Send + 'static {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    fn values(&self) -> Vec<SqlValue>;
}

fn quote(column: &str) -> String {
    format!("\"{column}\"")
}

fn column_list(columns: &[&str]) -> String {
    columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ")
}

pub(crate) fn insert_sql(
    table: &str,
    columns: &[&'static str],
    mode: InsertMode,
) -> Result<String, DbError> {
    if columns.is_empty() {
        return Err(DbError::Statement(format!("no columns to insert into {table}")));
    }
    let verb = match mode {
        InsertMode::Normal | InsertMode::Upsert(_) => "INSERT",
        InsertMode::Ignore => "INSERT OR IGNORE",
        InsertMode::Replace => "INSERT OR REPLACE",
    };
    let placeholders = vec!["?"; columns.len()].join(", ");
    let mut sql = format!(
        "{verb} INTO {table} ({}) VALUES ({placeholders})",
        column_list(columns)
    );

    if let InsertMode::Upsert(targets) = mode {
        if targets.is_empty() {
            return Err(DbError::Statement(format!(
                "upsert into {table} needs at least one conflict column"
            )));
        }
        if let Some(unknown) = targets.iter().find(|t| !columns.contains(t)) {
            return Err(DbError::Statement(format!(
                "conflict column {unknown} is not a column of {table}"
            )));
        }
        let assignments: Vec<String> = columns
            .iter()
            .filter(|c| !targets.contains(c))
            .map(|c| format!("{} = excluded.{}", quote(c), quote(c)))
            .collect();
        sql.push_str(&format!(" ON CONFLICT ({})", column_list(targets)));
        if assignments.is_empty() {
            sql.push_str(" DO NOTHING");
        } else {
            sql.push_str(&format!(" DO UPDATE SET {}", assignments.join(", ")));
        }
    }
    Ok(sql)
}

pub(crate) fn select_sql(table: &str, columns: &[&str], where_clause: &str) -> String {
    format!(
        "SELECT {} FROM {table} WHERE {where_clause}",
        column_list(columns)
    )
}

pub(crate) fn update_sql(table: &str, fields: &[&str], where_clause: &str) -> String {
    let assignments: Vec<String> = fields.iter().map(|f| format!("{} = ?", quote(f))).collect();
    format!(
        "UPDATE {table} SET {} WHERE {where_clause}",
        assignments.join(", ")
    )
}

fn bind_all(
    mut query: BoxedSqlQuery<'static, Sqlite, SqlQuery>,
    params: Vec<SqlValue>,
) -> BoxedSqlQuery<'static, Sqlite, SqlQuery> {
    for value in params {
        query = match value {
            SqlValue::Null => query.bind::<Nullable<Text>, _>(None::<String>),
            SqlValue::Bool(v) => query.bind::<Bool, _>(v),
            SqlValue::Integer(v) => query.bind::<BigInt, _>(v),
            SqlValue::Text(v) => query.bind::<Text, _>(v),
            SqlValue::Timestamp(v) => query.bind::<Timestamp, _>(v),
        };
    }
    query
}

fn prepare(sql: String, params: Vec<SqlValue>) -> BoxedSqlQuery<'static, Sqlite, SqlQuery> {
    bind_all(diesel::sql_query(sql).into_boxed(), params)
}

/// Runs a statement and returns the number of affected rows.
pub fn execute(
    conn: &mut SqliteConnection,
    sql: impl Into<String>,
    params: Vec<SqlValue>,
) -> Result<usize, DbError> {
    Ok(prepare(sql.into(), params).execute(conn)?)
}

/// Runs a query and maps every row by column name.
pub fn query<R>(
    conn: &mut SqliteConnection,
    sql: impl Into<String>,
    params: Vec<SqlValue>,
) -> Result<Vec<R>, DbError>
where
    R: QueryableByName<Sqlite> + 'static,
    BoxedSqlQuery<'static, Sqlite, SqlQuery>: LoadQuery<'static, SqliteConnection, R>,
{
    Ok(prepare(sql.into(), params).load::<R>(conn)?)
}

pub fn insert_rows<R: Record>(
    conn: &mut SqliteConnection,
    rows: &[R],
    mode: InsertMode,
) -> Result<usize, DbError> {
    if rows.is_empty() {
        return Ok(0);
    }
    let sql = insert_sql(R::TABLE, R::COLUMNS, mode)?;
    let mut affected = 0;
    for row in rows {
        affected += execute(conn, sql.clone(), row.values())?;
    }
    Ok(affected)
}

pub fn update_rows(
    conn: &mut SqliteConnection,
    table: &str,
    fields: Vec<(&'static str, SqlValue)>,
    where_clause: &str,
    where_params: Vec<SqlValue>,
) -> Result<usize, DbError> {
    if fields.is_empty() {
        return Ok(0);
    }
    let (names, mut params): (Vec<&str>, Vec<SqlValue>) = fields.into_iter().unzip();
    params.extend(where_params);
    execute(conn, update_sql(table, &names, where_clause), params)
}

pub fn delete_rows(
    conn: &mut SqliteConnection,
    table: &str,
    where_clause: &str,
    where_params: Vec<SqlValue>,
) -> Result<usize, DbError> {
    execute(
        conn,
        format!("DELETE FROM {table} WHERE {where_clause}"),
        where_params,
    )
}

pub fn get_rows<R>(
    conn: &mut SqliteConnection,
    where_clause: &str,
    where_params: Vec<SqlValue>,
) -> Result<Vec<R>, DbError>
where
    R: Record,
    BoxedSqlQuery<'static, Sqlite, SqlQuery>: LoadQuery<'static, SqliteConnection, R>,
{
    query(conn, select_sql(R::TABLE, R::COLUMNS, where_clause), where_params)
}

pub fn get_one<R>(
    conn: &mut SqliteConnection,
    where_clause: &str,
    where_params: Vec<SqlValue>,
) -> Result<Option<R>, DbError>
where
    R: Record,
    BoxedSqlQuery<'static, Sqlite, SqlQuery>: LoadQuery<'static, SqliteConnection, R>,
{
    let clause = format!("{where_clause} LIMIT 1");
    Ok(get_rows::<R>(conn, &clause, where_params)?.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_sql_uses_conflict_verbs() {
        let cols = &["a", "b"];
        assert_eq!(
            insert_sql("t", cols, InsertMode::Normal).unwrap(),
            r#"INSERT INTO t ("a", "b") VALUES (?, ?)"#
        );
        assert!(
            insert_sql("t", cols, InsertMode::Ignore)
                .unwrap()
                .starts_with("INSERT OR IGNORE INTO t")
        );
        assert!(
            insert_sql("t", cols, InsertMode::Replace)
                .unwrap()
                .starts_with("INSERT OR REPLACE INTO t")
        );
    }

    #[test]
    fn upsert_updates_every_non_key_column() {
        let sql = insert_sql("t", &["id", "x", "y"], InsertMode::Upsert(&["id"])).unwrap();
        assert!(sql.ends_with(
            r#"ON CONFLICT ("id") DO UPDATE SET "x" = excluded."x", "y" = excluded."y""#
        ));
    }

    #[test]
    fn upsert_over_key_only_does_nothing_on_conflict() {
        let sql = insert_sql("t", &["id"], InsertMode::Upsert(&["id"])).unwrap();
        assert!(sql.ends_with("DO NOTHING"));
    }

    #[test]
    fn upsert_rejects_unknown_conflict_columns() {
        assert!(insert_sql("t", &["id"], InsertMode::Upsert(&["nope"])).is_err());
        assert!(insert_sql("t", &["id"], InsertMode::Upsert(&[])).is_err());
    }

    #[test]
    fn option_values_become_null() {
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("x")), SqlValue::Text("x".into()));
    }
}
