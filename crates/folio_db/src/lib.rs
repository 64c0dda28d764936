//! Unified database layer for Folio content resolution.
//!
//! This crate provides the single read path onto a site's SQLite content
//! database. All higher layers (schema registry, content engine, listing)
//! should go through [`ContentDb`] rather than holding their own pools.
//!
//! # Usage
//!
//! ```rust,ignore
//! use folio_db::{ContentDb, Filter, SelectQuery, SqlValue};
//!
//! let db = ContentDb::open("~/.folio/site.sqlite3").await?;
//!
//! let rows = db
//!     .select(
//!         &SelectQuery::table("collection_posts")
//!             .filter(Filter::Eq("status".into(), SqlValue::from("published"))),
//!     )
//!     .await?;
//! ```
//!
//! Content tables are named at runtime by site authors, so every identifier
//! is validated against the allow-list in [`guard`] before it is ever
//! interpolated into SQL. Values always travel as bound parameters.

mod error;
mod guard;
mod query;
mod row;

pub use error::{DbError, Result};
pub use guard::safe_ident;
pub use query::{Filter, JoinQuery, OrderDir, SelectQuery};
pub use row::{FromSqlValue, Row, SqlValue};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::{debug, info};

/// Connections per file-backed pool, enough to serve one full resolver
/// fan-out without queueing.
const POOL_CONNECTIONS: u32 = 8;

/// Shared handle to one site's content database.
///
/// The typed surface only reads; writers (the schema registry, test
/// setup) go through [`ContentDb::pool`]. Cheap to clone; all clones
/// share the same pool.
#[derive(Clone)]
pub struct ContentDb {
    pool: SqlitePool,
}

impl ContentDb {
    /// Open the database at `path`, creating the file and any missing
    /// parent directories on first use.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(POOL_CONNECTIONS)
            .connect_with(options)
            .await?;

        info!(path = %path.display(), "Content database opened");

        Ok(Self { pool })
    }

    /// Open a database that must already exist.
    ///
    /// A missing file is [`DbError::NotFound`]; nothing is created.
    pub async fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(DbError::NotFound(format!(
                "Database not found: {}",
                path.display()
            )));
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(POOL_CONNECTIONS)
            .connect_with(SqliteConnectOptions::new().filename(path))
            .await?;

        Ok(Self { pool })
    }

    /// Open an in-memory database. Mostly useful in tests.
    ///
    /// A single connection keeps every caller on the same database; with more
    /// connections each one would get its own private `:memory:` instance.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    /// The underlying pool, for setup code and the registry's writes.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool and every connection in it.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

// Schema introspection
impl ContentDb {
    /// Whether a table with this exact name exists.
    ///
    /// Names that fail identifier validation report `false` rather than
    /// erroring; a table we would refuse to query might as well not exist.
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let table = match guard::safe_ident(table) {
            Ok(table) => table,
            Err(_) => return Ok(false),
        };

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    /// Column names of a table, in declaration order.
    ///
    /// Returns an empty list for tables that don't exist.
    pub async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let table = guard::safe_ident(table)?;

        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?)")
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        Ok(names)
    }
}

// Read path
impl ContentDb {
    /// Fetch all rows matching a query.
    pub async fn select(&self, query: &SelectQuery) -> Result<Vec<Row>> {
        let (sql, params) = query.build()?;
        debug!(sql = %sql, params = params.len(), "select");

        let rows = bind_values(sqlx::query(&sql), &params)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Row::from_sqlite).collect()
    }

    /// Fetch the first row matching a query, if any.
    pub async fn select_one(&self, query: &SelectQuery) -> Result<Option<Row>> {
        let query = query.clone().limit(1);
        let (sql, params) = query.build()?;
        debug!(sql = %sql, params = params.len(), "select_one");

        let row = bind_values(sqlx::query(&sql), &params)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Row::from_sqlite).transpose()
    }

    /// Count rows matching a query, ignoring its pagination.
    pub async fn count(&self, query: &SelectQuery) -> Result<i64> {
        let (sql, params) = query.build_count()?;
        debug!(sql = %sql, params = params.len(), "count");

        let mut scalar = sqlx::query_scalar::<_, i64>(&sql);
        for value in &params {
            scalar = match value {
                SqlValue::Null => scalar.bind(None::<i64>),
                SqlValue::Integer(v) => scalar.bind(*v),
                SqlValue::Real(v) => scalar.bind(*v),
                SqlValue::Text(v) => scalar.bind(v.clone()),
                SqlValue::Blob(v) => scalar.bind(v.clone()),
            };
        }

        Ok(scalar.fetch_one(&self.pool).await?)
    }

    /// Fetch target rows through a junction table, owner side first.
    pub async fn select_joined(&self, query: &JoinQuery) -> Result<Vec<Row>> {
        let (sql, params) = query.build()?;
        debug!(sql = %sql, "select_joined");

        let rows = bind_values(sqlx::query(&sql), &params)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Row::from_sqlite).collect()
    }
}

fn bind_values<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    params: &'q [SqlValue],
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for value in params {
        query = match value {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Blob(v) => query.bind(v.as_slice()),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_db() -> ContentDb {
        let db = ContentDb::in_memory().await.unwrap();
        sqlx::query(
            r#"
            CREATE TABLE collection_posts (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'published',
                views INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(db.pool())
        .await
        .unwrap();

        for (id, title, status, views) in [
            (1, "Hello", "published", 10),
            (2, "Draft notes", "draft", 0),
            (3, "World", "published", 25),
        ] {
            sqlx::query(
                "INSERT INTO collection_posts (id, title, status, views) VALUES (?, ?, ?, ?)",
            )
            .bind(id)
            .bind(title)
            .bind(status)
            .bind(views)
            .execute(db.pool())
            .await
            .unwrap();
        }

        db
    }

    #[tokio::test]
    async fn test_table_exists_and_columns() {
        let db = seeded_db().await;

        assert!(db.table_exists("collection_posts").await.unwrap());
        assert!(!db.table_exists("collection_missing").await.unwrap());
        // Hostile names are refused, not queried.
        assert!(!db.table_exists("posts; DROP TABLE x").await.unwrap());

        let columns = db.table_columns("collection_posts").await.unwrap();
        assert_eq!(columns, vec!["id", "title", "status", "views"]);
        assert!(db
            .table_columns("collection_missing")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_select_with_filter_and_order() {
        let db = seeded_db().await;

        let rows = db
            .select(
                &SelectQuery::table("collection_posts")
                    .filter(Filter::Eq("status".into(), SqlValue::from("published")))
                    .order_by("views", OrderDir::Desc),
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_by_name::<String>("title").unwrap(), "World");
        assert_eq!(rows[1].get_by_name::<String>("title").unwrap(), "Hello");
    }

    #[tokio::test]
    async fn test_select_one_and_count() {
        let db = seeded_db().await;

        let row = db
            .select_one(
                &SelectQuery::table("collection_posts")
                    .filter(Filter::Eq("id".into(), SqlValue::from(2_i64))),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get_by_name::<String>("status").unwrap(), "draft");

        let missing = db
            .select_one(
                &SelectQuery::table("collection_posts")
                    .filter(Filter::Eq("id".into(), SqlValue::from(99_i64))),
            )
            .await
            .unwrap();
        assert!(missing.is_none());

        let total = db
            .count(
                &SelectQuery::table("collection_posts")
                    .filter(Filter::Eq("status".into(), SqlValue::from("published")))
                    .limit(1),
            )
            .await
            .unwrap();
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn test_select_joined_orders_by_junction_sort() {
        let db = seeded_db().await;

        sqlx::query("CREATE TABLE collection_tags (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query(
            r#"
            CREATE TABLE junction_posts_tags (
                id INTEGER PRIMARY KEY,
                collection_id INTEGER NOT NULL,
                target_id INTEGER NOT NULL,
                sort INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(db.pool())
        .await
        .unwrap();

        for (id, name) in [(1, "rust"), (2, "sqlite"), (3, "cms")] {
            sqlx::query("INSERT INTO collection_tags (id, name) VALUES (?, ?)")
                .bind(id)
                .bind(name)
                .execute(db.pool())
                .await
                .unwrap();
        }
        // Deliberately inserted out of sort order, plus one dangling target.
        for (owner, target, sort) in [(1, 2, 1), (1, 1, 0), (1, 99, 2), (2, 3, 0)] {
            sqlx::query(
                "INSERT INTO junction_posts_tags (collection_id, target_id, sort) VALUES (?, ?, ?)",
            )
            .bind(owner)
            .bind(target)
            .bind(sort)
            .execute(db.pool())
            .await
            .unwrap();
        }

        let rows = db
            .select_joined(
                &JoinQuery::new(
                    "junction_posts_tags",
                    "collection_tags",
                    "collection_id",
                    SqlValue::from(1_i64),
                )
                .order_by_sort(),
            )
            .await
            .unwrap();

        let names: Vec<String> = rows
            .iter()
            .map(|r| r.get_by_name::<String>("name").unwrap())
            .collect();
        assert_eq!(names, vec!["rust", "sqlite"]);
    }
}
