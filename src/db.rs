use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::models::LocalDb;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("database error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("stored data under \"{key}\" is not valid: {source}")]
    Corrupt {
        key: String,
        source: serde_json::Error,
    },

    #[error("could not serialize data: {0}")]
    Serialize(serde_json::Error),
}

/// Persistence boundary for the whole [`LocalDb`].
///
/// Implementations hand out a fresh copy on `load` and replace everything on
/// `save`; there are no partial updates.
pub trait Store {
    fn load(&self) -> Result<LocalDb, StoreError>;
    fn save(&self, db: &LocalDb) -> Result<(), StoreError>;
}

/// Keeps the JSON document in a single row of an SQLite key-value table.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
    key: String,
}

impl SqliteStore {
    pub fn open(path: &Path, key: impl Into<String>) -> Result<Self, StoreError> {
        let pool = init_db(path)?;
        Ok(Self {
            pool,
            key: key.into(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Store for SqliteStore {
    fn load(&self) -> Result<LocalDb, StoreError> {
        let conn = self.pool.get()?;
        match read_value(&conn, &self.key)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                key: self.key.clone(),
                source,
            }),
            None => Ok(LocalDb::default()),
        }
    }

    fn save(&self, db: &LocalDb) -> Result<(), StoreError> {
        let raw = serde_json::to_string(db).map_err(StoreError::Serialize)?;
        let conn = self.pool.get()?;
        write_value(&conn, &self.key, &raw)?;
        Ok(())
    }
}

pub fn init_db(path: &Path) -> Result<DbPool, StoreError> {
    let manager = SqliteConnectionManager::file(path);
    let pool = Pool::new(manager)?;
    {
        let conn = pool.get()?;
        run_migrations(&conn)?;
    }
    Ok(pool)
}

fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )
}

fn read_value(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM kv_store WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

fn write_value(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "
        INSERT INTO kv_store (key, value) VALUES (?1, ?2)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        ",
        params![key, value],
    )?;
    Ok(())
}
