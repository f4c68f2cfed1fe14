//! SQLite-backed record store for the `data` role.
//!
//! One append-only table. Statements are prepared once per connection and
//! reused through `prepare_cached`. Every call runs on the blocking pool so
//! the async workers never stall on disk I/O.

use crate::domain::envelope::Token;
use crate::domain::error::StoreError;
use crate::ports::outbound::RecordStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const CREATE_RECORDS: &str = "
    CREATE TABLE IF NOT EXISTS records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        token INTEGER NOT NULL,
        text TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_records_token ON records(token);
";

const INSERT_RECORD: &str = "INSERT INTO records (token, text) VALUES (?1, ?2)";

const SELECT_FIRST: &str = "SELECT text FROM records WHERE token = ?1 ORDER BY id LIMIT 1";

/// Record store over a single SQLite connection.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    location: String,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| StoreError::Open(e.to_string()))?;

        // WAL lets the HTTP read path run while a worker writes
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| StoreError::Open(e.to_string()))?;

        info!(path = %path.display(), "Opened record store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: path.display().to_string(),
        })
    }

    /// Private in-memory database, lost on drop.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: ":memory:".to_string(),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard).map_err(StoreError::from)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

// SQLite integers are signed; tokens are stored bit-for-bit.
fn to_sql(token: Token) -> i64 {
    token.get() as i64
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| conn.execute_batch(CREATE_RECORDS))
            .await?;
        debug!(location = %self.location, "Record table ready");
        Ok(())
    }

    async fn insert(&self, token: Token, text: &str) -> Result<i64, StoreError> {
        let text = text.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(INSERT_RECORD)?;
            stmt.execute(rusqlite::params![to_sql(token), text])?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn select_first(&self, token: Token) -> Result<Option<String>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(SELECT_FIRST)?;
            let text: Option<Option<String>> = stmt
                .query_row([to_sql(token)], |row| row.get(0))
                .optional()?;
            Ok(text.flatten())
        })
        .await
    }

    async fn ping(&self) -> bool {
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await
            .is_ok()
    }
}
