//! Database connection management

use crate::error::Result;
use libsql::params::IntoParams;
use libsql::{Builder, Connection, Database as LibSqlDatabase, Transaction, Value};
use std::path::Path;

use super::migrations;

/// Database wrapper for the local libSQL store
///
/// Created once at startup and handed to whoever needs it; there is no
/// process-wide handle.
pub struct Database {
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open a local database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        let conn = db.connect()?;

        let database = Self { _db: db, conn };
        database.configure().await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        let conn = db.connect()?;

        let database = Self { _db: db, conn };
        database.configure().await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Configure `SQLite` for durability and concurrency
    async fn configure(&self) -> Result<()> {
        // In-memory databases reject WAL; ignore it there
        self.conn
            .execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA synchronous = NORMAL;", ())
            .await
            .ok();
        self.conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
        Ok(())
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn).await
    }

    /// Run a query and collect every row as owned column values
    ///
    /// Each row is read out before the cursor advances.
    pub async fn query(&self, sql: &str, params: impl IntoParams) -> Result<Vec<Vec<Value>>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut collected = Vec::new();
        while let Some(row) = rows.next().await? {
            let values = (0..row.column_count())
                .map(|index| row.get_value(index))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            collected.push(values);
        }
        Ok(collected)
    }

    /// Execute a mutating statement, returning the number of affected rows
    ///
    /// Outside an explicit transaction the change is durable on return.
    pub async fn execute(&self, sql: &str, params: impl IntoParams) -> Result<u64> {
        Ok(self.conn.execute(sql, params).await?)
    }

    /// Begin a transaction
    ///
    /// All effects commit together on `commit()`; dropping the handle without
    /// committing rolls everything back.
    pub async fn transaction(&self) -> Result<Transaction> {
        Ok(self.conn.transaction().await?)
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
