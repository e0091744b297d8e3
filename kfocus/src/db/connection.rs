use std::path::Path;
use std::sync::Arc;

use libsql::{Builder, Connection};

use crate::error::Result;

use super::schema;

pub struct Database {
    pub(crate) db: Arc<libsql::Database>,
    pub(crate) busy_timeout_ms: u64,
}

impl Database {
    /// Open (or create) the local metadata database, apply the pragma set
    /// and initialize the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        let busy_timeout_ms = std::env::var("DATABASE_BUSY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(5000);

        let db = Builder::new_local(path).build().await?;

        let database = Self {
            db: Arc::new(db),
            busy_timeout_ms,
        };
        database.configure().await?;
        database.init_schema().await?;

        Ok(database)
    }

    /// In-memory database for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        let database = Self {
            db: Arc::new(db),
            busy_timeout_ms: 5000,
        };
        database.configure().await?;
        database.init_schema().await?;
        Ok(database)
    }

    pub fn connect(&self) -> Result<Connection> {
        Ok(self.db.connect()?)
    }

    async fn configure(&self) -> Result<()> {
        let conn = self.connect()?;

        let busy_timeout_sql = format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms);
        if let Err(error) = conn.execute_batch(&busy_timeout_sql).await {
            tracing::warn!(
                busy_timeout_ms = self.busy_timeout_ms,
                error = %error,
                "Failed to set SQLite busy_timeout"
            );
        }

        // WAL + NORMAL is the concurrency discipline: short write
        // transactions, long computations outside the write path.
        for pragma in [
            "PRAGMA journal_mode = WAL",
            "PRAGMA synchronous = NORMAL",
            "PRAGMA foreign_keys = ON",
        ] {
            if let Err(error) = conn.execute_batch(pragma).await {
                tracing::warn!(pragma, error = %error, "Failed to apply SQLite pragma");
            }
        }

        Ok(())
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        schema::init_schema(&conn).await?;
        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            busy_timeout_ms: self.busy_timeout_ms,
        }
    }
}
