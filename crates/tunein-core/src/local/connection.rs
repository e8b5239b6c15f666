//! libSQL handle for the journal cache

use std::path::Path;

use libsql::{Builder, Connection, Database as LibSqlDatabase};

use super::migrations;
use crate::error::Result;

/// Settings for a single-process cache. Failures are tolerated because
/// in-memory databases refuse WAL.
const BEST_EFFORT_PRAGMAS: [&str; 2] = ["PRAGMA journal_mode = WAL", "PRAGMA synchronous = NORMAL"];

/// Open libSQL database plus the one connection every repository shares.
pub struct Database {
    // Dropping the database closes the connection
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open (or create) the cache file and bring its schema up to date.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let location = path.as_ref().to_string_lossy().into_owned();
        Self::connect(Builder::new_local(location).build().await?).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        Self::connect(Builder::new_local(":memory:").build().await?).await
    }

    async fn connect(db: LibSqlDatabase) -> Result<Self> {
        let conn = db.connect()?;
        for pragma in BEST_EFFORT_PRAGMAS {
            if let Err(error) = conn.execute(pragma, ()).await {
                tracing::debug!("Skipped `{pragma}`: {error}");
            }
        }
        migrations::run(&conn).await?;

        Ok(Self { _db: db, conn })
    }

    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
