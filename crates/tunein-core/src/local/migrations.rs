//! Schema for the journal cache, versioned with `PRAGMA user_version`.

use libsql::Connection;

use crate::error::Result;

/// Ordered schema steps; index + 1 is the version each one produces.
const MIGRATIONS: &[&[&str]] = &[
    // v1: entry cache and mutation queue
    &[
        // Full known entry set; timestamps are Unix seconds
        "CREATE TABLE IF NOT EXISTS entries (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            mood TEXT,
            reflection TEXT,
            timestamp INTEGER NOT NULL,
            sync_state TEXT NOT NULL DEFAULT 'pending'
        )",
        "CREATE INDEX IF NOT EXISTS idx_entries_timestamp ON entries(timestamp DESC, id DESC)",
        "CREATE INDEX IF NOT EXISTS idx_entries_sync_state ON entries(sync_state)",
        // FIFO of unsynced appends and deletes
        "CREATE TABLE IF NOT EXISTS pending_mutations (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            entry_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            enqueued_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_pending_mutations_entry ON pending_mutations(entry_id)",
    ],
];

/// Latest schema version this build knows about
#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
pub const SCHEMA_VERSION: i64 = MIGRATIONS.len() as i64;

/// Bring the schema up to [`SCHEMA_VERSION`].
///
/// Each step runs in its own transaction together with the version bump.
pub async fn run(conn: &Connection) -> Result<()> {
    let current = schema_version(conn).await?;

    for (version, statements) in (1_i64..).zip(MIGRATIONS.iter()) {
        if version <= current {
            continue;
        }
        apply(conn, version, statements).await?;
        tracing::info!("Local journal schema migrated to v{version}");
    }

    Ok(())
}

pub async fn schema_version(conn: &Connection) -> Result<i64> {
    let mut rows = conn.query("PRAGMA user_version", ()).await?;
    match rows.next().await? {
        Some(row) => Ok(row.get::<i64>(0)?),
        None => Ok(0),
    }
}

async fn apply(conn: &Connection, version: i64, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    let bump = format!("PRAGMA user_version = {version}");
    for statement in statements.iter().copied().chain(std::iter::once(bump.as_str())) {
        if let Err(error) = conn.execute(statement, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(error.into());
        }
    }

    if let Err(error) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(error.into());
    }
    Ok(())
}
