//! Durable local entry cache and mutation queue.
//!
//! Reads never fail: a cache that cannot be decoded is reported as
//! `CorruptLocalState` in the logs and treated as empty, so the app keeps
//! working against the remote store alone. Writes return errors so the
//! caller can decide what a lost local write means.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libsql::Connection;
use tokio::sync::Mutex;

use super::{
    Database, EntryRepository, LibSqlEntryRepository, LibSqlMutationQueue, MutationQueue,
};
use crate::models::{EntryId, EntryRecord, Mutation, QueuedMutation};
use crate::{Error, Result};

/// Thread-safe handle to the local cache; cheap to clone.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open the store at the given filesystem path.
    ///
    /// A file that is not a database is moved aside and recreated empty.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path).await {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local journal at {} is unreadable ({}); starting with an empty cache",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path).await?
            }
            Err(error) => return Err(error),
        };

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    fn is_corrupted_db_error(error: &Error) -> bool {
        let message = error.to_string().to_ascii_lowercase();
        message.contains("file is not a database") || message.contains("malformed")
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let base_name = db_path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("tunein.db");
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local DB file from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };
        let sidecar_prefix = format!("{base_name}-");

        for entry in std::fs::read_dir(parent)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with(&sidecar_prefix) {
                let path = entry.path();
                std::fs::remove_file(&path)?;
                tracing::warn!("Removed stale local DB file {}", path.display());
            }
        }

        Ok(())
    }

    async fn reopen_after_corruption(&self) -> Result<bool> {
        let Some(db_path) = self.db_path.clone() else {
            return Ok(false);
        };

        let mut db = self.db.lock().await;
        let placeholder = Database::open_in_memory().await?;
        let _old = std::mem::replace(&mut *db, placeholder);

        Self::quarantine_corrupted_db_files(&db_path)?;
        *db = Database::open(&db_path).await?;
        Ok(true)
    }

    /// Log a failed read and recover the file if it is corrupt.
    async fn absorb_read_failure(&self, what: &str, error: &Error) {
        tracing::warn!(
            "{}",
            Error::CorruptLocalState(format!("failed to read {what}: {error}"))
        );
        if Self::is_corrupted_db_error(error) {
            if let Err(reopen_error) = self.reopen_after_corruption().await {
                tracing::error!("Failed to recover local journal: {reopen_error}");
            }
        }
    }

    /// Insert or replace an entry by id.
    pub async fn put(&self, entry: &EntryRecord) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection()).put(entry).await
    }

    /// Fetch a cached entry by id.
    pub async fn get(&self, id: &EntryId) -> Result<Option<EntryRecord>> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection()).get(id).await
    }

    /// Every cached entry, newest first; empty when the cache is unreadable.
    pub async fn get_all(&self) -> Vec<EntryRecord> {
        let result = {
            let db = self.db.lock().await;
            LibSqlEntryRepository::new(db.connection()).list_all().await
        };

        match result {
            Ok(entries) => entries,
            Err(error) => {
                self.absorb_read_failure("cached entries", &error).await;
                Vec::new()
            }
        }
    }

    /// Remove an entry from the cache.
    pub async fn remove(&self, id: &EntryId) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection()).remove(id).await
    }

    /// Append a mutation to the tail of the queue.
    pub async fn enqueue(&self, mutation: &Mutation) -> Result<i64> {
        let db = self.db.lock().await;
        LibSqlMutationQueue::new(db.connection())
            .enqueue(mutation)
            .await
    }

    /// Every queued mutation, oldest first; empty when unreadable.
    pub async fn pending_mutations(&self) -> Vec<QueuedMutation> {
        let result = {
            let db = self.db.lock().await;
            LibSqlMutationQueue::new(db.connection()).list().await
        };

        match result {
            Ok(mutations) => mutations,
            Err(error) => {
                self.absorb_read_failure("pending mutations", &error).await;
                Vec::new()
            }
        }
    }

    /// Oldest queued mutation. It stays queued until [`Self::acknowledge`].
    pub async fn next_mutation(&self) -> Result<Option<QueuedMutation>> {
        let db = self.db.lock().await;
        LibSqlMutationQueue::new(db.connection()).head().await
    }

    /// Remove a mutation once the remote store confirmed it.
    pub async fn acknowledge(&self, seq: i64) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlMutationQueue::new(db.connection())
            .acknowledge(seq)
            .await
    }

    /// Queued append for an entry that never reached the remote store.
    pub async fn pending_append_for(&self, id: &EntryId) -> Result<Option<QueuedMutation>> {
        let db = self.db.lock().await;
        LibSqlMutationQueue::new(db.connection())
            .find_append(id)
            .await
    }

    /// Ids with a queued delete; empty when unreadable.
    pub async fn pending_deletes(&self) -> HashSet<EntryId> {
        let result = {
            let db = self.db.lock().await;
            LibSqlMutationQueue::new(db.connection())
                .pending_deletes()
                .await
        };

        match result {
            Ok(ids) => ids,
            Err(error) => {
                self.absorb_read_failure("pending deletes", &error).await;
                HashSet::new()
            }
        }
    }

    /// Number of queued mutations; zero when unreadable.
    pub async fn pending_count(&self) -> usize {
        let result = {
            let db = self.db.lock().await;
            LibSqlMutationQueue::new(db.connection()).count().await
        };

        match result {
            Ok(count) => count,
            Err(error) => {
                self.absorb_read_failure("queue length", &error).await;
                0
            }
        }
    }

    /// Persist a new pending entry and queue its append in one transaction.
    pub async fn record_append(&self, entry: &EntryRecord) -> Result<i64> {
        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute("BEGIN TRANSACTION", ()).await?;
        let outcome = async {
            LibSqlEntryRepository::new(conn).put(entry).await?;
            LibSqlMutationQueue::new(conn)
                .enqueue(&Mutation::Append(entry.clone()))
                .await
        }
        .await;
        finish_transaction(conn, outcome).await
    }

    /// Update a pending entry and the payload of its queued append together.
    pub async fn update_pending(&self, entry: &EntryRecord) -> Result<bool> {
        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute("BEGIN TRANSACTION", ()).await?;
        let outcome = async {
            LibSqlEntryRepository::new(conn).put(entry).await?;
            LibSqlMutationQueue::new(conn).replace_append(entry).await
        }
        .await;
        finish_transaction(conn, outcome).await
    }

    /// Remove an entry from the cache and queue a delete tombstone.
    pub async fn record_delete(&self, id: &EntryId) -> Result<i64> {
        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute("BEGIN TRANSACTION", ()).await?;
        let outcome = async {
            LibSqlEntryRepository::new(conn).remove(id).await?;
            LibSqlMutationQueue::new(conn)
                .enqueue(&Mutation::Delete(*id))
                .await
        }
        .await;
        finish_transaction(conn, outcome).await
    }

    /// Forget an entry that only ever existed locally: drop the cache row and
    /// its queued append. Returns whether an append was discarded.
    pub async fn discard_unsynced(&self, id: &EntryId) -> Result<bool> {
        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute("BEGIN TRANSACTION", ()).await?;
        let outcome = async {
            LibSqlEntryRepository::new(conn).remove(id).await?;
            LibSqlMutationQueue::new(conn).discard_append(id).await
        }
        .await;
        finish_transaction(conn, outcome).await.map(|discarded| discarded > 0)
    }

    /// Replace a local copy with the remote store's authoritative one and
    /// retire its queued append.
    pub async fn mark_synced(&self, remote_copy: &EntryRecord) -> Result<()> {
        let synced = remote_copy.clone().into_synced();
        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute("BEGIN TRANSACTION", ()).await?;
        let outcome = async {
            LibSqlEntryRepository::new(conn).put(&synced).await?;
            LibSqlMutationQueue::new(conn)
                .discard_append(&synced.id)
                .await
                .map(|_| ())
        }
        .await;
        finish_transaction(conn, outcome).await
    }

    /// Cache remote rows as synced without touching the queue.
    pub async fn cache_synced(&self, entries: &[EntryRecord]) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute("BEGIN TRANSACTION", ()).await?;
        let outcome = async {
            let repo = LibSqlEntryRepository::new(conn);
            for entry in entries {
                repo.put(&entry.clone().into_synced()).await?;
            }
            Ok(())
        }
        .await;
        finish_transaction(conn, outcome).await
    }

    /// Wipe the cache and the queue.
    pub async fn clear(&self) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute("BEGIN TRANSACTION", ()).await?;
        let outcome = async {
            LibSqlEntryRepository::new(conn).clear().await?;
            LibSqlMutationQueue::new(conn).clear().await
        }
        .await;
        finish_transaction(conn, outcome).await?;
        tracing::info!("Cleared local journal cache and pending queue");
        Ok(())
    }
}

async fn finish_transaction<T>(conn: &Connection, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            if let Err(error) = conn.execute("COMMIT", ()).await {
                conn.execute("ROLLBACK", ()).await.ok();
                return Err(error.into());
            }
            Ok(value)
        }
        Err(error) => {
            conn.execute("ROLLBACK", ()).await.ok();
            Err(error)
        }
    }
}
