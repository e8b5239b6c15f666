//! Entry cache repository

use crate::error::Result;
use crate::models::{sort_newest_first, EntryId, EntryRecord, Mood, SyncState};
use libsql::{Connection, Value};

/// Trait for entry cache operations (async)
#[allow(async_fn_in_trait)]
pub trait EntryRepository {
    /// Insert or replace an entry by id
    async fn put(&self, entry: &EntryRecord) -> Result<()>;

    /// Get an entry by ID
    async fn get(&self, id: &EntryId) -> Result<Option<EntryRecord>>;

    /// Every cached entry, newest first; undecodable rows are skipped
    async fn list_all(&self) -> Result<Vec<EntryRecord>>;

    /// Remove an entry; returns whether a row existed
    async fn remove(&self, id: &EntryId) -> Result<bool>;

    /// Delete every cached entry
    async fn clear(&self) -> Result<()>;
}

/// libSQL implementation of `EntryRepository`
pub struct LibSqlEntryRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlEntryRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an entry from a database row.
    ///
    /// Returns `Ok(None)` for rows whose id cannot be decoded.
    fn parse_entry(row: &libsql::Row) -> Result<Option<EntryRecord>> {
        let raw_id: String = row.get(0)?;
        let Ok(id) = raw_id.parse::<EntryId>() else {
            tracing::warn!("Skipping cached entry with corrupt id {raw_id:?}");
            return Ok(None);
        };

        let mood = row.get::<Option<String>>(2)?.and_then(|label| {
            let mood = Mood::from_label(&label);
            if mood.is_none() {
                tracing::warn!("Ignoring unknown mood label {label:?} on entry {id}");
            }
            mood
        });

        let raw_state: String = row.get(5)?;
        let sync_state = SyncState::parse(&raw_state).unwrap_or_else(|| {
            tracing::warn!("Unknown sync state {raw_state:?} on entry {id}; treating as pending");
            SyncState::Pending
        });

        Ok(Some(EntryRecord {
            id,
            content: row.get(1)?,
            mood,
            reflection: row.get(3)?,
            timestamp: row.get(4)?,
            sync_state,
        }))
    }
}

pub(crate) fn optional_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

impl EntryRepository for LibSqlEntryRepository<'_> {
    async fn put(&self, entry: &EntryRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO entries (id, content, mood, reflection, timestamp, sync_state)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    content = excluded.content,
                    mood = excluded.mood,
                    reflection = excluded.reflection,
                    timestamp = excluded.timestamp,
                    sync_state = excluded.sync_state",
                libsql::params![
                    entry.id.as_str(),
                    entry.content.clone(),
                    optional_text(entry.mood.map(Mood::label)),
                    optional_text(entry.reflection.as_deref()),
                    entry.timestamp,
                    entry.sync_state.as_str()
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &EntryId) -> Result<Option<EntryRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, content, mood, reflection, timestamp, sync_state
                 FROM entries WHERE id = ?",
                [id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Self::parse_entry(&row),
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<EntryRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, content, mood, reflection, timestamp, sync_state
                 FROM entries
                 ORDER BY timestamp DESC",
                (),
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            if let Some(entry) = Self::parse_entry(&row)? {
                entries.push(entry);
            }
        }
        sort_newest_first(&mut entries);
        Ok(entries)
    }

    async fn remove(&self, id: &EntryId) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM entries WHERE id = ?", [id.as_str()])
            .await?;
        Ok(affected > 0)
    }

    async fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM entries", ()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::Database;
    use crate::models::EntryDraft;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn entry_at(content: &str, timestamp: i64) -> EntryRecord {
        EntryRecord {
            timestamp,
            ..EntryRecord::from_draft(EntryDraft::new(content))
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_and_get_roundtrip() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let entry = EntryRecord {
            reflection: Some("A calm day.".to_string()),
            ..EntryRecord::from_draft(
                EntryDraft::new("How do you feel?\n\nRested").with_mood(Mood::Calm),
            )
        };
        repo.put(&entry).await.unwrap();

        let fetched = repo.get(&entry.id).await.unwrap().unwrap();
        assert_eq!(fetched, entry);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_is_idempotent_upsert() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let entry = entry_at("first", 100);
        repo.put(&entry).await.unwrap();
        repo.put(&entry).await.unwrap();
        repo.put(&entry.clone().into_synced()).await.unwrap();

        let all = repo.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].sync_state, SyncState::Synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_all_newest_first() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        repo.put(&entry_at("old", 100)).await.unwrap();
        repo.put(&entry_at("new", 300)).await.unwrap();
        repo.put(&entry_at("middle", 200)).await.unwrap();

        let contents = repo
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.content)
            .collect::<Vec<_>>();
        assert_eq!(contents, vec!["new", "middle", "old"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_corrupt_rows_are_skipped() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());
        repo.put(&entry_at("good", 100)).await.unwrap();

        db.connection()
            .execute(
                "INSERT INTO entries (id, content, mood, timestamp, sync_state)
                 VALUES ('not-a-uuid', 'bad', 'Happy', 50, 'pending')",
                (),
            )
            .await
            .unwrap();
        db.connection()
            .execute(
                "INSERT INTO entries (id, content, mood, timestamp, sync_state)
                 VALUES ('018f3a4e-0000-7000-8000-000000000001', 'odd mood', 'Ecstatic', 40, 'weird')",
                (),
            )
            .await
            .unwrap();

        let all = repo.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
        let odd = all.iter().find(|entry| entry.content == "odd mood").unwrap();
        assert_eq!(odd.mood, None);
        assert_eq!(odd.sync_state, SyncState::Pending);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remove_and_clear() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let first = entry_at("first", 100);
        let second = entry_at("second", 200);
        repo.put(&first).await.unwrap();
        repo.put(&second).await.unwrap();

        assert!(repo.remove(&second.id).await.unwrap());
        assert!(!repo.remove(&second.id).await.unwrap());

        repo.clear().await.unwrap();
        assert!(repo.list_all().await.unwrap().is_empty());
    }
}
