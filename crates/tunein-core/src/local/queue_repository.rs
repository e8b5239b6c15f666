//! Pending mutation queue repository

use std::collections::HashSet;

use crate::error::Result;
use crate::util::unix_timestamp_now;
use crate::models::{EntryId, EntryRecord, Mutation, QueuedMutation};
use libsql::Connection;

/// Trait for the FIFO of unsynced mutations (async)
#[allow(async_fn_in_trait)]
pub trait MutationQueue {
    /// Append a mutation to the tail; returns its sequence number
    async fn enqueue(&self, mutation: &Mutation) -> Result<i64>;

    /// Every decodable mutation, oldest first
    async fn list(&self) -> Result<Vec<QueuedMutation>>;

    /// Oldest decodable mutation, if any
    async fn head(&self) -> Result<Option<QueuedMutation>>;

    /// Remove a mutation after the remote store confirmed it
    async fn acknowledge(&self, seq: i64) -> Result<bool>;

    /// Queued append for an entry that has not reached the remote store
    async fn find_append(&self, id: &EntryId) -> Result<Option<QueuedMutation>>;

    /// Swap the payload of a queued append, keeping its position
    async fn replace_append(&self, entry: &EntryRecord) -> Result<bool>;

    /// Drop the queued append for an entry; returns how many rows went away
    async fn discard_append(&self, id: &EntryId) -> Result<u64>;

    /// Ids with a queued delete (tombstones)
    async fn pending_deletes(&self) -> Result<HashSet<EntryId>>;

    /// Number of queued mutations
    async fn count(&self) -> Result<usize>;

    /// Drop every queued mutation
    async fn clear(&self) -> Result<()>;
}

/// libSQL implementation of `MutationQueue`
pub struct LibSqlMutationQueue<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlMutationQueue<'a> {
    /// Create a new queue view over the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Read the raw columns of a queue row
    fn read_row(row: &libsql::Row) -> Result<RawQueueRow> {
        Ok(RawQueueRow {
            seq: row.get(0)?,
            payload: row.get(1)?,
            enqueued_at: row.get(2)?,
        })
    }

    /// Decode a queue row; undecodable payloads are dropped from the queue
    async fn decode(&self, raw: RawQueueRow) -> Result<Option<QueuedMutation>> {
        match serde_json::from_str::<Mutation>(&raw.payload) {
            Ok(mutation) => Ok(Some(QueuedMutation {
                seq: raw.seq,
                mutation,
                enqueued_at: raw.enqueued_at,
            })),
            Err(error) => {
                tracing::warn!("Dropping corrupt queued mutation #{}: {error}", raw.seq);
                self.acknowledge(raw.seq).await?;
                Ok(None)
            }
        }
    }

    async fn collect(&self, mut rows: libsql::Rows) -> Result<Vec<QueuedMutation>> {
        let mut raw_rows = Vec::new();
        while let Some(row) = rows.next().await? {
            raw_rows.push(Self::read_row(&row)?);
        }
        drop(rows);

        let mut mutations = Vec::with_capacity(raw_rows.len());
        for raw in raw_rows {
            if let Some(mutation) = self.decode(raw).await? {
                mutations.push(mutation);
            }
        }
        Ok(mutations)
    }
}

struct RawQueueRow {
    seq: i64,
    payload: String,
    enqueued_at: i64,
}

impl MutationQueue for LibSqlMutationQueue<'_> {
    async fn enqueue(&self, mutation: &Mutation) -> Result<i64> {
        let payload = serde_json::to_string(mutation)?;
        let mut rows = self
            .conn
            .query(
                "INSERT INTO pending_mutations (kind, entry_id, payload, enqueued_at)
                 VALUES (?, ?, ?, ?)
                 RETURNING seq",
                libsql::params![
                    mutation.kind(),
                    mutation.entry_id().as_str(),
                    payload,
                    unix_timestamp_now()
                ],
            )
            .await?;

        let seq = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => {
                return Err(crate::Error::Database(
                    "queue insert returned no sequence number".to_string(),
                ))
            }
        };
        tracing::debug!("Queued {} for entry {} as #{seq}", mutation.kind(), mutation.entry_id());
        Ok(seq)
    }

    async fn list(&self) -> Result<Vec<QueuedMutation>> {
        let rows = self
            .conn
            .query(
                "SELECT seq, payload, enqueued_at FROM pending_mutations ORDER BY seq ASC",
                (),
            )
            .await?;
        self.collect(rows).await
    }

    async fn head(&self) -> Result<Option<QueuedMutation>> {
        loop {
            let mut rows = self
                .conn
                .query(
                    "SELECT seq, payload, enqueued_at FROM pending_mutations ORDER BY seq ASC LIMIT 1",
                    (),
                )
                .await?;

            let Some(row) = rows.next().await? else {
                return Ok(None);
            };
            let raw = Self::read_row(&row)?;
            drop(rows);

            // A corrupt head is dropped by decode; look at the next one
            if let Some(mutation) = self.decode(raw).await? {
                return Ok(Some(mutation));
            }
        }
    }

    async fn acknowledge(&self, seq: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM pending_mutations WHERE seq = ?", [seq])
            .await?;
        Ok(affected > 0)
    }

    async fn find_append(&self, id: &EntryId) -> Result<Option<QueuedMutation>> {
        let rows = self
            .conn
            .query(
                "SELECT seq, payload, enqueued_at FROM pending_mutations
                 WHERE entry_id = ? AND kind = 'append'
                 ORDER BY seq ASC",
                [id.as_str()],
            )
            .await?;
        Ok(self.collect(rows).await?.into_iter().next())
    }

    async fn replace_append(&self, entry: &EntryRecord) -> Result<bool> {
        let payload = serde_json::to_string(&Mutation::Append(entry.clone()))?;
        let affected = self
            .conn
            .execute(
                "UPDATE pending_mutations SET payload = ?
                 WHERE entry_id = ? AND kind = 'append'",
                [payload, entry.id.as_str()],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn discard_append(&self, id: &EntryId) -> Result<u64> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM pending_mutations WHERE entry_id = ? AND kind = 'append'",
                [id.as_str()],
            )
            .await?;
        Ok(affected)
    }

    async fn pending_deletes(&self) -> Result<HashSet<EntryId>> {
        let mut rows = self
            .conn
            .query(
                "SELECT entry_id FROM pending_mutations WHERE kind = 'delete'",
                (),
            )
            .await?;

        let mut ids = HashSet::new();
        while let Some(row) = rows.next().await? {
            let raw: String = row.get(0)?;
            if let Ok(id) = raw.parse() {
                ids.insert(id);
            }
        }
        Ok(ids)
    }

    async fn count(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM pending_mutations", ())
            .await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM pending_mutations", ()).await?;
        Ok(())
    }
}
