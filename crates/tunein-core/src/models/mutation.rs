//! Queued offline mutations

use serde::{Deserialize, Serialize};

use super::{EntryId, EntryRecord};

/// A write that still has to be replayed against the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Mutation {
    /// Store the entry remotely (replayed as an upsert)
    Append(EntryRecord),
    /// Remove the entry remotely; also keeps stale remote copies hidden
    Delete(EntryId),
}

impl Mutation {
    /// Entry this mutation applies to
    #[must_use]
    pub const fn entry_id(&self) -> EntryId {
        match self {
            Self::Append(entry) => entry.id,
            Self::Delete(id) => *id,
        }
    }

    /// Stable kind name stored in the queue table
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Append(_) => "append",
            Self::Delete(_) => "delete",
        }
    }
}

/// A mutation as stored in the queue, with its position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMutation {
    /// Queue position; lower is older
    pub seq: i64,
    pub mutation: Mutation,
    /// When the mutation was enqueued (Unix seconds)
    pub enqueued_at: i64,
}
